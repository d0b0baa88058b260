use axum_extra::extract::cookie::{Cookie, SameSite};

use crate::services::share_access::SHARE_SESSION_COOKIE;

pub const ADMIN_REFRESH_COOKIE: &str = "admin_refresh";
const ADMIN_REFRESH_PATH: &str = "/auth";

pub fn share_session_cookie(session_id: String, max_age_seconds: u64, secure: bool) -> Cookie<'static> {
    Cookie::build((SHARE_SESSION_COOKIE, session_id))
        .path("/")
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .max_age(time::Duration::seconds(max_age_seconds as i64))
        .build()
}

pub fn share_session_removal() -> Cookie<'static> {
    Cookie::build((SHARE_SESSION_COOKIE, "")).path("/").build()
}

pub fn admin_refresh_cookie(token: String, max_age_seconds: i64, secure: bool) -> Cookie<'static> {
    Cookie::build((ADMIN_REFRESH_COOKIE, token))
        .path(ADMIN_REFRESH_PATH)
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Strict)
        .max_age(time::Duration::seconds(max_age_seconds.max(0)))
        .build()
}

pub fn admin_refresh_removal() -> Cookie<'static> {
    Cookie::build((ADMIN_REFRESH_COOKIE, ""))
        .path(ADMIN_REFRESH_PATH)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_share_cookie_attributes() {
        let cookie = share_session_cookie("abc".to_string(), 86_400, true);
        assert_eq!(cookie.name(), SHARE_SESSION_COOKIE);
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.secure(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Lax));
        assert_eq!(cookie.max_age(), Some(time::Duration::seconds(86_400)));
        assert_eq!(cookie.path(), Some("/"));
    }

    #[test]
    fn test_refresh_cookie_is_scoped_to_auth_routes() {
        let cookie = admin_refresh_cookie("r".to_string(), 60, false);
        assert_eq!(cookie.path(), Some("/auth"));
        assert_eq!(cookie.same_site(), Some(SameSite::Strict));
        assert_eq!(cookie.secure(), Some(false));
    }
}
