//! Signing and verification of every bearer token the service issues.
//!
//! One envelope ([`Claims`]) carries the registered claims; the payload is a
//! tagged [`TokenPayload`] so admin, share, guest and reset tokens share one
//! signing path and are told apart by their `kind`. The codec is pure: it never
//! consults revocation state.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::models::AuthMethod;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum TokenError {
    #[error("token expired")]
    Expired,
    #[error("token malformed")]
    Malformed,
    #[error("token claims invalid")]
    Invalid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenUse {
    Access,
    Refresh,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminClaims {
    pub sub: Uuid,
    pub role: String,
    /// Lineage id shared by every token minted from one login.
    pub session_id: String,
    /// Device fingerprint hash.
    pub fph: String,
    pub token_use: TokenUse,
    #[serde(default)]
    pub permissions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareClaims {
    pub project_id: Uuid,
    pub session_id: String,
    pub method: AuthMethod,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuestClaims {
    pub project_id: Uuid,
    pub session_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TokenPayload {
    Admin(AdminClaims),
    Share(ShareClaims),
    Guest(GuestClaims),
    ResetPassword { sub: Uuid, email: String },
}

impl TokenPayload {
    pub fn kind(&self) -> &'static str {
        match self {
            TokenPayload::Admin(_) => "admin",
            TokenPayload::Share(_) => "share",
            TokenPayload::Guest(_) => "guest",
            TokenPayload::ResetPassword { .. } => "reset_password",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub jti: String,
    pub iat: i64,
    pub exp: i64,
    #[serde(flatten)]
    pub payload: TokenPayload,
}

impl Claims {
    pub fn expires_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.exp, 0).unwrap_or_else(Utc::now)
    }

    /// Seconds until expiry, never below one so it can arm a store TTL.
    pub fn remaining_seconds(&self) -> u64 {
        (self.exp - Utc::now().timestamp()).max(1) as u64
    }

    /// Short prefix of the token id, safe for logs.
    pub fn short_id(&self) -> &str {
        self.jti.get(..8).unwrap_or(&self.jti)
    }
}

#[derive(Debug)]
pub struct SignedToken {
    pub token: String,
    pub claims: Claims,
}

#[derive(Clone)]
pub struct TokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    algorithm: Algorithm,
}

impl TokenCodec {
    /// HS256 codec keyed by the server secret. An empty secret is a startup error.
    pub fn new(secret: &SecretString) -> Result<Self, anyhow::Error> {
        let secret = secret.expose_secret();
        if secret.is_empty() {
            return Err(anyhow::anyhow!("token signing secret is not configured"));
        }

        tracing::info!("Token codec initialized with HS256");

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            algorithm: Algorithm::HS256,
        })
    }

    pub fn sign(&self, payload: TokenPayload, ttl: Duration) -> Result<SignedToken, anyhow::Error> {
        let now = Utc::now();
        let claims = Claims {
            jti: Uuid::new_v4().to_string(),
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
            payload,
        };

        let token = encode(&Header::new(self.algorithm), &claims, &self.encoding_key)
            .map_err(|e| anyhow::anyhow!("Failed to encode {} token: {}", claims.payload.kind(), e))?;

        Ok(SignedToken { token, claims })
    }

    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        let mut validation = Validation::new(self.algorithm);
        validation.validate_exp = true;
        validation.leeway = 0;

        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| {
                let kind = match e.kind() {
                    ErrorKind::ExpiredSignature => TokenError::Expired,
                    ErrorKind::Json(_) | ErrorKind::MissingRequiredClaim(_) => TokenError::Invalid,
                    _ => TokenError::Malformed,
                };
                tracing::debug!(error = %kind, "Token verification failed");
                kind
            })
    }
}
