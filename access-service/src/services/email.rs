use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    Message, SmtpTransport, Transport,
};
use secrecy::ExposeSecret;
use service_core::error::AppError;
use std::sync::Mutex;
use std::time::Duration;

use crate::config::SmtpConfig;

#[async_trait]
pub trait EmailProvider: Send + Sync {
    async fn send_otp_code(
        &self,
        to_email: &str,
        project_title: &str,
        code: &str,
        expiry_minutes: i64,
    ) -> Result<(), AppError>;

    async fn send_password_reset_email(
        &self,
        to_email: &str,
        reset_token: &str,
        base_url: &str,
    ) -> Result<(), AppError>;
}

#[derive(Clone)]
pub struct EmailService {
    mailer: SmtpTransport,
    from_email: String,
}

impl EmailService {
    pub fn new(config: &SmtpConfig) -> Result<Self, AppError> {
        let creds = Credentials::new(
            config.user.clone(),
            config.password.expose_secret().to_string(),
        );

        let mailer = SmtpTransport::starttls_relay(&config.host)
            .map_err(|e| AppError::InternalError(anyhow::anyhow!(e.to_string())))?
            .credentials(creds)
            .port(config.port)
            .timeout(Some(Duration::from_secs(10)))
            .build();

        tracing::info!(host = %config.host, "Email service initialized");

        Ok(Self {
            mailer,
            from_email: config.from_address.clone(),
        })
    }

    async fn send_email(
        &self,
        to_email: &str,
        subject: &str,
        plain_body: String,
        html_body: String,
    ) -> Result<(), AppError> {
        let email = Message::builder()
            .from(
                self.from_email
                    .parse()
                    .map_err(|e: lettre::address::AddressError| AppError::InternalError(e.into()))?,
            )
            .to(to_email
                .parse()
                .map_err(|e: lettre::address::AddressError| AppError::BadRequest(e.into()))?)
            .subject(subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(plain_body),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(html_body),
                    ),
            )
            .map_err(|e| AppError::EmailError(e.to_string()))?;

        // SmtpTransport blocks.
        let mailer = self.mailer.clone();
        let result = tokio::task::spawn_blocking(move || mailer.send(&email))
            .await
            .map_err(|e| AppError::InternalError(e.into()))?;

        match result {
            Ok(_) => {
                tracing::info!(subject = %subject, "Email sent");
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, subject = %subject, "Failed to send email");
                Err(AppError::EmailError(e.to_string()))
            }
        }
    }
}

#[async_trait]
impl EmailProvider for EmailService {
    async fn send_otp_code(
        &self,
        to_email: &str,
        project_title: &str,
        code: &str,
        expiry_minutes: i64,
    ) -> Result<(), AppError> {
        let html_body = format!(
            r###"<html>
    <body style="font-family: Arial, sans-serif;">
        <h2>Your access code for {title}</h2>
        <p style="font-size: 28px; letter-spacing: 6px;"><strong>{code}</strong></p>
        <p style="color: #666; font-size: 12px;">
            The code expires in {minutes} minutes. If you didn't request it, ignore this email.
        </p>
    </body>
</html>"###,
            title = project_title,
            code = code,
            minutes = expiry_minutes
        );

        let plain_body = format!(
            "Your access code for {}: {}\n\nThe code expires in {} minutes. If you didn't request it, ignore this email.",
            project_title, code, expiry_minutes
        );

        self.send_email(to_email, "Your review access code", plain_body, html_body)
            .await
    }

    async fn send_password_reset_email(
        &self,
        to_email: &str,
        reset_token: &str,
        base_url: &str,
    ) -> Result<(), AppError> {
        let reset_link = format!("{}/admin/reset-password?token={}", base_url, reset_token);

        let html_body = format!(
            r###"<html>
    <body style="font-family: Arial, sans-serif;">
        <h2>Password Reset Request</h2>
        <p>We received a request to reset your password. Click the link below to set a new one:</p>
        <p><a href="{}">Reset Password</a></p>
        <p style="color: #666; font-size: 12px;">
            This link expires soon and works once. If you didn't request this, ignore this email.
        </p>
    </body>
</html>"###,
            reset_link
        );

        let plain_body = format!(
            "Password Reset Request\n\nVisit the following link to set a new password:\n\n{}\n\nThis link expires soon and works once.",
            reset_link
        );

        self.send_email(to_email, "Reset Your Password", plain_body, html_body)
            .await
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SentEmail {
    OtpCode { to: String, code: String },
    PasswordReset { to: String, token: String },
}

/// Captures outgoing mail instead of sending it.
#[derive(Default)]
pub struct MockEmailService {
    sent: Mutex<Vec<SentEmail>>,
}

impl MockEmailService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<SentEmail> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn last_otp_code(&self, to: &str) -> Option<String> {
        self.sent().into_iter().rev().find_map(|mail| match mail {
            SentEmail::OtpCode { to: recipient, code } if recipient == to => Some(code),
            _ => None,
        })
    }

    pub fn last_reset_token(&self, to: &str) -> Option<String> {
        self.sent().into_iter().rev().find_map(|mail| match mail {
            SentEmail::PasswordReset {
                to: recipient,
                token,
            } if recipient == to => Some(token),
            _ => None,
        })
    }

    fn push(&self, mail: SentEmail) {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(mail);
        }
    }
}

#[async_trait]
impl EmailProvider for MockEmailService {
    async fn send_otp_code(
        &self,
        to_email: &str,
        _project_title: &str,
        code: &str,
        _expiry_minutes: i64,
    ) -> Result<(), AppError> {
        self.push(SentEmail::OtpCode {
            to: to_email.to_string(),
            code: code.to_string(),
        });
        Ok(())
    }

    async fn send_password_reset_email(
        &self,
        to_email: &str,
        reset_token: &str,
        _base_url: &str,
    ) -> Result<(), AppError> {
        self.push(SentEmail::PasswordReset {
            to: to_email.to_string(),
            token: reset_token.to_string(),
        });
        Ok(())
    }
}
