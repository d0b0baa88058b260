//! Services layer: stores, token handling, and the access-control core.

pub mod admin_auth;
pub mod best_effort;
pub mod content_token;
mod database;
mod email;
pub mod error;
mod memory_repository;
pub mod metrics;
pub mod otp;
pub mod rate_limit;
pub mod security_recorder;
pub mod session;
pub mod share_access;
pub mod store;
pub mod token_codec;

pub use admin_auth::AdminAuthService;
pub use content_token::{ContentTokenService, MintedContentToken};
pub use database::{AccessRepository, Database};
pub use email::{EmailProvider, EmailService, MockEmailService, SentEmail};
pub use error::ServiceError;
pub use memory_repository::MemoryRepository;
pub use otp::{OtpOutcome, OtpVerifier};
pub use rate_limit::RateLimiter;
pub use security_recorder::SecurityRecorder;
pub use session::{AdminContext, ClientContext, SessionManager, SessionTokens};
pub use share_access::{
    AccessContext, AccessLevel, Capabilities, RequestCredentials, ShareAccessResolver, ShareGrant,
};
pub use store::{MemoryStore, RedisStore, SharedStore};
pub use token_codec::{TokenCodec, TokenError, TokenPayload};
