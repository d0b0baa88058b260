pub mod admin;
pub mod credentials;
pub mod metrics;

pub use admin::AdminSession;
pub use credentials::{bearer_token, request_credentials, Credentials, DEVICE_ID_HEADER};
pub use metrics::metrics_middleware;
