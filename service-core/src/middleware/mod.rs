pub mod client_ip;
pub mod rate_limit;
pub mod security_headers;
pub mod tracing;

pub use client_ip::{ClientIp, TrustedProxies, client_ip_from_parts};
