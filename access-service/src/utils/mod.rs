pub mod crypto;
pub mod password;
pub mod validation;

pub use crypto::{constant_time_eq, device_fingerprint, numeric_code, random_hex, sha256_hex};
pub use password::{hash_password, verify_against_dummy, verify_password, Password};
pub use validation::{ValidatedJson, ValidatedQuery};
