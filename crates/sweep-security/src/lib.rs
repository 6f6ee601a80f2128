mod error;
mod keychain;

pub use error::SecurityError;
pub use keychain::{SecretKey, SecretStore, ACCESS_TOKEN_NAMESPACE};
