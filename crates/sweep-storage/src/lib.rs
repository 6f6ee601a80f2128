mod error;
mod storage;
mod store;

pub use error::StorageError;
pub use storage::Storage;
pub use store::MailStore;
