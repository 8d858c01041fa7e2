pub mod storage;
pub mod types;

pub use storage::CatalogStorage;
pub use types::*;
