pub mod storage;
pub mod types;

pub use storage::SelectionStorage;
pub use types::*;
