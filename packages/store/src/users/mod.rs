pub mod storage;
pub mod types;

pub use storage::UserStorage;
pub use types::{LoginInput, RegisterInput, Role, SessionToken, User};
