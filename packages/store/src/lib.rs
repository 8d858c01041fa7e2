//! # Cube Store
//!
//! Domain layer for the Magic Cube storefront: product catalog, material
//! selections, and the selection-to-download pipeline over SQLite.

pub mod cache;
pub mod catalog;
pub mod db;
pub mod downloads;
pub mod pagination;
pub mod selections;
pub mod storage;
pub mod users;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

// Re-export database state
pub use db::DbState;

// Re-export error types
pub use storage::{StorageError, StorageResult};

// Re-export catalog types
pub use catalog::{
    CatalogStorage, Material, MaterialCreateInput, MaterialModule, ModuleCreateInput,
    ModuleStatus, ModuleUpdateInput, Product, ProductCreateInput, ProductStatus,
    ProductUpdateInput,
};

// Re-export selection types
pub use selections::{
    ChoiceInput, DownloadHistoryEntry, DownloadStats, Selection, SelectionStatus,
    SelectionStorage, StatsRange,
};

// Re-export the download pipeline
pub use cache::{MemoryTtlCache, TtlCache};
pub use downloads::{
    ArchiveBuilder, BlobStore, DownloadBinding, FsBlobStore, IssuedDownload, SelectionArchive,
    TokenIssuer,
};

// Re-export account types
pub use users::{LoginInput, RegisterInput, Role, SessionToken, User, UserStorage};

// Re-export pagination helpers
pub use pagination::{Paginated, PaginationParams};
