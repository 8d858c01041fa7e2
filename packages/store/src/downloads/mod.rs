pub mod archive;
pub mod blobs;
pub mod tokens;

pub use archive::{ArchiveBuilder, SelectionArchive};
pub use blobs::{BlobStore, FsBlobStore};
pub use tokens::{DownloadBinding, IssuedDownload, TokenIssuer};
