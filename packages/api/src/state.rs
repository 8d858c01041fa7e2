// ABOUTME: Shared application state threaded through all handlers

use std::sync::Arc;
use std::time::Duration;

use cube_store::{ArchiveBuilder, BlobStore, DbState, TokenIssuer, TtlCache};

/// Everything a handler can reach: database storages, the TTL cache, the
/// download token issuer, and the archive builder.
#[derive(Clone)]
pub struct AppState {
    pub db: DbState,
    pub cache: Arc<dyn TtlCache>,
    pub tokens: Arc<TokenIssuer>,
    pub archives: Arc<ArchiveBuilder>,
}

impl AppState {
    pub fn new(
        db: DbState,
        cache: Arc<dyn TtlCache>,
        blobs: Arc<dyn BlobStore>,
        token_ttl: Duration,
    ) -> Self {
        let tokens = Arc::new(TokenIssuer::new(cache.clone(), token_ttl));
        let archives = Arc::new(ArchiveBuilder::new(blobs));

        Self {
            db,
            cache,
            tokens,
            archives,
        }
    }
}
