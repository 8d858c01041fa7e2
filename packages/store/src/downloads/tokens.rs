// ABOUTME: Single-use download tokens bound to a completed selection
// ABOUTME: Tokens live only in the TTL cache; redeeming one consumes it

use base64::Engine;
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::cache::TtlCache;
use crate::selections::{Selection, SelectionStatus};
use crate::storage::{StorageError, StorageResult};

/// What a download token stands for while it is live.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DownloadBinding {
    #[serde(rename = "selectionId")]
    pub selection_id: String,
    #[serde(rename = "userId")]
    pub user_id: String,
    #[serde(rename = "productId")]
    pub product_id: String,
    #[serde(rename = "issuedAt")]
    pub issued_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct IssuedDownload {
    pub token: String,
    pub expires_in: u64,
}

/// Issues and redeems download tokens against the TTL cache.
pub struct TokenIssuer {
    cache: Arc<dyn TtlCache>,
    ttl: Duration,
}

impl TokenIssuer {
    pub fn new(cache: Arc<dyn TtlCache>, ttl: Duration) -> Self {
        Self { cache, ttl }
    }

    /// Generate a cryptographically secure random token
    /// Returns a base64-encoded 32-byte token
    pub fn generate_token() -> String {
        let mut rng = rand::thread_rng();
        let random_bytes: [u8; 32] = rng.gen();
        base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(random_bytes)
    }

    fn cache_key(token: &str) -> String {
        format!("download:{token}")
    }

    /// Mint a token for a completed selection owned by `user_id`.
    pub async fn issue(
        &self,
        selection: &Selection,
        user_id: &str,
    ) -> StorageResult<IssuedDownload> {
        if selection.user_id != user_id {
            return Err(StorageError::Forbidden);
        }
        if selection.status != SelectionStatus::Completed {
            return Err(StorageError::InvalidState(
                "selection must be completed before it can be downloaded".to_string(),
            ));
        }

        let token = Self::generate_token();
        let binding = DownloadBinding {
            selection_id: selection.id.clone(),
            user_id: user_id.to_string(),
            product_id: selection.product_id.clone(),
            issued_at: Utc::now(),
        };
        let payload = serde_json::to_string(&binding)?;

        self.cache
            .set(&Self::cache_key(&token), &payload, self.ttl)
            .await?;

        debug!("Issued download token for selection {}", selection.id);
        Ok(IssuedDownload {
            token,
            expires_in: self.ttl.as_secs(),
        })
    }

    /// Read the binding without consuming the token.
    pub async fn peek(&self, token: &str) -> StorageResult<Option<DownloadBinding>> {
        match self.cache.get(&Self::cache_key(token)).await? {
            Some(payload) => Ok(Some(serde_json::from_str(&payload)?)),
            None => Ok(None),
        }
    }

    /// Consume the token. Exactly one caller gets the binding back; everyone
    /// else sees `None`, including after expiry.
    pub async fn take(&self, token: &str) -> StorageResult<Option<DownloadBinding>> {
        match self.cache.take(&Self::cache_key(token)).await? {
            Some(payload) => Ok(Some(serde_json::from_str(&payload)?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryTtlCache;
    use std::collections::BTreeMap;

    fn completed_selection() -> Selection {
        let now = Utc::now();
        Selection {
            id: "sel-1".to_string(),
            user_id: "user-1".to_string(),
            product_id: "prod-1".to_string(),
            status: SelectionStatus::Completed,
            choices: BTreeMap::new(),
            download_count: 0,
            last_download_at: None,
            completed_at: Some(now),
            created_at: now,
            updated_at: now,
        }
    }

    fn issuer(ttl_secs: u64) -> TokenIssuer {
        TokenIssuer::new(
            Arc::new(MemoryTtlCache::new()),
            Duration::from_secs(ttl_secs),
        )
    }

    #[test]
    fn test_generated_tokens_are_long_and_unique() {
        let a = TokenIssuer::generate_token();
        let b = TokenIssuer::generate_token();
        // 32 random bytes come out as 43 unpadded base64 characters
        assert_eq!(a.len(), 43);
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_issue_requires_completed_selection() {
        let issuer = issuer(1800);
        let mut selection = completed_selection();
        selection.status = SelectionStatus::Draft;

        let err = issuer.issue(&selection, "user-1").await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_issue_requires_ownership() {
        let issuer = issuer(1800);
        let selection = completed_selection();

        let err = issuer.issue(&selection, "someone-else").await.unwrap_err();
        assert!(matches!(err, StorageError::Forbidden));
    }

    #[tokio::test]
    async fn test_peek_does_not_consume() {
        let issuer = issuer(1800);
        let selection = completed_selection();

        let issued = issuer.issue(&selection, "user-1").await.unwrap();
        assert_eq!(issued.expires_in, 1800);

        let binding = issuer.peek(&issued.token).await.unwrap().unwrap();
        assert_eq!(binding.selection_id, "sel-1");
        assert_eq!(binding.user_id, "user-1");
        assert_eq!(binding.product_id, "prod-1");

        // Still there after a peek
        assert!(issuer.peek(&issued.token).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_take_consumes_exactly_once() {
        let issuer = issuer(1800);
        let selection = completed_selection();
        let issued = issuer.issue(&selection, "user-1").await.unwrap();

        assert!(issuer.take(&issued.token).await.unwrap().is_some());
        assert!(issuer.take(&issued.token).await.unwrap().is_none());
        assert!(issuer.peek(&issued.token).await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokens_expire() {
        let issuer = issuer(1800);
        let selection = completed_selection();
        let issued = issuer.issue(&selection, "user-1").await.unwrap();

        tokio::time::advance(Duration::from_secs(1801)).await;
        assert!(issuer.take(&issued.token).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unknown_token_is_none() {
        let issuer = issuer(1800);
        assert!(issuer.peek("not-a-token").await.unwrap().is_none());
        assert!(issuer.take("not-a-token").await.unwrap().is_none());
    }
}
