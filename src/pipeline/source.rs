use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// One unit of content handed to summarization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceItem {
    /// Content fingerprint or provider-native ID
    pub hash: String,

    /// Payload given to the model verbatim
    pub data: String,
}

impl SourceItem {
    pub fn new(hash: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            hash: hash.into(),
            data: data.into(),
        }
    }

    /// Item whose hash is the SHA-256 digest of its data
    pub fn hashed(data: impl Into<String>) -> Self {
        let data = data.into();
        Self {
            hash: content_hash(&data),
            data,
        }
    }
}

/// Hex SHA-256 digest of `content`
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

/// A pluggable producer of items for the summarization pipeline.
///
/// `init` starts (or restarts) a session; `next_items` then yields each item at most
/// once per session. Implementations serialize their own internal state, so
/// `next_items` may be called from several workers at once.
#[async_trait]
pub trait ItemSource: Send + Sync {
    /// Reset session state and prepare the underlying resource
    async fn init(&self) -> Result<()>;

    /// Up to `n` unseen items; `None` once the source is exhausted
    async fn next_items(&self, n: usize) -> Result<Option<Vec<SourceItem>>>;
}
