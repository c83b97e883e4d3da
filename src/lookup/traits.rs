//! Trait definitions for the external lookup service.
//!
//! These traits enable dependency injection and mocking for tests.
//! Production code uses the real client implementation, while tests
//! can substitute mock implementations.

use async_trait::async_trait;

use crate::error::Result;
use crate::model::{AudioMetadata, SearchMatch};

/// Trait for external recording search.
///
/// Implement this trait to create mock implementations for testing.
#[async_trait]
pub trait LookupApi: Send + Sync {
    /// Search for recordings matching the query record, best match
    /// first.
    async fn search(&self, query: &AudioMetadata) -> Result<Vec<SearchMatch>>;
}

#[async_trait]
impl LookupApi for super::client::MusicBrainzClient {
    async fn search(&self, query: &AudioMetadata) -> Result<Vec<SearchMatch>> {
        self.search(query).await
    }
}
