//! MusicBrainz HTTP client
//!
//! Handles communication with the MusicBrainz recording search endpoint.
//! See: https://musicbrainz.org/doc/MusicBrainz_API/Search
//!
//! IMPORTANT: MusicBrainz requires a User-Agent header and rate limits
//! to 1 req/sec. Every request goes through the shared [`RateLimiter`]
//! before hitting the wire.

use std::sync::Arc;
use std::time::Duration;

use crate::config::LookupConfig;
use crate::error::{Error, Result};
use crate::lookup::rate_limit::RateLimiter;
use crate::lookup::{adapter, dto, similarity};
use crate::model::{AudioMetadata, SearchMatch};

/// User agent string - MusicBrainz requires this
const USER_AGENT: &str = concat!(
    "TagMend/",
    env!("CARGO_PKG_VERSION"),
    " (https://github.com/tagmend)"
);

/// MusicBrainz search API client
pub struct MusicBrainzClient {
    http_client: reqwest::Client,
    base_url: String,
    limiter: Arc<RateLimiter>,
    config: LookupConfig,
}

impl MusicBrainzClient {
    /// Create a new client sharing the given rate limiter.
    pub fn new(config: LookupConfig, limiter: Arc<RateLimiter>) -> Self {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            http_client,
            base_url: "https://musicbrainz.org/ws/2".to_string(),
            limiter,
            config,
        }
    }

    /// Create a client for testing with custom base URL
    #[cfg(test)]
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        let config = LookupConfig::default();
        let limiter = Arc::new(RateLimiter::from_secs(0.0));
        let mut client = Self::new(config, limiter);
        client.base_url = base_url.into();
        client
    }

    /// Search for recordings matching the query record.
    ///
    /// Results come back scored against the query and sorted best
    /// first, truncated to the configured maximum. A query with no
    /// title cannot be searched and yields no matches. If the full
    /// fielded query finds nothing, the search relaxes once to
    /// title-only before giving up.
    pub async fn search(&self, query: &AudioMetadata) -> Result<Vec<SearchMatch>> {
        if !query.has_search_terms() {
            tracing::debug!("query has no title, skipping lookup");
            return Ok(Vec::new());
        }

        let mut recordings = self.send_search(&build_query(query, false)).await?;

        // Relax to title-only once when the fielded query is too strict
        if recordings.is_empty() && (query.artist.is_some() || query.album.is_some()) {
            tracing::debug!("fielded query found nothing, retrying title-only");
            recordings = self.send_search(&build_query(query, true)).await?;
        }

        let mut matches: Vec<SearchMatch> = recordings
            .iter()
            .map(|recording| {
                let metadata = adapter::recording_to_metadata(recording);
                let similarity = similarity::score(query, &metadata);
                SearchMatch {
                    metadata,
                    similarity,
                }
            })
            .collect();

        matches.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        matches.truncate(self.config.max_search_results);

        Ok(matches)
    }

    /// Send one search request and parse the response.
    async fn send_search(&self, lucene_query: &str) -> Result<Vec<dto::Recording>> {
        let url = format!(
            "{}/recording?query={}&fmt=json&limit={}",
            self.base_url,
            urlencoding::encode(lucene_query),
            self.config.max_search_results
        );

        self.limiter.acquire().await;

        let response = match self.http_client.get(&url).send().await {
            Ok(response) => response,
            Err(e) if e.is_timeout() => {
                // A slow service is not a broken file; treat as no matches
                tracing::warn!(error = %e, "lookup request timed out");
                return Ok(Vec::new());
            }
            Err(e) => return Err(Error::lookup(0, e.to_string())),
        };

        let status = response.status();
        if !status.is_success() {
            let message = match response.json::<dto::ApiError>().await {
                Ok(error) => error.error,
                Err(_) => status
                    .canonical_reason()
                    .unwrap_or("request failed")
                    .to_string(),
            };
            return Err(Error::lookup(status.as_u16(), message));
        }

        let parsed = response
            .json::<dto::RecordingSearchResponse>()
            .await
            .map_err(|e| Error::lookup(0, format!("malformed response: {e}")))?;

        Ok(parsed.recordings)
    }
}

/// Build a Lucene query string from the populated query fields.
///
/// `recording:"Title" AND artist:"Artist" AND release:"Album"`, with
/// embedded quotes escaped. `title_only` drops the artist and release
/// clauses for the relaxed retry.
fn build_query(query: &AudioMetadata, title_only: bool) -> String {
    let mut clauses = Vec::new();

    if let Some(title) = &query.title {
        clauses.push(format!("recording:\"{}\"", escape(title)));
    }
    if !title_only {
        if let Some(artist) = &query.artist {
            clauses.push(format!("artist:\"{}\"", escape(artist)));
        }
        if let Some(album) = &query.album {
            clauses.push(format!("release:\"{}\"", escape(album)));
        }
    }

    clauses.join(" AND ")
}

/// Escape characters that would terminate a quoted Lucene phrase.
fn escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MetadataSource;

    fn query_record(title: &str, artist: Option<&str>, album: Option<&str>) -> AudioMetadata {
        let mut meta = AudioMetadata::new(MetadataSource::Embedded);
        meta.title = Some(title.to_string());
        meta.artist = artist.map(String::from);
        meta.album = album.map(String::from);
        meta
    }

    #[test]
    fn test_client_creation() {
        let client = MusicBrainzClient::new(
            LookupConfig::default(),
            Arc::new(RateLimiter::from_secs(1.0)),
        );
        assert_eq!(client.base_url, "https://musicbrainz.org/ws/2");
    }

    #[test]
    fn test_client_with_custom_url() {
        let client = MusicBrainzClient::with_base_url("http://localhost:8080");
        assert_eq!(client.base_url, "http://localhost:8080");
    }

    #[test]
    fn test_user_agent_format() {
        assert!(USER_AGENT.starts_with("TagMend/"));
    }

    #[test]
    fn test_fielded_query_includes_all_clauses() {
        let record = query_record("Bohemian Rhapsody", Some("Queen"), Some("A Night at the Opera"));
        assert_eq!(
            build_query(&record, false),
            r#"recording:"Bohemian Rhapsody" AND artist:"Queen" AND release:"A Night at the Opera""#
        );
    }

    #[test]
    fn test_title_only_query_drops_other_clauses() {
        let record = query_record("Bohemian Rhapsody", Some("Queen"), Some("A Night at the Opera"));
        assert_eq!(build_query(&record, true), r#"recording:"Bohemian Rhapsody""#);
    }

    #[test]
    fn test_query_escapes_embedded_quotes() {
        let record = query_record(r#"The "Best" Song"#, None, None);
        assert_eq!(
            build_query(&record, false),
            r#"recording:"The \"Best\" Song""#
        );
    }

    #[tokio::test]
    async fn test_search_without_title_skips_network() {
        // Unroutable base URL proves no request is attempted
        let client = MusicBrainzClient::with_base_url("http://127.0.0.1:1");
        let mut record = AudioMetadata::new(MetadataSource::Embedded);
        record.artist = Some("Queen".to_string());

        let matches = client.search(&record).await.expect("no-title search");
        assert!(matches.is_empty());
    }

    #[tokio::test]
    async fn test_transport_failure_is_a_lookup_error() {
        let client = MusicBrainzClient::with_base_url("http://127.0.0.1:1");
        let record = query_record("Anything", None, None);

        let err = client.search(&record).await.unwrap_err();
        match err {
            Error::Lookup { status_code, .. } => assert_eq!(status_code, 0),
            other => panic!("expected lookup error, got {other:?}"),
        }
    }
}
