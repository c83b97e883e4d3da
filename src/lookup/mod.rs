//! External recording lookup.
//!
//! Talks to the MusicBrainz search API: wire DTOs stay in [`dto`], the
//! [`adapter`] converts them to domain records, [`similarity`] scores
//! candidates against the query, and every request waits on the shared
//! [`rate_limit::RateLimiter`] first.

pub mod adapter;
pub mod client;
pub mod dto;
pub mod rate_limit;
pub mod similarity;
pub mod traits;

pub use client::MusicBrainzClient;
pub use rate_limit::RateLimiter;
pub use traits::LookupApi;
