//! Core domain types for metadata processing.
//!
//! These types are OUR types - external API responses and tag containers
//! are converted into them at the module boundaries (extractor, lookup
//! adapter) and never leak past them.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;

/// Per-field confidence weights and source trust factors.
///
/// The six required fields carry weights summing to 1.0, so a record with
/// every required field populated from embedded tags scores exactly 1.0
/// and each missing field subtracts its own weight. The values are
/// tunable; tests assert the sum.
pub mod weights {
    /// Weight of the title field.
    pub const TITLE: f32 = 0.25;
    /// Weight of the artist field.
    pub const ARTIST: f32 = 0.25;
    /// Weight of the album field.
    pub const ALBUM: f32 = 0.15;
    /// Weight of the track number field.
    pub const TRACK_NUMBER: f32 = 0.15;
    /// Weight of the date field.
    pub const DATE: f32 = 0.10;
    /// Weight of the genre field.
    pub const GENRE: f32 = 0.10;

    /// Trust factor for filename-derived values. Filenames are the
    /// lowest-trust source: a record assembled purely from filename
    /// guesses must not claim embedded-tag-level confidence.
    pub const FILENAME_TRUST: f32 = 0.5;

    /// Weight for a required field by name.
    pub fn for_field(name: &str) -> f32 {
        match name {
            "title" => TITLE,
            "artist" => ARTIST,
            "album" => ALBUM,
            "track_number" => TRACK_NUMBER,
            "date" => DATE,
            "genre" => GENRE,
            _ => 0.0,
        }
    }
}

/// Provenance of a metadata record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MetadataSource {
    /// Read from the file's own tag container
    Embedded,
    /// Inferred from the file name
    Filename,
    /// Returned by the remote metadata service
    External,
    /// Assembled from more than one origin
    Merged,
}

impl std::fmt::Display for MetadataSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MetadataSource::Embedded => "embedded",
            MetadataSource::Filename => "filename",
            MetadataSource::External => "external",
            MetadataSource::Merged => "merged",
        };
        f.write_str(s)
    }
}

/// A semantic metadata record for one audio track.
///
/// `track_number` is a string to preserve `N/M` (track/total) values as
/// some containers store them; the writer validates the shape.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AudioMetadata {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub date: Option<String>,
    pub genre: Option<String>,
    pub track_number: Option<String>,
    pub composer: Option<String>,
    pub album_artist: Option<String>,
    /// Edition note stripped from bracketed filename qualifiers,
    /// e.g. "Remaster 2023". Never part of the title.
    pub edition: Option<String>,
    /// MusicBrainz recording ID
    pub recording_id: Option<String>,
    /// MusicBrainz release ID
    pub release_id: Option<String>,
    pub source: MetadataSource,
    /// Completeness/trust estimate in [0, 1]
    pub confidence: f32,
    pub last_updated: DateTime<Utc>,
}

/// Fields that count toward the confidence score.
pub const REQUIRED_FIELDS: [&str; 6] =
    ["title", "artist", "album", "date", "genre", "track_number"];

impl AudioMetadata {
    /// Create an empty record with the given provenance.
    pub fn new(source: MetadataSource) -> Self {
        Self {
            title: None,
            artist: None,
            album: None,
            date: None,
            genre: None,
            track_number: None,
            composer: None,
            album_artist: None,
            edition: None,
            recording_id: None,
            release_id: None,
            source,
            confidence: 0.0,
            last_updated: Utc::now(),
        }
    }

    /// Look up a field by its canonical name. Returns `None` for unset or
    /// whitespace-only values.
    pub fn field(&self, name: &str) -> Option<&str> {
        let value = match name {
            "title" => &self.title,
            "artist" => &self.artist,
            "album" => &self.album,
            "date" => &self.date,
            "genre" => &self.genre,
            "track_number" => &self.track_number,
            "composer" => &self.composer,
            "album_artist" => &self.album_artist,
            "edition" => &self.edition,
            "recording_id" => &self.recording_id,
            "release_id" => &self.release_id,
            _ => &None,
        };
        value.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }

    /// Set a field by its canonical name. Unknown names are ignored.
    pub fn set_field(&mut self, name: &str, value: impl Into<String>) {
        let value = Some(value.into());
        match name {
            "title" => self.title = value,
            "artist" => self.artist = value,
            "album" => self.album = value,
            "date" => self.date = value,
            "genre" => self.genre = value,
            "track_number" => self.track_number = value,
            "composer" => self.composer = value,
            "album_artist" => self.album_artist = value,
            "edition" => self.edition = value,
            "recording_id" => self.recording_id = value,
            "release_id" => self.release_id = value,
            _ => {}
        }
    }

    /// Required fields that are unset or empty.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        REQUIRED_FIELDS
            .iter()
            .copied()
            .filter(|name| self.field(name).is_none())
            .collect()
    }

    /// Whether every required field is populated.
    pub fn is_complete(&self) -> bool {
        self.missing_fields().is_empty()
    }

    /// Whether the record carries any value at all.
    pub fn is_empty(&self) -> bool {
        const ALL: [&str; 11] = [
            "title",
            "artist",
            "album",
            "date",
            "genre",
            "track_number",
            "composer",
            "album_artist",
            "edition",
            "recording_id",
            "release_id",
        ];
        ALL.iter().all(|name| self.field(name).is_none())
    }

    /// Whether there is enough text to build an external search query.
    pub fn has_search_terms(&self) -> bool {
        self.field("title").is_some()
    }
}

/// Outcome of processing one file. Created fresh per file, immutable
/// once returned.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessingResult {
    pub success: bool,
    pub metadata: Option<AudioMetadata>,
    pub error: Option<String>,
    pub warnings: Vec<String>,
    pub elapsed: Duration,
}

impl ProcessingResult {
    /// A successful result.
    pub fn ok(metadata: AudioMetadata, warnings: Vec<String>, elapsed: Duration) -> Self {
        Self {
            success: true,
            metadata: Some(metadata),
            error: None,
            warnings,
            elapsed,
        }
    }

    /// A failed result with a human-readable error.
    pub fn failed(error: impl Into<String>, warnings: Vec<String>, elapsed: Duration) -> Self {
        Self {
            success: false,
            metadata: None,
            error: Some(error.into()),
            warnings,
            elapsed,
        }
    }
}

/// One external-lookup candidate: a record plus its similarity to the
/// query. Produced by the lookup client, consumed by the reconciler,
/// never persisted.
#[derive(Debug, Clone)]
pub struct SearchMatch {
    pub metadata: AudioMetadata,
    /// Similarity to the query in [0, 1]
    pub similarity: f32,
}
