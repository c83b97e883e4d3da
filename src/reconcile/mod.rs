//! Deterministic source reconciliation.
//!
//! Merges the embedded, filename, and external views of one track into
//! a single record. Field precedence is fixed: embedded tags win, then
//! an external match above the similarity threshold, then filename
//! guesses. Candidate ORDER never matters - precedence derives from
//! each candidate's provenance, so any permutation of the same inputs
//! merges to the same record.

use chrono::Utc;

use crate::model::{weights, AudioMetadata, MetadataSource, SearchMatch, REQUIRED_FIELDS};

/// Fields the merge copies from candidates, precedence applied per
/// field. Identifier fields are handled separately because filenames
/// can never carry them.
const MERGE_FIELDS: [&str; 9] = [
    "title",
    "artist",
    "album",
    "date",
    "genre",
    "track_number",
    "composer",
    "album_artist",
    "edition",
];

/// One input to the merge: a record plus, for external candidates, its
/// similarity to the query.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub metadata: AudioMetadata,
    /// Populated for external candidates only
    pub similarity: Option<f32>,
}

impl Candidate {
    /// Candidate from the file's own tags.
    pub fn embedded(metadata: AudioMetadata) -> Self {
        debug_assert_eq!(metadata.source, MetadataSource::Embedded);
        Self {
            metadata,
            similarity: None,
        }
    }

    /// Candidate inferred from the file name.
    pub fn filename(metadata: AudioMetadata) -> Self {
        debug_assert_eq!(metadata.source, MetadataSource::Filename);
        Self {
            metadata,
            similarity: None,
        }
    }

    /// Candidate from an external search match.
    pub fn external(search_match: SearchMatch) -> Self {
        Self {
            metadata: search_match.metadata,
            similarity: Some(search_match.similarity),
        }
    }
}

/// Merge candidates into one record.
///
/// External candidates below `threshold` contribute nothing. With no
/// usable candidates at all the result is an empty `Merged` record with
/// confidence 0. Confidence is the weight-sum of required fields,
/// scaled per field by the trust of the source that supplied it:
/// embedded 1.0, external its similarity, filename a flat discount.
pub fn merge(candidates: &[Candidate], threshold: f32) -> AudioMetadata {
    let embedded = best_for_source(candidates, MetadataSource::Embedded);
    let filename = best_for_source(candidates, MetadataSource::Filename);
    let external = best_external(candidates, threshold);

    let mut merged = AudioMetadata::new(MetadataSource::Merged);
    let mut confidence = 0.0f32;
    let mut contributed = [false; 3];

    for name in MERGE_FIELDS {
        let choice = embedded
            .and_then(|c| c.metadata.field(name).map(|v| (v, 1.0f32, 0)))
            .or_else(|| {
                external.and_then(|c| {
                    c.metadata
                        .field(name)
                        .map(|v| (v, c.similarity.unwrap_or(0.0), 1))
                })
            })
            .or_else(|| {
                filename.and_then(|c| {
                    c.metadata
                        .field(name)
                        .map(|v| (v, weights::FILENAME_TRUST, 2))
                })
            });

        if let Some((value, trust, origin)) = choice {
            merged.set_field(name, value);
            confidence += weights::for_field(name) * trust;
            contributed[origin] = true;
        }
    }

    // Identifiers: embedded tags first, then the external match.
    // Filename candidates never carry them.
    for name in ["recording_id", "release_id"] {
        let id = embedded
            .and_then(|c| c.metadata.field(name))
            .or_else(|| external.and_then(|c| c.metadata.field(name)));
        if let Some(id) = id {
            merged.set_field(name, id);
        }
    }

    merged.confidence = confidence.clamp(0.0, 1.0);
    merged.source = match contributed {
        [true, false, false] => MetadataSource::Embedded,
        [false, true, false] => MetadataSource::External,
        [false, false, true] => MetadataSource::Filename,
        _ => MetadataSource::Merged,
    };
    merged.last_updated = Utc::now();
    merged
}

/// Best candidate for a source: most populated required fields wins,
/// ties broken by field-value comparison so the pick is order-free.
fn best_for_source(candidates: &[Candidate], source: MetadataSource) -> Option<&Candidate> {
    candidates
        .iter()
        .filter(|c| c.metadata.source == source)
        .max_by(|a, b| {
            populated_count(&a.metadata)
                .cmp(&populated_count(&b.metadata))
                .then_with(|| field_key(&a.metadata).cmp(&field_key(&b.metadata)))
        })
}

/// Best external candidate at or above the threshold: highest
/// similarity wins, ties broken like [`best_for_source`].
fn best_external(candidates: &[Candidate], threshold: f32) -> Option<&Candidate> {
    candidates
        .iter()
        .filter(|c| c.metadata.source == MetadataSource::External)
        .filter(|c| c.similarity.unwrap_or(0.0) >= threshold)
        .max_by(|a, b| {
            a.similarity
                .unwrap_or(0.0)
                .partial_cmp(&b.similarity.unwrap_or(0.0))
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| populated_count(&a.metadata).cmp(&populated_count(&b.metadata)))
                .then_with(|| field_key(&a.metadata).cmp(&field_key(&b.metadata)))
        })
}

fn populated_count(meta: &AudioMetadata) -> usize {
    REQUIRED_FIELDS
        .iter()
        .filter(|name| meta.field(name).is_some())
        .count()
}

fn field_key(meta: &AudioMetadata) -> Vec<Option<&str>> {
    MERGE_FIELDS.iter().map(|name| meta.field(name)).collect()
}
