//! Similarity scoring between a query record and a lookup candidate.
//!
//! Normalized string distance over title and artist, weighted 0.6/0.4.
//! Fields absent on either side drop out of the weighting; a candidate
//! that matches nothing scores 0.

use crate::model::AudioMetadata;

/// Weight of the title comparison.
pub const TITLE_WEIGHT: f64 = 0.6;
/// Weight of the artist comparison.
pub const ARTIST_WEIGHT: f64 = 0.4;

/// Similarity of `candidate` to `query` in [0, 1].
pub fn score(query: &AudioMetadata, candidate: &AudioMetadata) -> f32 {
    let mut weighted = 0.0;
    let mut total_weight = 0.0;

    for (field, weight) in [("title", TITLE_WEIGHT), ("artist", ARTIST_WEIGHT)] {
        if let (Some(a), Some(b)) = (query.field(field), candidate.field(field)) {
            weighted += field_similarity(a, b) * weight;
            total_weight += weight;
        }
    }

    if total_weight == 0.0 {
        return 0.0;
    }
    ((weighted / total_weight) as f32).clamp(0.0, 1.0)
}

/// Case-insensitive normalized Levenshtein similarity of two values.
fn field_similarity(a: &str, b: &str) -> f64 {
    strsim::normalized_levenshtein(&a.to_lowercase(), &b.to_lowercase())
}
