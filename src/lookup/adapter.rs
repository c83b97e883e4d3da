//! Adapter: MusicBrainz DTOs -> domain metadata.
//!
//! The only place in the crate that knows both the wire shapes and the
//! domain model. Everything downstream of this works on
//! [`AudioMetadata`] with `source = External`.

use crate::lookup::dto::{Recording, Release, Tag};
use crate::model::{AudioMetadata, MetadataSource};

/// Convert one search hit into a domain record.
pub fn recording_to_metadata(recording: &Recording) -> AudioMetadata {
    let mut meta = AudioMetadata::new(MetadataSource::External);

    meta.title = non_empty(&recording.title);
    meta.artist = build_artist_string(recording);
    meta.recording_id = non_empty(&recording.id);
    meta.genre = top_tag(&recording.tags);

    if let Some(release) = pick_release(&recording.releases) {
        meta.album = non_empty(&release.title);
        meta.date = release.date.as_deref().and_then(non_empty);
        meta.release_id = non_empty(&release.id);
    }

    meta
}

/// Join artist credits, honoring each credit's joinphrase.
///
/// "Queen" + " & " then "David Bowie" becomes "Queen & David Bowie".
/// Credited names (cover bands, "feat." spellings) win over the
/// official artist name when present.
fn build_artist_string(recording: &Recording) -> Option<String> {
    if recording.artist_credit.is_empty() {
        return None;
    }

    let mut joined = String::new();
    for credit in &recording.artist_credit {
        let name = credit.name.as_deref().unwrap_or(&credit.artist.name);
        joined.push_str(name);
        if let Some(phrase) = &credit.joinphrase {
            joined.push_str(phrase);
        }
    }

    non_empty(joined.trim())
}

/// Pick the release to source album/date/id from: the first Official
/// release if any, otherwise the first release at all. Search results
/// list releases in server relevance order, so "first" is meaningful.
fn pick_release(releases: &[Release]) -> Option<&Release> {
    releases
        .iter()
        .find(|r| r.status.as_deref() == Some("Official"))
        .or_else(|| releases.first())
}

/// Highest-voted folksonomy tag, used as the genre.
fn top_tag(tags: &[Tag]) -> Option<String> {
    tags.iter()
        .max_by_key(|t| t.count)
        .and_then(|t| non_empty(&t.name))
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
