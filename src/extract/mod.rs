//! Embedded-tag extraction.
//!
//! Uses the lofty crate for format-independent tag access across FLAC
//! (Vorbis comments), MP3 (ID3v2), MP4/M4A (iTunes atoms), OGG, and WAV.
//! All text fields pass through the double-encoding repair in
//! [`encoding`] on the way out.

pub mod encoding;

use lofty::file::TaggedFileExt;
use lofty::probe::Probe;
use lofty::tag::{Accessor, ItemKey, Tag};
use std::path::Path;

use crate::error::{Error, Result};
use crate::model::{AudioMetadata, MetadataSource};

/// Extensions the extractor recognizes. Anything else is
/// [`Error::UnsupportedFormat`] before the file is even opened.
pub const SUPPORTED_EXTENSIONS: [&str; 6] = ["flac", "mp3", "m4a", "mp4", "ogg", "wav"];

/// Trait seam for embedded-tag extraction, so orchestration tests can
/// substitute a fake without touching real files.
pub trait TagExtractor: Send + Sync {
    /// Read the file's tags into a normalized record with
    /// `source = Embedded`. A file with no tags yields an empty record,
    /// not an error.
    fn extract(&self, path: &Path) -> Result<AudioMetadata>;

    /// Whether the path's container family is supported.
    fn supports(&self, path: &Path) -> bool;
}

/// Production extractor backed by lofty.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoftyExtractor;

impl TagExtractor for LoftyExtractor {
    fn extract(&self, path: &Path) -> Result<AudioMetadata> {
        if !self.supports(path) {
            return Err(Error::unsupported_format(path));
        }

        // Probe in read-only scope; the handle closes when this returns
        let tagged_file = Probe::open(path)
            .map_err(|e| match e.kind() {
                lofty::error::ErrorKind::Io(_) => {
                    Error::Io(std::io::Error::other(e.to_string()))
                }
                _ => Error::corrupt_file(path, e.to_string()),
            })?
            .read()
            .map_err(|e| Error::corrupt_file(path, e.to_string()))?;

        let tag = tagged_file.primary_tag().or_else(|| tagged_file.first_tag());

        let mut meta = AudioMetadata::new(MetadataSource::Embedded);
        let Some(tag) = tag else {
            tracing::debug!(path = %path.display(), "no embedded tag present");
            return Ok(meta);
        };

        meta.title = tag.title().as_deref().map(fixed);
        meta.artist = tag.artist().as_deref().map(fixed);
        meta.album = tag.album().as_deref().map(fixed);
        meta.genre = tag.genre().as_deref().map(fixed);
        meta.date = read_date(tag);
        meta.track_number = read_track(tag);
        meta.composer = tag.get_string(&ItemKey::Composer).map(fixed);
        meta.album_artist = tag.get_string(&ItemKey::AlbumArtist).map(fixed);
        meta.recording_id = tag
            .get_string(&ItemKey::MusicBrainzRecordingId)
            .map(str::to_string);
        meta.release_id = tag
            .get_string(&ItemKey::MusicBrainzReleaseId)
            .map(str::to_string);

        Ok(meta)
    }

    fn supports(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|s| s.to_str())
            .map(|ext| {
                let ext = ext.to_lowercase();
                SUPPORTED_EXTENSIONS.contains(&ext.as_str())
            })
            .unwrap_or(false)
    }
}

/// Run a tag string through the double-encoding repair and trim it.
fn fixed(value: &str) -> String {
    encoding::fix(value.trim())
}

/// Date: prefer the full recording date string, fall back to the year.
fn read_date(tag: &Tag) -> Option<String> {
    tag.get_string(&ItemKey::RecordingDate)
        .map(str::to_string)
        .or_else(|| tag.year().map(|y| y.to_string()))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Track number, preserving the total as `N/M` when the container has it.
fn read_track(tag: &Tag) -> Option<String> {
    let number = tag.track()?;
    Some(match tag.track_total() {
        Some(total) => format!("{number}/{total}"),
        None => number.to_string(),
    })
}
