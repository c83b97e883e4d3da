//! Transactional tag writing.
//!
//! Writes merged metadata back into audio files. Supports MP3 (ID3v2),
//! FLAC, M4A/AAC, OGG Vorbis, and other formats via lofty. Every write
//! is backup-first: the original file is copied aside before the tag
//! save, and restored byte-for-byte if the save fails, so a crash or
//! codec error never leaves a half-written file behind.

use lofty::config::WriteOptions;
use lofty::file::TaggedFileExt;
use lofty::probe::Probe;
use lofty::tag::{Accessor, ItemKey, Tag, TagExt};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::model::AudioMetadata;

/// Trait seam for the raw tag save, so write-safety tests can inject a
/// writer that corrupts the file and fails.
pub trait TagWriter: Send + Sync {
    /// Write the record's fields into the file's tag container.
    fn write_tags(&self, path: &Path, metadata: &AudioMetadata) -> Result<()>;
}

/// Production tag writer backed by lofty.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoftyTagWriter;

impl TagWriter for LoftyTagWriter {
    fn write_tags(&self, path: &Path, metadata: &AudioMetadata) -> Result<()> {
        let mut tagged_file = Probe::open(path)
            .map_err(|e| Error::write(path, format!("open failed: {e}")))?
            .read()
            .map_err(|e| Error::write(path, format!("read failed: {e}")))?;

        // Get or create the format's primary tag
        let tag_type = tagged_file.primary_tag_type();
        let tag = match tagged_file.tag_mut(tag_type) {
            Some(tag) => tag,
            None => {
                tagged_file.insert_tag(Tag::new(tag_type));
                tagged_file
                    .tag_mut(tag_type)
                    .ok_or_else(|| Error::write(path, "tag insertion failed"))?
            }
        };

        apply(tag, metadata);

        tag.save_to_path(path, WriteOptions::default())
            .map_err(|e| Error::write(path, format!("save failed: {e}")))
    }
}

/// Copy populated fields into the tag. Unset fields are left alone so a
/// partial record never erases values the file already has.
fn apply(tag: &mut Tag, metadata: &AudioMetadata) {
    if let Some(title) = metadata.field("title") {
        tag.set_title(title.to_string());
    }
    if let Some(artist) = metadata.field("artist") {
        tag.set_artist(artist.to_string());
    }
    if let Some(album) = metadata.field("album") {
        tag.set_album(album.to_string());
    }
    if let Some(genre) = metadata.field("genre") {
        tag.set_genre(genre.to_string());
    }
    if let Some(date) = metadata.field("date") {
        tag.insert_text(ItemKey::RecordingDate, date.to_string());
        if let Some(year) = leading_year(date) {
            tag.set_year(year);
        }
    }
    if let Some(track) = metadata.field("track_number")
        && let Some((number, total)) = parse_track(track)
    {
        tag.set_track(number);
        if let Some(total) = total {
            tag.set_track_total(total);
        }
    }
    if let Some(composer) = metadata.field("composer") {
        tag.insert_text(ItemKey::Composer, composer.to_string());
    }
    if let Some(album_artist) = metadata.field("album_artist") {
        tag.insert_text(ItemKey::AlbumArtist, album_artist.to_string());
    }
    if let Some(id) = metadata.field("recording_id") {
        tag.insert_text(ItemKey::MusicBrainzRecordingId, id.to_string());
    }
    if let Some(id) = metadata.field("release_id") {
        tag.insert_text(ItemKey::MusicBrainzReleaseId, id.to_string());
    }
}

/// The 4-digit year a date string must start with, if it has one.
fn leading_year(date: &str) -> Option<u32> {
    let digits: String = date.chars().take(4).collect();
    (digits.len() == 4 && digits.chars().all(|c| c.is_ascii_digit()))
        .then(|| digits.parse().ok())
        .flatten()
}

/// Parse `N` or `N/M` into (track, total).
fn parse_track(value: &str) -> Option<(u32, Option<u32>)> {
    match value.split_once('/') {
        Some((number, total)) => {
            Some((number.trim().parse().ok()?, Some(total.trim().parse().ok()?)))
        }
        None => Some((value.trim().parse().ok()?, None)),
    }
}

/// Backup-before-write wrapper around a [`TagWriter`].
pub struct MetadataWriter {
    inner: Box<dyn TagWriter>,
    keep_backups: bool,
}

impl MetadataWriter {
    pub fn new(keep_backups: bool) -> Self {
        Self {
            inner: Box::new(LoftyTagWriter),
            keep_backups,
        }
    }

    /// Writer with an injected tag backend, for tests.
    pub fn with_inner(inner: Box<dyn TagWriter>, keep_backups: bool) -> Self {
        Self {
            inner,
            keep_backups,
        }
    }

    /// Validate, back up, write, and either commit or roll back.
    ///
    /// Returns the validation warnings on success. On any save failure
    /// the original bytes are restored from the backup and the error is
    /// reported as [`Error::Write`]; the file on disk is untouched.
    /// Once the save has committed, a failure to remove the backup is a
    /// warning, never an error.
    pub fn write(&self, path: &Path, metadata: &AudioMetadata) -> Result<Vec<String>> {
        let (sanitized, mut warnings) = validate(metadata);
        for warning in &warnings {
            tracing::warn!(path = %path.display(), "{warning}");
        }

        let backup = backup_path(path);
        fs::copy(path, &backup).map_err(|e| Error::write(path, format!("backup failed: {e}")))?;

        match self.inner.write_tags(path, &sanitized) {
            Ok(()) => {
                if !self.keep_backups
                    && let Err(e) = fs::remove_file(&backup)
                {
                    tracing::warn!(path = %backup.display(), error = %e, "could not remove backup");
                    warnings.push(format!("could not remove backup {}: {e}", backup.display()));
                }
                Ok(warnings)
            }
            Err(e) => {
                // Restore the original bytes, then surface the failure
                fs::copy(&backup, path)
                    .map_err(|re| Error::write(path, format!("restore from backup failed: {re} (save failed: {e})")))?;
                if let Err(cleanup) = fs::remove_file(&backup) {
                    tracing::warn!(path = %backup.display(), error = %cleanup, "could not remove backup");
                }
                tracing::error!(path = %path.display(), error = %e, "tag save failed, original restored");
                Err(Error::write(path, e.to_string()))
            }
        }
    }
}

/// Sibling backup path: `song.mp3` -> `song.mp3.bak`.
fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".bak");
    path.with_file_name(name)
}

/// Drop malformed fields instead of refusing the whole write.
///
/// Track numbers must be `N` or `N/M`, dates must start with a 4-digit
/// year. A dropped field produces a warning, never an error.
fn validate(metadata: &AudioMetadata) -> (AudioMetadata, Vec<String>) {
    let mut sanitized = metadata.clone();
    let mut warnings = Vec::new();

    if let Some(track) = metadata.field("track_number")
        && parse_track(track).is_none()
    {
        warnings.push(format!("dropping malformed track number: {track:?}"));
        sanitized.track_number = None;
    }

    if let Some(date) = metadata.field("date")
        && leading_year(date).is_none()
    {
        warnings.push(format!("dropping date without a leading year: {date:?}"));
        sanitized.date = None;
    }

    (sanitized, warnings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MetadataSource;
    use tempfile::tempdir;

    /// Tag backend that scribbles over the file and then fails,
    /// simulating a codec crash mid-save.
    struct CorruptingWriter;

    impl TagWriter for CorruptingWriter {
        fn write_tags(&self, path: &Path, _metadata: &AudioMetadata) -> Result<()> {
            fs::write(path, b"half-written garbage")?;
            Err(Error::write(path, "simulated save failure"))
        }
    }

    /// Tag backend that rewrites the file and succeeds.
    struct ReplacingWriter;

    impl TagWriter for ReplacingWriter {
        fn write_tags(&self, path: &Path, _metadata: &AudioMetadata) -> Result<()> {
            fs::write(path, b"new tag data")?;
            Ok(())
        }
    }

    /// Tag backend that commits the save and deletes the backup itself,
    /// so the writer's own cleanup finds nothing to remove.
    struct BackupStealingWriter;

    impl TagWriter for BackupStealingWriter {
        fn write_tags(&self, path: &Path, _metadata: &AudioMetadata) -> Result<()> {
            fs::write(path, b"new tag data")?;
            let _ = fs::remove_file(backup_path(path));
            Ok(())
        }
    }

    fn sample() -> AudioMetadata {
        let mut meta = AudioMetadata::new(MetadataSource::Merged);
        meta.title = Some("Song".to_string());
        meta.track_number = Some("3/12".to_string());
        meta.date = Some("1982-05-21".to_string());
        meta
    }

    #[test]
    fn test_backup_path_appends_suffix() {
        assert_eq!(
            backup_path(Path::new("/music/song.mp3")),
            PathBuf::from("/music/song.mp3.bak")
        );
    }

    #[test]
    fn test_parse_track_shapes() {
        assert_eq!(parse_track("7"), Some((7, None)));
        assert_eq!(parse_track("3/12"), Some((3, Some(12))));
        assert_eq!(parse_track("3 / 12"), Some((3, Some(12))));
        assert_eq!(parse_track("three"), None);
        assert_eq!(parse_track("3/twelve"), None);
    }

    #[test]
    fn test_validation_drops_bad_fields_with_warnings() {
        let mut meta = sample();
        meta.track_number = Some("three".to_string());
        meta.date = Some("May 1982".to_string());

        let (sanitized, warnings) = validate(&meta);
        assert!(sanitized.track_number.is_none());
        assert!(sanitized.date.is_none());
        assert_eq!(sanitized.title.as_deref(), Some("Song"));
        assert_eq!(warnings.len(), 2);
    }

    #[test]
    fn test_validation_passes_clean_record_untouched() {
        let meta = sample();
        let (sanitized, warnings) = validate(&meta);
        assert_eq!(sanitized, meta);
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_failed_write_restores_original_bytes() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("song.mp3");
        fs::write(&path, b"pristine original audio").expect("seed file");

        let writer = MetadataWriter::with_inner(Box::new(CorruptingWriter), false);
        let err = writer.write(&path, &sample()).unwrap_err();

        assert!(matches!(err, Error::Write { .. }));
        let bytes = fs::read(&path).expect("read back");
        assert_eq!(bytes, b"pristine original audio");
        assert!(!backup_path(&path).exists(), "backup cleaned after rollback");
    }

    #[test]
    fn test_successful_write_removes_backup_by_default() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("song.mp3");
        fs::write(&path, b"original").expect("seed file");

        let writer = MetadataWriter::with_inner(Box::new(ReplacingWriter), false);
        let warnings = writer.write(&path, &sample()).expect("write");

        assert!(warnings.is_empty());
        assert_eq!(fs::read(&path).expect("read back"), b"new tag data");
        assert!(!backup_path(&path).exists());
    }

    #[test]
    fn test_keep_backups_retains_original_copy() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("song.flac");
        fs::write(&path, b"original").expect("seed file");

        let writer = MetadataWriter::with_inner(Box::new(ReplacingWriter), true);
        writer.write(&path, &sample()).expect("write");

        let backup = backup_path(&path);
        assert!(backup.exists());
        assert_eq!(fs::read(&backup).expect("read backup"), b"original");
    }

    #[test]
    fn test_malformed_fields_surface_as_warnings_not_errors() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("song.ogg");
        fs::write(&path, b"original").expect("seed file");

        let mut meta = sample();
        meta.track_number = Some("A1".to_string());

        let writer = MetadataWriter::with_inner(Box::new(ReplacingWriter), false);
        let warnings = writer.write(&path, &meta).expect("write succeeds");
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("track number"));
    }

    #[test]
    fn test_backup_cleanup_failure_does_not_fail_a_committed_write() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("song.mp3");
        fs::write(&path, b"original").expect("seed file");

        let writer = MetadataWriter::with_inner(Box::new(BackupStealingWriter), false);
        let warnings = writer.write(&path, &sample()).expect("committed write succeeds");

        assert_eq!(fs::read(&path).expect("read back"), b"new tag data");
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("backup"));
    }

    #[test]
    fn test_missing_file_is_a_write_error() {
        let writer = MetadataWriter::with_inner(Box::new(ReplacingWriter), false);
        let err = writer
            .write(Path::new("/nonexistent/song.mp3"), &sample())
            .unwrap_err();
        assert!(matches!(err, Error::Write { .. }));
        assert!(err.to_string().contains("backup failed"));
    }
}
