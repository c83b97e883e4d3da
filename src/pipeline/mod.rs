//! Batch orchestration.
//!
//! Runs each file through extract -> parse -> lookup -> merge -> write
//! and isolates failures: one corrupt file or blown deadline never
//! takes down the batch. External lookups are skipped when the local
//! sources already produce a confident, complete record, and suspended
//! for the rest of the batch after a quota-class service error.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::time::Instant;

use crate::config::Config;
use crate::error::Error;
use crate::extract::{LoftyExtractor, TagExtractor};
use crate::lookup::{LookupApi, MusicBrainzClient, RateLimiter};
use crate::model::{AudioMetadata, ProcessingResult};
use crate::parse::FilenameParser;
use crate::reconcile::{self, Candidate};
use crate::writer::MetadataWriter;

/// Cooperative cancellation for a running batch. Files already being
/// processed finish; files not yet started are reported as stopped.
#[derive(Clone)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// Per-file lifecycle, surfaced in logs. `Errored` absorbs from any
/// stage; everything else advances in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Extracted,
    Queried,
    Reconciled,
    Written,
    Done,
    Errored,
}

/// The per-file processing pipeline plus batch scheduling state.
pub struct MetadataPipeline {
    extractor: Arc<dyn TagExtractor>,
    parser: FilenameParser,
    lookup: Arc<dyn LookupApi>,
    writer: Arc<MetadataWriter>,
    search_threshold: f32,
    file_deadline: Duration,
    concurrency: usize,
    lookup_suspended: AtomicBool,
    stop: Arc<AtomicBool>,
}

impl MetadataPipeline {
    /// Production wiring from config: lofty extraction, the built-in
    /// filename rules, a rate-limited MusicBrainz client, and the
    /// backup-first writer.
    pub fn new(config: &Config) -> Self {
        let limiter = Arc::new(RateLimiter::from_secs(config.lookup.rate_limit));
        let lookup = Arc::new(MusicBrainzClient::new(config.lookup.clone(), limiter));
        Self::with_components(
            Arc::new(LoftyExtractor),
            lookup,
            Arc::new(MetadataWriter::new(config.writer.keep_backups)),
            config,
        )
    }

    /// Pipeline with injected components, for tests.
    pub fn with_components(
        extractor: Arc<dyn TagExtractor>,
        lookup: Arc<dyn LookupApi>,
        writer: Arc<MetadataWriter>,
        config: &Config,
    ) -> Self {
        Self {
            extractor,
            parser: FilenameParser::new(),
            lookup,
            writer,
            search_threshold: config.lookup.search_threshold,
            file_deadline: Duration::from_secs(config.processing.file_deadline_secs),
            concurrency: config.processing.concurrency.max(1),
            lookup_suspended: AtomicBool::new(false),
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Handle that can stop the batch from another task.
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle(Arc::clone(&self.stop))
    }

    /// Process a batch of files with bounded concurrency.
    ///
    /// Every input path gets exactly one entry in the result map, in
    /// whatever order the files finish.
    pub async fn process_batch(
        &self,
        files: &[PathBuf],
        write: bool,
    ) -> HashMap<PathBuf, ProcessingResult> {
        let semaphore = Semaphore::new(self.concurrency);

        let tasks = files.iter().map(|path| {
            let semaphore = &semaphore;
            async move {
                let _permit = semaphore.acquire().await.expect("semaphore open");
                let result = if self.stop.load(Ordering::SeqCst) {
                    ProcessingResult::failed(
                        "batch stopped before this file started",
                        Vec::new(),
                        Duration::ZERO,
                    )
                } else {
                    self.process_file(path, write).await
                };
                (path.clone(), result)
            }
        });

        futures::future::join_all(tasks).await.into_iter().collect()
    }

    /// Process one file under the per-file deadline.
    pub async fn process_file(&self, path: &Path, write: bool) -> ProcessingResult {
        let started = Instant::now();
        match tokio::time::timeout(self.file_deadline, self.run_stages(path, write)).await {
            Ok(result) => result,
            Err(_) => {
                let err = Error::Deadline(path.to_path_buf());
                tracing::warn!(path = %path.display(), "{err}");
                ProcessingResult::failed(err.to_string(), Vec::new(), started.elapsed())
            }
        }
    }

    async fn run_stages(&self, path: &Path, write: bool) -> ProcessingResult {
        let started = Instant::now();
        let mut warnings = Vec::new();

        // Extract. An unreadable container is fatal for this file;
        // absent tags just mean the embedded source has nothing to say.
        // Tag IO is synchronous, so it runs on the blocking pool to keep
        // the deadline timer and the other workers responsive.
        let extractor = Arc::clone(&self.extractor);
        let extract_path = path.to_path_buf();
        let extracted = tokio::task::spawn_blocking(move || extractor.extract(&extract_path))
            .await
            .unwrap_or_else(|e| Err(Error::corrupt_file(path, format!("extraction task failed: {e}"))));
        let embedded = match extracted {
            Ok(meta) => meta,
            Err(e) => {
                tracing::warn!(path = %path.display(), stage = ?Stage::Errored, error = %e, "extraction failed");
                return ProcessingResult::failed(e.to_string(), warnings, started.elapsed());
            }
        };
        tracing::debug!(path = %path.display(), stage = ?Stage::Extracted, has_tags = !embedded.is_empty());

        let mut candidates = Vec::new();
        if !embedded.is_empty() {
            candidates.push(Candidate::embedded(embedded));
        }

        if let Some(stem) = path.file_stem().and_then(|s| s.to_str())
            && let Some(parsed) = self.parser.parse(stem)
        {
            candidates.push(Candidate::filename(parsed));
        }

        // Local-only view decides whether the lookup is worth a request
        let local = reconcile::merge(&candidates, self.search_threshold);

        if self.needs_lookup(&local) {
            match self.lookup.search(&local).await {
                Ok(matches) => {
                    tracing::debug!(path = %path.display(), stage = ?Stage::Queried, matches = matches.len());
                    candidates.extend(matches.into_iter().map(Candidate::external));
                }
                Err(e) => {
                    if e.is_lookup_quota() {
                        self.suspend_lookups(&e);
                    }
                    warnings.push(format!("external lookup failed: {e}"));
                }
            }
        }

        let merged = reconcile::merge(&candidates, self.search_threshold);
        tracing::debug!(path = %path.display(), stage = ?Stage::Reconciled, confidence = merged.confidence);

        if write {
            let writer = Arc::clone(&self.writer);
            let write_path = path.to_path_buf();
            let record = merged.clone();
            let written = tokio::task::spawn_blocking(move || writer.write(&write_path, &record))
                .await
                .unwrap_or_else(|e| Err(Error::write(path, format!("write task failed: {e}"))));
            match written {
                Ok(mut write_warnings) => {
                    tracing::debug!(path = %path.display(), stage = ?Stage::Written);
                    warnings.append(&mut write_warnings);
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), stage = ?Stage::Errored, error = %e, "write failed");
                    return ProcessingResult::failed(e.to_string(), warnings, started.elapsed());
                }
            }
        }

        tracing::debug!(path = %path.display(), stage = ?Stage::Done, warnings = warnings.len());
        ProcessingResult::ok(merged, warnings, started.elapsed())
    }

    /// Lookup only when it can help: something to search on, room to
    /// improve, and the service hasn't told us to back off.
    fn needs_lookup(&self, local: &AudioMetadata) -> bool {
        if self.lookup_suspended.load(Ordering::SeqCst) || !local.has_search_terms() {
            return false;
        }
        local.confidence < self.search_threshold || !local.is_complete()
    }

    /// Stop issuing lookups for the rest of the batch after the
    /// service signals auth or quota trouble. Retrying into a 429/503
    /// only digs the hole deeper.
    fn suspend_lookups(&self, error: &Error) {
        if !self.lookup_suspended.swap(true, Ordering::SeqCst) {
            tracing::warn!(error = %error, "suspending external lookups for this batch");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::lookup::traits::mocks::MockLookup;
    use crate::model::MetadataSource;
    use crate::writer::TagWriter;

    /// Extractor driven by the file name: stems containing "corrupt"
    /// fail, stems containing "tagged" return a full record, everything
    /// else has no embedded tags.
    struct StubExtractor;

    impl TagExtractor for StubExtractor {
        fn extract(&self, path: &Path) -> crate::error::Result<AudioMetadata> {
            let stem = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or_default();
            if stem.contains("corrupt") {
                return Err(Error::corrupt_file(path, "stub corruption"));
            }
            let mut meta = AudioMetadata::new(MetadataSource::Embedded);
            if stem.contains("tagged") {
                meta.title = Some("Tagged Title".to_string());
                meta.artist = Some("Tagged Artist".to_string());
                meta.album = Some("Tagged Album".to_string());
                meta.date = Some("1999".to_string());
                meta.genre = Some("Rock".to_string());
                meta.track_number = Some("1".to_string());
                if stem.contains("badtrack") {
                    meta.track_number = Some("A1".to_string());
                }
            }
            Ok(meta)
        }

        fn supports(&self, _path: &Path) -> bool {
            true
        }
    }

    struct NoopTagWriter;

    impl TagWriter for NoopTagWriter {
        fn write_tags(&self, _path: &Path, _metadata: &AudioMetadata) -> crate::error::Result<()> {
            Ok(())
        }
    }

    /// Tag backend that scribbles over the file and then fails, so the
    /// writer has to roll back.
    struct ScribblingWriter;

    impl TagWriter for ScribblingWriter {
        fn write_tags(&self, path: &Path, _metadata: &AudioMetadata) -> crate::error::Result<()> {
            std::fs::write(path, b"scribble")?;
            Err(Error::write(path, "simulated save failure"))
        }
    }

    fn pipeline_with(lookup: Arc<dyn LookupApi>) -> Arc<MetadataPipeline> {
        pipeline_with_writer(Box::new(NoopTagWriter), lookup)
    }

    fn pipeline_with_writer(
        inner: Box<dyn TagWriter>,
        lookup: Arc<dyn LookupApi>,
    ) -> Arc<MetadataPipeline> {
        Arc::new(MetadataPipeline::with_components(
            Arc::new(StubExtractor),
            lookup,
            Arc::new(MetadataWriter::with_inner(inner, false)),
            &Config::default(),
        ))
    }

    #[tokio::test]
    async fn test_corrupt_file_does_not_poison_the_batch() {
        let pipeline = pipeline_with(Arc::new(MockLookup::no_matches()));
        let files = vec![
            PathBuf::from("one - tagged.mp3"),
            PathBuf::from("two - corrupt.mp3"),
            PathBuf::from("three - tagged.mp3"),
        ];

        let results = pipeline.process_batch(&files, false).await;

        assert_eq!(results.len(), 3);
        assert!(results[&files[0]].success);
        assert!(!results[&files[1]].success);
        assert!(results[&files[2]].success);
        assert!(
            results[&files[1]]
                .error
                .as_deref()
                .unwrap_or_default()
                .contains("stub corruption")
        );
    }

    #[tokio::test]
    async fn test_complete_confident_record_skips_lookup() {
        let lookup = Arc::new(MockLookup::single_match("Other", "Other", 0.99));
        let pipeline = pipeline_with(lookup.clone());

        let result = pipeline
            .process_file(Path::new("tagged song.mp3"), false)
            .await;

        assert!(result.success);
        assert_eq!(lookup.call_count(), 0);
        let meta = result.metadata.expect("metadata");
        assert_eq!(meta.title.as_deref(), Some("Tagged Title"));
    }

    #[tokio::test]
    async fn test_incomplete_record_triggers_lookup_and_merges() {
        let lookup = Arc::new(MockLookup::single_match("Yellow", "Coldplay", 0.95));
        let pipeline = pipeline_with(lookup.clone());

        let result = pipeline
            .process_file(Path::new("Coldplay - Yellow.mp3"), false)
            .await;

        assert!(result.success);
        assert_eq!(lookup.call_count(), 1);
        let meta = result.metadata.expect("metadata");
        // External match above the threshold outranks filename guesses
        assert_eq!(meta.title.as_deref(), Some("Yellow"));
        assert_eq!(meta.recording_id.as_deref(), Some("mock-recording-id"));
    }

    #[tokio::test]
    async fn test_quota_error_suspends_lookups_for_the_batch() {
        let lookup = Arc::new(MockLookup::with_error(503, "rate limited"));
        let pipeline = pipeline_with(lookup.clone());

        // Sequential calls make the suspension point deterministic
        for name in ["a - b.mp3", "c - d.mp3", "e - f.mp3"] {
            let result = pipeline.process_file(Path::new(name), false).await;
            assert!(result.success, "lookup failure is a warning, not fatal");
        }

        assert_eq!(lookup.call_count(), 1, "suspended after the first error");
    }

    #[tokio::test]
    async fn test_transient_lookup_error_is_warning_only() {
        let lookup = Arc::new(MockLookup::with_error(500, "server fell over"));
        let pipeline = pipeline_with(lookup.clone());

        let first = pipeline.process_file(Path::new("a - b.mp3"), false).await;
        let second = pipeline.process_file(Path::new("c - d.mp3"), false).await;

        assert!(first.success && second.success);
        assert!(first.warnings.iter().any(|w| w.contains("lookup failed")));
        assert_eq!(lookup.call_count(), 2, "non-quota errors do not suspend");
    }

    #[tokio::test]
    async fn test_stop_handle_skips_unstarted_files() {
        let pipeline = pipeline_with(Arc::new(MockLookup::no_matches()));
        pipeline.stop_handle().stop();

        let files = vec![PathBuf::from("a - tagged.mp3"), PathBuf::from("b - tagged.mp3")];
        let results = pipeline.process_batch(&files, false).await;

        assert!(results.values().all(|r| !r.success));
        assert!(
            results
                .values()
                .all(|r| r.error.as_deref().unwrap_or_default().contains("stopped"))
        );
    }

    #[tokio::test]
    async fn test_every_input_gets_a_result() {
        let pipeline = pipeline_with(Arc::new(MockLookup::no_matches()));
        let files: Vec<PathBuf> = (0..10)
            .map(|i| PathBuf::from(format!("artist - song {i}.mp3")))
            .collect();

        let results = pipeline.process_batch(&files, false).await;

        assert_eq!(results.len(), files.len());
        for file in &files {
            assert!(results.contains_key(file), "missing result for {file:?}");
        }
    }

    #[tokio::test]
    async fn test_write_mode_commits_and_cleans_up_the_backup() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("tagged song.mp3");
        std::fs::write(&path, b"original audio").expect("seed file");

        let pipeline = pipeline_with(Arc::new(MockLookup::no_matches()));
        let result = pipeline.process_file(&path, true).await;

        assert!(result.success);
        assert!(result.warnings.is_empty());
        assert!(
            !dir.path().join("tagged song.mp3.bak").exists(),
            "backup removed after commit"
        );
    }

    #[tokio::test]
    async fn test_write_failure_fails_the_file_and_restores_bytes() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("tagged song.mp3");
        std::fs::write(&path, b"original audio").expect("seed file");

        let pipeline =
            pipeline_with_writer(Box::new(ScribblingWriter), Arc::new(MockLookup::no_matches()));
        let result = pipeline.process_file(&path, true).await;

        assert!(!result.success);
        assert!(
            result
                .error
                .as_deref()
                .unwrap_or_default()
                .contains("Write failed")
        );
        let bytes = std::fs::read(&path).expect("read back");
        assert_eq!(bytes, b"original audio", "rolled back to the original");
    }

    #[tokio::test]
    async fn test_write_validation_warnings_reach_the_result() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("tagged badtrack song.mp3");
        std::fs::write(&path, b"original audio").expect("seed file");

        let pipeline = pipeline_with(Arc::new(MockLookup::no_matches()));
        let result = pipeline.process_file(&path, true).await;

        assert!(result.success, "dropped field is a warning, not fatal");
        assert!(result.warnings.iter().any(|w| w.contains("track number")));
    }

    #[tokio::test]
    async fn test_second_write_run_changes_nothing() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("tagged song.mp3");
        std::fs::write(&path, b"original audio").expect("seed file");

        let pipeline = pipeline_with(Arc::new(MockLookup::no_matches()));
        let first = pipeline.process_file(&path, true).await;
        let second = pipeline.process_file(&path, true).await;

        assert!(first.success && second.success);
        assert!(second.warnings.is_empty());

        let mut a = first.metadata.expect("first record");
        let b = second.metadata.expect("second record");
        assert!((b.confidence - 1.0).abs() < 1e-6);
        a.last_updated = b.last_updated;
        assert_eq!(a, b, "a fully tagged file reconciles to the same record");
    }

    /// Extractor that blocks the thread, standing in for slow tag IO.
    struct SlowExtractor;

    impl TagExtractor for SlowExtractor {
        fn extract(&self, _path: &Path) -> crate::error::Result<AudioMetadata> {
            std::thread::sleep(Duration::from_millis(200));
            Ok(AudioMetadata::new(MetadataSource::Embedded))
        }

        fn supports(&self, _path: &Path) -> bool {
            true
        }
    }

    #[tokio::test]
    async fn test_blocking_extraction_cannot_outlive_the_deadline() {
        let mut config = Config::default();
        config.processing.file_deadline_secs = 0;
        let pipeline = MetadataPipeline::with_components(
            Arc::new(SlowExtractor),
            Arc::new(MockLookup::no_matches()),
            Arc::new(MetadataWriter::with_inner(Box::new(NoopTagWriter), false)),
            &config,
        );

        let result = pipeline.process_file(Path::new("slow.mp3"), false).await;

        assert!(!result.success);
        assert!(
            result
                .error
                .as_deref()
                .unwrap_or_default()
                .contains("deadline")
        );
    }

    #[tokio::test]
    async fn test_filename_only_record_is_discounted() {
        let pipeline = pipeline_with(Arc::new(MockLookup::no_matches()));

        let result = pipeline
            .process_file(Path::new("07. Some Artist - Some Song.mp3"), false)
            .await;

        assert!(result.success);
        let meta = result.metadata.expect("metadata");
        assert_eq!(meta.source, MetadataSource::Filename);
        assert!(meta.confidence < 0.8, "filename guesses stay below threshold");
        assert_eq!(meta.title.as_deref(), Some("Some Song"));
        assert_eq!(meta.artist.as_deref(), Some("Some Artist"));
    }
}
