//! CLI command definitions and handlers.
//!
//! Each subcommand is implemented as a function that takes the parsed
//! arguments and returns an `anyhow::Result<()>`.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tokio::runtime::Runtime;

use crate::config;
use crate::extract::SUPPORTED_EXTENSIONS;
use crate::model::ProcessingResult;
use crate::parse::FilenameParser;
use crate::pipeline::MetadataPipeline;

/// TagMend CLI
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand)]
pub enum Commands {
    /// Reconcile metadata for a file or directory of audio files
    Process {
        /// Path to the file or directory to process
        path: PathBuf,
        /// Write reconciled tags back to the files
        #[arg(long)]
        write: bool,
        /// Show what would be written without changing any file
        #[arg(long)]
        dry_run: bool,
        /// Recurse into subdirectories
        #[arg(short, long)]
        recursive: bool,
        /// Keep the .bak files after successful writes
        #[arg(long)]
        keep_backups: bool,
        /// Files processed concurrently (overrides config)
        #[arg(long)]
        concurrency: Option<usize>,
        /// Similarity an external match must reach (0.0-1.0, overrides config)
        #[arg(long, env = "TAGMEND_SEARCH_THRESHOLD")]
        search_threshold: Option<f32>,
    },
    /// Show the reconciled record for one file without writing
    Inspect {
        /// Path to the audio file
        path: PathBuf,
    },
    /// Parse a file name and show the fields the rules infer from it
    ParseName {
        /// File name or stem to parse
        name: String,
    },
}

/// Run the specified CLI command.
pub fn run_command(cli: &Cli) -> anyhow::Result<()> {
    let rt = Runtime::new()?;

    match &cli.command {
        Commands::Process {
            path,
            write,
            dry_run,
            recursive,
            keep_backups,
            concurrency,
            search_threshold,
        } => cmd_process(
            &rt,
            path,
            *write && !*dry_run,
            *dry_run,
            *recursive,
            *keep_backups,
            *concurrency,
            *search_threshold,
        ),
        Commands::Inspect { path } => cmd_inspect(&rt, path),
        Commands::ParseName { name } => cmd_parse_name(name),
    }
}

// ============================================================================
// Individual command implementations
// ============================================================================

#[allow(clippy::too_many_arguments)]
fn cmd_process(
    rt: &Runtime,
    path: &PathBuf,
    write: bool,
    dry_run: bool,
    recursive: bool,
    keep_backups: bool,
    concurrency: Option<usize>,
    search_threshold: Option<f32>,
) -> anyhow::Result<()> {
    let mut config = config::load();
    config.writer.keep_backups |= keep_backups;
    if let Some(concurrency) = concurrency {
        config.processing.concurrency = concurrency;
    }
    if let Some(threshold) = search_threshold {
        config.lookup.search_threshold = threshold;
    }

    let files = collect_audio_files(path, recursive);
    if files.is_empty() {
        println!("No audio files found.");
        return Ok(());
    }

    if dry_run {
        println!("DRY RUN - no files will be modified\n");
    }
    println!("Processing {} file(s)...\n", files.len());

    let pipeline = MetadataPipeline::new(&config);
    let results = rt.block_on(pipeline.process_batch(&files, write));

    let mut ordered: Vec<_> = results.into_iter().collect();
    ordered.sort_by(|a, b| a.0.cmp(&b.0));

    let mut success_count = 0;
    let mut error_count = 0;

    for (file, result) in &ordered {
        let name = file
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| file.display().to_string());

        if result.success {
            success_count += 1;
            let confidence = result
                .metadata
                .as_ref()
                .map(|m| m.confidence * 100.0)
                .unwrap_or(0.0);
            println!("✓ {} (confidence: {:.0}%)", name, confidence);
        } else {
            error_count += 1;
            println!(
                "✗ {}: {}",
                name,
                result.error.as_deref().unwrap_or("unknown error")
            );
        }
        for warning in &result.warnings {
            println!("  warning: {}", warning);
        }
    }

    println!(
        "\nCompleted: {} successful, {} errors",
        success_count, error_count
    );
    Ok(())
}

fn cmd_inspect(rt: &Runtime, path: &PathBuf) -> anyhow::Result<()> {
    let config = config::load();
    let pipeline = MetadataPipeline::new(&config);

    let result = rt.block_on(pipeline.process_file(path, false));
    print_result(path, &result);

    if !result.success {
        std::process::exit(1);
    }
    Ok(())
}

fn cmd_parse_name(name: &str) -> anyhow::Result<()> {
    // Accept either a bare stem or a full file name
    let stem = Path::new(name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(name);

    let parser = FilenameParser::new();
    match parser.parse(stem) {
        Some(meta) => {
            println!("✓ Parsed {:?}", stem);
            println!();
            print_fields(&meta);
        }
        None => {
            println!("✗ No rule matched {:?}", stem);
        }
    }
    Ok(())
}

// ============================================================================
// Output helpers
// ============================================================================

fn print_result(path: &Path, result: &ProcessingResult) {
    match (&result.metadata, &result.error) {
        (Some(meta), _) => {
            println!(
                "✓ {} (source: {}, confidence: {:.0}%)",
                path.display(),
                meta.source,
                meta.confidence * 100.0
            );
            println!();
            print_fields(meta);
            if !meta.is_complete() {
                println!();
                println!("  Missing: {}", meta.missing_fields().join(", "));
            }
        }
        (None, Some(error)) => {
            eprintln!("✗ {}: {}", path.display(), error);
        }
        (None, None) => {
            eprintln!("✗ {}: no metadata produced", path.display());
        }
    }
    for warning in &result.warnings {
        println!("  warning: {}", warning);
    }
}

fn print_fields(meta: &crate::model::AudioMetadata) {
    let rows = [
        ("Title", &meta.title),
        ("Artist", &meta.artist),
        ("Album", &meta.album),
        ("Date", &meta.date),
        ("Genre", &meta.genre),
        ("Track", &meta.track_number),
        ("Composer", &meta.composer),
        ("Album artist", &meta.album_artist),
        ("Edition", &meta.edition),
        ("Recording ID", &meta.recording_id),
        ("Release ID", &meta.release_id),
    ];
    for (label, value) in rows {
        if let Some(value) = value {
            println!("  {:<13} {}", format!("{label}:"), value);
        }
    }
}

// ============================================================================
// File collection helpers
// ============================================================================

/// Collect audio files under a path. A file path is returned as-is, a
/// directory is listed (recursively with `recursive`).
fn collect_audio_files(path: &PathBuf, recursive: bool) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = if path.is_dir() {
        if recursive {
            walkdir::WalkDir::new(path)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
                .filter(|e| is_audio_file(e.path()))
                .map(|e| e.path().to_path_buf())
                .collect()
        } else {
            match std::fs::read_dir(path) {
                Ok(entries) => entries
                    .filter_map(|e| e.ok())
                    .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
                    .filter(|e| is_audio_file(&e.path()))
                    .map(|e| e.path())
                    .collect(),
                Err(e) => {
                    tracing::error!(path = %path.display(), error = %e, "failed to read directory");
                    Vec::new()
                }
            }
        }
    } else {
        vec![path.clone()]
    };
    files.sort();
    files
}

/// Check if a path has a supported audio file extension
fn is_audio_file(path: &Path) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .map(|s| s.to_lowercase())
        .map(|ext| SUPPORTED_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}
