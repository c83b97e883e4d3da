//! Filename-derived metadata.
//!
//! When a file carries no usable tags, the name itself often encodes
//! track number, artist, and title. The parser tries an ordered list of
//! pattern rules from most specific to least specific; the first rule
//! whose structural shape matches wins - there is no scoring across
//! rules. Rules split only on spaced delimiters (` - `), so names like
//! "AC/DC - Back in Black" keep the artist intact.
//!
//! Trailing bracketed qualifiers ("(Remaster 2023)", "[Live]") are
//! stripped into the record's edition note before pattern matching, so
//! they never corrupt the title. A trailing parenthetical that does not
//! look like a qualifier is treated as the album.

use regex::Regex;
use std::sync::LazyLock;

use crate::model::{AudioMetadata, MetadataSource};

/// Capability interface for one filename pattern. Implementations are
/// registered in priority order on [`FilenameParser`].
pub trait FilenameRule: Send + Sync {
    /// Short identifier for logging.
    fn name(&self) -> &'static str;

    /// Cheap structural check without building a record.
    fn can_parse(&self, stem: &str) -> bool;

    /// Parse the stem into a partial record, or `None` if the shape
    /// does not match.
    fn parse(&self, stem: &str) -> Option<AudioMetadata>;
}

/// What each capture group of a pattern binds to.
#[derive(Debug, Clone, Copy)]
enum Slot {
    Track,
    Artist,
    Title,
    Album,
}

/// A regex-backed pattern rule.
struct PatternRule {
    name: &'static str,
    regex: Regex,
    slots: &'static [Slot],
}

impl PatternRule {
    fn new(name: &'static str, pattern: &str, slots: &'static [Slot]) -> Self {
        Self {
            name,
            regex: Regex::new(pattern).expect("filename rule regex is valid"),
            slots,
        }
    }
}

impl FilenameRule for PatternRule {
    fn name(&self) -> &'static str {
        self.name
    }

    fn can_parse(&self, stem: &str) -> bool {
        self.regex.is_match(stem)
    }

    fn parse(&self, stem: &str) -> Option<AudioMetadata> {
        let captures = self.regex.captures(stem)?;
        let mut meta = AudioMetadata::new(MetadataSource::Filename);

        for (i, slot) in self.slots.iter().enumerate() {
            let raw = captures.get(i + 1)?.as_str();
            match slot {
                Slot::Track => {
                    // Strip leading zeros; "00" and non-numbers are a
                    // structural mismatch
                    let number: u32 = raw.trim().parse().ok().filter(|&n| n > 0)?;
                    meta.track_number = Some(number.to_string());
                }
                Slot::Artist => meta.artist = clean_field(raw),
                Slot::Title => meta.title = clean_field(raw),
                Slot::Album => meta.album = clean_field(raw),
            }
        }

        // A rule only matches if it produced a title
        meta.title.as_ref()?;
        Some(meta)
    }
}

/// Ordered registry of filename rules.
pub struct FilenameParser {
    rules: Vec<Box<dyn FilenameRule>>,
}

impl Default for FilenameParser {
    fn default() -> Self {
        Self::new()
    }
}

impl FilenameParser {
    /// Parser with the built-in rule set, most specific first.
    pub fn new() -> Self {
        let rules: Vec<Box<dyn FilenameRule>> = vec![
            Box::new(PatternRule::new(
                "track-artist-title",
                r"^(\d{1,3})(?:\.| -)? +(.+?) - (.+)$",
                &[Slot::Track, Slot::Artist, Slot::Title],
            )),
            Box::new(PatternRule::new(
                "artist-album-title",
                r"^(.+?) - (.+?) - (.+)$",
                &[Slot::Artist, Slot::Album, Slot::Title],
            )),
            Box::new(PatternRule::new(
                "artist-title",
                r"^(.+?) - (.+)$",
                &[Slot::Artist, Slot::Title],
            )),
            Box::new(PatternRule::new(
                "track-title",
                r"^(\d{1,3})[. ]+(.*\D.*)$",
                &[Slot::Track, Slot::Title],
            )),
            Box::new(PatternRule::new(
                "title-only",
                r"^(.+)$",
                &[Slot::Title],
            )),
        ];
        Self { rules }
    }

    /// Parser with a custom rule list, tried in the given order.
    pub fn with_rules(rules: Vec<Box<dyn FilenameRule>>) -> Self {
        Self { rules }
    }

    /// Parse a file stem (extension already stripped by the caller) into
    /// a partial record with `source = Filename`, or `None` when nothing
    /// matches.
    pub fn parse(&self, stem: &str) -> Option<AudioMetadata> {
        let normalized = normalize(stem);
        let (remainder, edition, album_candidate) = strip_qualifiers(&normalized);
        if remainder.is_empty() {
            return None;
        }

        for rule in &self.rules {
            if !rule.can_parse(&remainder) {
                continue;
            }
            if let Some(mut meta) = rule.parse(&remainder) {
                tracing::debug!(rule = rule.name(), stem, "filename pattern matched");
                if meta.album.is_none() {
                    meta.album = album_candidate;
                }
                meta.edition = edition;
                return Some(meta);
            }
        }
        None
    }
}

/// Underscores to spaces, whitespace collapsed, ends trimmed.
fn normalize(stem: &str) -> String {
    let spaced = stem.replace('_', " ");
    spaced.split_whitespace().collect::<Vec<_>>().join(" ")
}

static TRAILING_QUALIFIER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<rest>.*?)\s*[(\[](?P<qual>[^()\[\]]+)[)\]]$").expect("qualifier regex")
});

/// Words that mark a bracketed qualifier as an edition note rather than
/// an album name. A bare four-digit year counts too.
const EDITION_KEYWORDS: [&str; 15] = [
    "remaster",
    "remastered",
    "live",
    "deluxe",
    "mono",
    "stereo",
    "demo",
    "remix",
    "edit",
    "version",
    "mix",
    "bonus",
    "single",
    "anniversary",
    "expanded",
];

/// Peel trailing bracketed qualifiers off the stem. Edition-like
/// qualifiers accumulate into the edition note; the first other
/// parenthetical becomes the album candidate.
fn strip_qualifiers(stem: &str) -> (String, Option<String>, Option<String>) {
    let mut remainder = stem.to_string();
    let mut editions: Vec<String> = Vec::new();
    let mut album = None;

    while let Some(captures) = TRAILING_QUALIFIER.captures(&remainder) {
        let rest = captures["rest"].trim().to_string();
        let qual = captures["qual"].trim().to_string();
        if rest.is_empty() || qual.is_empty() {
            break;
        }
        if is_edition_qualifier(&qual) {
            editions.insert(0, qual);
        } else if album.is_none() {
            album = Some(qual);
        } else {
            break;
        }
        remainder = rest;
    }

    let edition = if editions.is_empty() {
        None
    } else {
        Some(editions.join(", "))
    };
    (remainder, edition, album)
}

fn is_edition_qualifier(qual: &str) -> bool {
    let lower = qual.to_lowercase();
    if lower.len() == 4 && lower.chars().all(|c| c.is_ascii_digit()) {
        return true;
    }
    EDITION_KEYWORDS.iter().any(|kw| lower.contains(kw))
}

/// Trim stray separators left at field edges by the pattern split.
fn clean_field(raw: &str) -> Option<String> {
    let cleaned = raw
        .trim()
        .trim_matches(|c: char| c == '-' || c == '.' || c.is_whitespace())
        .to_string();
    if cleaned.is_empty() { None } else { Some(cleaned) }
}
