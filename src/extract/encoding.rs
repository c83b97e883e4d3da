//! Repair of double-encoded UTF-8 tag text.
//!
//! A common corruption: text is stored as UTF-8, misread as Latin-1, and
//! re-encoded as UTF-8. "Garçon" then surfaces as "GarÃ§on". The repair
//! reverses the round trip - re-encode the string as Latin-1 bytes and
//! decode those bytes as UTF-8 - and accepts the result only if it
//! strictly reduces the garble score.

/// Score one string for mojibake evidence: replacement characters,
/// control characters, and code points in U+0080..=U+00BF. That last
/// range is where UTF-8 continuation bytes land when misread as Latin-1,
/// which is why "Ã§" (C3 A7) scores and "café" does not.
pub fn garble_score(text: &str) -> usize {
    text.chars()
        .filter(|&c| {
            c == char::REPLACEMENT_CHARACTER
                || c.is_control()
                || ('\u{0080}'..='\u{00BF}').contains(&c)
        })
        .count()
}

/// Attempt to repair a double-encoded string.
///
/// Returns `Some(repaired)` only when the Latin-1 round trip yields valid
/// UTF-8 with a strictly lower garble score; otherwise the input is left
/// alone and `None` is returned.
pub fn repair_double_encoded(text: &str) -> Option<String> {
    let bytes = latin1_bytes(text)?;
    let repaired = String::from_utf8(bytes).ok()?;
    if garble_score(&repaired) < garble_score(text) {
        Some(repaired)
    } else {
        None
    }
}

/// Repair a string if possible, otherwise return it unchanged.
pub fn fix(text: &str) -> String {
    match repair_double_encoded(text) {
        Some(repaired) => {
            tracing::debug!(original = text, repaired = %repaired, "repaired double-encoded text");
            repaired
        }
        None => text.to_string(),
    }
}

/// Encode a string as Latin-1. Only possible when every code point fits
/// in one byte; anything else means the text was never a Latin-1 misread.
fn latin1_bytes(text: &str) -> Option<Vec<u8>> {
    text.chars()
        .map(|c| {
            let cp = c as u32;
            if cp <= 0xFF { Some(cp as u8) } else { None }
        })
        .collect()
}
