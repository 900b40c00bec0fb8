//! Language tag validation.
//!
//! Only the shape of the tag is checked here (`fr`, `pt-BR`, `zh-Hant`).
//! Whether the engine actually supports a language is the engine's call and
//! surfaces as a permanent engine failure.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::TranslateError;

static LANGUAGE_TAG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z]{2,3}(-[A-Za-z0-9]{2,8})*$").expect("language tag regex is valid")
});

/// Validate and normalise a language tag.
///
/// The primary subtag is lower-cased, a two-letter region is upper-cased:
/// `PT-br` becomes `pt-BR`.
pub fn normalize_language(tag: &str) -> Result<String, TranslateError> {
    let tag = tag.trim();
    if !LANGUAGE_TAG.is_match(tag) {
        return Err(TranslateError::InvalidLanguage {
            tag: tag.to_string(),
        });
    }

    let mut parts = tag.split('-');
    let mut out = parts.next().unwrap_or_default().to_ascii_lowercase();
    for sub in parts {
        out.push('-');
        if sub.len() == 2 && sub.bytes().all(|b| b.is_ascii_alphabetic()) {
            out.push_str(&sub.to_ascii_uppercase());
        } else {
            out.push_str(sub);
        }
    }
    Ok(out)
}
