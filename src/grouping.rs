//! Grouping keys cluster the episodes of one series/season.
//!
//! A key is derived data. Two unrelated uploads whose cleaned names coincide
//! share a key, and nothing relies on keys being unique.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::metadata::VideoMetadata;

const MAX_SLUG_CHARS: usize = 50;

static NON_SLUG: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\s-]").unwrap());
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// `series-<slug>-s<season>` when a season is known, `movie-<slug>` otherwise.
pub fn grouping_key(metadata: &VideoMetadata, file_name: &str) -> String {
    let name = match metadata.series_name.as_deref().filter(|n| !n.is_empty()) {
        Some(series) => series.to_string(),
        None => {
            let base = if file_name.is_empty() {
                "unknown"
            } else {
                file_name.split('.').next().unwrap_or("")
            };
            truncate_chars(&NON_SLUG.replace_all(base, ""), MAX_SLUG_CHARS)
        }
    };

    let cleaned = NON_SLUG.replace_all(&name.to_lowercase(), "").into_owned();
    let slug = truncate_chars(&WHITESPACE.replace_all(cleaned.trim(), "-"), MAX_SLUG_CHARS);

    match metadata.season_number {
        Some(season) if season > 0 => format!("series-{slug}-s{season}"),
        _ => format!("movie-{slug}"),
    }
}

/// Stem of a file name, used as the display title when no name was extracted.
pub fn file_stem(file_name: &str) -> &str {
    file_name.split('.').next().unwrap_or(file_name)
}

fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}
