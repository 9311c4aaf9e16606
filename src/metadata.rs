//! Caption and file name normalization.
//!
//! Captions in the archive are free text, mostly Arabic with English
//! fragments ("الموسم الثاني الحلقة 5 مترجم 720p", "Show S01E02 HD"). Each
//! attribute is looked up by its own ordered rule; the first match wins and
//! an attribute that no rule finds is simply left unset.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Subtitle/dub state of a video, stored with its Arabic label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContentStatus {
    #[serde(rename = "مترجم")]
    Subbed,
    #[serde(rename = "مدبلج")]
    Dubbed,
    #[serde(rename = "متحدث")]
    ArabicSpoken,
}

impl ContentStatus {
    pub fn label(self) -> &'static str {
        match self {
            ContentStatus::Subbed => "مترجم",
            ContentStatus::Dubbed => "مدبلج",
            ContentStatus::ArabicSpoken => "متحدث",
        }
    }
}

/// Attributes extracted from a caption. Serialized as the `metadata` blob
/// of a video row; unset attributes are left out of the JSON.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub series_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub season_number: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub episode_number: Option<u32>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_final_episode: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality_resolution: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ContentStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub production: Option<String>,
}

impl VideoMetadata {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Human readable lines for the attributes that are set.
    pub fn summary_lines(&self) -> Vec<String> {
        let mut lines = Vec::new();
        if let Some(name) = &self.series_name {
            lines.push(format!("🎬 Name: {name}"));
        }
        if let Some(season) = self.season_number {
            lines.push(format!("📺 Season: {season}"));
        }
        if let Some(episode) = self.episode_number {
            if self.is_final_episode {
                lines.push(format!("🎞 Episode: {episode} (final)"));
            } else {
                lines.push(format!("🎞 Episode: {episode}"));
            }
        }
        if let Some(quality) = &self.quality_resolution {
            lines.push(format!("🎥 Quality: {quality}"));
        }
        if let Some(status) = self.status {
            lines.push(format!("🎭 Status: {}", status.label()));
        }
        if let Some(production) = &self.production {
            lines.push(format!("🏬 Production: {production}"));
        }
        lines
    }
}

const ARABIC_ORDINALS: &[(&str, u32)] = &[
    ("الاول", 1),
    ("الأول", 1),
    ("الاولى", 1),
    ("الأولى", 1),
    ("واحد", 1),
    ("الثاني", 2),
    ("الثانية", 2),
    ("اثنين", 2),
    ("الثالث", 3),
    ("الثالثة", 3),
    ("ثلاثة", 3),
    ("الرابع", 4),
    ("الرابعة", 4),
    ("اربعة", 4),
    ("أربعة", 4),
    ("الخامس", 5),
    ("الخامسة", 5),
    ("خمسة", 5),
    ("السادس", 6),
    ("السادسة", 6),
    ("ستة", 6),
    ("السابع", 7),
    ("السابعة", 7),
    ("سبعة", 7),
    ("الثامن", 8),
    ("الثامنة", 8),
    ("ثمانية", 8),
    ("التاسع", 9),
    ("التاسعة", 9),
    ("تسعة", 9),
    ("العاشر", 10),
    ("العاشرة", 10),
    ("عشرة", 10),
];

/// Resolve an Arabic ordinal or cardinal word (1 through 10).
pub fn arabic_ordinal(word: &str) -> Option<u32> {
    let word = word.trim();
    ARABIC_ORDINALS
        .iter()
        .find(|(candidate, _)| *candidate == word)
        .map(|(_, value)| *value)
}

static SUBBED: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)مترجم|subbed|sub").unwrap());
static DUBBED: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)مدبلج|dubbed|dub").unwrap());
static ARABIC_SPOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)متحدث عربي").unwrap());
static QUALITY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{3,4}[pP])|([Hh][Dd])|([48][Kk])").unwrap());
static SEASON_EPISODE_PAIR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bS(\d+)\s*E(\d+)").unwrap());
// Latin S and E only count at a word start, so "Bus12" is not season 12.
static SEASON: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:الموسم|\bseason)\s*(\d+)|\bS(\d+)|الموسم\s+([^\s\d]+)").unwrap()
});
// The optional trailing p is captured so "720p" can be told apart from an episode.
// A bare E may also follow a digit, as in "2E05".
static EPISODE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(?:الحلقة|\bepisode)\s*(\d+)([pP]?)|(?:\b|\d)E(\d+)([pP]?)|الحلقة\s+([^\s\d]+)",
    )
    .unwrap()
});
static FINAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)الاخيرة|الأخيرة|finale").unwrap());
static NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(?:مسلسل|فيلم|series|movie)\s+([^\n#|]+)").unwrap());
static PRODUCTION: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)إنتاج\s+([^\n|]+)").unwrap());

static LEADING_JUNK: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[\d\s\W_\-]+").unwrap());
static SEASON_EPISODE_TOKENS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:الحلقة|الموسم|episode|season)\s*(?:\d+|[^\s\d]+)|\bS\d+(?:\s*E\d+)?|\bE\d+")
        .unwrap()
});
static NOISE_WORDS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:مترجم|مدبلج|عربي|HD|1080p|720p|480p|360p|جودة عالية|جودة متعددة)\b")
        .unwrap()
});
static MULTI_SPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s{2,}").unwrap());
static TRAILING_JUNK: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\s\W_\-]+$").unwrap());

/// Extract structured attributes from a caption and the file name.
///
/// Status, quality, season, episode and the final flag are searched in the
/// caption followed by the file name. The name and production house only
/// come from the caption, except that an empty caption falls back to the
/// file name for the name.
pub fn extract_metadata(caption: &str, file_name: &str) -> VideoMetadata {
    let text = format!("{caption} {file_name}");
    let mut metadata = VideoMetadata::default();

    metadata.status = if SUBBED.is_match(&text) {
        Some(ContentStatus::Subbed)
    } else if DUBBED.is_match(&text) {
        Some(ContentStatus::Dubbed)
    } else if ARABIC_SPOKEN.is_match(&text) {
        Some(ContentStatus::ArabicSpoken)
    } else {
        None
    };

    metadata.quality_resolution = QUALITY
        .find(&text)
        .map(|m| m.as_str().to_uppercase().replace('P', "p"));

    // An explicit S<n>E<n> pair decides both numbers.
    match SEASON_EPISODE_PAIR.captures(&text) {
        Some(pair) => {
            metadata.season_number = parse_number(&pair[1]);
            metadata.episode_number = parse_number(&pair[2]);
        }
        None => {
            metadata.season_number = find_season(&text);
            metadata.episode_number = find_episode(&text);
        }
    }
    metadata.is_final_episode = FINAL.is_match(&text);

    let raw_name = match NAME.captures(caption) {
        Some(caps) => caps.get(1).map_or("", |m| m.as_str()),
        None if !caption.is_empty() => caption.split('\n').next().unwrap_or(""),
        None => file_name,
    };
    metadata.series_name = clean_name(raw_name);

    metadata.production = PRODUCTION
        .captures(caption)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|p| !p.is_empty());

    metadata
}

fn find_season(text: &str) -> Option<u32> {
    let caps = SEASON.captures(text)?;
    match (caps.get(1).or(caps.get(2)), caps.get(3)) {
        (Some(digits), _) => parse_number(digits.as_str()),
        (None, Some(word)) => arabic_ordinal(word.as_str()),
        _ => None,
    }
}

fn find_episode(text: &str) -> Option<u32> {
    for caps in EPISODE.captures_iter(text) {
        let numbered = match (caps.get(1), caps.get(3)) {
            (Some(digits), _) => Some((digits, caps.get(2))),
            (None, Some(digits)) => Some((digits, caps.get(4))),
            _ => None,
        };
        if let Some((digits, suffix)) = numbered {
            if suffix.map_or(false, |p| !p.as_str().is_empty()) {
                continue;
            }
            return parse_number(digits.as_str());
        }
        return caps.get(5).and_then(|word| arabic_ordinal(word.as_str()));
    }
    None
}

/// Digits as matched by `\d`, including Arabic-Indic forms.
fn parse_number(digits: &str) -> Option<u32> {
    digits.chars().try_fold(0u32, |acc, c| {
        let digit = match c {
            '0'..='9' => c as u32 - '0' as u32,
            '\u{0660}'..='\u{0669}' => c as u32 - 0x0660,
            '\u{06F0}'..='\u{06F9}' => c as u32 - 0x06F0,
            _ => return None,
        };
        acc.checked_mul(10)?.checked_add(digit)
    })
}

fn clean_name(raw: &str) -> Option<String> {
    let name = LEADING_JUNK.replace(raw, "");
    let name = SEASON_EPISODE_TOKENS.replace_all(name.trim(), "");
    let name = NOISE_WORDS.replace_all(name.trim(), "");
    let name = MULTI_SPACE.replace_all(name.trim(), " ");
    let name = TRAILING_JUNK.replace(name.trim(), "");
    let name = name.trim();

    (!name.is_empty()).then(|| name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latin_season_episode_pair() {
        let meta = extract_metadata("Breaking Bad S05E14 1080p", "");
        assert_eq!(meta.season_number, Some(5));
        assert_eq!(meta.episode_number, Some(14));
        assert_eq!(meta.quality_resolution.as_deref(), Some("1080p"));
        assert_eq!(meta.series_name.as_deref(), Some("Breaking Bad"));

        let lower = extract_metadata("show s2e3", "");
        assert_eq!(lower.season_number, Some(2));
        assert_eq!(lower.episode_number, Some(3));
    }

    #[test]
    fn latin_pair_beats_stray_numbers() {
        let meta = extract_metadata("The 100 S02E05", "");
        assert_eq!(meta.season_number, Some(2));
        assert_eq!(meta.episode_number, Some(5));

        let meta = extract_metadata("Jaws 2 S01E01", "");
        assert_eq!(meta.season_number, Some(1));
        assert_eq!(meta.episode_number, Some(1));

        let meta = extract_metadata("Jaws 2", "The 100.mp4");
        assert_eq!(meta.season_number, None);
        assert_eq!(meta.episode_number, None);
    }

    #[test]
    fn single_latin_markers_need_a_word_start() {
        let meta = extract_metadata("Planet Earth S3 E07", "");
        assert_eq!(meta.season_number, Some(3));
        assert_eq!(meta.episode_number, Some(7));

        let meta = extract_metadata("clip", "Show.2E05.mkv");
        assert_eq!(meta.episode_number, Some(5));
    }

    #[test]
    fn arabic_ordinals_resolve() {
        let meta = extract_metadata("مسلسل الاختيار الموسم الثاني الحلقة 5 مترجم", "");
        assert_eq!(meta.season_number, Some(2));
        assert_eq!(meta.episode_number, Some(5));
        assert_eq!(meta.status, Some(ContentStatus::Subbed));
        assert_eq!(meta.series_name.as_deref(), Some("الاختيار"));

        let tenth = extract_metadata("الحلقة العاشرة", "");
        assert_eq!(tenth.episode_number, Some(10));
    }

    #[test]
    fn unknown_ordinal_is_omitted() {
        let meta = extract_metadata("الموسم الحادي عشر", "");
        assert_eq!(meta.season_number, None);
        assert_eq!(arabic_ordinal("الحادي"), None);
        assert_eq!(arabic_ordinal(" الأولى "), Some(1));
    }

    #[test]
    fn quality_token_is_not_an_episode() {
        let meta = extract_metadata("The Office 720p", "");
        assert_eq!(meta.episode_number, None);
        assert_eq!(meta.quality_resolution.as_deref(), Some("720p"));

        let meta = extract_metadata("E720p الحلقة 3", "");
        assert_eq!(meta.episode_number, Some(3));
    }

    #[test]
    fn quality_is_case_normalized() {
        assert_eq!(
            extract_metadata("clip 480P", "").quality_resolution.as_deref(),
            Some("480p")
        );
        assert_eq!(extract_metadata("clip hd", "").quality_resolution.as_deref(), Some("HD"));
        assert_eq!(extract_metadata("clip 4k", "").quality_resolution.as_deref(), Some("4K"));
    }

    #[test]
    fn status_priority_is_fixed() {
        assert_eq!(
            extract_metadata("مدبلج و مترجم", "").status,
            Some(ContentStatus::Subbed)
        );
        assert_eq!(extract_metadata("dubbed", "").status, Some(ContentStatus::Dubbed));
        assert_eq!(
            extract_metadata("متحدث عربي", "").status,
            Some(ContentStatus::ArabicSpoken)
        );
    }

    #[test]
    fn final_episode_and_production() {
        let meta = extract_metadata("مسلسل نسل الأغراب الحلقة الأخيرة\nإنتاج سينرجي", "");
        assert!(meta.is_final_episode);
        assert_eq!(meta.episode_number, None);
        assert_eq!(meta.production.as_deref(), Some("سينرجي"));
        assert_eq!(meta.series_name.as_deref(), Some("نسل الأغراب"));
    }

    #[test]
    fn empty_input_yields_nothing() {
        let meta = extract_metadata("", "");
        assert!(meta.is_empty());
        assert_eq!(serde_json::to_string(&meta).unwrap(), "{}");
    }

    #[test]
    fn empty_caption_uses_file_name_for_name() {
        let meta = extract_metadata("", "Documentary.mkv");
        assert_eq!(meta.series_name.as_deref(), Some("Documentary.mkv"));
    }

    #[test]
    fn arabic_indic_digits_parse() {
        let meta = extract_metadata("الحلقة ١٢", "");
        assert_eq!(meta.episode_number, Some(12));
    }

    #[test]
    fn blob_uses_arabic_status_label() {
        let meta = VideoMetadata {
            status: Some(ContentStatus::Dubbed),
            season_number: Some(1),
            ..Default::default()
        };
        let json = serde_json::to_string(&meta).unwrap();
        assert!(json.contains("\"status\":\"مدبلج\""));
        assert!(!json.contains("is_final_episode"));
    }
}
