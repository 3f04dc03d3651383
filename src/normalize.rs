//! Entity normalization at the catalog boundary.
//!
//! Canonicalizes catalog-native records into the comparable
//! [`NormalizedEntity`] shape before any matching runs. Matching logic
//! never inspects raw platform payloads.

use any_ascii::any_ascii;
use once_cell::sync::Lazy;
use rayon::prelude::*;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

use crate::error::SyncError;
use crate::models::{EntityKind, NormalizedEntity, RawEntity};

// ============================================================================
// REGEX PATTERNS
// ============================================================================

/// Version/edition noise stripped from names before comparison (applied in
/// order). Live/remix markers are handled separately by [`version_markers`]
/// so that a studio recording never silently matches a live one.
static NAME_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        // Remaster variants: "- Remastered 2011", "(2011 Remaster)"
        Regex::new(r"(?i)\s*[-–—/]\s*(?:remaster(?:ed)?(?:\s+\d{4})?|(?:\d{4}\s+)?remaster(?:ed)?)").unwrap(),
        Regex::new(r"(?i)\s*[\(\[](?:remaster(?:ed)?(?:\s+\d{4})?|(?:\d{4}\s+)?remaster(?:ed)?)[\)\]]").unwrap(),
        // Edition variants: "(Deluxe Edition)", "[Super Deluxe]"
        Regex::new(r"(?i)\s*[\(\[](?:deluxe|super\s+deluxe|expanded|anniversary|bonus\s+track(?:s)?|special|collector'?s?)(?:\s+edition)?[\)\]]").unwrap(),
        // Mix/version tags: "(Single Version)", "[Album Version]", "(Mono)"
        Regex::new(r"(?i)\s*[\(\[](?:single\s+version|album\s+version|extended(?:\s+(?:mix|version))?|original\s+mix|mono|stereo)[\)\]]").unwrap(),
        // Content tags: "(Explicit)", "[Clean]"
        Regex::new(r"(?i)\s*[\(\[](?:explicit|clean|censored)[\)\]]").unwrap(),
        // Featured artists: "(feat. Artist)", "ft. Someone"
        Regex::new(r"(?i)\s*[\(\[](?:feat\.?|ft\.?|featuring)\s+[^)\]]+[\)\]]").unwrap(),
        Regex::new(r"(?i)\s+(?:feat\.?|ft\.?|featuring)\s+.+$").unwrap(),
        // Year suffix: "- 2011", "- 1997 Version"
        Regex::new(r"(?i)\s*[-–—]\s*\d{4}(?:\s+(?:version|mix|edit))?$").unwrap(),
        // Year in parens: "(1964)"
        Regex::new(r"\s*\(\d{4}\)\s*$").unwrap(),
    ]
});

/// Artist cleanup patterns: drop featured credits and trailing qualifiers.
static ARTIST_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"(?i)\s+(?:feat\.?|ft\.?|featuring|with)\s+.*").unwrap(),
        Regex::new(r"(?i)\s+(?:band|orchestra|ensemble|quartet|trio)$").unwrap(),
    ]
});

/// Multi-artist separator for extracting the primary credit.
/// Matches: &, /, ,, •, +, x, vs, and, with, feat, ft
static ARTIST_SEPARATOR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\s*(?:[&/,•+×]|(?:\s+(?:x|vs\.?|and|with|feat\.?|ft\.?)\s+))\s*").unwrap()
});

/// Recording-variant markers that must agree between two names before a
/// fuzzy match is allowed: a "(Live)" take and the studio cut share a title
/// but are different recordings.
static VERSION_MARKERS: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    vec![
        ("live", Regex::new(r"(?i)\blive\b").unwrap()),
        ("acoustic", Regex::new(r"(?i)\b(?:acoustic|unplugged)\b").unwrap()),
        ("remix", Regex::new(r"(?i)\bremix(?:ed)?\b").unwrap()),
        ("instrumental", Regex::new(r"(?i)\binstrumental\b").unwrap()),
        ("acapella", Regex::new(r"(?i)\ba\s?capp?ella\b").unwrap()),
        ("karaoke", Regex::new(r"(?i)\bkaraoke\b").unwrap()),
        ("demo", Regex::new(r"(?i)\bdemo\b").unwrap()),
        ("radio edit", Regex::new(r"(?i)\bradio\s+edit\b").unwrap()),
    ]
});

/// Collapse runs of whitespace into a single space.
static MULTI_SPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s{2,}").unwrap());

// ============================================================================
// HELPERS
// ============================================================================

/// Check if a character is a Unicode combining mark (diacritical mark).
fn is_combining_mark(c: char) -> bool {
    matches!(c as u32, 0x0300..=0x036F | 0x1AB0..=0x1AFF | 0x1DC0..=0x1DFF | 0xFE20..=0xFE2F)
}

/// Fold text to lowercase ASCII: NFKD decomposition, drop combining marks,
/// transliterate whatever remains. "Beyoncé" → "beyonce".
pub fn fold_to_ascii(s: &str) -> String {
    let stripped: String = s.nfkd().filter(|c| !is_combining_mark(*c)).collect();
    any_ascii(&stripped).to_lowercase()
}

/// Straighten curly quotes, unify "&" with "and", collapse whitespace.
pub fn normalize_punctuation(s: &str) -> String {
    let result = s
        .replace(['\u{2018}', '\u{2019}', '\u{00B4}', '\u{0060}'], "'")
        .replace(['\u{201C}', '\u{201D}'], "\"")
        .replace(" & ", " and ");
    MULTI_SPACE.replace_all(&result, " ").trim().to_string()
}

/// Final comparison-string cleanup: apostrophes vanish ("don't" → "dont"),
/// every other punctuation character becomes a space, runs collapse.
fn strip_punctuation(s: &str) -> String {
    let cleaned: String = s
        .chars()
        .filter(|c| *c != '\'')
        .map(|c| {
            if c.is_alphanumeric() || c.is_whitespace() {
                c
            } else {
                ' '
            }
        })
        .collect();
    MULTI_SPACE.replace_all(cleaned.trim(), " ").to_string()
}

// ============================================================================
// NORMALIZATION FUNCTIONS
// ============================================================================

/// Normalize an entity name for comparison: strip version/edition noise,
/// fold to ASCII, drop a leading "the ".
pub fn normalize_name(name: &str) -> String {
    let mut result = normalize_punctuation(name);
    for pattern in NAME_PATTERNS.iter() {
        result = pattern.replace_all(&result, "").to_string();
    }

    let mut normalized = strip_punctuation(&fold_to_ascii(&result));
    if normalized.starts_with("the ") && normalized.len() > 6 {
        normalized = normalized[4..].to_string();
    }
    normalized
}

/// Normalize an artist name: drop featured credits, fold to ASCII, handle
/// "The" prefix and ", The" suffix forms.
pub fn normalize_artist(artist: &str) -> String {
    let mut result = normalize_punctuation(artist);
    for pattern in ARTIST_PATTERNS.iter() {
        result = pattern.replace_all(&result, "").to_string();
    }

    // ", The" suffix must go before punctuation cleanup eats the comma.
    let mut folded = fold_to_ascii(&result).trim().to_string();
    if folded.ends_with(", the") {
        folded = folded[..folded.len() - 5].to_string();
    }
    let mut normalized = strip_punctuation(&folded);
    if normalized.starts_with("the ") {
        normalized = normalized[4..].to_string();
    }
    normalized
}

/// Extract and normalize the primary (first-credited) artist from a
/// multi-artist string. "Duck Sauce, A-Trak" → "duck sauce".
pub fn primary_artist(artist: &str) -> String {
    let cut = match ARTIST_SEPARATOR.find(artist) {
        Some(m) if m.start() >= 2 => &artist[..m.start()],
        _ => artist,
    };
    let normalized = normalize_artist(cut);
    if normalized.is_empty() {
        normalize_artist(artist)
    } else {
        normalized
    }
}

/// Recording-variant markers present in a name ("live", "remix", ...).
/// Returned sorted so marker sets compare directly.
pub fn version_markers(name: &str) -> Vec<&'static str> {
    let mut found: Vec<&'static str> = VERSION_MARKERS
        .iter()
        .filter(|(_, re)| re.is_match(name))
        .map(|(tag, _)| *tag)
        .collect();
    found.sort_unstable();
    found
}

// ============================================================================
// BOUNDARY
// ============================================================================

/// Canonicalize one raw catalog record.
///
/// Fails with [`SyncError::MalformedEntity`] only when the record carries
/// neither a name nor an ISRC, leaving nothing to match on. An empty
/// artist list falls back to the entity's own name (the self-titled
/// convention used for artist records), keeping the comparison strings
/// non-empty whenever the input had a name.
pub fn normalize_entity(raw: &RawEntity, kind: EntityKind) -> Result<NormalizedEntity, SyncError> {
    let display_name = raw.name.trim().to_string();
    let isrc = raw
        .isrc
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.to_ascii_uppercase());

    if display_name.is_empty() && isrc.is_none() {
        return Err(SyncError::MalformedEntity {
            source_id: raw.id.clone(),
        });
    }

    let mut name = normalize_name(&display_name);
    if name.is_empty() {
        // Pattern stripping can consume degenerate names entirely
        // (e.g. a bare "(Live)"); fall back to the folded raw form.
        name = strip_punctuation(&fold_to_ascii(&display_name));
    }

    let display_artist = raw
        .artists
        .first()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| display_name.clone());
    let artist = primary_artist(&display_artist);
    let artist = if artist.is_empty() {
        strip_punctuation(&fold_to_ascii(&display_artist))
    } else {
        artist
    };

    let duration_secs = match kind {
        EntityKind::Track => raw.duration_ms.map(|ms| (ms + 500) / 1000),
        _ => None,
    };

    Ok(NormalizedEntity {
        kind,
        display_name,
        display_artist,
        name,
        primary_artist: artist,
        duration_secs,
        isrc,
        source_id: raw.id.clone(),
    })
}

/// Normalize a whole collection, splitting off the records that could not
/// be normalized. Order of the normalized entities follows the input.
pub fn normalize_collection(
    kind: EntityKind,
    raws: &[RawEntity],
) -> (Vec<NormalizedEntity>, Vec<String>) {
    let results: Vec<Result<NormalizedEntity, SyncError>> = raws
        .par_iter()
        .map(|raw| normalize_entity(raw, kind))
        .collect();

    let mut entities = Vec::with_capacity(results.len());
    let mut malformed = Vec::new();
    for result in results {
        match result {
            Ok(entity) => entities.push(entity),
            Err(SyncError::MalformedEntity { source_id }) => malformed.push(source_id),
            Err(_) => {}
        }
    }
    (entities, malformed)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn track(name: &str, artists: &[&str]) -> RawEntity {
        RawEntity {
            id: "t1".into(),
            name: name.into(),
            artists: artists.iter().map(|s| s.to_string()).collect(),
            duration_ms: Some(200_000),
            ..Default::default()
        }
    }

    #[test]
    fn test_normalize_name_strips_version_noise() {
        assert_eq!(normalize_name("Yesterday (Remastered 2009)"), "yesterday");
        assert_eq!(normalize_name("Song - 2011 Remaster"), "song");
        assert_eq!(normalize_name("Hit (Deluxe Edition)"), "hit");
        assert_eq!(normalize_name("Track (feat. Someone)"), "track");
        assert_eq!(normalize_name("The Sound of Silence"), "sound of silence");
    }

    #[test]
    fn test_normalize_artist_forms() {
        assert_eq!(normalize_artist("The Beatles"), "beatles");
        assert_eq!(normalize_artist("Scorpions, The"), "scorpions");
        assert_eq!(normalize_artist("Artist feat. Other"), "artist");
        assert_eq!(normalize_artist("Motörhead"), "motorhead");
    }

    #[test]
    fn test_primary_artist_extraction() {
        assert_eq!(primary_artist("Mustard, Migos"), "mustard");
        assert_eq!(primary_artist("DJ Snake x Lil Jon"), "dj snake");
        assert_eq!(primary_artist("Beatles"), "beatles");
        assert_eq!(primary_artist("The Beatles & Billy Preston"), "beatles");
    }

    #[test]
    fn test_fold_to_ascii() {
        assert_eq!(fold_to_ascii("Björk"), "bjork");
        assert_eq!(fold_to_ascii("Beyoncé"), "beyonce");
    }

    #[test]
    fn test_version_markers() {
        assert_eq!(version_markers("Yesterday"), Vec::<&str>::new());
        assert_eq!(version_markers("Yesterday (Live at the BBC)"), vec!["live"]);
        assert_eq!(
            version_markers("Song (Acoustic Live)"),
            vec!["acoustic", "live"]
        );
    }

    #[test]
    fn test_normalize_entity_rounds_duration() {
        let entity = normalize_entity(
            &RawEntity {
                duration_ms: Some(214_499),
                ..track("Yesterday", &["The Beatles"])
            },
            EntityKind::Track,
        )
        .unwrap();
        assert_eq!(entity.duration_secs, Some(214));

        let entity = normalize_entity(
            &RawEntity {
                duration_ms: Some(214_500),
                ..track("Yesterday", &["The Beatles"])
            },
            EntityKind::Track,
        )
        .unwrap();
        assert_eq!(entity.duration_secs, Some(215));
    }

    #[test]
    fn test_normalize_entity_album_has_no_duration() {
        let entity = normalize_entity(&track("Help!", &["The Beatles"]), EntityKind::Album).unwrap();
        assert_eq!(entity.duration_secs, None);
    }

    #[test]
    fn test_normalize_entity_malformed() {
        let raw = RawEntity {
            id: "x".into(),
            ..Default::default()
        };
        assert!(matches!(
            normalize_entity(&raw, EntityKind::Track),
            Err(SyncError::MalformedEntity { .. })
        ));

        // An ISRC alone is enough to match on.
        let raw = RawEntity {
            id: "x".into(),
            isrc: Some("usx1x1234567".into()),
            ..Default::default()
        };
        let entity = normalize_entity(&raw, EntityKind::Track).unwrap();
        assert_eq!(entity.isrc.as_deref(), Some("USX1X1234567"));
    }

    #[test]
    fn test_normalize_entity_artist_fallback() {
        let entity = normalize_entity(&track("Daft Punk", &[]), EntityKind::Artist).unwrap();
        assert_eq!(entity.primary_artist, "daft punk");
        assert_eq!(entity.display_artist, "Daft Punk");
    }

    #[test]
    fn test_normalize_collection_splits_malformed() {
        let raws = vec![
            track("Yesterday", &["The Beatles"]),
            RawEntity {
                id: "bad".into(),
                ..Default::default()
            },
        ];
        let (entities, malformed) = normalize_collection(EntityKind::Track, &raws);
        assert_eq!(entities.len(), 1);
        assert_eq!(malformed, vec!["bad".to_string()]);
    }
}
