//! Fuzzy artist/title matching for acquisition candidates.
//!
//! Search results coming back from the acquisition tools rarely match the
//! catalog metadata byte-for-byte: labels append "(Extended Mix)", feature
//! credits move around, punctuation differs. This module normalizes both
//! sides, scores them with Levenshtein-based similarity, and ranks surviving
//! candidates by DJ-preferred mix type.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref BRACKETED: Regex = Regex::new(r"[(\[].*?[)\]]").unwrap();
    static ref NON_ALNUM: Regex = Regex::new(r"[^a-z0-9\s]").unwrap();
    static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();
    static ref EXTENDED: Regex =
        Regex::new(r"(?i)extended\s*mix|ext\s*mix|extended\s*version|club\s*mix").unwrap();
    static ref ORIGINAL: Regex = Regex::new(r"(?i)original\s*mix|original\s*version").unwrap();
    static ref RADIO: Regex = Regex::new(r"(?i)radio\s*edit|radio\s*version|radio\s*mix").unwrap();
    static ref MIX_ANNOTATION: Regex = Regex::new(
        r"(?i)[(\[](extended mix|original mix|radio edit|club mix|dub mix|instrumental)[)\]]|- (extended mix|original mix|radio edit)"
    )
    .unwrap();
}

/// One entry parsed from an acquisition tool's enumerated search results.
///
/// `ordinal` is the 1-based selection index exactly as the tool presented it;
/// it is what gets written back to the tool's stdin on selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub ordinal: usize,
    pub artist: String,
    pub title: String,
}

/// Mix-type preference order for DJ sets. Lower priority value wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MixType {
    Extended,
    Original,
    RadioEdit,
    Unknown,
}

impl MixType {
    /// Detect the mix type of a title. Patterns are tested in preference
    /// order, first match wins.
    pub fn from_title(title: &str) -> Self {
        if EXTENDED.is_match(title) {
            MixType::Extended
        } else if ORIGINAL.is_match(title) {
            MixType::Original
        } else if RADIO.is_match(title) {
            MixType::RadioEdit
        } else {
            MixType::Unknown
        }
    }

    pub fn priority(self) -> u8 {
        match self {
            MixType::Extended => 1,
            MixType::Original => 2,
            MixType::RadioEdit => 3,
            MixType::Unknown => 4,
        }
    }

    pub fn label(self) -> Option<&'static str> {
        match self {
            MixType::Extended => Some("Extended Mix"),
            MixType::Original => Some("Original Mix"),
            MixType::RadioEdit => Some("Radio Edit"),
            MixType::Unknown => None,
        }
    }
}

/// Scores for one candidate against the requested artist/title.
///
/// `index` points into the candidate slice handed to
/// [`select_best_candidate`], not the tool ordinal.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchDecision {
    pub index: usize,
    pub artist_score: f64,
    pub title_score: f64,
    pub combined_score: f64,
    pub mix_type: MixType,
}

/// Weight of the title score in the combined score. Titles carry the
/// remix/version information, so they matter more than artist-name variants.
const TITLE_WEIGHT: f64 = 0.7;
const ARTIST_WEIGHT: f64 = 0.3;

/// Normalize a string for comparison: lowercase, drop bracketed annotations,
/// strip punctuation, collapse whitespace.
pub fn normalize(s: &str) -> String {
    let lowered = s.to_lowercase();
    let stripped = BRACKETED.replace_all(&lowered, "");
    let alnum = NON_ALNUM.replace_all(&stripped, "");
    WHITESPACE.replace_all(&alnum, " ").trim().to_string()
}

/// Similarity in [0, 1] between two strings after normalization.
///
/// 1.0 iff the normalized strings are equal, otherwise one minus the
/// Levenshtein distance over the longer normalized length.
pub fn similarity(a: &str, b: &str) -> f64 {
    let na = normalize(a);
    let nb = normalize(b);

    if na == nb {
        return 1.0;
    }

    let max_len = na.chars().count().max(nb.chars().count());
    if max_len == 0 {
        return 1.0;
    }

    let distance = levenshtein_distance(&na, &nb);
    1.0 - (distance as f64 / max_len as f64)
}

/// Extract the literal mix annotation from a title, e.g. "Extended Mix",
/// for recording on the ledger entry. Returns None when no annotation is
/// present.
pub fn extract_mix_type(title: &str) -> Option<String> {
    MIX_ANNOTATION.find(title).map(|m| {
        m.as_str()
            .trim_matches(|c| matches!(c, '(' | ')' | '[' | ']' | '-'))
            .trim()
            .to_string()
    })
}

/// Similarity thresholds for candidate selection. Selection runs at the
/// strict threshold first and falls back to the relaxed one; whatever wins
/// must still clear the acceptance floor on its combined score.
#[derive(Debug, Clone, Copy, serde::Deserialize)]
#[serde(default)]
pub struct MatchThresholds {
    pub strict: f64,
    pub relaxed: f64,
    pub floor: f64,
}

impl Default for MatchThresholds {
    fn default() -> Self {
        Self {
            strict: 0.75,
            relaxed: 0.60,
            floor: 0.65,
        }
    }
}

/// Two-pass selection: strict threshold first, relaxed as fallback, and the
/// winner's combined score gated on the acceptance floor.
pub fn select_with_fallback(
    artist: &str,
    title: &str,
    candidates: &[Candidate],
    thresholds: MatchThresholds,
) -> Option<MatchDecision> {
    select_best_candidate(artist, title, candidates, thresholds.strict)
        .or_else(|| select_best_candidate(artist, title, candidates, thresholds.relaxed))
        .filter(|decision| decision.combined_score >= thresholds.floor)
}

/// Pick the best candidate for the requested artist/title.
///
/// Candidates survive the filter only when artist, title AND combined scores
/// all reach `min_similarity`. Survivors are ranked by mix-type priority
/// first (Extended > Original > Radio Edit > unknown), then by combined
/// score. Returns None when nothing survives.
pub fn select_best_candidate(
    artist: &str,
    title: &str,
    candidates: &[Candidate],
    min_similarity: f64,
) -> Option<MatchDecision> {
    let mut survivors: Vec<MatchDecision> = candidates
        .iter()
        .enumerate()
        .filter_map(|(index, candidate)| {
            let artist_score = similarity(artist, &candidate.artist);
            let title_score = similarity(title, &candidate.title);
            let combined_score = TITLE_WEIGHT * title_score + ARTIST_WEIGHT * artist_score;

            if artist_score >= min_similarity
                && title_score >= min_similarity
                && combined_score >= min_similarity
            {
                Some(MatchDecision {
                    index,
                    artist_score,
                    title_score,
                    combined_score,
                    mix_type: MixType::from_title(&candidate.title),
                })
            } else {
                None
            }
        })
        .collect();

    survivors.sort_by(|a, b| {
        a.mix_type
            .priority()
            .cmp(&b.mix_type.priority())
            .then_with(|| {
                b.combined_score
                    .partial_cmp(&a.combined_score)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
    });

    survivors.into_iter().next()
}

/// Classic Levenshtein edit distance (insert/delete/substitute, unit cost),
/// computed over chars.
fn levenshtein_distance(a: &str, b: &str) -> usize {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();

    let m = a_chars.len();
    let n = b_chars.len();

    if m == 0 {
        return n;
    }
    if n == 0 {
        return m;
    }

    let mut dp = vec![vec![0usize; n + 1]; m + 1];

    for (i, row) in dp.iter_mut().enumerate() {
        row[0] = i;
    }
    for j in 0..=n {
        dp[0][j] = j;
    }

    for i in 1..=m {
        for j in 1..=n {
            let cost = if a_chars[i - 1] == b_chars[j - 1] {
                0
            } else {
                1
            };
            dp[i][j] = (dp[i - 1][j] + 1)
                .min(dp[i][j - 1] + 1)
                .min(dp[i - 1][j - 1] + cost);
        }
    }

    dp[m][n]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(ordinal: usize, artist: &str, title: &str) -> Candidate {
        Candidate {
            ordinal,
            artist: artist.to_string(),
            title: title.to_string(),
        }
    }

    #[test]
    fn test_levenshtein_distance() {
        assert_eq!(levenshtein_distance("", ""), 0);
        assert_eq!(levenshtein_distance("abc", "abc"), 0);
        assert_eq!(levenshtein_distance("abc", ""), 3);
        assert_eq!(levenshtein_distance("", "abc"), 3);
        assert_eq!(levenshtein_distance("kitten", "sitting"), 3);
    }

    #[test]
    fn test_normalize_strips_annotations() {
        assert_eq!(normalize("Track Name (Extended Mix)"), "track name");
        assert_eq!(normalize("Track  [feat. Someone]"), "track");
        assert_eq!(normalize("It's A Track!"), "its a track");
    }

    #[test]
    fn test_similarity_identity_and_symmetry() {
        for s in ["Daft Punk", "One More Time (Radio Edit)", "", "Ümlaut"] {
            assert_eq!(similarity(s, s), 1.0);
        }
        let a = "Charlotte de Witte";
        let b = "Charlotte De Wite";
        assert_eq!(similarity(a, b), similarity(b, a));
    }

    #[test]
    fn test_mix_type_detection() {
        assert_eq!(MixType::from_title("Track (Extended Mix)"), MixType::Extended);
        assert_eq!(MixType::from_title("Track (Club Mix)"), MixType::Extended);
        assert_eq!(MixType::from_title("Track (Original Mix)"), MixType::Original);
        assert_eq!(MixType::from_title("Track - Radio Edit"), MixType::RadioEdit);
        assert_eq!(MixType::from_title("Track"), MixType::Unknown);
    }

    #[test]
    fn test_extract_mix_type() {
        assert_eq!(
            extract_mix_type("Track (Extended Mix)").as_deref(),
            Some("Extended Mix")
        );
        assert_eq!(
            extract_mix_type("Track - radio edit").as_deref(),
            Some("radio edit")
        );
        assert_eq!(extract_mix_type("Track"), None);
    }

    #[test]
    fn test_extended_mix_preferred_over_radio_edit() {
        // Equal textual similarity, mix priority must break the tie.
        let candidates = vec![
            candidate(1, "Artist A", "Title (Radio Edit)"),
            candidate(2, "Artist A", "Title (Extended Mix)"),
        ];
        let decision = select_best_candidate("Artist A", "Title", &candidates, 0.75).unwrap();
        assert_eq!(decision.index, 1);
        assert_eq!(decision.mix_type, MixType::Extended);
    }

    #[test]
    fn test_daft_punk_selection() {
        let candidates = vec![
            candidate(1, "Daft Punk", "One More Time (Radio Edit)"),
            candidate(2, "Daft Punk", "One More Time (Extended Mix)"),
        ];
        let decision =
            select_best_candidate("Daft Punk", "One More Time", &candidates, 0.75).unwrap();
        assert_eq!(candidates[decision.index].ordinal, 2);
    }

    #[test]
    fn test_no_match_below_threshold() {
        let candidates = vec![candidate(1, "Completely Different", "Something Else")];
        assert!(select_best_candidate("Daft Punk", "One More Time", &candidates, 0.60).is_none());
    }

    #[test]
    fn test_combined_score_weighting() {
        let candidates = vec![candidate(1, "Daft Punk", "One More Time")];
        let decision =
            select_best_candidate("Daft Punk", "One More Time", &candidates, 0.75).unwrap();
        assert_eq!(decision.combined_score, 1.0);
        assert_eq!(decision.artist_score, 1.0);
        assert_eq!(decision.title_score, 1.0);
    }

    #[test]
    fn test_fallback_threshold_and_floor() {
        let thresholds = MatchThresholds::default();

        // Exact match survives the strict pass.
        let exact = vec![candidate(1, "Daft Punk", "One More Time")];
        assert!(select_with_fallback("Daft Punk", "One More Time", &exact, thresholds).is_some());

        // A truncated title misses 0.75 but clears 0.60 and the floor:
        // title score 1 - 5/13 ~= 0.615, combined ~= 0.73.
        let close = vec![candidate(1, "Daft Punk", "One Time")];
        let decision =
            select_with_fallback("Daft Punk", "One More Time", &close, thresholds).unwrap();
        assert!(decision.combined_score >= thresholds.floor);
        assert!(decision.title_score < thresholds.strict);

        // Nothing close enough, both passes fail.
        let far = vec![candidate(1, "Someone Else", "Another Song Entirely")];
        assert!(select_with_fallback("Daft Punk", "One More Time", &far, thresholds).is_none());
    }
}
