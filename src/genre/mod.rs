//! Genre classification for file placement.
//!
//! Streaming services attach loosely structured genre tags to artists
//! ("electronic", "melodic techno", "german techno"...). This module maps a
//! tag set to exactly one destination folder, preferring the most specific
//! sub-genre seen across all tags so that tag order never decides placement.

use lazy_static::lazy_static;
use std::path::{Path, PathBuf};

/// Catch-all destination for tracks no rule matches.
pub const OTHER: &str = "Other";

/// Specificity tiers. A more specific label always beats a general one,
/// regardless of which tag produced it.
const HIGHLY_SPECIFIC: u32 = 100;
const MODERATELY_SPECIFIC: u32 = 50;
const GENERAL: u32 = 25;
const NAMED: u32 = 10;

struct GenreRule {
    key: &'static str,
    label: &'static str,
    specificity: u32,
}

const fn rule(key: &'static str, label: &'static str, specificity: u32) -> GenreRule {
    GenreRule {
        key,
        label,
        specificity,
    }
}

lazy_static! {
    /// Tag-substring to destination-folder rules. Keys are lowercase; more
    /// specific sub-genres carry higher specificity so they win when a track
    /// carries both a specific and a general tag.
    static ref GENRE_RULES: Vec<GenreRule> = vec![
        // Techno
        rule("hard techno", "Hard Techno", HIGHLY_SPECIFIC),
        rule("hypertechno", "Hard Techno", HIGHLY_SPECIFIC),
        rule("melodic techno", "Melodic Techno", HIGHLY_SPECIFIC),
        rule("peak time techno", "Peak Time Techno", NAMED),
        rule("industrial techno", "Industrial Techno", HIGHLY_SPECIFIC),
        rule("acid techno", "Acid Techno", NAMED),
        rule("minimal techno", "Minimal / Deep Tech", NAMED),
        rule("techno", "Techno", GENERAL),
        // House
        rule("tech house", "Tech House", MODERATELY_SPECIFIC),
        rule("deep house", "Deep House", MODERATELY_SPECIFIC),
        rule("progressive house", "Progressive House", MODERATELY_SPECIFIC),
        rule("bass house", "Bass House", HIGHLY_SPECIFIC),
        rule("future house", "Future House", NAMED),
        rule("g-house", "G-House", HIGHLY_SPECIFIC),
        rule("g house", "G-House", HIGHLY_SPECIFIC),
        rule("electro house", "Electro House", NAMED),
        rule("big room", "Electro House", NAMED),
        rule("melbourne bounce", "Electro House", NAMED),
        rule("bounce", "Electro House", NAMED),
        rule("slap house", "Slap House", NAMED),
        rule("tropical house", "Tropical House", NAMED),
        rule("stutter house", "Stutter House", HIGHLY_SPECIFIC),
        rule("french house", "French House", NAMED),
        rule("disco house", "French House", NAMED),
        rule("filter house", "French House", NAMED),
        rule("afro house", "Afro House", MODERATELY_SPECIFIC),
        rule("latin house", "Latin House", NAMED),
        rule("moombahton", "Latin House", NAMED),
        rule("baile funk", "Latin House", NAMED),
        rule("brazilian bass", "Latin House", NAMED),
        rule("techengue", "Latin House", NAMED),
        rule("house", "House", GENERAL),
        // Minimal & deep tech
        rule("minimal tech house", "Minimal / Deep Tech", NAMED),
        rule("minimal", "Minimal / Deep Tech", NAMED),
        rule("deep tech", "Minimal / Deep Tech", NAMED),
        rule("microhouse", "Microhouse", NAMED),
        rule("micro house", "Microhouse", NAMED),
        // Electro & breaks
        rule("electroclash", "Electro", NAMED),
        rule("electro", "Electro", GENERAL),
        rule("breakbeat", "Breakbeat / Breaks", MODERATELY_SPECIFIC),
        rule("breaks", "Breakbeat / Breaks", MODERATELY_SPECIFIC),
        rule("uk garage", "UK Garage", MODERATELY_SPECIFIC),
        rule("speed garage", "UK Garage", MODERATELY_SPECIFIC),
        rule("uk funky", "UK Garage", MODERATELY_SPECIFIC),
        rule("rally house", "UK Garage", MODERATELY_SPECIFIC),
        rule("garage", "UK Garage", MODERATELY_SPECIFIC),
        rule("bassline", "Bassline", NAMED),
        // Drum & bass
        rule("liquid funk", "Liquid Drum & Bass", HIGHLY_SPECIFIC),
        rule("liquid dnb", "Liquid Drum & Bass", HIGHLY_SPECIFIC),
        rule("liquid drum and bass", "Liquid Drum & Bass", HIGHLY_SPECIFIC),
        rule("neurofunk", "Neurofunk", HIGHLY_SPECIFIC),
        rule("neuro", "Neurofunk", HIGHLY_SPECIFIC),
        rule("jungle", "Jungle", MODERATELY_SPECIFIC),
        rule("drum and bass", "Drum & Bass", GENERAL),
        rule("dnb", "Drum & Bass", GENERAL),
        rule("drumstep", "Drum & Bass", GENERAL),
        // Bass music
        rule("riddim", "Riddim", HIGHLY_SPECIFIC),
        rule("deathstep", "Deathstep", HIGHLY_SPECIFIC),
        rule("dubstep", "Dubstep", MODERATELY_SPECIFIC),
        rule("brostep", "Dubstep", MODERATELY_SPECIFIC),
        rule("future bass", "Future Bass", MODERATELY_SPECIFIC),
        rule("melodic bass", "Melodic Bass", NAMED),
        rule("edm trap", "Trap", NAMED),
        rule("trap latino", "Trap (Hip Hop)", NAMED),
        rule("trap", "Trap", NAMED),
        rule("bass music", "Bass Music", GENERAL),
        rule("wave", "Bass Music", GENERAL),
        // Trance
        rule("progressive trance", "Progressive Trance", NAMED),
        rule("uplifting trance", "Trance", GENERAL),
        rule("psytrance", "Psytrance", HIGHLY_SPECIFIC),
        rule("psy trance", "Psytrance", HIGHLY_SPECIFIC),
        rule("tech trance", "Tech Trance", NAMED),
        rule("trance", "Trance", GENERAL),
        // Hardcore & hardstyle
        rule("hardstyle", "Hardstyle", MODERATELY_SPECIFIC),
        rule("uptempo hardcore", "Hardcore", NAMED),
        rule("uk hardcore", "Hardcore", NAMED),
        rule("hardcore", "Hardcore", NAMED),
        rule("gabber", "Hardcore", NAMED),
        // Downtempo & chill
        rule("downtempo", "Downtempo", NAMED),
        rule("chillstep", "Chillstep", NAMED),
        rule("chillout", "Downtempo", NAMED),
        rule("chill", "Downtempo", NAMED),
        rule("trip hop", "Downtempo", NAMED),
        rule("witch house", "Downtempo", NAMED),
        rule("ambient", "Ambient", NAMED),
        rule("lo-fi", "Lo-Fi", NAMED),
        rule("lofi", "Lo-Fi", NAMED),
        // Disco & funk
        rule("nu disco", "Nu Disco", NAMED),
        rule("disco", "Disco", NAMED),
        rule("funk", "Funk", NAMED),
        rule("boogie", "Funk", NAMED),
        // Hip hop & urban
        rule("hip hop", "Hip Hop", NAMED),
        rule("french rap", "Hip Hop", NAMED),
        rule("rap", "Hip Hop", NAMED),
        rule("urbano latino", "Trap (Hip Hop)", NAMED),
        // Afro & latin
        rule("amapiano", "Amapiano", HIGHLY_SPECIFIC),
        rule("gqom", "Amapiano", HIGHLY_SPECIFIC),
        rule("afropiano", "Amapiano", HIGHLY_SPECIFIC),
        rule("reggaeton", "Reggaeton", NAMED),
        // Indie & alternative
        rule("indie dance", "Indie Dance", NAMED),
        rule("alternative dance", "Indie Dance", NAMED),
        rule("indie rock", "Alternative", NAMED),
        rule("indie", "Alternative", NAMED),
        rule("hyperpop", "Alternative", NAMED),
    ];
}

/// Map a set of genre tags to the most specific destination label.
///
/// Each tag is tried with an exact rule lookup first, then a substring scan
/// across all rule keys (so "melodic techno remix" still hits "melodic
/// techno"). The highest-specificity label seen across all tags wins.
/// Returns [`OTHER`] when nothing matches.
pub fn classify(tags: &[String]) -> &'static str {
    let mut best_label = OTHER;
    let mut best_specificity = 0u32;

    for tag in tags {
        let normalized = tag.to_lowercase();
        let normalized = normalized.trim();

        for r in GENRE_RULES.iter() {
            let matched = normalized == r.key || normalized.contains(r.key);
            if matched && r.specificity > best_specificity {
                best_label = r.label;
                best_specificity = r.specificity;
            }
        }
    }

    best_label
}

/// Destination directory for a track with the given tags.
pub fn destination_path(base: &Path, tags: &[String]) -> PathBuf {
    base.join(classify(tags))
}
