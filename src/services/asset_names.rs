use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::debug;

/// Slug of the reserved placeholder card.
pub const NO_CARD_SLUG: &str = "no-card";

/// Explicit card slugs for names the generic rule would get wrong.
const CARD_OVERRIDES: &[(&str, &str)] = &[
    ("No Card", NO_CARD_SLUG),
    ("P.E.K.K.A", "pekka"),
    ("Pekka", "pekka"),
    ("Mini P.E.K.K.A", "mini-pekka"),
    ("Mini Pekka", "mini-pekka"),
    ("Super Mini Pekka", "super-mini-pekka"),
    ("Log", "the-log"),
    ("The Log", "the-log"),
    ("X-Bow", "x-bow"),
    ("Beserker", "berserker"),
    ("P.E.K.K.A (Evo)", "pekka-evo"),
    ("Megaknight (Evo)", "mega-knight-evo"),
    ("Snowball (Evo)", "giant-snowball-evo"),
    ("Archers (Evo)", "archers-evo"),
    ("Baby Dragon (Evo)", "baby-dragon-evo"),
    ("Barbarians (Evo)", "barbarians-evo"),
    ("Bats (Evo)", "bats-evo"),
    ("Battle Ram (Evo)", "battle-ram-evo"),
    ("Bomber (Evo)", "bomber-evo"),
    ("Cannon (Evo)", "cannon-evo"),
    ("Dart Goblin (Evo)", "dart-goblin-evo"),
    ("Electro Dragon (Evo)", "electro-dragon-evo"),
    ("Executioner (Evo)", "executioner-evo"),
    ("Firecracker (Evo)", "firecracker-evo"),
    ("Furnace (Evo)", "furnace-evo"),
    ("Giant Snowball (Evo)", "giant-snowball-evo"),
    ("Goblin Barrel (Evo)", "goblin-barrel-evo"),
    ("Goblin Cage (Evo)", "goblin-cage-evo"),
    ("Goblin Drill (Evo)", "goblin-drill-evo"),
    ("Goblin Giant (Evo)", "goblin-giant-evo"),
    ("Hunter (Evo)", "hunter-evo"),
    ("Ice Spirit (Evo)", "ice-spirit-evo"),
    ("Inferno Dragon (Evo)", "inferno-dragon-evo"),
    ("Knight (Evo)", "knight-evo"),
    ("Lumberjack (Evo)", "lumberjack-evo"),
    ("Mega Knight (Evo)", "mega-knight-evo"),
    ("Mortar (Evo)", "mortar-evo"),
    ("Musketeer (Evo)", "musketeer-evo"),
    ("Royal Ghost (Evo)", "royal-ghost-evo"),
    ("Royal Giant (Evo)", "royal-giant-evo"),
    ("Royal Hogs (Evo)", "royal-hogs-evo"),
    ("Royal Recruits (Evo)", "royal-recruits-evo"),
    ("Skeleton Army (Evo)", "skeleton-army-evo"),
    ("Skeleton Barrel (Evo)", "skeleton-barrel-evo"),
    ("Skeletons (Evo)", "skeletons-evo"),
    ("Tesla (Evo)", "tesla-evo"),
    ("Valkyrie (Evo)", "valkyrie-evo"),
    ("Wall Breakers (Evo)", "wall-breakers-evo"),
    ("Witch (Evo)", "witch-evo"),
    ("Wizard (Evo)", "wizard-evo"),
    ("Zap (Evo)", "zap-evo"),
];

/// Built-in school logo files, keyed by affiliation name.
const SCHOOL_LOGOS: &[(&str, &str)] = &[
    ("UC Berkeley", "berkeley.png"),
    ("UCLA", "ucla.png"),
    ("UC San Diego", "ucsd.png"),
    ("UC Irvine", "uci.png"),
    ("UC Davis", "ucdavis.png"),
    ("USC", "usc.png"),
    ("Stanford", "stanford.png"),
    ("University of Washington", "uw.png"),
];

/// Map a card display name to its asset slug. Total over all inputs.
pub fn normalize_card_name(name: &str) -> String {
    let trimmed = name.trim();
    if let Some((_, slug)) = CARD_OVERRIDES
        .iter()
        .find(|(display, _)| display.eq_ignore_ascii_case(trimmed))
    {
        return (*slug).to_string();
    }
    generic_slug(trimmed)
}

/// Lower-case, drop apostrophes and parentheses, collapse whitespace runs to `-`.
fn generic_slug(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| !matches!(c, '\'' | '\u{2019}' | '(' | ')'))
        .flat_map(char::to_lowercase)
        .collect();
    cleaned.split_whitespace().collect::<Vec<_>>().join("-")
}

/// Logo file for an affiliation, `None` when the caller should show a text label.
/// `extra` entries from config take precedence over the built-in table.
pub fn school_logo_file(affiliation: &str, extra: &HashMap<String, String>) -> Option<String> {
    let trimmed = affiliation.trim();
    if trimmed.is_empty() {
        return None;
    }
    extra
        .iter()
        .find(|(name, _)| name.trim().eq_ignore_ascii_case(trimmed))
        .map(|(_, file)| file.trim().to_string())
        .filter(|file| !file.is_empty())
        .or_else(|| {
            SCHOOL_LOGOS
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(trimmed))
                .map(|(_, file)| (*file).to_string())
        })
}

pub fn card_asset_path(slug: &str) -> String {
    format!("/images/{slug}.png")
}

pub fn school_logo_asset_path(file: &str) -> String {
    format!("/images/school_logos/{file}")
}

pub fn placeholder_asset_path() -> String {
    card_asset_path(NO_CARD_SLUG)
}

/// Resolves asset paths below an assets root on disk.
#[derive(Debug, Clone)]
pub struct AssetResolver {
    root: PathBuf,
    school_logos: HashMap<String, String>,
}

impl AssetResolver {
    pub fn new(root: impl Into<PathBuf>, school_logos: HashMap<String, String>) -> Self {
        Self {
            root: root.into(),
            school_logos,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn on_disk(&self, asset_path: &str) -> PathBuf {
        self.root.join(asset_path.trim_start_matches('/'))
    }

    /// Card image path, falling back to the placeholder when the file is missing.
    /// Returns `None` only if the placeholder itself is absent.
    pub fn card_image(&self, card_name: &str) -> Option<PathBuf> {
        let slug = normalize_card_name(card_name);
        let path = self.on_disk(&card_asset_path(&slug));
        if path.is_file() {
            return Some(path);
        }
        debug!("Card image missing for '{}' ({}), using placeholder", card_name, path.display());
        self.placeholder()
    }

    pub fn placeholder(&self) -> Option<PathBuf> {
        let path = self.on_disk(&placeholder_asset_path());
        path.is_file().then_some(path)
    }

    /// School logo path, `None` for unmapped schools or missing files.
    pub fn school_logo(&self, affiliation: &str) -> Option<PathBuf> {
        let file = school_logo_file(affiliation, &self.school_logos)?;
        let path = self.on_disk(&school_logo_asset_path(&file));
        if path.is_file() {
            Some(path)
        } else {
            debug!("School logo file missing for '{}': {}", affiliation, path.display());
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CARD_NAMES;
    use proptest::prelude::*;

    #[test]
    fn reserved_no_card_slug() {
        assert_eq!(normalize_card_name("No Card"), "no-card");
    }

    #[test]
    fn overrides_beat_generic_rule() {
        assert_eq!(normalize_card_name("P.E.K.K.A"), "pekka");
        assert_ne!(generic_slug("P.E.K.K.A"), "pekka");
        assert_eq!(normalize_card_name("Baby Dragon (Evo)"), "baby-dragon-evo");
        assert_eq!(normalize_card_name("Goblin Barrel (Evo)"), "goblin-barrel-evo");
        assert_eq!(normalize_card_name("Megaknight (Evo)"), "mega-knight-evo");
    }

    #[test]
    fn generic_rule_slugs_plain_names() {
        assert_eq!(normalize_card_name("Hog Rider"), "hog-rider");
        assert_eq!(normalize_card_name("  Three   Musketeers "), "three-musketeers");
        assert_eq!(normalize_card_name("King's Guard"), "kings-guard");
        assert_eq!(normalize_card_name("Royal Delivery (Evo)"), "royal-delivery-evo");
        assert_eq!(normalize_card_name(""), "");
    }

    #[test]
    fn override_lookup_ignores_case_and_padding() {
        assert_eq!(normalize_card_name(" p.e.k.k.a "), "pekka");
        assert_eq!(normalize_card_name("no card"), "no-card");
    }

    #[test]
    fn every_catalogue_card_has_a_filesystem_safe_slug() {
        for card in CARD_NAMES {
            let slug = normalize_card_name(card);
            assert!(!slug.is_empty(), "{card}");
            assert!(
                slug.chars()
                    .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-'),
                "{card} -> {slug}"
            );
        }
    }

    #[test]
    fn unknown_school_has_no_logo() {
        let extra = HashMap::new();
        assert_eq!(school_logo_file("UNIVERSITY B", &extra), None);
        assert_eq!(school_logo_file("   ", &extra), None);
        assert_eq!(school_logo_file("ucla", &extra).as_deref(), Some("ucla.png"));
    }

    #[test]
    fn configured_school_logos_take_precedence() {
        let extra = HashMap::from([
            ("UCLA".to_string(), "ucla-alt.png".to_string()),
            ("University A".to_string(), "a.png".to_string()),
        ]);
        assert_eq!(school_logo_file("UCLA", &extra).as_deref(), Some("ucla-alt.png"));
        assert_eq!(school_logo_file("UNIVERSITY A", &extra).as_deref(), Some("a.png"));
    }

    #[test]
    fn asset_paths_follow_fixed_layout() {
        assert_eq!(card_asset_path("hog-rider"), "/images/hog-rider.png");
        assert_eq!(school_logo_asset_path("ucla.png"), "/images/school_logos/ucla.png");
        assert_eq!(placeholder_asset_path(), "/images/no-card.png");
    }

    proptest! {
        #[test]
        fn normalize_is_deterministic(name in any::<String>()) {
            prop_assert_eq!(normalize_card_name(&name), normalize_card_name(&name));
        }

        #[test]
        fn generic_slug_has_no_whitespace_or_apostrophes(name in "[A-Za-z' ]{0,40}") {
            let slug = normalize_card_name(&name);
            prop_assert!(!slug.contains(char::is_whitespace));
            prop_assert!(!slug.contains('\''));
            prop_assert!(!slug.contains("--"));
        }
    }
}
