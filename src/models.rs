use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Number of card slots in a deck.
pub const DECK_SIZE: usize = 8;

/// Reserved card name meaning "empty slot".
pub const NO_CARD: &str = "No Card";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SeriesLength {
    #[default]
    BestOf3,
    BestOf5,
}

impl SeriesLength {
    pub fn games(self) -> usize {
        match self {
            SeriesLength::BestOf3 => 3,
            SeriesLength::BestOf5 => 5,
        }
    }

    /// Games one side has to take to win the series.
    pub fn wins_needed(self) -> u32 {
        match self {
            SeriesLength::BestOf3 => 2,
            SeriesLength::BestOf5 => 3,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            SeriesLength::BestOf3 => "Bo3",
            SeriesLength::BestOf5 => "Bo5",
        }
    }
}

impl Serialize for SeriesLength {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.games() as u8)
    }
}

impl<'de> Deserialize<'de> for SeriesLength {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        // Only an explicit 3 means Bo3; anything else is played as Bo5.
        let raw = serde_json::Value::deserialize(deserializer)?;
        let games = match &raw {
            serde_json::Value::Number(n) => n.as_f64(),
            serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        };
        Ok(if games == Some(3.0) {
            SeriesLength::BestOf3
        } else {
            SeriesLength::BestOf5
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerRecord {
    #[serde(rename = "name")]
    pub display_name: String,
    #[serde(rename = "school")]
    pub affiliation: String,
    pub score: u32,
    #[serde(rename = "winPercentage")]
    pub win_rate: u8,
    #[serde(rename = "favoriteCard")]
    pub favorite_card_name: String,
    pub deck: Vec<String>,
}

impl PlayerRecord {
    fn with_deck(name: &str, school: &str, favorite: &str, deck: [&str; DECK_SIZE]) -> Self {
        Self {
            display_name: name.to_string(),
            affiliation: school.to_string(),
            score: 0,
            win_rate: 50,
            favorite_card_name: favorite.to_string(),
            deck: deck.iter().map(|card| card.to_string()).collect(),
        }
    }

    /// Deck cut or padded to exactly [`DECK_SIZE`] slots for rendering.
    pub fn normalized_deck(&self) -> Vec<String> {
        let mut deck: Vec<String> = self.deck.iter().take(DECK_SIZE).cloned().collect();
        deck.resize(DECK_SIZE, NO_CARD.to_string());
        deck
    }
}

impl Default for PlayerRecord {
    fn default() -> Self {
        Self::with_deck(
            "PLAYER",
            "",
            NO_CARD,
            [NO_CARD; DECK_SIZE],
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchRecord {
    #[serde(rename = "matchTitle")]
    pub title: String,
    #[serde(rename = "matchNumber")]
    pub match_number: u32,
    pub day: u32,
    #[serde(rename = "bestOf")]
    pub series_length: SeriesLength,
    #[serde(rename = "isLive")]
    pub is_live: bool,
    #[serde(rename = "isOvertime")]
    pub is_overtime: bool,
    #[serde(rename = "showCameraFrames")]
    pub show_camera_frames: bool,
    pub player1: PlayerRecord,
    pub player2: PlayerRecord,
    /// Per-game crown scores. Not reconciled with the players' `score`.
    #[serde(rename = "scores")]
    pub per_game_scores: Vec<i32>,
}

impl Default for MatchRecord {
    fn default() -> Self {
        Self {
            title: "CRCL PILOT".to_string(),
            match_number: 1,
            day: 1,
            series_length: SeriesLength::BestOf3,
            is_live: true,
            is_overtime: false,
            show_camera_frames: true,
            player1: PlayerRecord::with_deck(
                "PLAYER 1",
                "UNIVERSITY A",
                "Hog Rider",
                [
                    "Hog Rider",
                    "Musketeer",
                    "Fireball",
                    "Ice Spirit",
                    "Log",
                    "Ice Golem",
                    "Cannon",
                    "Skeletons",
                ],
            ),
            player2: PlayerRecord::with_deck(
                "PLAYER 2",
                "UNIVERSITY B",
                "Miner",
                [
                    "Miner",
                    "Poison",
                    "Valkyrie",
                    "Musketeer",
                    "Inferno Tower",
                    "Log",
                    "Ice Spirit",
                    "Skeletons",
                ],
            ),
            per_game_scores: Vec::new(),
        }
    }
}

impl MatchRecord {
    pub fn player(&self, side: Side) -> &PlayerRecord {
        match side {
            Side::Player1 => &self.player1,
            Side::Player2 => &self.player2,
        }
    }

    pub fn player_mut(&mut self, side: Side) -> &mut PlayerRecord {
        match side {
            Side::Player1 => &mut self.player1,
            Side::Player2 => &mut self.player2,
        }
    }

    /// Number of per-game scores beyond what the series allows.
    /// The store never rejects such records; callers decide whether to warn.
    pub fn per_game_overflow(&self) -> usize {
        self.per_game_scores
            .len()
            .saturating_sub(self.series_length.games())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Player1,
    Player2,
}

impl Side {
    pub const BOTH: [Side; 2] = [Side::Player1, Side::Player2];

    pub fn label(self) -> &'static str {
        match self {
            Side::Player1 => "PLAYER 1",
            Side::Player2 => "PLAYER 2",
        }
    }
}

/// Partial edit of a [`PlayerRecord`]. `None` leaves the field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlayerPatch {
    pub display_name: Option<String>,
    pub affiliation: Option<String>,
    pub score: Option<u32>,
    pub win_rate: Option<u8>,
    pub favorite_card_name: Option<String>,
    pub deck: Option<Vec<String>>,
}

impl PlayerPatch {
    pub fn apply_to(self, player: &mut PlayerRecord) {
        if let Some(display_name) = self.display_name {
            player.display_name = display_name;
        }
        if let Some(affiliation) = self.affiliation {
            player.affiliation = affiliation;
        }
        if let Some(score) = self.score {
            player.score = score;
        }
        if let Some(win_rate) = self.win_rate {
            player.win_rate = win_rate.min(100);
        }
        if let Some(favorite_card_name) = self.favorite_card_name {
            player.favorite_card_name = favorite_card_name;
        }
        if let Some(deck) = self.deck {
            player.deck = deck;
        }
    }

    /// Replace one deck slot, keeping the rest of the current deck.
    pub fn deck_card(current: &PlayerRecord, index: usize, card: &str) -> Self {
        let mut deck = current.normalized_deck();
        if let Some(slot) = deck.get_mut(index) {
            *slot = card.to_string();
        }
        Self {
            deck: Some(deck),
            ..Self::default()
        }
    }
}

/// Partial edit of a [`MatchRecord`], merged shallowly onto the last known record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchPatch {
    pub title: Option<String>,
    pub match_number: Option<u32>,
    pub day: Option<u32>,
    pub series_length: Option<SeriesLength>,
    pub is_live: Option<bool>,
    pub is_overtime: Option<bool>,
    pub show_camera_frames: Option<bool>,
    pub per_game_scores: Option<Vec<i32>>,
}

impl MatchPatch {
    pub fn merged(self, base: &MatchRecord) -> MatchRecord {
        let mut record = base.clone();
        if let Some(title) = self.title {
            record.title = title;
        }
        if let Some(match_number) = self.match_number {
            record.match_number = match_number;
        }
        if let Some(day) = self.day {
            record.day = day;
        }
        if let Some(series_length) = self.series_length {
            record.series_length = series_length;
        }
        if let Some(is_live) = self.is_live {
            record.is_live = is_live;
        }
        if let Some(is_overtime) = self.is_overtime {
            record.is_overtime = is_overtime;
        }
        if let Some(show_camera_frames) = self.show_camera_frames {
            record.show_camera_frames = show_camera_frames;
        }
        if let Some(per_game_scores) = self.per_game_scores {
            record.per_game_scores = per_game_scores;
        }
        record
    }
}

/// Merge a player edit into a copy of `base`, touching only `side`.
pub fn merge_player(base: &MatchRecord, side: Side, patch: PlayerPatch) -> MatchRecord {
    let mut record = base.clone();
    patch.apply_to(record.player_mut(side));
    record
}

/// One persisted row: the record plus store bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredMatch {
    #[serde(rename = "id")]
    pub match_id: String,
    pub data: MatchRecord,
    pub updated_at: DateTime<Utc>,
    /// Store-assigned, strictly increasing per match id. Starts at 1.
    pub revision: u64,
    /// Client session that wrote this row.
    #[serde(default)]
    pub origin: String,
    /// Writer-local edit sequence of this row.
    #[serde(default)]
    pub origin_seq: u64,
}

/// Upsert request sent by a sync client.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchWrite {
    pub match_id: String,
    pub data: MatchRecord,
    pub updated_at: DateTime<Utc>,
    pub origin: String,
    pub origin_seq: u64,
}

pub const CARD_NAMES: &[&str] = &[
    "Archer Queen", "Arrows", "Baby Dragon", "Balloon", "Bandit", "Barbarian Barrel",
    "Barbarians", "Bats", "Battle Healer", "Battle Ram", "Bomber", "Bowler",
    "Cannon", "Cannon Cart", "Clone", "Dark Prince", "Dart Goblin", "Earthquake",
    "Electro Dragon", "Electro Giant", "Electro Spirit", "Electro Wizard",
    "Elite Barbarians", "Elixir Golem", "Executioner", "Fire Spirit", "Fireball",
    "Firecracker", "Fisherman", "Flying Machine", "Freeze", "Furnace",
    "Giant", "Giant Skeleton", "Goblin Barrel", "Goblin Cage", "Goblin Drill",
    "Goblin Gang", "Goblin Giant", "Goblin Hut", "Goblins", "Golden Knight",
    "Golem", "Graveyard", "Guards", "Heal Spirit", "Hog Rider", "Hunter",
    "Ice Golem", "Ice Spirit", "Ice Wizard", "Inferno Dragon", "Inferno Tower",
    "Knight", "Lava Hound", "Lightning", "Log", "Lumberjack", "Magic Archer",
    "Mega Knight", "Mega Minion", "Mighty Miner", "Miner", "Mini Pekka",
    "Minion Horde", "Minions", "Mirror", "Mortar", "Mother Witch", "Musketeer",
    "Night Witch", "No Card", "Pekka", "Phoenix", "Poison", "Prince", "Princess",
    "Rage", "Ram Rider", "Rascals", "Rocket", "Royal Delivery", "Royal Ghost",
    "Royal Giant", "Royal Hogs", "Royal Recruits", "Skeleton Army", "Skeleton Barrel",
    "Skeleton Dragons", "Skeleton King", "Skeletons", "Sparky", "Spear Goblins",
    "Tesla", "Three Musketeers", "Tornado", "Valkyrie", "Wall Breakers",
    "Witch", "Wizard", "X-Bow", "Zap", "Zappies",
    "Baby Dragon (Evo)", "Bomber (Evo)", "Cannon (Evo)", "Dart Goblin (Evo)",
    "Executioner (Evo)", "Furnace (Evo)", "Goblin Barrel (Evo)", "Goblin Cage (Evo)",
    "Goblin Drill (Evo)", "Goblin Giant (Evo)", "Ice Spirit (Evo)",
    "Inferno Dragon (Evo)", "Lumberjack (Evo)", "Mega Knight (Evo)",
    "Musketeer (Evo)", "P.E.K.K.A (Evo)", "Royal Ghost (Evo)", "Royal Hogs (Evo)",
    "Skeleton Army (Evo)", "Skeleton Barrel (Evo)", "Giant Snowball (Evo)",
    "Tesla (Evo)", "Valkyrie (Evo)", "Wall Breakers (Evo)", "Witch (Evo)",
    "Wizard (Evo)", "Zap (Evo)",
    "Archers", "Barbarian Hut", "Barbarian Launcher", "Beserker", "Bomb Tower",
    "Boss Bandit", "Elixir Collector", "Fire Spirits", "Giant Snowball",
    "Goblin Demolisher", "Goblin Machine", "Goblinstein", "Heal", "Little Prince",
    "Monk", "Party Hut", "Party Rocket", "Raging Prince", "Rune Giant",
    "Santa Hog Rider", "Super Archers", "Super Hog Rider", "Super Ice Golem",
    "Super Lava Hound", "Super Magic Archer", "Super Mini Pekka", "Super Witch",
    "Suspicious Bush", "Terry", "Tombstone", "Vines", "Void", "Warmth",
    "Archers (Evo)", "Barbarians (Evo)", "Bats (Evo)", "Battle Ram (Evo)",
    "Electro Dragon (Evo)", "Firecracker (Evo)", "Hunter (Evo)", "Knight (Evo)",
    "Mortar (Evo)", "Royal Giant (Evo)", "Royal Recruits (Evo)", "Skeletons (Evo)",
    "Megaknight (Evo)", "Snowball (Evo)",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_record_round_trips_through_original_wire_names() {
        let record = MatchRecord::default();
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["matchTitle"], "CRCL PILOT");
        assert_eq!(value["bestOf"], 3);
        assert_eq!(value["player1"]["winPercentage"], 50);
        assert_eq!(value["player2"]["favoriteCard"], "Miner");
        assert!(value["scores"].as_array().unwrap().is_empty());

        let back: MatchRecord = serde_json::from_value(value).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn partial_payload_fills_defaults() {
        let record: MatchRecord =
            serde_json::from_str(r#"{"matchTitle":"FINALS","bestOf":"5","player1":{"score":2}}"#)
                .unwrap();
        assert_eq!(record.title, "FINALS");
        assert_eq!(record.series_length, SeriesLength::BestOf5);
        assert_eq!(record.player1.score, 2);
        assert_eq!(record.player1.display_name, "PLAYER");
        assert_eq!(record.match_number, 1);
    }

    #[test]
    fn only_three_decodes_as_best_of_three() {
        let series = |raw: &str| {
            serde_json::from_str::<MatchRecord>(&format!(r#"{{"bestOf":{raw}}}"#))
                .unwrap()
                .series_length
        };
        assert_eq!(series("3"), SeriesLength::BestOf3);
        assert_eq!(series(r#"" 3 ""#), SeriesLength::BestOf3);
        assert_eq!(series("5"), SeriesLength::BestOf5);
        assert_eq!(series("4"), SeriesLength::BestOf5);
        assert_eq!(series("7"), SeriesLength::BestOf5);
        assert_eq!(series(r#""seven""#), SeriesLength::BestOf5);
        assert_eq!(series("null"), SeriesLength::BestOf5);
    }

    #[test]
    fn match_patch_only_touches_named_fields() {
        let base = MatchRecord::default();
        let merged = MatchPatch {
            is_overtime: Some(true),
            day: Some(3),
            ..MatchPatch::default()
        }
        .merged(&base);

        assert!(merged.is_overtime);
        assert_eq!(merged.day, 3);
        assert_eq!(merged.title, base.title);
        assert_eq!(merged.player1, base.player1);
    }

    #[test]
    fn player_patch_only_touches_one_side() {
        let base = MatchRecord::default();
        let merged = merge_player(
            &base,
            Side::Player2,
            PlayerPatch {
                score: Some(1),
                win_rate: Some(180),
                ..PlayerPatch::default()
            },
        );

        assert_eq!(merged.player2.score, 1);
        assert_eq!(merged.player2.win_rate, 100);
        assert_eq!(merged.player2.display_name, base.player2.display_name);
        assert_eq!(merged.player1, base.player1);
    }

    #[test]
    fn deck_card_patch_replaces_single_slot() {
        let base = MatchRecord::default();
        let patch = PlayerPatch::deck_card(&base.player1, 4, "The Log");
        let merged = merge_player(&base, Side::Player1, patch);
        assert_eq!(merged.player1.deck[4], "The Log");
        assert_eq!(merged.player1.deck[0], "Hog Rider");
        assert_eq!(merged.player1.deck.len(), DECK_SIZE);
    }

    #[test]
    fn normalized_deck_pads_short_decks() {
        let player = PlayerRecord {
            deck: vec!["Zap".to_string()],
            ..PlayerRecord::default()
        };
        let deck = player.normalized_deck();
        assert_eq!(deck.len(), DECK_SIZE);
        assert_eq!(deck[0], "Zap");
        assert!(deck[1..].iter().all(|card| card == NO_CARD));
    }

    #[test]
    fn per_game_overflow_is_reported_not_enforced() {
        let record = MatchRecord {
            per_game_scores: vec![1, 2, 1, 2],
            ..MatchRecord::default()
        };
        assert_eq!(record.per_game_overflow(), 1);
    }
}
