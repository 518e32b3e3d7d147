use serde::Deserialize;

use crate::models::{MatchRecord, Side};

/// Which field of the record drives the crown column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrownSource {
    /// Slot `i` is won by a side whose cumulative `score` exceeds `i`.
    #[default]
    CumulativeScore,
    /// Slot `i` is decided by `per_game_scores[i]` (1 or 2 names the winner).
    PerGameScores,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackerSlot {
    pub index: usize,
    pub player1_won: bool,
    pub player2_won: bool,
}

impl TrackerSlot {
    pub fn filled(&self) -> bool {
        self.player1_won || self.player2_won
    }
}

pub fn slots(record: &MatchRecord, source: CrownSource) -> Vec<TrackerSlot> {
    match source {
        CrownSource::CumulativeScore => tracker_slots(record),
        CrownSource::PerGameScores => per_game_slots(record),
    }
}

/// Exactly `series_length` slots from the players' scores; `per_game_scores` is ignored.
pub fn tracker_slots(record: &MatchRecord) -> Vec<TrackerSlot> {
    let p1 = record.player1.score as usize;
    let p2 = record.player2.score as usize;
    (0..record.series_length.games())
        .map(|index| TrackerSlot {
            index,
            player1_won: index < p1,
            player2_won: index < p2,
        })
        .collect()
}

/// Exactly `series_length` slots from `per_game_scores`; extra entries are ignored.
pub fn per_game_slots(record: &MatchRecord) -> Vec<TrackerSlot> {
    (0..record.series_length.games())
        .map(|index| {
            let winner = record.per_game_scores.get(index).copied();
            TrackerSlot {
                index,
                player1_won: winner == Some(1),
                player2_won: winner == Some(2),
            }
        })
        .collect()
}

pub fn slots_won(slots: &[TrackerSlot], side: Side) -> usize {
    slots
        .iter()
        .filter(|slot| match side {
            Side::Player1 => slot.player1_won,
            Side::Player2 => slot.player2_won,
        })
        .count()
}

/// Side that has reached the wins needed for the series, by cumulative score.
pub fn series_winner(record: &MatchRecord) -> Option<Side> {
    let needed = record.series_length.wins_needed();
    match (record.player1.score >= needed, record.player2.score >= needed) {
        (true, false) => Some(Side::Player1),
        (false, true) => Some(Side::Player2),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SeriesLength;

    fn record(series_length: SeriesLength, p1: u32, p2: u32, per_game: Vec<i32>) -> MatchRecord {
        let mut record = MatchRecord {
            series_length,
            per_game_scores: per_game,
            ..MatchRecord::default()
        };
        record.player1.score = p1;
        record.player2.score = p2;
        record
    }

    #[test]
    fn score_drives_slots_regardless_of_per_game_scores() {
        let record = record(SeriesLength::BestOf3, 2, 0, vec![2, 2, 2]);
        let slots = tracker_slots(&record);
        assert_eq!(slots.len(), 3);
        assert_eq!(slots_won(&slots, Side::Player1), 2);
        assert_eq!(slots_won(&slots, Side::Player2), 0);
        assert!(slots[0].player1_won && slots[1].player1_won && !slots[2].player1_won);
    }

    #[test]
    fn slot_count_follows_series_length() {
        let record = record(SeriesLength::BestOf5, 9, 1, vec![]);
        let slots = tracker_slots(&record);
        assert_eq!(slots.len(), 5);
        assert_eq!(slots_won(&slots, Side::Player1), 5);
        assert_eq!(slots_won(&slots, Side::Player2), 1);
    }

    #[test]
    fn per_game_slots_read_winner_per_game() {
        let record = record(SeriesLength::BestOf3, 0, 0, vec![1, 2, 7, 1]);
        let slots = per_game_slots(&record);
        assert_eq!(slots.len(), 3);
        assert!(slots[0].player1_won && !slots[0].player2_won);
        assert!(slots[1].player2_won);
        assert!(!slots[2].filled());
    }

    #[test]
    fn source_selects_derivation() {
        let record = record(SeriesLength::BestOf3, 1, 0, vec![2]);
        assert!(slots(&record, CrownSource::CumulativeScore)[0].player1_won);
        assert!(slots(&record, CrownSource::PerGameScores)[0].player2_won);
    }

    #[test]
    fn series_winner_needs_majority() {
        assert_eq!(series_winner(&record(SeriesLength::BestOf3, 2, 1, vec![])), Some(Side::Player1));
        assert_eq!(series_winner(&record(SeriesLength::BestOf5, 2, 1, vec![])), None);
        assert_eq!(series_winner(&record(SeriesLength::BestOf5, 0, 3, vec![])), Some(Side::Player2));
    }
}
