use eframe::egui;

use crate::models::{CARD_NAMES, MatchPatch, PlayerPatch, SeriesLength, Side};
use crate::services::match_sync::MatchSyncClient;

pub enum AdminAction {
    Stay,
    Back,
}

const FIELD_WIDTH: f32 = 420.0;

/// Edits collected during one frame, sent once the form is drawn.
enum Edit {
    Match(MatchPatch),
    Player(Side, PlayerPatch),
}

pub fn ui(ui: &mut egui::Ui, client: &mut MatchSyncClient) -> AdminAction {
    ui.heading("CRCL Admin Panel");
    ui.add_space(4.0);
    ui.label(format!("Match: {}", client.match_id()));

    if client.is_loading() {
        ui.add_space(12.0);
        ui.horizontal(|ui| {
            ui.spinner();
            ui.label("Loading match...");
        });
        return back_button(ui);
    }

    let record = client.data().clone();
    let mut edits: Vec<Edit> = Vec::new();

    render_status(ui, client);
    ui.add_space(8.0);

    egui::ScrollArea::vertical().show(ui, |ui| {
        ui.group(|ui| {
            ui.label(egui::RichText::new("MATCH").strong());
            egui::Grid::new("admin_match_grid")
                .num_columns(2)
                .spacing([16.0, 8.0])
                .show(ui, |ui| {
                    ui.label("Title");
                    let mut title = record.title.clone();
                    if ui
                        .add_sized([FIELD_WIDTH, 26.0], egui::TextEdit::singleline(&mut title))
                        .changed()
                    {
                        edits.push(Edit::Match(MatchPatch {
                            title: Some(title),
                            ..MatchPatch::default()
                        }));
                    }
                    ui.end_row();

                    ui.label("Match number");
                    let mut match_number = record.match_number;
                    if ui
                        .add(egui::DragValue::new(&mut match_number).range(1..=999))
                        .changed()
                    {
                        edits.push(Edit::Match(MatchPatch {
                            match_number: Some(match_number),
                            ..MatchPatch::default()
                        }));
                    }
                    ui.end_row();

                    ui.label("Day");
                    let mut day = record.day;
                    if ui.add(egui::DragValue::new(&mut day).range(1..=99)).changed() {
                        edits.push(Edit::Match(MatchPatch {
                            day: Some(day),
                            ..MatchPatch::default()
                        }));
                    }
                    ui.end_row();

                    ui.label("Series");
                    let mut series_length = record.series_length;
                    egui::ComboBox::from_id_salt("admin_series_length")
                        .selected_text(series_length.label())
                        .show_ui(ui, |ui| {
                            for option in [SeriesLength::BestOf3, SeriesLength::BestOf5] {
                                ui.selectable_value(&mut series_length, option, option.label());
                            }
                        });
                    if series_length != record.series_length {
                        edits.push(Edit::Match(MatchPatch {
                            series_length: Some(series_length),
                            ..MatchPatch::default()
                        }));
                    }
                    ui.end_row();

                    ui.label("Flags");
                    ui.horizontal(|ui| {
                        let mut is_live = record.is_live;
                        if ui.checkbox(&mut is_live, "Live").changed() {
                            edits.push(Edit::Match(MatchPatch {
                                is_live: Some(is_live),
                                ..MatchPatch::default()
                            }));
                        }
                        let mut is_overtime = record.is_overtime;
                        if ui.checkbox(&mut is_overtime, "Overtime").changed() {
                            edits.push(Edit::Match(MatchPatch {
                                is_overtime: Some(is_overtime),
                                ..MatchPatch::default()
                            }));
                        }
                        let mut show_camera_frames = record.show_camera_frames;
                        if ui
                            .checkbox(&mut show_camera_frames, "Camera frames")
                            .changed()
                        {
                            edits.push(Edit::Match(MatchPatch {
                                show_camera_frames: Some(show_camera_frames),
                                ..MatchPatch::default()
                            }));
                        }
                    });
                    ui.end_row();
                });

            ui.add_space(6.0);
            if let Some(scores) = render_per_game_scores(ui, &record.per_game_scores) {
                edits.push(Edit::Match(MatchPatch {
                    per_game_scores: Some(scores),
                    ..MatchPatch::default()
                }));
            }
            let overflow = record.per_game_overflow();
            if overflow > 0 {
                ui.colored_label(
                    egui::Color32::YELLOW,
                    format!(
                        "{} game result(s) beyond {} are ignored by the overlay",
                        overflow,
                        record.series_length.label()
                    ),
                );
            }
        });

        ui.add_space(8.0);
        ui.columns(2, |columns| {
            for (column, side) in columns.iter_mut().zip(Side::BOTH) {
                column.group(|ui| {
                    if let Some(patch) = render_player(ui, side, record.player(side)) {
                        edits.push(Edit::Player(side, patch));
                    }
                });
            }
        });
    });

    for edit in edits {
        match edit {
            Edit::Match(patch) => client.update_match(patch),
            Edit::Player(side, patch) => client.update_player(side, patch),
        }
    }

    back_button(ui)
}

fn back_button(ui: &mut egui::Ui) -> AdminAction {
    ui.add_space(12.0);
    if ui.button("Back").clicked() {
        return AdminAction::Back;
    }
    AdminAction::Stay
}

fn render_status(ui: &mut egui::Ui, client: &MatchSyncClient) {
    let state = client.state();
    ui.horizontal(|ui| {
        ui.label(format!("Revision {}", state.applied_revision()));
        if let Some(updated_at) = state.updated_at() {
            ui.label(format!("· saved {}", updated_at.format("%H:%M:%S")));
        }
        if state.has_pending_writes() {
            ui.label("· saving...");
        }
        if state.conflicts() > 0 {
            ui.colored_label(
                egui::Color32::YELLOW,
                format!("· conflicts: {}", state.conflicts()),
            );
        }
    });

    if !state.issues().is_empty() {
        egui::Frame::group(ui.style())
            .stroke(egui::Stroke::new(1.0, egui::Color32::from_rgb(200, 80, 80)))
            .show(ui, |ui| {
                ui.colored_label(egui::Color32::RED, "Sync issues:");
                for issue in state.issues().iter().rev() {
                    ui.label(format!("- {issue}"));
                }
            });
    }
}

fn game_result_label(value: i32) -> &'static str {
    match value {
        1 => "Player 1",
        2 => "Player 2",
        _ => "Undecided",
    }
}

/// Returns the new list when any game result changed.
fn render_per_game_scores(ui: &mut egui::Ui, scores: &[i32]) -> Option<Vec<i32>> {
    let mut edited = scores.to_vec();
    let mut changed = false;

    ui.label("Game results");
    ui.horizontal_wrapped(|ui| {
        for (index, value) in edited.iter_mut().enumerate() {
            let before = *value;
            egui::ComboBox::from_id_salt(("admin_game_result", index))
                .selected_text(format!("G{}: {}", index + 1, game_result_label(*value)))
                .show_ui(ui, |ui| {
                    for option in [0, 1, 2] {
                        ui.selectable_value(value, option, game_result_label(option));
                    }
                });
            changed |= *value != before;
        }
        if ui.button("+ game").clicked() {
            edited.push(0);
            changed = true;
        }
        if !edited.is_empty() && ui.button("- game").clicked() {
            edited.pop();
            changed = true;
        }
    });

    changed.then_some(edited)
}

fn card_combo(ui: &mut egui::Ui, id: impl std::hash::Hash, current: &str) -> Option<String> {
    let mut selected = current.to_string();
    egui::ComboBox::from_id_salt(id)
        .selected_text(current)
        .width(200.0)
        .height(320.0)
        .show_ui(ui, |ui| {
            for card in CARD_NAMES {
                ui.selectable_value(&mut selected, card.to_string(), *card);
            }
        });
    (selected != current).then_some(selected)
}

fn render_player(
    ui: &mut egui::Ui,
    side: Side,
    player: &crate::models::PlayerRecord,
) -> Option<PlayerPatch> {
    let mut patch = PlayerPatch::default();
    let mut changed = false;

    ui.label(egui::RichText::new(side.label()).strong());
    egui::Grid::new(("admin_player_grid", side))
        .num_columns(2)
        .spacing([12.0, 6.0])
        .show(ui, |ui| {
            ui.label("Name");
            let mut name = player.display_name.clone();
            if ui.text_edit_singleline(&mut name).changed() {
                patch.display_name = Some(name);
                changed = true;
            }
            ui.end_row();

            ui.label("School");
            let mut school = player.affiliation.clone();
            if ui.text_edit_singleline(&mut school).changed() {
                patch.affiliation = Some(school);
                changed = true;
            }
            ui.end_row();

            ui.label("Score");
            let mut score = player.score;
            if ui.add(egui::DragValue::new(&mut score).range(0..=5)).changed() {
                patch.score = Some(score);
                changed = true;
            }
            ui.end_row();

            ui.label("Win %");
            let mut win_rate = player.win_rate;
            if ui
                .add(egui::DragValue::new(&mut win_rate).range(0..=100).suffix("%"))
                .changed()
            {
                patch.win_rate = Some(win_rate);
                changed = true;
            }
            ui.end_row();

            ui.label("Favorite card");
            if let Some(card) = card_combo(
                ui,
                ("admin_favorite", side),
                &player.favorite_card_name,
            ) {
                patch.favorite_card_name = Some(card);
                changed = true;
            }
            ui.end_row();
        });

    ui.add_space(4.0);
    ui.label("Deck");
    let deck = player.normalized_deck();
    let mut deck_edit: Option<(usize, String)> = None;
    egui::Grid::new(("admin_deck_grid", side))
        .num_columns(2)
        .spacing([8.0, 4.0])
        .show(ui, |ui| {
            for (index, card) in deck.iter().enumerate() {
                if let Some(picked) = card_combo(ui, ("admin_deck", side, index), card) {
                    deck_edit = Some((index, picked));
                }
                if index % 2 == 1 {
                    ui.end_row();
                }
            }
        });
    if let Some((index, card)) = deck_edit {
        patch.deck = PlayerPatch::deck_card(player, index, &card).deck;
        changed = true;
    }

    changed.then_some(patch)
}
