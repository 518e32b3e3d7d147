use std::cell::RefCell;
use std::path::{Path, PathBuf};

use eframe::egui;

use crate::models::{MatchRecord, PlayerRecord, Side};
use crate::screens::textures::TextureCache;
use crate::services::asset_names::AssetResolver;
use crate::services::config_loader::OverlayConfig;
use crate::services::crown_tracker::{self, TrackerSlot};
use crate::services::match_sync::MatchSyncClient;

pub enum OverlayAction {
    Stay,
    Back,
}

/// Broadcast canvas size the layout is designed for.
const CANVAS: egui::Vec2 = egui::vec2(1920.0, 1080.0);
const PANEL_WIDTH: f32 = 400.0;
const TRACKER_WIDTH: f32 = 80.0;

const RED: egui::Color32 = egui::Color32::from_rgb(200, 40, 52);
const BLUE: egui::Color32 = egui::Color32::from_rgb(38, 110, 230);
const GOLD: egui::Color32 = egui::Color32::from_rgb(255, 204, 0);
const DARK_1: egui::Color32 = egui::Color32::from_rgb(14, 16, 22);
const DARK_2: egui::Color32 = egui::Color32::from_rgb(24, 27, 36);
const DARK_3: egui::Color32 = egui::Color32::from_rgb(36, 40, 52);

#[derive(Default)]
struct OverlayUiState {
    textures: TextureCache,
    assets: Option<OverlayAssets>,
}

thread_local! {
    static OVERLAY_STATE: RefCell<OverlayUiState> = RefCell::new(OverlayUiState::default());
}

struct PlayerAssets {
    logo: Option<PathBuf>,
    favorite: Option<PathBuf>,
    deck: Vec<Option<PathBuf>>,
}

/// On-disk image paths for the names currently on screen.
struct OverlayAssets {
    key: Vec<String>,
    players: [PlayerAssets; 2],
}

impl OverlayAssets {
    fn resolve(key: Vec<String>, record: &MatchRecord, resolver: &AssetResolver) -> Self {
        let players = Side::BOTH.map(|side| {
            let player = record.player(side);
            PlayerAssets {
                logo: resolver.school_logo(&player.affiliation),
                favorite: resolver.card_image(&player.favorite_card_name),
                deck: player
                    .normalized_deck()
                    .iter()
                    .map(|card| resolver.card_image(card))
                    .collect(),
            }
        });
        Self { key, players }
    }

    fn player(&self, side: Side) -> &PlayerAssets {
        match side {
            Side::Player1 => &self.players[0],
            Side::Player2 => &self.players[1],
        }
    }

    fn paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self
            .players
            .iter()
            .flat_map(|player| {
                [&player.logo, &player.favorite]
                    .into_iter()
                    .chain(player.deck.iter())
                    .flatten()
                    .cloned()
            })
            .collect();
        paths.sort();
        paths.dedup();
        paths
    }
}

/// Names that select images; title or score edits leave it unchanged.
fn asset_key(record: &MatchRecord, resolver: &AssetResolver) -> Vec<String> {
    let mut key = vec![resolver.root().display().to_string()];
    for side in Side::BOTH {
        let player = record.player(side);
        key.push(player.affiliation.clone());
        key.push(player.favorite_card_name.clone());
        key.extend(player.normalized_deck());
    }
    key
}

/// Cached assets for `record`, resolved again only when its asset key changed.
/// The flag is true when a fresh resolve happened.
fn assets_for<'a>(
    slot: &'a mut Option<OverlayAssets>,
    record: &MatchRecord,
    resolver: &AssetResolver,
) -> (&'a OverlayAssets, bool) {
    let key = asset_key(record, resolver);
    let (assets, fresh) = match slot.take() {
        Some(assets) if assets.key == key => (assets, false),
        _ => (OverlayAssets::resolve(key, record, resolver), true),
    };
    (slot.insert(assets), fresh)
}

/// Maps canvas coordinates onto the window.
#[derive(Clone, Copy)]
struct Canvas {
    origin: egui::Pos2,
    scale: f32,
}

impl Canvas {
    fn fit(rect: egui::Rect) -> Self {
        let scale = (rect.width() / CANVAS.x).min(rect.height() / CANVAS.y).max(0.01);
        let size = CANVAS * scale;
        let origin = rect.center() - size * 0.5;
        Self { origin, scale }
    }

    fn rect(&self, x: f32, y: f32, w: f32, h: f32) -> egui::Rect {
        egui::Rect::from_min_size(
            self.origin + egui::vec2(x, y) * self.scale,
            egui::vec2(w, h) * self.scale,
        )
    }

    fn font(&self, size: f32) -> egui::FontId {
        egui::FontId::proportional(size * self.scale)
    }

    fn px(&self, v: f32) -> f32 {
        v * self.scale
    }
}

pub fn ui(
    ui: &mut egui::Ui,
    ctx: &egui::Context,
    client: &MatchSyncClient,
    resolver: &AssetResolver,
    config: &OverlayConfig,
) -> OverlayAction {
    if ctx.input_mut(|input| input.consume_key(egui::Modifiers::NONE, egui::Key::Escape)) {
        return OverlayAction::Back;
    }
    if client.is_loading() {
        return OverlayAction::Stay;
    }

    let record = client.data();
    let canvas = Canvas::fit(ui.max_rect());

    OVERLAY_STATE.with(|cell| {
        let mut guard = cell.borrow_mut();
        let state = &mut *guard;
        let (assets, fresh) = assets_for(&mut state.assets, record, resolver);
        if fresh {
            state
                .textures
                .request(assets.paths(), config.presentation.deck_image_max_dimension);
        }
        if state.textures.pump(ctx) {
            ctx.request_repaint();
        }
        let textures = &state.textures;

        render_top_bar(ui, record, &canvas);
        render_player_panel(
            ui,
            textures,
            assets.player(Side::Player1),
            record.player(Side::Player1),
            Side::Player1,
            canvas.rect(0.0, 0.0, PANEL_WIDTH, CANVAS.y),
            &canvas,
        );
        render_player_panel(
            ui,
            textures,
            assets.player(Side::Player2),
            record.player(Side::Player2),
            Side::Player2,
            canvas.rect(
                CANVAS.x - TRACKER_WIDTH - PANEL_WIDTH,
                0.0,
                PANEL_WIDTH,
                CANVAS.y,
            ),
            &canvas,
        );
        if record.show_camera_frames {
            render_camera_frames(ui, &canvas);
        }
        render_crown_column(
            ui,
            record,
            &crown_tracker::slots(record, config.presentation.crown_source),
            &canvas,
        );
        ui.painter().text(
            canvas.rect(0.0, CANVAS.y - 40.0, CANVAS.x, 30.0).center(),
            egui::Align2::CENTER_CENTER,
            "CLASH ROYALE COLLEGIATE LEAGUE",
            canvas.font(16.0),
            egui::Color32::from_white_alpha(26),
        );
    });

    OverlayAction::Stay
}

fn text_width(painter: &egui::Painter, text: &str, font: &egui::FontId) -> f32 {
    painter
        .layout_no_wrap(text.to_owned(), font.clone(), egui::Color32::WHITE)
        .size()
        .x
}

fn render_top_bar(ui: &mut egui::Ui, record: &MatchRecord, canvas: &Canvas) {
    let painter = ui.painter();
    let title = format!("{} — {}", record.title, record.series_length.label());
    let match_label = format!("MATCH {}", record.match_number);
    let day_label = format!("DAY {}", record.day);
    let winner = crown_tracker::series_winner(record)
        .map(|side| format!("{} WINS", record.player(side).display_name));

    let title_font = canvas.font(26.0);
    let small_font = canvas.font(18.0);
    let gap = canvas.px(24.0);
    let pad = canvas.px(28.0);

    let mut items: Vec<(String, egui::FontId, egui::Color32)> = vec![
        (title, title_font, egui::Color32::WHITE),
        (match_label, small_font.clone(), GOLD),
        (day_label, small_font.clone(), egui::Color32::from_white_alpha(180)),
    ];
    if record.is_live {
        items.push(("● LIVE".to_string(), small_font.clone(), RED));
    }
    if record.is_overtime {
        items.push(("OVERTIME".to_string(), small_font.clone(), DARK_1));
    }
    if let Some(winner) = winner {
        items.push((winner, small_font, GOLD));
    }

    let widths: Vec<f32> = items
        .iter()
        .map(|(text, font, _)| text_width(painter, text, font))
        .collect();
    let content_width = widths.iter().sum::<f32>() + gap * (items.len() as f32 - 1.0);
    let bar_height = canvas.px(56.0);
    let top = canvas.rect(0.0, 0.0, CANVAS.x, 0.0).top();
    let center_x = canvas.rect(0.0, 0.0, CANVAS.x, 0.0).center().x;
    let bar_rect = egui::Rect::from_center_size(
        egui::pos2(center_x, top + bar_height * 0.5),
        egui::vec2(content_width + pad * 2.0, bar_height),
    );
    painter.rect_filled(bar_rect, 0.0, DARK_1.gamma_multiply(0.92));
    painter.line_segment(
        [bar_rect.left_bottom(), bar_rect.right_bottom()],
        egui::Stroke::new(canvas.px(2.0), GOLD.gamma_multiply(0.5)),
    );

    let mut x = bar_rect.left() + pad;
    for ((text, font, color), width) in items.into_iter().zip(widths) {
        if text == "OVERTIME" {
            let badge = egui::Rect::from_min_size(
                egui::pos2(x - canvas.px(6.0), bar_rect.center().y - canvas.px(13.0)),
                egui::vec2(width + canvas.px(12.0), canvas.px(26.0)),
            );
            painter.rect_filled(badge, canvas.px(2.0), GOLD);
        }
        painter.text(
            egui::pos2(x, bar_rect.center().y),
            egui::Align2::LEFT_CENTER,
            text,
            font,
            color,
        );
        x += width + gap;
    }
}

fn side_color(side: Side) -> egui::Color32 {
    match side {
        Side::Player1 => RED,
        Side::Player2 => BLUE,
    }
}

fn draw_image_or(
    ui: &mut egui::Ui,
    textures: &TextureCache,
    path: Option<&Path>,
    rect: egui::Rect,
    fallback: impl FnOnce(&egui::Painter),
) {
    match path.and_then(|path| textures.get(path)) {
        Some(texture) => {
            let image = egui::Image::new(texture).fit_to_exact_size(rect.size());
            ui.put(rect, image);
        }
        None => fallback(ui.painter()),
    }
}

fn render_player_panel(
    ui: &mut egui::Ui,
    textures: &TextureCache,
    assets: &PlayerAssets,
    player: &PlayerRecord,
    side: Side,
    panel: egui::Rect,
    canvas: &Canvas,
) {
    let accent = side_color(side);
    let pad = canvas.px(12.0);
    let gap = canvas.px(8.0);
    ui.painter().rect_filled(panel, 0.0, DARK_1.gamma_multiply(0.88));

    let inner = panel.shrink(pad);
    let mut y = inner.top() + canvas.px(64.0);
    let mut section = |height: f32| {
        let rect = egui::Rect::from_min_size(
            egui::pos2(inner.left(), y),
            egui::vec2(inner.width(), canvas.px(height)),
        );
        y += canvas.px(height) + gap;
        rect
    };

    // Name and school
    let header = section(96.0);
    ui.painter().rect_filled(header, 0.0, accent.gamma_multiply(0.85));
    let logo_size = header.height() - canvas.px(20.0);
    let logo_rect = egui::Rect::from_min_size(
        egui::pos2(header.right() - logo_size - canvas.px(10.0), header.top() + canvas.px(10.0)),
        egui::vec2(logo_size, logo_size),
    );
    let text_left = header.left() + canvas.px(16.0);
    ui.painter().text(
        egui::pos2(text_left, header.top() + canvas.px(34.0)),
        egui::Align2::LEFT_CENTER,
        player.display_name.to_uppercase(),
        canvas.font(30.0),
        egui::Color32::WHITE,
    );
    let logo_path = assets.logo.as_deref();
    let has_logo = logo_path.and_then(|path| textures.get(path)).is_some();
    draw_image_or(ui, textures, logo_path, logo_rect, |_| {});
    // Text label doubles as the fallback when no logo image is available.
    ui.painter().text(
        egui::pos2(text_left, header.top() + canvas.px(70.0)),
        egui::Align2::LEFT_CENTER,
        player.affiliation.to_uppercase(),
        canvas.font(if has_logo { 14.0 } else { 18.0 }),
        egui::Color32::from_white_alpha(180),
    );

    // Score
    let score = section(72.0);
    render_stat_box(ui, score, accent, side, "SCORE", &player.score.to_string(), GOLD, canvas);

    // Favorite card
    let favorite = section(128.0);
    render_box_frame(ui, favorite, accent, side, canvas);
    ui.painter().text(
        egui::pos2(favorite.left() + canvas.px(16.0), favorite.top() + canvas.px(14.0)),
        egui::Align2::LEFT_CENTER,
        "FAVORITE CARD",
        canvas.font(13.0),
        egui::Color32::from_white_alpha(128),
    );
    let card_rect = egui::Rect::from_min_size(
        egui::pos2(favorite.left() + canvas.px(16.0), favorite.top() + canvas.px(28.0)),
        egui::vec2(canvas.px(72.0), canvas.px(90.0)),
    );
    draw_image_or(
        ui,
        textures,
        assets.favorite.as_deref(),
        card_rect,
        |painter| {
            painter.rect_filled(card_rect, canvas.px(4.0), DARK_3);
            painter.rect_stroke(
                card_rect,
                canvas.px(4.0),
                egui::Stroke::new(canvas.px(2.0), GOLD.gamma_multiply(0.3)),
                egui::StrokeKind::Inside,
            );
        },
    );
    ui.painter().text(
        egui::pos2(card_rect.right() + canvas.px(16.0), card_rect.center().y),
        egui::Align2::LEFT_CENTER,
        player.favorite_card_name.to_uppercase(),
        canvas.font(22.0),
        egui::Color32::WHITE,
    );

    // Deck grid, 4 x 2
    let deck_box = section(372.0);
    render_box_frame(ui, deck_box, accent, side, canvas);
    ui.painter().text(
        egui::pos2(deck_box.left() + canvas.px(16.0), deck_box.top() + canvas.px(14.0)),
        egui::Align2::LEFT_CENTER,
        "DECK",
        canvas.font(13.0),
        egui::Color32::from_white_alpha(128),
    );
    let grid = egui::Rect::from_min_max(
        egui::pos2(deck_box.left() + canvas.px(16.0), deck_box.top() + canvas.px(30.0)),
        egui::pos2(deck_box.right() - canvas.px(16.0), deck_box.bottom() - canvas.px(10.0)),
    );
    let cell_gap = canvas.px(6.0);
    let cell_w = (grid.width() - cell_gap * 3.0) / 4.0;
    let cell_h = (grid.height() - cell_gap) / 2.0;
    for (index, card) in player.normalized_deck().iter().enumerate() {
        let col = (index % 4) as f32;
        let row = (index / 4) as f32;
        let cell = egui::Rect::from_min_size(
            egui::pos2(
                grid.left() + col * (cell_w + cell_gap),
                grid.top() + row * (cell_h + cell_gap),
            ),
            egui::vec2(cell_w, cell_h),
        );
        ui.painter().rect_filled(cell, canvas.px(2.0), DARK_3);
        let label_h = canvas.px(22.0);
        let art = egui::Rect::from_min_max(
            cell.min + egui::vec2(canvas.px(4.0), canvas.px(4.0)),
            egui::pos2(cell.right() - canvas.px(4.0), cell.bottom() - label_h),
        );
        let art_path = assets.deck.get(index).and_then(|path| path.as_deref());
        draw_image_or(ui, textures, art_path, art, |painter| {
            painter.rect_filled(art, canvas.px(2.0), DARK_1);
        });
        ui.painter().with_clip_rect(cell).text(
            egui::pos2(cell.center().x, cell.bottom() - label_h * 0.5),
            egui::Align2::CENTER_CENTER,
            card.to_uppercase(),
            canvas.font(10.0),
            egui::Color32::from_white_alpha(180),
        );
    }

    // Win percentage
    let win = section(72.0);
    render_stat_box(
        ui,
        win,
        accent,
        side,
        "WIN %",
        &format!("{}%", player.win_rate),
        egui::Color32::WHITE,
        canvas,
    );
}

fn render_box_frame(ui: &mut egui::Ui, rect: egui::Rect, accent: egui::Color32, side: Side, canvas: &Canvas) {
    ui.painter().rect_filled(rect, 0.0, DARK_2);
    let edge = match side {
        Side::Player1 => [rect.left_top(), rect.left_bottom()],
        Side::Player2 => [rect.right_top(), rect.right_bottom()],
    };
    ui.painter()
        .line_segment(edge, egui::Stroke::new(canvas.px(4.0), accent));
}

#[allow(clippy::too_many_arguments)]
fn render_stat_box(
    ui: &mut egui::Ui,
    rect: egui::Rect,
    accent: egui::Color32,
    side: Side,
    label: &str,
    value: &str,
    value_color: egui::Color32,
    canvas: &Canvas,
) {
    render_box_frame(ui, rect, accent, side, canvas);
    ui.painter().text(
        egui::pos2(rect.left() + canvas.px(16.0), rect.center().y),
        egui::Align2::LEFT_CENTER,
        label,
        canvas.font(16.0),
        egui::Color32::from_white_alpha(150),
    );
    ui.painter().text(
        egui::pos2(rect.right() - canvas.px(16.0), rect.center().y),
        egui::Align2::RIGHT_CENTER,
        value,
        canvas.font(40.0),
        value_color,
    );
}

fn render_camera_frames(ui: &mut egui::Ui, canvas: &Canvas) {
    let stroke = egui::Stroke::new(canvas.px(3.0), GOLD.gamma_multiply(0.6));
    let width = 320.0;
    let height = 180.0;
    let top = CANVAS.y - height - 70.0;
    for (x, color) in [
        (PANEL_WIDTH + 24.0, RED),
        (CANVAS.x - TRACKER_WIDTH - PANEL_WIDTH - 24.0 - width, BLUE),
    ] {
        let frame = canvas.rect(x, top, width, height);
        ui.painter()
            .rect_stroke(frame, canvas.px(4.0), stroke, egui::StrokeKind::Inside);
        ui.painter().line_segment(
            [frame.left_top(), frame.right_top()],
            egui::Stroke::new(canvas.px(4.0), color),
        );
    }
}

fn render_crown_column(ui: &mut egui::Ui, record: &MatchRecord, slots: &[TrackerSlot], canvas: &Canvas) {
    let column = canvas.rect(CANVAS.x - TRACKER_WIDTH, 0.0, TRACKER_WIDTH, CANVAS.y);
    ui.painter().rect_filled(column, 0.0, DARK_1.gamma_multiply(0.88));
    ui.painter().line_segment(
        [column.left_top(), column.left_bottom()],
        egui::Stroke::new(canvas.px(2.0), GOLD.gamma_multiply(0.3)),
    );
    ui.painter().text(
        egui::pos2(column.center().x, column.top() + canvas.px(120.0)),
        egui::Align2::CENTER_CENTER,
        format!("MATCH {}", record.match_number),
        canvas.font(13.0),
        GOLD,
    );
    ui.painter().text(
        egui::pos2(column.center().x, column.top() + canvas.px(150.0)),
        egui::Align2::CENTER_CENTER,
        format!("DAY {}", record.day),
        canvas.font(18.0),
        GOLD,
    );

    let slot_height = canvas.px(56.0);
    let total = slot_height * slots.len() as f32;
    let mut y = column.center().y - total * 0.5;
    for slot in slots {
        let row = egui::Rect::from_min_size(
            egui::pos2(column.left(), y),
            egui::vec2(column.width(), slot_height),
        );
        let crown = egui::vec2(canvas.px(28.0), canvas.px(24.0));
        let left = egui::Rect::from_center_size(
            egui::pos2(row.center().x - canvas.px(17.0), row.center().y),
            crown,
        );
        let right = egui::Rect::from_center_size(
            egui::pos2(row.center().x + canvas.px(17.0), row.center().y),
            crown,
        );
        paint_crown(ui.painter(), left, crown_color(slot.player1_won));
        paint_crown(ui.painter(), right, crown_color(slot.player2_won));
        y += slot_height;
    }
}

fn crown_color(won: bool) -> egui::Color32 {
    if won {
        GOLD
    } else {
        egui::Color32::from_white_alpha(38)
    }
}

/// Crown glyph made of convex pieces: a band and three spikes.
fn paint_crown(painter: &egui::Painter, rect: egui::Rect, color: egui::Color32) {
    let w = rect.width();
    let h = rect.height();
    let at = |fx: f32, fy: f32| egui::pos2(rect.left() + w * fx, rect.top() + h * fy);

    let band = egui::Rect::from_min_max(at(0.08, 0.62), at(0.92, 0.8));
    painter.rect_filled(band, 0.0, color);
    let base = egui::Rect::from_min_max(at(0.08, 0.85), at(0.92, 1.0));
    painter.rect_filled(base, w * 0.04, color);
    for spike in [
        [at(0.0, 0.25), at(0.08, 0.62), at(0.35, 0.62)],
        [at(0.5, 0.0), at(0.3, 0.62), at(0.7, 0.62)],
        [at(1.0, 0.25), at(0.65, 0.62), at(0.92, 0.62)],
    ] {
        painter.add(egui::Shape::convex_polygon(
            spike.to_vec(),
            color,
            egui::Stroke::NONE,
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn write_card(root: &Path, slug: &str) -> PathBuf {
        let dir = root.join("images");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(format!("{slug}.png"));
        std::fs::write(&path, b"png").unwrap();
        path
    }

    #[test]
    fn assets_resolve_once_until_card_names_change() {
        let dir = tempfile::tempdir().unwrap();
        let hog = write_card(dir.path(), "hog-rider");
        let resolver = AssetResolver::new(dir.path(), HashMap::new());
        let mut record = MatchRecord::default();
        let mut slot = None;

        let (assets, fresh) = assets_for(&mut slot, &record, &resolver);
        assert!(fresh);
        assert_eq!(assets.player(Side::Player1).favorite, Some(hog.clone()));
        assert!(assets.paths().contains(&hog));

        // Removing the file is not noticed while nothing relevant changed.
        std::fs::remove_file(&hog).unwrap();
        record.title = "FINALS".to_string();
        record.player1.score = 2;
        let (assets, fresh) = assets_for(&mut slot, &record, &resolver);
        assert!(!fresh);
        assert_eq!(assets.player(Side::Player1).favorite, Some(hog));

        record.player1.favorite_card_name = "Zap".to_string();
        let (assets, fresh) = assets_for(&mut slot, &record, &resolver);
        assert!(fresh);
        assert_eq!(assets.player(Side::Player1).favorite, None);
        assert_eq!(assets.player(Side::Player1).deck.len(), 8);
    }
}
