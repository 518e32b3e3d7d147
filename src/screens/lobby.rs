use eframe::egui;
use parking_lot::Mutex;
use rfd::FileDialog;
use std::path::Path;
use std::sync::OnceLock;

use crate::services::match_store::validate_match_id;

pub enum LobbyAction {
    Stay,
    OpenOverlay(String),
    OpenAdmin(String),
}

struct LobbyUiState {
    match_id: String,
    message: Option<String>,
}

impl Default for LobbyUiState {
    fn default() -> Self {
        Self {
            match_id: "match-1".to_string(),
            message: None,
        }
    }
}

static LOBBY_STATE: OnceLock<Mutex<LobbyUiState>> = OnceLock::new();

fn lobby_state() -> &'static Mutex<LobbyUiState> {
    LOBBY_STATE.get_or_init(|| Mutex::new(LobbyUiState::default()))
}

fn validate_store_folder(folder_path: &str) -> Result<(), String> {
    let folder = Path::new(folder_path);
    if folder.exists() && !folder.is_dir() {
        return Err(format!("Path is not a folder: {}", folder.display()));
    }
    Ok(())
}

/// `fallback_id` is used when the match field is left empty.
pub fn ui(ui: &mut egui::Ui, store_dir: &mut String, fallback_id: &str) -> LobbyAction {
    ui.heading("CRCL Overlay");
    ui.add_space(8.0);
    ui.label("Pick a match and open the broadcast overlay or the admin panel.");
    ui.add_space(12.0);

    let mut state = lobby_state().lock();

    ui.label("Match ID:");
    ui.add_sized(
        [420.0, 28.0],
        egui::TextEdit::singleline(&mut state.match_id).hint_text(fallback_id),
    );
    ui.add_space(8.0);

    ui.label("Store folder:");
    ui.add_sized(
        [900.0, 28.0],
        egui::TextEdit::singleline(store_dir).hint_text("Folder shared by overlay and admin..."),
    );
    ui.add_space(6.0);
    if ui.button("Choose folder").clicked()
        && let Some(path) = FileDialog::new().set_directory(".").pick_folder()
    {
        *store_dir = path.display().to_string();
    }
    ui.add_space(12.0);

    let mut action = LobbyAction::Stay;
    ui.horizontal(|ui| {
        let open_overlay = ui.button("Open Overlay").clicked();
        let open_admin = ui.button("Admin Panel").clicked();
        if !open_overlay && !open_admin {
            return;
        }

        let trimmed = state.match_id.trim();
        let match_id = if trimmed.is_empty() {
            fallback_id.to_string()
        } else {
            trimmed.to_string()
        };
        let checked = validate_match_id(&match_id)
            .map_err(|err| err.to_string())
            .and_then(|_| validate_store_folder(store_dir.trim()));
        match checked {
            Ok(()) => {
                state.message = None;
                action = if open_overlay {
                    LobbyAction::OpenOverlay(match_id)
                } else {
                    LobbyAction::OpenAdmin(match_id)
                };
            }
            Err(message) => state.message = Some(message),
        }
    });

    if let Some(message) = &state.message {
        ui.add_space(8.0);
        ui.colored_label(egui::Color32::RED, message);
    }

    action
}
