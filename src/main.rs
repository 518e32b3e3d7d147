use anyhow::Context as _;
use clap::{Parser, Subcommand};
use crcl_overlay::screens;
use crcl_overlay::screens::admin::AdminAction;
use crcl_overlay::screens::lobby::LobbyAction;
use crcl_overlay::screens::overlay::OverlayAction;
use crcl_overlay::services::asset_names::AssetResolver;
use crcl_overlay::services::config_loader::{self, OverlayConfig};
use crcl_overlay::services::match_store::{FileStore, MatchStore};
use crcl_overlay::services::match_sync::{MatchSyncClient, Notifier};
use eframe::egui;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

const LOBBY_SIZE: [f32; 2] = [1280.0, 720.0];
const ADMIN_SIZE: [f32; 2] = [1280.0, 960.0];
const OVERLAY_SIZE: [f32; 2] = [1920.0, 1080.0];

#[derive(Parser)]
#[command(name = "crcl-overlay", about = "CRCL broadcast overlay and admin panel")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,
    /// Overrides `store_dir` from the configuration.
    #[arg(long)]
    store_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Open the broadcast overlay for a match.
    Overlay { match_id: Option<String> },
    /// Open the admin panel for a match.
    Admin { match_id: Option<String> },
}

enum AppView {
    Lobby,
    Overlay(MatchSyncClient),
    Admin(MatchSyncClient),
}

impl AppView {
    fn client_mut(&mut self) -> Option<&mut MatchSyncClient> {
        match self {
            AppView::Lobby => None,
            AppView::Overlay(client) | AppView::Admin(client) => Some(client),
        }
    }
}

struct OverlayApp {
    view: AppView,
    config: OverlayConfig,
    resolver: AssetResolver,
    store_dir: String,
    store: Option<(PathBuf, Arc<FileStore>)>,
    ctx: egui::Context,
    open_error: Option<String>,
}

impl OverlayApp {
    fn new(ctx: egui::Context, config: OverlayConfig, start: Option<Command>) -> Self {
        let resolver = AssetResolver::new(config.assets_dir.clone(), config.school_logos.clone());
        let mut app = Self {
            view: AppView::Lobby,
            store_dir: config.store_dir.display().to_string(),
            resolver,
            store: None,
            ctx,
            open_error: None,
            config,
        };

        match start {
            Some(Command::Overlay { match_id }) => {
                let match_id = app.config.resolve_match_id(match_id.as_deref());
                app.open_overlay(match_id);
            }
            Some(Command::Admin { match_id }) => {
                let match_id = app.config.resolve_match_id(match_id.as_deref());
                app.open_admin(match_id);
            }
            None => {}
        }
        app
    }

    fn store(&mut self) -> anyhow::Result<Arc<FileStore>> {
        let dir = PathBuf::from(self.store_dir.trim());
        if let Some((open_dir, store)) = &self.store
            && *open_dir == dir
        {
            return Ok(Arc::clone(store));
        }
        let store = FileStore::open(&dir, self.config.poll_interval())
            .with_context(|| format!("Failed to open match store at {}", dir.display()))?;
        let store = Arc::new(store);
        self.store = Some((dir, Arc::clone(&store)));
        Ok(store)
    }

    fn connect(&mut self, match_id: &str) -> Option<MatchSyncClient> {
        match self.store() {
            Ok(store) => {
                let ctx = self.ctx.clone();
                let notifier: Notifier = Arc::new(move || ctx.request_repaint());
                let store: Arc<dyn MatchStore> = store;
                self.open_error = None;
                Some(MatchSyncClient::connect_with_notifier(
                    store,
                    match_id,
                    Some(notifier),
                ))
            }
            Err(err) => {
                warn!("{:#}", err);
                self.open_error = Some(format!("{err:#}"));
                None
            }
        }
    }

    fn open_overlay(&mut self, match_id: String) {
        if let Some(client) = self.connect(&match_id) {
            info!("Transition: Lobby -> Overlay ({})", match_id);
            self.view = AppView::Overlay(client);
            self.resize(OVERLAY_SIZE);
        }
    }

    fn open_admin(&mut self, match_id: String) {
        if let Some(client) = self.connect(&match_id) {
            info!("Transition: Lobby -> Admin ({})", match_id);
            self.view = AppView::Admin(client);
            self.resize(ADMIN_SIZE);
        }
    }

    fn back_to_lobby(&mut self) {
        info!("Transition: -> Lobby");
        // Dropping the client releases its subscription.
        self.view = AppView::Lobby;
        self.resize(LOBBY_SIZE);
    }

    fn resize(&self, size: [f32; 2]) {
        self.ctx
            .send_viewport_cmd(egui::ViewportCommand::InnerSize(egui::vec2(size[0], size[1])));
    }
}

impl eframe::App for OverlayApp {
    fn clear_color(&self, visuals: &egui::Visuals) -> [f32; 4] {
        match self.view {
            AppView::Overlay(_) => egui::Rgba::TRANSPARENT.to_array(),
            _ => visuals.panel_fill.to_normalized_gamma_f32(),
        }
    }

    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        if let Some(client) = self.view.client_mut() {
            client.pump();
        }

        let frame = match self.view {
            AppView::Overlay(_) => egui::Frame::NONE,
            _ => egui::Frame::central_panel(&ctx.style()),
        };

        let mut next: Option<LobbyAction> = None;
        let mut go_back = false;
        egui::CentralPanel::default().frame(frame).show(ctx, |ui| match &mut self.view {
            AppView::Lobby => {
                ui.add_space(8.0);
                ui.vertical_centered(|ui| {
                    match screens::lobby::ui(ui, &mut self.store_dir, &self.config.default_match_id)
                    {
                        LobbyAction::Stay => {}
                        action => next = Some(action),
                    }
                    if let Some(message) = &self.open_error {
                        ui.add_space(8.0);
                        ui.colored_label(egui::Color32::RED, message);
                    }
                });
            }
            AppView::Overlay(client) => {
                match screens::overlay::ui(ui, ctx, client, &self.resolver, &self.config) {
                    OverlayAction::Stay => {}
                    OverlayAction::Back => go_back = true,
                }
            }
            AppView::Admin(client) => {
                ui.add_space(8.0);
                match screens::admin::ui(ui, client) {
                    AdminAction::Stay => {}
                    AdminAction::Back => go_back = true,
                }
            }
        });

        if go_back {
            self.back_to_lobby();
        }
        match next {
            Some(LobbyAction::OpenOverlay(match_id)) => self.open_overlay(match_id),
            Some(LobbyAction::OpenAdmin(match_id)) => self.open_admin(match_id),
            Some(LobbyAction::Stay) | None => {}
        }
    }
}

fn init_tracing() -> Option<WorkerGuard> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stdout)
        .with_target(true);

    let _ = fs::create_dir_all("logs");
    let file_appender = tracing_appender::rolling::daily("logs", "crcl-overlay.log");
    let (file_writer, file_guard) = tracing_appender::non_blocking(file_appender);
    let file_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(file_writer)
        .with_target(true);

    let init_result = tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init();

    if let Err(err) = init_result {
        eprintln!("tracing init failed: {err}");
        return None;
    }

    Some(file_guard)
}

fn load_config(cli: &Cli) -> anyhow::Result<OverlayConfig> {
    let mut config = config_loader::load_overlay_config(Path::new(&cli.config))
        .map_err(anyhow::Error::msg)?;
    if let Some(store_dir) = &cli.store_dir {
        config.store_dir = store_dir.clone();
    }
    Ok(config)
}

fn main() -> anyhow::Result<()> {
    let _log_guard = init_tracing();
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    info!(
        "Starting crcl-overlay (store: {}, assets: {})",
        config.store_dir.display(),
        config.assets_dir.display()
    );

    let initial_size = match cli.command {
        Some(Command::Overlay { .. }) => OVERLAY_SIZE,
        Some(Command::Admin { .. }) => ADMIN_SIZE,
        None => LOBBY_SIZE,
    };
    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size(initial_size)
            .with_transparent(true),
        ..Default::default()
    };

    let pixels_per_point = config.presentation.pixels_per_point;
    let start = cli.command;
    eframe::run_native(
        "CRCL Overlay",
        options,
        Box::new(move |cc| {
            cc.egui_ctx.set_pixels_per_point(pixels_per_point);

            let mut style = (*cc.egui_ctx.style()).clone();
            style
                .text_styles
                .insert(egui::TextStyle::Heading, egui::FontId::proportional(30.0));
            style
                .text_styles
                .insert(egui::TextStyle::Body, egui::FontId::proportional(18.0));
            style
                .text_styles
                .insert(egui::TextStyle::Button, egui::FontId::proportional(18.0));
            style.spacing.button_padding = egui::vec2(12.0, 7.0);
            cc.egui_ctx.set_style(style);

            Ok(Box::new(OverlayApp::new(cc.egui_ctx.clone(), config, start)))
        }),
    )
    .map_err(|err| anyhow::anyhow!("eframe exited with an error: {err}"))
}
