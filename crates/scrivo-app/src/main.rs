//! Scrivo binary - composition root.
//!
//! Wires the session controller to the status hub and the three feedback
//! surfaces (overlay, tray, main window), backed by the configuration store
//! and the history log. The pipeline boundaries run on the mock backends
//! until platform providers are linked in; the control surface is a small
//! stdin command loop standing in for the global hotkey.

mod cli;

use std::sync::Arc;

use clap::Parser;
use tokio::io::AsyncBufReadExt;
use tracing::info;
use tracing_subscriber::EnvFilter;

use scrivo_core::config::{AppConfig, ConfigStore};
use scrivo_core::error::Result;
use scrivo_core::profile::{resolve_effective_config, EphemeralOverrides};
use scrivo_core::types::ForegroundApp;
use scrivo_history::HistoryStore;
use scrivo_session::pipeline::{
    MockAudioSource, MockEnhancer, MockForegroundProbe, MockSpeechToText, MockTextInserter,
};
use scrivo_session::{ControllerTunables, SessionController};
use scrivo_sync::{attach_surface, StatusHub, SyncConfig};
use scrivo_ui::{overlay_model, TrayModel};

use cli::{CliArgs, Command};

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_new(args.resolve_log_level())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config_path = args.resolve_config_path();
    let store = ConfigStore::at_path(&config_path);
    let config = store.load_or_default();

    let history_path = config_path
        .parent()
        .map(|dir| dir.join("history.json"))
        .unwrap_or_else(|| "history.json".into());
    let history = Arc::new(HistoryStore::at_path(history_path));

    match args.command.unwrap_or(Command::Run) {
        Command::Resolve {
            process_name,
            exe_path,
            window_title,
        } => resolve_command(&config, process_name, exe_path, window_title),
        Command::History { clear } => history_command(&history, clear),
        Command::Run => run(store, config, history).await,
    }
}

fn resolve_command(
    config: &AppConfig,
    process_name: Option<String>,
    exe_path: Option<String>,
    window_title: Option<String>,
) -> Result<()> {
    let app = ForegroundApp {
        process_name,
        exe_path,
        window_title,
    };
    let effective = resolve_effective_config(
        &config.defaults,
        &config.profiles,
        &app,
        &EphemeralOverrides::default(),
    );
    println!("{}", serde_json::to_string_pretty(&effective)?);
    Ok(())
}

fn history_command(history: &HistoryStore, clear: bool) -> Result<()> {
    if clear {
        history.clear()?;
        println!("history cleared");
        return Ok(());
    }
    let entries = history.list()?;
    if entries.is_empty() {
        println!("history is empty");
        return Ok(());
    }
    for entry in entries {
        println!(
            "{} [{}] {} - {}",
            entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
            entry.outcome,
            entry.process_name.as_deref().unwrap_or("unknown"),
            entry.text
        );
    }
    Ok(())
}

async fn run(store: ConfigStore, config: AppConfig, history: Arc<HistoryStore>) -> Result<()> {
    // Persist defaults on first launch so the user has a file to edit.
    if !store.path().exists() {
        store.save(&config)?;
    }

    let hub = StatusHub::new();
    let controller = Arc::new(SessionController::new(
        Arc::new(MockAudioSource::new()),
        Arc::new(MockForegroundProbe::new()),
        Arc::new(MockSpeechToText::fixed("this is a dictated sentence")),
        Arc::new(MockEnhancer::new()),
        Arc::new(MockTextInserter::new()),
        history,
        hub.clone(),
        config,
        ControllerTunables::default(),
    ));

    // Every surface converges through push plus poll fallback; none of them
    // talk to the controller directly.
    let overlay = attach_surface("overlay", &hub, controller.clone(), SyncConfig::default());
    let tray = attach_surface("tray", &hub, controller.clone(), SyncConfig::default());
    let main_window = attach_surface(
        "main-window",
        &hub,
        controller.clone(),
        SyncConfig::default(),
    );

    // Narrate status pushes so the demo shows what the surfaces would paint.
    {
        let mut rx = hub.subscribe_status();
        let tray_view = tray.name().to_string();
        tokio::spawn(async move {
            while let Ok(frame) = rx.recv().await {
                info!(
                    surface = %tray_view,
                    stage = %frame.status.stage_label,
                    "status push"
                );
            }
        });
    }

    info!(version = env!("CARGO_PKG_VERSION"), "scrivo started");
    println!("commands: toggle | cancel | status | quit");

    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match line.trim() {
            "toggle" => match controller.toggle().await {
                Ok(status) => println!("-> {}", status.stage_label),
                Err(e) => println!("!! {e}"),
            },
            "cancel" => {
                controller.cancel().await?;
                println!("-> {}", controller.status().stage_label);
            }
            "status" => {
                println!("{}", serde_json::to_string_pretty(&controller.status())?);
                let model = TrayModel::from_surface(tray.health(), tray.status().as_ref());
                println!("tray: {} ({})", model.state, model.tooltip);
                let view = overlay_model(overlay.health(), overlay.status().as_ref());
                println!("overlay: visible={} headline={}", view.visible, view.headline);
            }
            "quit" => break,
            "" => {}
            other => println!("unknown command: {other}"),
        }
    }

    overlay.detach();
    tray.detach();
    main_window.detach();
    info!("scrivo stopped");
    Ok(())
}
