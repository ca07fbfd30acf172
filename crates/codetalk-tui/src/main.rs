use std::fs::{self, OpenOptions};
use std::io;
use std::sync::{Arc, Mutex};
use anyhow::Result;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use codetalk_core::session::generate_user_id;
use codetalk_core::{ChatSession, Config, DirDownloader, IdentityStore, MmdcRenderer};

mod app;
mod handler;
mod tui;
mod ui;

use app::App;
use tui::EventHandler;

const LOG_FILE: &str = "codetalk.log";

/// Log to a file in the config dir; the terminal belongs to the UI.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let log_file = Config::config_dir().and_then(|dir| {
        fs::create_dir_all(&dir)?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join(LOG_FILE))?;
        Ok(file)
    });

    match log_file {
        Ok(file) => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init();
        }
        Err(_) => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(io::sink)
                .try_init();
        }
    }
}

fn resolve_user_id() -> String {
    let stored = IdentityStore::default_location().and_then(|store| store.resolve_user_id());
    stored.unwrap_or_else(|err| {
        // Still usable, just not remembered across runs
        warn!(%err, "could not persist user id, using an ephemeral one");
        generate_user_id()
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let config = Config::load().unwrap_or_else(|err| {
        warn!(%err, "failed to load config, using defaults");
        Config::new()
    });
    info!(agent = %config.agent_url, app = %config.app_name, "starting codetalk");

    let session = ChatSession::new(resolve_user_id());
    let renderer = Arc::new(MmdcRenderer::new(&config.mmdc_path));
    let downloader = DirDownloader::from_config(&config);

    let mut app = App::new(&config, session, renderer, downloader);
    app.start_session();

    tui::install_panic_hook();
    let mut terminal = tui::init()?;
    let mut events = EventHandler::new();

    while !app.should_quit {
        terminal.draw(|frame| ui::render(&mut app, frame))?;

        if let Some(event) = events.next().await {
            handler::handle_event(&mut app, event).await?;
        }
    }

    tui::restore()?;
    info!("codetalk exited");
    Ok(())
}
