pub mod api;
mod cli;
pub mod db;
pub mod error;
pub mod models;
pub mod rollcall;
pub mod selection;
pub mod settings;
pub mod utils;

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;

use api::{HttpApi, RollCallApi};
use db::Database;
use rollcall::{RollCallController, RollCallState};
use settings::{default_data_dir, SettingsStore};

pub struct AppState {
    pub rollcall: RollCallController,
    pub settings: SettingsStore,
}

impl AppState {
    /// Wires the controller to the configured backend.
    pub fn load(settings: SettingsStore, local: bool) -> Result<Self> {
        let effective = settings.effective();

        let api: Arc<dyn RollCallApi> = if local {
            let db_path = settings.database_path();
            log::info!("Using local roster database at {}", db_path.display());
            Arc::new(Database::open(db_path)?)
        } else {
            log::info!("Using roll call server at {}", effective.api_base_url);
            Arc::new(HttpApi::new(effective.api_base_url.clone(), effective.token.clone())?)
        };

        let initial = RollCallState::with_preferences(effective.roll_speed_ms, effective.allow_repeat);
        Ok(Self {
            rollcall: RollCallController::new(api, initial),
            settings,
        })
    }
}

pub fn run() {
    utils::logging::init();
    log::info!("Roll call starting up...");

    let args = cli::Cli::parse();
    let settings_path = args
        .config
        .clone()
        .unwrap_or_else(|| default_data_dir().join("settings.json"));

    let result = (|| -> Result<()> {
        let settings = SettingsStore::new(settings_path)?;
        let runtime = tokio::runtime::Runtime::new()?;
        runtime.block_on(cli::execute(args, settings))
    })();

    if let Err(err) = result {
        log::error!("{err:#}");
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
