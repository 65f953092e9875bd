mod export;
mod scan;
mod select;

use std::process::ExitCode;
use std::sync::Arc;

use grabber_engine::{JsonFileStore, SelectionStore};
use serde::Serialize;

use crate::cli::{Cli, Commands};
use crate::config::AppConfig;

pub(crate) struct Context {
    pub json: bool,
    pub config: AppConfig,
}

impl Context {
    pub fn selection_store(&self) -> Arc<SelectionStore> {
        let store = JsonFileStore::new(self.config.store_path.clone());
        Arc::new(SelectionStore::new(
            Arc::new(store),
            self.config.max_selection,
        ))
    }

    /// Prints `data` as pretty JSON, or runs `text` for the human-readable form.
    pub fn print<T: Serialize>(&self, data: &T, text: impl FnOnce()) -> anyhow::Result<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(data)?);
        } else {
            text();
        }
        Ok(())
    }
}

pub async fn run(cli: Cli, config: AppConfig) -> anyhow::Result<ExitCode> {
    let ctx = Context {
        json: cli.json,
        config,
    };
    match cli.command {
        Commands::Scan {
            page,
            mode,
            like,
            select,
        } => scan::run(&ctx, &page, mode, like.as_deref(), select).await,
        Commands::Select { action } => select::run(&ctx, action).await,
        Commands::Export(args) => export::run(&ctx, args).await,
    }
}
