use std::env;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use once_cell::sync::OnceCell;
use tracing_subscriber::{fmt, EnvFilter};

use crate::app::App;
use crate::config::{ConfigLoader, CONFIG_ENV, DATA_ENV};
use crate::storage::{self, BackgroundStore};

pub mod commands;

use self::commands::{NewArgs, PrefsArgs, ShowArgs};

const LOG_FILE: &str = "scratchpad.log";

#[derive(Parser, Debug)]
#[command(
    name = "scratchpad",
    version,
    about = "Tabbed terminal scratchpad with debounced autosave"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Override the config file location (takes precedence over SCRATCHPAD_CONFIG)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Override the data directory (takes precedence over SCRATCHPAD_DATA)
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Minimum log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Launch the interactive scratchpad (default)
    Tui,
    /// List tabs, marking the active one
    Tabs,
    /// Print the content of a tab, by id or label
    Show(ShowArgs),
    /// Open a new tab, optionally with a label and content
    New(NewArgs),
    /// Show or change display preferences
    Prefs(PrefsArgs),
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    if let Some(path) = &cli.config {
        env::set_var(CONFIG_ENV, path);
    }
    if let Some(path) = &cli.data_dir {
        env::set_var(DATA_ENV, path);
    }

    let loader = ConfigLoader::discover()?;
    loader.paths().ensure_directories()?;
    let paths = loader.paths().clone();
    let command = cli.command.unwrap_or(Commands::Tui);

    // The TUI owns the terminal, so its log goes to a file.
    let log_file = matches!(command, Commands::Tui).then(|| paths.log_dir.join(LOG_FILE));
    init_tracing(&cli.log_level, log_file.as_deref())
        .with_context(|| format!("initialising logging at level {}", cli.log_level))?;

    let config = Arc::new(loader.load_or_init()?);
    let store = storage::init(&config.storage)?;
    tracing::debug!(db = %store.database_path().display(), "storage ready");

    match command {
        Commands::Tui => {
            let store = Arc::new(BackgroundStore::spawn(store)?);
            let mut app = App::new(config.clone(), store.clone())?;
            let result = commands::run_tui(&mut app);
            store.flush().context("flushing pending writes")?;
            result
        }
        Commands::Tabs => commands::list_tabs(config, Arc::new(store)),
        Commands::Show(args) => commands::show_tab(config, Arc::new(store), args),
        Commands::New(args) => commands::new_tab(config, Arc::new(store), args),
        Commands::Prefs(args) => commands::prefs(config, Arc::new(store), args),
    }
}

fn init_tracing(level: &str, log_file: Option<&Path>) -> Result<()> {
    static INIT: OnceCell<()> = OnceCell::new();
    INIT.get_or_try_init(|| {
        let env_filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
        match log_file {
            Some(path) => {
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .with_context(|| format!("opening log file {}", path.display()))?;
                fmt()
                    .with_env_filter(env_filter)
                    .with_ansi(false)
                    .with_writer(Mutex::new(file))
                    .init();
            }
            None => {
                fmt()
                    .with_env_filter(env_filter)
                    .with_writer(std::io::stderr)
                    .init();
            }
        }
        Ok::<(), anyhow::Error>(())
    })
    .map(|_| ())
}
