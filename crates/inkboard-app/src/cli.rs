//! Command-line interface.

use crate::script::{Script, ScriptError, replay};
use crate::shortcuts::ShortcutRegistry;
use inkboard_core::storage::{AutoSaveManager, FileStorage};
use inkboard_core::{ConfigError, EngineConfig, StorageError};
use inkboard_render::{RenderError, Session, SessionError};
use kurbo::Size;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// Viewport used when a saved session is opened only to export it.
const EXPORT_VIEWPORT: Size = Size::new(1.0, 1.0);

#[derive(clap::Parser, Debug)]
#[command(name = "inkboard", version, about = "Freehand drawing engine", long_about = None)]
pub struct Arguments {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(clap::Subcommand, Debug)]
pub enum Command {
    /// Replay a JSON input script and export the result
    Replay {
        /// Script with the steps to replay
        script: PathBuf,

        /// Where to write the exported PNG
        #[arg(short, long)]
        out: PathBuf,

        /// Save the session under this name
        #[arg(long)]
        save: Option<String>,

        /// Session directory (defaults to the platform data directory)
        #[arg(long, value_hint = clap::ValueHint::DirPath)]
        store: Option<PathBuf>,

        /// Engine configuration as JSON
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Export a saved session
    Export {
        /// Session name (defaults to the last one saved)
        name: Option<String>,

        /// Where to write the exported PNG
        #[arg(short, long)]
        out: PathBuf,

        /// Session directory (defaults to the platform data directory)
        #[arg(long, value_hint = clap::ValueHint::DirPath)]
        store: Option<PathBuf>,

        /// Engine configuration as JSON
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// List saved sessions
    List {
        #[arg(long, value_hint = clap::ValueHint::DirPath)]
        store: Option<PathBuf>,
    },
    /// Print the keyboard shortcuts usable in scripts
    Shortcuts,
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{path}: {source}")]
    Io { path: PathBuf, source: std::io::Error },
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Script(#[from] ScriptError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("No saved session to export")]
    NoSession,
}

impl From<RenderError> for AppError {
    fn from(error: RenderError) -> Self {
        Self::Session(error.into())
    }
}

impl From<StorageError> for AppError {
    fn from(error: StorageError) -> Self {
        Self::Session(error.into())
    }
}

pub fn run(args: Arguments) -> Result<(), AppError> {
    match args.command {
        Command::Replay {
            script,
            out,
            save,
            store,
            config,
        } => {
            let config = load_config(config.as_deref())?;
            let text = fs::read_to_string(&script).map_err(|source| AppError::Io {
                path: script.clone(),
                source,
            })?;
            let script = Script::from_json(&text)?;

            let mut session = Session::new(config, script.viewport.size(), script.pixel_ratio)?;
            let summary = pollster::block_on(replay(&mut session, &script.steps))?;
            log::info!(
                "Replayed {} steps: {} committed, {} compactions, history {}",
                summary.steps,
                summary.committed,
                summary.compactions,
                session.history().len()
            );

            write_export(&mut session, &out)?;

            if let Some(name) = save {
                let mut autosave = AutoSaveManager::new(Arc::new(open_storage(store)?));
                autosave.set_session_name(Some(name));
                pollster::block_on(autosave.save(&session.state()))?;
                log::info!("Saved session {}", autosave.session_name());
            }
            Ok(())
        }
        Command::Export {
            name,
            out,
            store,
            config,
        } => {
            let config = load_config(config.as_deref())?;
            let mut autosave = AutoSaveManager::new(Arc::new(open_storage(store)?));
            let state = match name {
                Some(name) => pollster::block_on(autosave.load(&name))?,
                None => pollster::block_on(autosave.load_last()).ok_or(AppError::NoSession)?,
            };
            let mut session = Session::from_state(state, config, EXPORT_VIEWPORT, 1.0)?;
            write_export(&mut session, &out)
        }
        Command::List { store } => {
            let autosave = AutoSaveManager::new(Arc::new(open_storage(store)?));
            for name in pollster::block_on(autosave.list_sessions())? {
                println!("{name}");
            }
            Ok(())
        }
        Command::Shortcuts => {
            ShortcutRegistry::print_all();
            Ok(())
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig, ConfigError> {
    match path {
        Some(path) => EngineConfig::load(path),
        None => Ok(EngineConfig::default()),
    }
}

fn open_storage(store: Option<PathBuf>) -> Result<FileStorage, StorageError> {
    match store {
        Some(dir) => FileStorage::new(dir),
        None => FileStorage::default_location(),
    }
}

fn write_export(session: &mut Session, out: &Path) -> Result<(), AppError> {
    let exported = pollster::block_on(session.export())?;
    fs::write(out, &exported.png).map_err(|source| AppError::Io {
        path: out.to_path_buf(),
        source,
    })?;
    log::info!("Wrote {}x{} PNG to {}", exported.width, exported.height, out.display());
    Ok(())
}
