use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

use crate::config::{self, ConfigFile, HelperConfig, Overrides, WatchConfig};
use crate::paths;

/// Flash the screen whenever a marker file is created.
#[derive(Debug, Parser)]
#[command(name = "file-watch-flash")]
#[command(version, about, long_about = None)]
pub struct Args {
    /// File to watch [default: .cursor_response_complete]
    #[arg(short, long, value_name = "PATH")]
    pub file: Option<PathBuf>,

    /// Image shown during the flash [default: ~/alfred-e-neuman.jpeg]
    #[arg(short, long, value_name = "PATH")]
    pub image: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Config file [default: <config dir>/file-watch-flash/config.toml]
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Prebuilt flash helper executable
    #[arg(long, value_name = "PATH", conflicts_with = "helper_script")]
    pub helper: Option<PathBuf>,

    /// Flash helper source file, run with --interpreter
    #[arg(long, value_name = "PATH")]
    pub helper_script: Option<PathBuf>,

    /// Interpreter for the helper script or the bundled Swift helper [default: swift]
    #[arg(long, value_name = "PROGRAM")]
    pub interpreter: Option<String>,

    /// Also flash when the file is deleted
    #[arg(long)]
    pub flash_on_delete: bool,

    /// Also flash when the file is modified
    #[arg(long)]
    pub flash_on_modify: bool,
}

impl Args {
    /// Command-line layer of the configuration.
    pub fn overrides(&self) -> Overrides {
        let helper = match (&self.helper, &self.helper_script) {
            (Some(path), _) => Some(HelperConfig::Program { path: path.clone() }),
            (None, Some(source)) => Some(HelperConfig::Script {
                interpreter: config::DEFAULT_INTERPRETER.to_string(),
                source: source.clone(),
            }),
            (None, None) => None,
        };
        Overrides {
            file: self.file.clone(),
            image: self.image.clone(),
            verbose: self.verbose,
            helper,
            interpreter: self.interpreter.clone(),
            flash_on_delete: self.flash_on_delete,
            flash_on_modify: self.flash_on_modify,
        }
    }

    /// Loads the config file named by `--config`, or the default one if it exists.
    pub fn config_file(&self) -> Result<ConfigFile> {
        match self.config.clone().or_else(paths::config_file_path) {
            Some(path) => config::load_or_default(&paths::expand_home(&path)),
            None => Ok(ConfigFile::default()),
        }
    }

    /// Layers the command line over `file`.
    pub fn resolve(&self, file: ConfigFile) -> Result<WatchConfig> {
        let cwd = std::env::current_dir().context("Failed to determine working directory")?;
        Ok(WatchConfig::resolve(file, self.overrides(), &cwd))
    }
}
