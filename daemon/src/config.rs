use anyhow::{Context, Result};
use serde::Deserialize;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::paths;

pub const DEFAULT_INTERPRETER: &str = "swift";
pub const DEFAULT_LAUNCH_CHECK_MS: u64 = 100;
pub const DEFAULT_CLEANUP_DELAY_MS: u64 = 1500;

/// How the flash helper is reached.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum HelperConfig {
    /// A prebuilt executable, invoked directly.
    Program { path: PathBuf },
    /// An interpreter run on an existing helper source file.
    Script {
        #[serde(default = "default_interpreter")]
        interpreter: String,
        source: PathBuf,
    },
    /// The bundled Swift helper, written to a temp file for every flash.
    Builtin {
        #[serde(default = "default_interpreter")]
        interpreter: String,
    },
}

impl Default for HelperConfig {
    fn default() -> Self {
        Self::Builtin {
            interpreter: DEFAULT_INTERPRETER.to_string(),
        }
    }
}

impl HelperConfig {
    fn expand_paths(self) -> Self {
        match self {
            Self::Program { path } => Self::Program {
                path: paths::expand_home(&path),
            },
            Self::Script { interpreter, source } => Self::Script {
                interpreter,
                source: paths::expand_home(&source),
            },
            builtin => builtin,
        }
    }
}

impl std::fmt::Display for HelperConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Program { path } => write!(f, "{}", path.display()),
            Self::Script { interpreter, source } => {
                write!(f, "{interpreter} {}", source.display())
            }
            Self::Builtin { interpreter } => write!(f, "{interpreter} <bundled flash_screen.swift>"),
        }
    }
}

/// Which kinds of marker-file events produce a flash.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TriggerPolicy {
    pub on_create: bool,
    pub on_delete: bool,
    pub on_modify: bool,
}

impl Default for TriggerPolicy {
    fn default() -> Self {
        Self {
            on_create: true,
            on_delete: false,
            on_modify: false,
        }
    }
}

/// Optional on-disk configuration. Every field may be omitted.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    pub file: Option<PathBuf>,
    pub image: Option<PathBuf>,
    pub helper: Option<HelperConfig>,
    #[serde(default)]
    pub flash_on_delete: bool,
    #[serde(default)]
    pub flash_on_modify: bool,
    pub launch_check_ms: Option<u64>,
    pub cleanup_delay_ms: Option<u64>,
}

/// Settings given on the command line. They take precedence over [`ConfigFile`].
#[derive(Debug, Default)]
pub struct Overrides {
    pub file: Option<PathBuf>,
    pub image: Option<PathBuf>,
    pub verbose: bool,
    pub helper: Option<HelperConfig>,
    /// Replaces the interpreter of a script or builtin helper.
    pub interpreter: Option<String>,
    pub flash_on_delete: bool,
    pub flash_on_modify: bool,
}

/// Immutable runtime configuration shared by the watcher and the flasher.
#[derive(Debug, Clone)]
pub struct WatchConfig {
    /// Absolute path of the marker file.
    pub watch_file: PathBuf,
    pub flash_image: Option<PathBuf>,
    pub verbose: bool,
    pub helper: HelperConfig,
    pub triggers: TriggerPolicy,
    /// How long to wait for a freshly spawned helper to fail.
    pub launch_check: Duration,
    /// Delay before a temporary helper script is removed.
    pub cleanup_delay: Duration,
}

impl WatchConfig {
    /// Layers `overrides` over `file` over the built-in defaults.
    /// Relative watch paths are resolved against `cwd`.
    pub fn resolve(file: ConfigFile, overrides: Overrides, cwd: &Path) -> Self {
        let watch_file = overrides
            .file
            .or(file.file)
            .map(|p| paths::expand_home(&p))
            .unwrap_or_else(|| PathBuf::from(paths::DEFAULT_WATCH_FILE));
        let watch_file = if watch_file.is_absolute() {
            watch_file
        } else {
            cwd.join(watch_file)
        };

        let flash_image = overrides
            .image
            .or(file.image)
            .map(|p| paths::expand_home(&p))
            .or_else(paths::default_image_path);

        let mut helper = overrides.helper.or(file.helper).unwrap_or_default();
        if let Some(name) = overrides.interpreter {
            match &mut helper {
                HelperConfig::Script { interpreter, .. } | HelperConfig::Builtin { interpreter } => {
                    *interpreter = name
                }
                HelperConfig::Program { .. } => {}
            }
        }

        Self {
            watch_file,
            flash_image,
            verbose: overrides.verbose,
            helper: helper.expand_paths(),
            triggers: TriggerPolicy {
                on_create: true,
                on_delete: overrides.flash_on_delete || file.flash_on_delete,
                on_modify: overrides.flash_on_modify || file.flash_on_modify,
            },
            launch_check: Duration::from_millis(
                file.launch_check_ms.unwrap_or(DEFAULT_LAUNCH_CHECK_MS),
            ),
            cleanup_delay: Duration::from_millis(
                file.cleanup_delay_ms.unwrap_or(DEFAULT_CLEANUP_DELAY_MS),
            ),
        }
    }

    /// Directory that is subscribed to: the parent of the marker file.
    pub fn watch_dir(&self) -> PathBuf {
        match self.watch_file.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    /// Basename that incoming events are matched against.
    pub fn file_name(&self) -> &OsStr {
        self.watch_file
            .file_name()
            .unwrap_or_else(|| self.watch_file.as_os_str())
    }
}

/// Loads the config file at `path`, returning `ConfigFile::default()` if the file does not exist.
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_or_default(path: &Path) -> Result<ConfigFile> {
    if !path.exists() {
        return Ok(ConfigFile::default());
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

fn default_interpreter() -> String {
    DEFAULT_INTERPRETER.to_string()
}
