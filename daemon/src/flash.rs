/// Launches the external flash helper for a triggering marker-file event.
///
/// The helper is spawned as a detached child. The caller only waits for a
/// short launch-check window so that an immediate failure (missing binary,
/// broken interpreter, bad script) can be reported; after that the helper is
/// left to finish on its own. Nothing in here returns an error to the watch
/// loop: every failure is logged and turned into a [`FlashOutcome`].
use async_trait::async_trait;
use std::ffi::{OsStr, OsString};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tracing::{debug, error, info};

use crate::config::{HelperConfig, WatchConfig};
use crate::event::FileEvent;
use crate::paths;

/// Source of the bundled Swift helper, used by [`HelperConfig::Builtin`].
pub const BUILTIN_HELPER_SOURCE: &str = include_str!("../assets/flash_screen.swift");

#[derive(Debug, Error)]
pub enum FlashError {
    #[error("Flash helper `{0}` not found or not executable")]
    HelperNotFound(String),
    #[error("Flash helper script {} is not readable: {source}", .path.display())]
    ScriptUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to write temporary helper script: {0}")]
    TempScript(#[source] std::io::Error),
    #[error("Failed to launch flash helper {}: {source}", .program.display())]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Result of a single flash attempt.
#[derive(Debug)]
pub enum FlashOutcome {
    /// The helper was still running when the launch window closed.
    Running,
    /// The helper exited inside the launch window.
    Exited(ExitStatus),
    /// A precondition failed; no process was spawned.
    Skipped,
    /// The process could not be spawned or checked.
    Failed,
}

impl FlashOutcome {
    /// Exit status of a helper that finished inside the launch window.
    pub fn exit_status(&self) -> Option<ExitStatus> {
        match self {
            Self::Exited(status) => Some(*status),
            _ => None,
        }
    }
}

/// Everything needed to spawn the helper once.
#[derive(Debug, Clone, PartialEq)]
pub struct FlashInvocation {
    pub program: PathBuf,
    pub args: Vec<OsString>,
    /// Per-flash copy of the bundled helper source, removed after a delay.
    pub temp_script: Option<PathBuf>,
}

/// Receives the marker-file events that the trigger policy selected.
#[async_trait]
pub trait FlashHandler: Send + Sync {
    async fn flash(&self, event: &FileEvent) -> FlashOutcome;
}

pub struct Flasher {
    helper: HelperConfig,
    image: Option<PathBuf>,
    launch_check: Duration,
    cleanup_delay: Duration,
}

impl Flasher {
    pub fn new(config: &WatchConfig) -> Self {
        Self {
            helper: config.helper.clone(),
            image: config.flash_image.clone(),
            launch_check: config.launch_check,
            cleanup_delay: config.cleanup_delay,
        }
    }

    /// Absolute path of the flash image, if it currently exists as a regular file.
    pub fn resolve_image(&self) -> Option<PathBuf> {
        let image = self.image.as_deref()?;
        if !image.is_file() {
            return None;
        }
        std::fs::canonicalize(image).ok()
    }

    /// Checks the helper preconditions and builds the argument list.
    ///
    /// For the builtin helper this writes a fresh temporary script.
    pub fn prepare(&self) -> Result<FlashInvocation, FlashError> {
        let image = self.resolve_image().map(OsString::from);

        match &self.helper {
            HelperConfig::Program { path } => {
                let program = resolve(path.as_os_str())?;
                Ok(FlashInvocation {
                    program,
                    args: image.into_iter().collect(),
                    temp_script: None,
                })
            }
            HelperConfig::Script {
                interpreter,
                source,
            } => {
                let program = resolve(OsStr::new(interpreter))?;
                check_readable(source)?;
                let mut args = vec![source.clone().into_os_string()];
                args.extend(image);
                Ok(FlashInvocation {
                    program,
                    args,
                    temp_script: None,
                })
            }
            HelperConfig::Builtin { interpreter } => {
                let program = resolve(OsStr::new(interpreter))?;
                let script = write_temp_script()?;
                let mut args = vec![script.clone().into_os_string()];
                args.extend(image);
                Ok(FlashInvocation {
                    program,
                    args,
                    temp_script: Some(script),
                })
            }
        }
    }

    /// Runs one flash attempt. Never fails; problems are logged.
    pub async fn flash_now(&self) -> FlashOutcome {
        match self.prepare() {
            Ok(invocation) => self.launch(invocation).await,
            Err(e) => {
                error!("{e}");
                FlashOutcome::Skipped
            }
        }
    }

    async fn launch(&self, invocation: FlashInvocation) -> FlashOutcome {
        let FlashInvocation {
            program,
            args,
            temp_script,
        } = invocation;

        if let Some(script) = temp_script {
            schedule_cleanup(script, self.cleanup_delay);
        }

        debug!(program = %program.display(), ?args, "Launching flash helper");
        let spawned = Command::new(&program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn();
        let mut child = match spawned {
            Ok(child) => child,
            Err(source) => {
                error!("{}", FlashError::Spawn { program, source });
                return FlashOutcome::Failed;
            }
        };

        let waited = tokio::time::timeout(self.launch_check, child.wait()).await;
        match waited {
            Ok(Ok(status)) => {
                let stderr = read_stderr(&mut child, self.launch_check).await;
                if status.success() {
                    debug!(%status, "Flash helper finished");
                } else if stderr.is_empty() {
                    error!("Flash helper {} exited with {status}", program.display());
                } else {
                    error!(
                        "Flash helper {} exited with {status}: {}",
                        program.display(),
                        stderr.trim()
                    );
                }
                FlashOutcome::Exited(status)
            }
            Ok(Err(e)) => {
                error!("Failed to check flash helper {}: {e}", program.display());
                FlashOutcome::Failed
            }
            Err(_) => {
                tokio::spawn(reap_detached(child));
                FlashOutcome::Running
            }
        }
    }
}

#[async_trait]
impl FlashHandler for Flasher {
    async fn flash(&self, event: &FileEvent) -> FlashOutcome {
        info!("Flashing screen for {}", event.path.display());
        self.flash_now().await
    }
}

fn resolve(program: &OsStr) -> Result<PathBuf, FlashError> {
    paths::find_program(program)
        .ok_or_else(|| FlashError::HelperNotFound(program.to_string_lossy().into_owned()))
}

fn check_readable(path: &Path) -> Result<(), FlashError> {
    let unreadable = |source| FlashError::ScriptUnreadable {
        path: path.to_path_buf(),
        source,
    };
    let meta = std::fs::metadata(path).map_err(unreadable)?;
    if !meta.is_file() {
        return Err(unreadable(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "not a regular file",
        )));
    }
    std::fs::File::open(path).map(drop).map_err(unreadable)
}

fn write_temp_script() -> Result<PathBuf, FlashError> {
    let mut file = tempfile::Builder::new()
        .prefix("flash-screen-")
        .suffix(".swift")
        .tempfile()
        .map_err(FlashError::TempScript)?;
    file.write_all(BUILTIN_HELPER_SOURCE.as_bytes())
        .map_err(FlashError::TempScript)?;
    let (_, path) = file.keep().map_err(|e| FlashError::TempScript(e.error))?;
    Ok(path)
}

/// Removes `path` after `delay` on a detached task. Failures are only logged at debug level.
fn schedule_cleanup(path: PathBuf, delay: Duration) {
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => debug!("Removed temporary helper script {}", path.display()),
            Err(e) => debug!("Failed to remove temporary helper script {}: {e}", path.display()),
        }
    });
}

/// Reads whatever the helper wrote to stderr, giving up after `limit`.
async fn read_stderr(child: &mut Child, limit: Duration) -> String {
    let mut buf = String::new();
    if let Some(mut pipe) = child.stderr.take() {
        let _ = tokio::time::timeout(limit, pipe.read_to_string(&mut buf)).await;
    }
    buf
}

async fn reap_detached(mut child: Child) {
    let mut stderr = String::new();
    if let Some(mut pipe) = child.stderr.take() {
        let _ = pipe.read_to_string(&mut stderr).await;
    }
    match child.wait().await {
        Ok(status) if status.success() => debug!(%status, "Flash helper finished"),
        Ok(status) => debug!(%status, stderr = %stderr.trim(), "Flash helper exited with failure"),
        Err(e) => debug!("Failed to wait for flash helper: {e}"),
    }
}
