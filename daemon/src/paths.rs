/// Default locations and path helpers for file-watch-flash.
///
///   - the marker file lives in the working directory
///   - the flash image defaults to a file in the user's home directory
///   - the optional config file lives under the platform config dir
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

const APP_DIR_NAME: &str = "file-watch-flash";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const DEFAULT_WATCH_FILE: &str = ".cursor_response_complete";
pub const DEFAULT_IMAGE_NAME: &str = "alfred-e-neuman.jpeg";

/// Returns the default flash image: `~/alfred-e-neuman.jpeg`.
/// `None` when the home directory cannot be determined.
pub fn default_image_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(DEFAULT_IMAGE_NAME))
}

/// Returns the default config file path: `<config_dir>/file-watch-flash/config.toml`.
pub fn config_file_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR_NAME).join(CONFIG_FILE_NAME))
}

/// Expands a leading `~` or `~/` to the home directory. Other paths are returned as-is.
pub fn expand_home(path: &Path) -> PathBuf {
    let mut components = path.components();
    match components.next() {
        Some(first) if first.as_os_str() == OsStr::new("~") => match dirs::home_dir() {
            Some(home) => home.join(components.as_path()),
            None => path.to_path_buf(),
        },
        _ => path.to_path_buf(),
    }
}

/// Resolves `program` to an executable file.
///
/// Names containing a path separator are checked directly; bare names are
/// searched for on `PATH`, in order.
pub fn find_program(program: &OsStr) -> Option<PathBuf> {
    let candidate = Path::new(program);
    if candidate.components().count() > 1 || candidate.is_absolute() {
        return is_executable(candidate).then(|| candidate.to_path_buf());
    }
    let search = std::env::var_os("PATH")?;
    std::env::split_paths(&search)
        .map(|dir| dir.join(program))
        .find(|p| is_executable(p))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    match std::fs::metadata(path) {
        Ok(meta) => meta.is_file() && meta.permissions().mode() & 0o111 != 0,
        Err(_) => false,
    }
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
