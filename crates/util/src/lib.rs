//! Environment handling shared by the bootstrapper: the optional env file,
//! the server address and [`BootConfig`].

pub mod config;

use std::{env, net::SocketAddr, path::PathBuf};

pub use config::{BootConfig, ConfigError, DatabaseConfig, Environment, ProbeConfig};

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8000";

/// Names an env file to load instead of `./.env`.
pub const ENV_FILE_VAR: &str = "BOOT_ENV_FILE";

/// Loads variables from an env file. Variables already set in the process
/// environment win over the file.
///
/// With [`ENV_FILE_VAR`] set, that file must exist and parse. Otherwise
/// `.env` is looked up from the working directory and skipped when absent,
/// since container images usually get their variables from the orchestrator.
/// Returns the path of the file that was loaded.
pub fn load_env_file() -> Result<Option<PathBuf>, ConfigError> {
    if let Some(path) = non_empty(ENV_FILE_VAR).map(PathBuf::from) {
        return match dotenvy::from_path(&path) {
            Ok(()) => Ok(Some(path)),
            Err(source) => Err(ConfigError::EnvFile { path, source }),
        };
    }

    match dotenvy::dotenv() {
        Ok(path) => Ok(Some(path)),
        Err(err) if err.not_found() => Ok(None),
        Err(source) => Err(ConfigError::EnvFile {
            path: PathBuf::from(".env"),
            source,
        }),
    }
}

/// Address handed to `runserver`, from `APP_BIND_ADDR` or [`DEFAULT_BIND_ADDR`].
///
/// Port 0 is rejected: the server has to listen on the port the container
/// publishes.
pub fn server_bind_address() -> Result<SocketAddr, ConfigError> {
    let value = non_empty("APP_BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
    let addr: SocketAddr = value.parse().map_err(ConfigError::BindAddress)?;
    if addr.port() == 0 {
        return Err(ConfigError::EphemeralBindPort(addr));
    }
    Ok(addr)
}

/// Trimmed value of `var`. Unset and blank read the same.
pub(crate) fn non_empty(var: &str) -> Option<String> {
    env::var(var)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
pub(crate) static ENV_GUARD: std::sync::LazyLock<std::sync::Mutex<()>> =
    std::sync::LazyLock::new(|| std::sync::Mutex::new(()));
