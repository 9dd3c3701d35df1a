use std::{env, fmt, net::SocketAddr, num::NonZeroU32, path::PathBuf, time::Duration};

use thiserror::Error;

use super::{non_empty, server_bind_address};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 30;
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_millis(1000);
pub const DEFAULT_MANAGE_PROGRAM: &str = "python";
pub const DEFAULT_MANAGE_ARGS: &[&str] = &["manage.py"];
pub const DEFAULT_LEDGER_TABLE: &str = "django_migrations";

/// Application runtime environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
    Test,
}

impl Environment {
    fn from_str(value: &str) -> Result<Self, ConfigError> {
        match value {
            "development" | "dev" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            "test" => Ok(Self::Test),
            other => Err(ConfigError::InvalidEnvironment(other.to_string())),
        }
    }

    /// Returns the canonical name used for logging labels.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
            Self::Test => "test",
        }
    }
}

/// Connection settings for the database the bootstrapper waits on.
#[derive(Clone)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub name: String,
    pub user: String,
    pub password: String,
    /// Full connection string that takes precedence over the discrete fields
    /// when reading the migration ledger.
    pub url: Option<String>,
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("name", &self.name)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("url", &self.url.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Retry parameters for the connectivity probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeConfig {
    pub max_attempts: NonZeroU32,
    pub interval: Duration,
    pub deadline: Option<Duration>,
    pub connect_timeout: Duration,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            max_attempts: NonZeroU32::new(DEFAULT_MAX_ATTEMPTS).unwrap_or(NonZeroU32::MIN),
            interval: DEFAULT_INTERVAL,
            deadline: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

/// Runtime configuration resolved from environment variables.
#[derive(Debug, Clone)]
pub struct BootConfig {
    pub environment: Environment,
    pub database: DatabaseConfig,
    pub probe: ProbeConfig,
    /// Framework management program, e.g. `python`.
    pub manage_program: String,
    /// Arguments placed before every subcommand, e.g. `manage.py`.
    pub manage_args: Vec<String>,
    pub fixture: Option<PathBuf>,
    pub ledger_table: String,
    pub bind_addr: SocketAddr,
}

impl BootConfig {
    /// Constructs the configuration by reading and validating environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let env_value = env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());
        let environment = Environment::from_str(&env_value)?;
        let bind_addr = server_bind_address()?;

        let database = DatabaseConfig {
            host: non_empty("POSTGRES_HOST").unwrap_or_else(|| "localhost".to_string()),
            port: parse_var("POSTGRES_PORT")?.unwrap_or(5432),
            name: non_empty("POSTGRES_DB").unwrap_or_else(|| "postgres".to_string()),
            user: non_empty("POSTGRES_USER").unwrap_or_else(|| "postgres".to_string()),
            password: env::var("POSTGRES_PASSWORD").unwrap_or_else(|_| "postgres".to_string()),
            url: non_empty("DATABASE_URL"),
        };

        let defaults = ProbeConfig::default();
        let max_attempts = match parse_var::<u32>("BOOT_MAX_ATTEMPTS")? {
            Some(value) => NonZeroU32::new(value).ok_or(ConfigError::NotPositive {
                var: "BOOT_MAX_ATTEMPTS",
                value: value.to_string(),
            })?,
            None => defaults.max_attempts,
        };
        let interval = seconds_var("BOOT_INTERVAL_SECS")?.unwrap_or(defaults.interval);
        let deadline = seconds_var("BOOT_DEADLINE_SECS")?;
        let connect_timeout = match parse_var::<u64>("BOOT_CONNECT_TIMEOUT_MS")? {
            Some(0) => {
                return Err(ConfigError::NotPositive {
                    var: "BOOT_CONNECT_TIMEOUT_MS",
                    value: "0".to_string(),
                })
            }
            Some(ms) => Duration::from_millis(ms),
            None => defaults.connect_timeout,
        };

        let manage_raw = env::var("BOOT_MANAGE_CMD").unwrap_or_default();
        let mut words = manage_raw.split_whitespace().map(str::to_string);
        let (manage_program, manage_args) = match words.next() {
            Some(program) => (program, words.collect()),
            None => (
                DEFAULT_MANAGE_PROGRAM.to_string(),
                DEFAULT_MANAGE_ARGS.iter().map(|arg| arg.to_string()).collect(),
            ),
        };

        let ledger_table =
            non_empty("BOOT_LEDGER_TABLE").unwrap_or_else(|| DEFAULT_LEDGER_TABLE.to_string());
        if !is_identifier(&ledger_table) {
            return Err(ConfigError::InvalidLedgerTable(ledger_table));
        }

        Ok(Self {
            environment,
            database,
            probe: ProbeConfig {
                max_attempts,
                interval,
                deadline,
                connect_timeout,
            },
            manage_program,
            manage_args,
            fixture: non_empty("BOOT_FIXTURE").map(PathBuf::from),
            ledger_table,
            bind_addr,
        })
    }
}

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("APP_ENV must be one of 'development', 'production', or 'test' (got {0})")]
    InvalidEnvironment(String),
    #[error("invalid APP_BIND_ADDR value: {0}")]
    BindAddress(std::net::AddrParseError),
    #[error("APP_BIND_ADDR must name a fixed port (got {0})")]
    EphemeralBindPort(SocketAddr),
    #[error("failed to load environment file {}: {source}", path.display())]
    EnvFile {
        path: PathBuf,
        #[source]
        source: dotenvy::Error,
    },
    #[error("{var} must be a number (got {value})")]
    InvalidNumber { var: &'static str, value: String },
    #[error("{var} must be greater than zero (got {value})")]
    NotPositive { var: &'static str, value: String },
    #[error("BOOT_LEDGER_TABLE must contain only letters, digits and underscores (got {0})")]
    InvalidLedgerTable(String),
}

fn parse_var<T: std::str::FromStr>(var: &'static str) -> Result<Option<T>, ConfigError> {
    match non_empty(var) {
        Some(value) => value
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidNumber { var, value }),
        None => Ok(None),
    }
}

fn seconds_var(var: &'static str) -> Result<Option<Duration>, ConfigError> {
    let Some(secs) = parse_var::<f64>(var)? else {
        return Ok(None);
    };
    if !secs.is_finite() || secs <= 0.0 {
        return Err(ConfigError::NotPositive {
            var,
            value: secs.to_string(),
        });
    }
    Duration::try_from_secs_f64(secs)
        .map(Some)
        .map_err(|_| ConfigError::InvalidNumber {
            var,
            value: secs.to_string(),
        })
}

fn is_identifier(value: &str) -> bool {
    let mut chars = value.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
