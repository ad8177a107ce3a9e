//! Client configuration.
//!
//! Values come from `$REPOCHAT_HOME/config.toml` (default
//! `~/.repochat/config.toml`), then environment variables, then explicit
//! overrides from the command line, each layer winning over the one before.

use repochat_api::Provider;
use repochat_api::RetryConfig;
use repochat_api::StaticAuth;
use repochat_login::AwaitConfig;
use serde::Deserialize;
use serde::Serialize;
use std::fs::File;
use std::fs::OpenOptions;
use std::io::Write;
#[cfg(unix)]
use std::os::unix::fs::OpenOptionsExt;
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

pub const CONFIG_TOML_FILE: &str = "config.toml";
pub const DEFAULT_API_BASE_URL: &str = "http://127.0.0.1:8000/api/v1";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(180);

pub const REPOCHAT_HOME_ENV: &str = "REPOCHAT_HOME";
pub const API_URL_ENV: &str = "REPOCHAT_API_URL";
pub const ACCESS_TOKEN_ENV: &str = "REPOCHAT_ACCESS_TOKEN";
pub const USER_ID_ENV: &str = "REPOCHAT_USER_ID";
pub const IDENTITY_URL_ENV: &str = "REPOCHAT_IDENTITY_URL";
pub const IDENTITY_KEY_ENV: &str = "REPOCHAT_IDENTITY_KEY";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not determine home directory; set {REPOCHAT_HOME_ENV}")]
    NoHome,
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// On-disk shape of `config.toml`. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigToml {
    pub api_base_url: Option<String>,
    pub request_timeout_secs: Option<u64>,
    pub access_token: Option<String>,
    pub user_id: Option<String>,
    pub identity: Option<IdentityToml>,
    pub session_wait: Option<SessionWaitToml>,
    pub retry: Option<RetryToml>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IdentityToml {
    pub url: Option<String>,
    pub anon_key: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionWaitToml {
    pub max_attempts: Option<u32>,
    pub interval_ms: Option<u64>,
    pub settle_delay_ms: Option<u64>,
    pub hard_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetryToml {
    pub max_attempts: Option<u64>,
    pub base_delay_ms: Option<u64>,
}

/// Values passed on the command line.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub api_base_url: Option<String>,
    pub access_token: Option<String>,
    pub user_id: Option<String>,
    pub request_timeout: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityConfig {
    pub url: String,
    pub anon_key: String,
}

/// Fully resolved configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub repochat_home: PathBuf,
    pub api_base_url: String,
    /// Deadline of a streamed answer and timeout of each unary call.
    pub request_timeout: Duration,
    pub access_token: Option<String>,
    pub user_id: Option<String>,
    pub identity: Option<IdentityConfig>,
    pub session_wait: AwaitConfig,
    pub retry: RetryConfig,
}

impl Config {
    /// Load from the real environment.
    pub fn load(overrides: ConfigOverrides) -> Result<Self, ConfigError> {
        let env = |key: &str| std::env::var(key).ok();
        let home = find_repochat_home(&env)?;
        Self::load_from(&home, &env, overrides)
    }

    /// Load from `home` with `env` standing in for the process environment.
    pub fn load_from(
        home: &Path,
        env: &dyn Fn(&str) -> Option<String>,
        overrides: ConfigOverrides,
    ) -> Result<Self, ConfigError> {
        let toml = load_config_toml(home)?;
        Self::from_layers(home.to_path_buf(), toml, env, overrides)
    }

    pub fn from_layers(
        repochat_home: PathBuf,
        toml: ConfigToml,
        env: &dyn Fn(&str) -> Option<String>,
        overrides: ConfigOverrides,
    ) -> Result<Self, ConfigError> {
        let var = |key: &str| env(key).filter(|value| !value.trim().is_empty());

        let api_base_url = overrides
            .api_base_url
            .or_else(|| var(API_URL_ENV))
            .or(toml.api_base_url)
            .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string());
        if !api_base_url.starts_with("http://") && !api_base_url.starts_with("https://") {
            return Err(ConfigError::Invalid(format!(
                "api_base_url must be an http(s) URL, got {api_base_url:?}"
            )));
        }

        let request_timeout = overrides
            .request_timeout
            .or_else(|| toml.request_timeout_secs.map(Duration::from_secs))
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT);
        if request_timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "request timeout must be greater than zero".to_string(),
            ));
        }

        let identity_toml = toml.identity.unwrap_or_default();
        let identity = match (
            var(IDENTITY_URL_ENV).or(identity_toml.url),
            var(IDENTITY_KEY_ENV).or(identity_toml.anon_key),
        ) {
            (Some(url), Some(anon_key)) => Some(IdentityConfig { url, anon_key }),
            _ => None,
        };

        let wait = toml.session_wait.unwrap_or_default();
        let wait_defaults = AwaitConfig::default();
        let session_wait = AwaitConfig {
            max_attempts: wait.max_attempts.unwrap_or(wait_defaults.max_attempts),
            interval: wait
                .interval_ms
                .map(Duration::from_millis)
                .unwrap_or(wait_defaults.interval),
            settle_delay: wait
                .settle_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(wait_defaults.settle_delay),
            hard_timeout: wait.hard_timeout_ms.map(Duration::from_millis),
        };
        if session_wait.interval.is_zero() {
            return Err(ConfigError::Invalid(
                "session_wait.interval_ms must be greater than zero".to_string(),
            ));
        }
        if session_wait.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "session_wait.max_attempts must be greater than zero".to_string(),
            ));
        }

        let retry_toml = toml.retry.unwrap_or_default();
        let retry_defaults = RetryConfig::default();
        let retry = RetryConfig {
            max_attempts: retry_toml
                .max_attempts
                .unwrap_or(retry_defaults.max_attempts),
            base_delay: retry_toml
                .base_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(retry_defaults.base_delay),
            ..retry_defaults
        };

        Ok(Self {
            repochat_home,
            api_base_url,
            request_timeout,
            access_token: overrides
                .access_token
                .or_else(|| var(ACCESS_TOKEN_ENV))
                .or(toml.access_token),
            user_id: overrides
                .user_id
                .or_else(|| var(USER_ID_ENV))
                .or(toml.user_id),
            identity,
            session_wait,
            retry,
        })
    }

    pub fn provider(&self) -> Provider {
        let mut provider = Provider::new(self.api_base_url.clone());
        provider.retry = self.retry.clone();
        provider.request_timeout = self.request_timeout;
        provider
    }

    pub fn auth(&self) -> StaticAuth {
        StaticAuth {
            access_token: self.access_token.clone(),
            user_id: self.user_id.clone(),
        }
    }

    pub fn config_path(&self) -> PathBuf {
        self.repochat_home.join(CONFIG_TOML_FILE)
    }
}

/// `$REPOCHAT_HOME` when set, otherwise `~/.repochat`.
pub fn find_repochat_home(env: &dyn Fn(&str) -> Option<String>) -> Result<PathBuf, ConfigError> {
    if let Some(home) = env(REPOCHAT_HOME_ENV).filter(|value| !value.is_empty()) {
        return Ok(PathBuf::from(home));
    }
    dirs::home_dir()
        .map(|home| home.join(".repochat"))
        .ok_or(ConfigError::NoHome)
}

/// Read `config.toml` under `home`. A missing file is an empty config.
pub fn load_config_toml(home: &Path) -> Result<ConfigToml, ConfigError> {
    let path = home.join(CONFIG_TOML_FILE);
    let contents = match std::fs::read_to_string(&path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "no config file, using defaults");
            return Ok(ConfigToml::default());
        }
        Err(source) => return Err(ConfigError::Read { path, source }),
    };
    toml::from_str(&contents).map_err(|source| ConfigError::Parse { path, source })
}

/// Store (or with `None`, forget) the credentials in `config.toml`, keeping
/// every other setting.
pub fn persist_credentials(
    home: &Path,
    access_token: Option<&str>,
    user_id: Option<&str>,
) -> Result<(), ConfigError> {
    let mut toml = load_config_toml(home)?;
    toml.access_token = access_token.map(str::to_string);
    toml.user_id = user_id.map(str::to_string);

    let path = home.join(CONFIG_TOML_FILE);
    std::fs::create_dir_all(home).map_err(|source| ConfigError::Write {
        path: path.clone(),
        source,
    })?;
    let contents = toml::to_string(&toml)?;

    // The file holds a bearer token.
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        options.mode(0o600);
    }
    let write = || -> std::io::Result<()> {
        let mut file = options.open(&path)?;
        ensure_owner_only_permissions(&file)?;
        file.write_all(contents.as_bytes())?;
        file.flush()
    };
    write().map_err(|source| ConfigError::Write { path, source })
}

/// `mode` only applies when the file is created, so an existing file is
/// narrowed to `0o600` (rw-------) here.
#[cfg(unix)]
fn ensure_owner_only_permissions(file: &File) -> std::io::Result<()> {
    let metadata = file.metadata()?;
    if metadata.permissions().mode() & 0o777 != 0o600 {
        let mut perms = metadata.permissions();
        perms.set_mode(0o600);
        file.set_permissions(perms)?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn ensure_owner_only_permissions(_file: &File) -> std::io::Result<()> {
    Ok(())
}
