use crate::error::{LiumError, Result};
use crate::lifecycle::LifecycleTimings;
use crate::remote::SshOptions;
use crate::retry::RetryPolicy;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://lium.io/api";

pub const ENV_API_KEY: &str = "LIUM_API_KEY";
pub const ENV_BASE_URL: &str = "LIUM_BASE_URL";
pub const ENV_SSH_KEY_PATH: &str = "LIUM_SSH_KEY_PATH";

/// Private keys probed under `~/.ssh` when none is configured, in priority order.
pub const FALLBACK_KEY_NAMES: [&str; 3] = ["id_ed25519", "id_rsa", "id_ecdsa"];

/// Default cap on concurrent sessions for fan-out execution.
pub const DEFAULT_MAX_WORKERS: usize = 32;

/// Resolved connection settings.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub api_key: String,
    pub base_url: String,
    pub ssh_key_path: Option<PathBuf>,
}

/// Explicit values; these win over the environment and the config file.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub ssh_key_path: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    api: ApiSection,
    #[serde(default)]
    ssh: SshSection,
}

#[derive(Debug, Default, Deserialize)]
struct ApiSection {
    api_key: Option<String>,
    base_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct SshSection {
    key_path: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// `~/.lium/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".lium").join("config.toml"))
}

fn expand_home(raw: &str) -> PathBuf {
    match raw.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| PathBuf::from(raw)),
        None => PathBuf::from(raw),
    }
}

/// A configured key may point at the public half; use the private one.
fn strip_pub(path: PathBuf) -> PathBuf {
    if path.extension().and_then(|e| e.to_str()) == Some("pub") {
        path.with_extension("")
    } else {
        path
    }
}

fn read_config_file(path: &Path) -> Result<ConfigFile> {
    match fs::read_to_string(path) {
        Ok(text) => toml::from_str(&text).map_err(|e| {
            LiumError::configuration(
                format!("invalid config file {}: {}", path.display(), e),
                "fix or remove the file",
            )
        }),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ConfigFile::default()),
        Err(e) => Err(e.into()),
    }
}

impl Config {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            ssh_key_path: None,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_ssh_key_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.ssh_key_path = Some(path.into());
        self
    }

    /// Load from `.env`, the process environment and `~/.lium/config.toml`.
    pub fn load() -> Result<Self> {
        Self::load_with_overrides(ConfigOverrides::default())
    }

    pub fn load_with_overrides(overrides: ConfigOverrides) -> Result<Self> {
        dotenv::dotenv().ok();
        Self::resolve(
            overrides,
            |key| env::var(key).ok(),
            default_config_path().as_deref(),
        )
    }

    /// Resolve each field as explicit value > environment > config file.
    pub fn resolve<F>(
        overrides: ConfigOverrides,
        env_lookup: F,
        config_path: Option<&Path>,
    ) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let file = match config_path {
            Some(path) => read_config_file(path)?,
            None => ConfigFile::default(),
        };

        let api_key = non_empty(overrides.api_key)
            .or_else(|| non_empty(env_lookup(ENV_API_KEY)))
            .or_else(|| non_empty(file.api.api_key))
            .ok_or_else(|| {
                LiumError::configuration(
                    "no API key found",
                    "pass it explicitly, set LIUM_API_KEY (environment or .env), \
                     or add `[api] api_key` to ~/.lium/config.toml",
                )
            })?;

        let base_url = non_empty(overrides.base_url)
            .or_else(|| non_empty(env_lookup(ENV_BASE_URL)))
            .or_else(|| non_empty(file.api.base_url))
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        let ssh_key_path = overrides
            .ssh_key_path
            .or_else(|| non_empty(env_lookup(ENV_SSH_KEY_PATH)).map(|p| expand_home(&p)))
            .or_else(|| non_empty(file.ssh.key_path).map(|p| expand_home(&p)))
            .map(strip_pub);

        Ok(Self {
            api_key,
            base_url,
            ssh_key_path,
        })
    }

    /// Private key to authenticate with: the configured one if it exists,
    /// otherwise the first of [`FALLBACK_KEY_NAMES`] present in `~/.ssh`.
    pub fn private_key_path(&self) -> Option<PathBuf> {
        let ssh_dir = dirs::home_dir().map(|home| home.join(".ssh"));
        resolve_private_key(self.ssh_key_path.as_deref(), ssh_dir.as_deref())
    }

    /// Public keys to install on new pods, read from `<private key>.pub`.
    pub fn public_keys(&self) -> Vec<String> {
        match self.private_key_path() {
            Some(path) => read_public_keys(&path),
            None => vec![],
        }
    }
}

pub fn resolve_private_key(configured: Option<&Path>, ssh_dir: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = configured {
        let path = strip_pub(path.to_path_buf());
        if path.is_file() {
            return Some(path);
        }
        tracing::debug!("[config] configured ssh key {} not found, probing ~/.ssh", path.display());
    }
    let dir = ssh_dir?;
    FALLBACK_KEY_NAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|p| p.is_file())
}

/// Lines of `<private>.pub` that look like OpenSSH public keys.
pub fn read_public_keys(private_key: &Path) -> Vec<String> {
    let mut pub_path = private_key.as_os_str().to_owned();
    pub_path.push(".pub");
    let pub_path = PathBuf::from(pub_path);

    let Ok(text) = fs::read_to_string(&pub_path) else {
        tracing::warn!("[config] public key file not found at {}", pub_path.display());
        return vec![];
    };
    let keys: Vec<String> = text
        .lines()
        .map(str::trim)
        .filter(|l| l.starts_with("ssh-") || l.starts_with("ecdsa-"))
        .map(str::to_string)
        .collect();
    if keys.is_empty() {
        tracing::warn!("[config] no valid public keys in {}", pub_path.display());
    }
    keys
}

/// Tunables for transport, polling and remote execution.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub retry: RetryPolicy,
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    pub timings: LifecycleTimings,
    pub max_workers: usize,
    pub ssh: SshOptions,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            request_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            timings: LifecycleTimings::default(),
            max_workers: DEFAULT_MAX_WORKERS,
            ssh: SshOptions::default(),
        }
    }
}
