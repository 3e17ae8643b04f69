//! Delivery configuration
//!
//! Loaded from a TOML file (JSON and YAML are accepted by extension). Every
//! field has a default, so an absent default file yields a usable config:
//!
//! ```toml
//! master_path = "/var/lib/delivery/work"
//! repo_url = "https://git.example.com/ops.git"
//! reponame = "ops"
//!
//! [server]
//! url = "https://chef.example.com/organizations/ops"
//! user = "delivery"
//! token_file = "/etc/delivery/token"
//!
//! [paths]
//! cookbook_paths = ["cookbooks", "site-cookbooks"]
//!
//! [[hooks]]
//! event = "post-run"
//! command = "logger"
//! args = ["delivery finished: ${STATUS_MSG}"]
//! ```

use std::path::PathBuf;
use std::time::Duration;

use delivery_fs::{ConfigStore, NormalizedPath, io};
use delivery_store::HttpStoreConfig;
use serde::{Deserialize, Serialize};

use crate::hooks::HookConfig;
use crate::{Error, Result};

/// Default location of the configuration file.
pub const DEFAULT_CONFIG_FILE: &str = "/etc/delivery/config.toml";

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    pub dry_run: bool,
    /// Work directory holding the checkout and the checkpoint file
    pub master_path: PathBuf,
    /// Cloned into `<master_path>/<reponame>` when no checkout exists
    pub repo_url: Option<String>,
    pub reponame: String,
    /// Checkpoint file name inside `master_path`
    pub rev_checkpoint: String,
    pub lockfile: PathBuf,
    pub pidfile: PathBuf,
    /// Node attribute under `normal` that receives the checkpoint tag
    pub checkpoint_attribute: String,
    /// Re-uploads per node when verification fails
    pub verify_retries: u32,
    pub server: ServerConfig,
    pub paths: PathsConfig,
    pub hooks: Vec<HookConfig>,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            dry_run: false,
            master_path: PathBuf::from("/var/lib/delivery/work"),
            repo_url: None,
            reponame: "ops".to_string(),
            rev_checkpoint: "delivery_revision".to_string(),
            lockfile: PathBuf::from("/var/lock/delivery"),
            pidfile: PathBuf::from("/var/run/delivery.pid"),
            checkpoint_attribute: "delivery".to_string(),
            verify_retries: 3,
            server: ServerConfig::default(),
            paths: PathsConfig::default(),
            hooks: Vec::new(),
        }
    }
}

impl DeliveryConfig {
    /// Load from `path`.
    ///
    /// When `explicit` is false a missing file yields the defaults;
    /// otherwise it is an error.
    pub fn load(path: &NormalizedPath, explicit: bool) -> Result<Self> {
        let store = ConfigStore::new();
        let config: Self = if explicit {
            store.load(path)?
        } else {
            store.load_or_default(path)?
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.reponame.trim().is_empty() {
            return Err(Error::Config {
                message: "reponame must not be empty".to_string(),
            });
        }
        if self.rev_checkpoint.trim().is_empty() {
            return Err(Error::Config {
                message: "rev_checkpoint must not be empty".to_string(),
            });
        }
        if self.checkpoint_attribute.contains('.') {
            return Err(Error::Config {
                message: format!(
                    "checkpoint_attribute '{}' must not contain '.'",
                    self.checkpoint_attribute
                ),
            });
        }
        Ok(())
    }

    /// `<master_path>/<reponame>`
    pub fn repo_path(&self) -> NormalizedPath {
        NormalizedPath::new(&self.master_path).join(&self.reponame)
    }

    /// `<master_path>/<rev_checkpoint>`
    pub fn checkpoint_path(&self) -> NormalizedPath {
        NormalizedPath::new(&self.master_path).join(&self.rev_checkpoint)
    }
}

/// Configuration server connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub url: String,
    pub user: String,
    /// File holding a bearer token; unset means no token is sent
    pub token_file: Option<PathBuf>,
    pub timeout_secs: u64,
    pub retry_max_elapsed_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            url: "https://127.0.0.1".to_string(),
            user: "admin".to_string(),
            token_file: None,
            timeout_secs: 60,
            retry_max_elapsed_secs: 30,
        }
    }
}

impl ServerConfig {
    /// Client settings, reading the token file if one is configured.
    pub fn store_config(&self) -> Result<HttpStoreConfig> {
        let token = match &self.token_file {
            Some(path) => {
                let token = io::read_text(&NormalizedPath::new(path))?;
                Some(token.trim().to_string())
            }
            None => None,
        };
        Ok(HttpStoreConfig {
            server_url: self.url.clone(),
            user: self.user.clone(),
            token,
            timeout: Duration::from_secs(self.timeout_secs),
            retry_max_elapsed: Duration::from_secs(self.retry_max_elapsed_secs),
        })
    }
}

/// Repository-relative directories per artifact category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub cookbook_paths: Vec<String>,
    pub role_path: String,
    pub role_local_path: String,
    pub databag_path: String,
    pub environment_path: String,
    pub node_path: String,
    pub client_path: String,
    pub user_path: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            cookbook_paths: vec!["cookbooks".to_string()],
            role_path: "roles".to_string(),
            role_local_path: "roles_local".to_string(),
            databag_path: "data_bags".to_string(),
            environment_path: "environments".to_string(),
            node_path: "nodes".to_string(),
            client_path: "clients".to_string(),
            user_path: "users".to_string(),
        }
    }
}
