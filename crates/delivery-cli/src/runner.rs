//! One delivery invocation: config, lock, pass, post-run hooks

use delivery_core::{
    DEFAULT_CONFIG_FILE, DeliveryConfig, HookContext, HookEvent, PassResult, SyncEngine, run_hooks,
};
use delivery_fs::NormalizedPath;
use delivery_git::GitRepository;
use delivery_store::HttpStore;

use crate::cli::Cli;
use crate::error::{CliError, Result};
use crate::lock::{LockGuard, write_pidfile};

/// Load the config file and apply command-line overrides.
pub fn load_config(cli: &Cli) -> Result<DeliveryConfig> {
    let (path, explicit) = match &cli.config_file {
        Some(path) => {
            if !path.exists() {
                return Err(CliError::ConfigMissing { path: path.clone() });
            }
            (NormalizedPath::new(path), true)
        }
        None => (NormalizedPath::new(DEFAULT_CONFIG_FILE), false),
    };

    let mut config = DeliveryConfig::load(&path, explicit)?;
    config.dry_run |= cli.dry_run;
    if let Some(lockfile) = &cli.lockfile {
        config.lockfile = lockfile.clone();
    }
    if let Some(pidfile) = &cli.pidfile {
        config.pidfile = pidfile.clone();
    }
    Ok(config)
}

/// Run preflight checks, take the lock and perform one pass.
pub fn run(config: &DeliveryConfig) -> Result<PassResult> {
    if config.dry_run {
        tracing::warn!("Dryrun mode activated, no changes will be made.");
    }

    let hook_dir = config.master_path.clone();
    run_hooks(
        &config.hooks,
        HookEvent::PreflightChecks,
        &HookContext::for_pass(config.dry_run),
        &hook_dir,
    )?;

    let _lock = LockGuard::acquire(&config.lockfile)?;
    write_pidfile(&config.pidfile)?;

    let vcs = GitRepository::new(config.repo_path());
    let result = match connect(config) {
        Ok(store) => SyncEngine::from_config(config, Box::new(vcs), Box::new(store)).run(),
        Err(e) => {
            tracing::error!("Could not set up the server connection: {}", e);
            PassResult::failure(e.to_string())
        }
    };
    tracing::warn!("{}", result.message);
    for node in &result.unverified {
        tracing::warn!("Node {} was not verified", node);
    }

    let ctx = HookContext::for_outcome(config.dry_run, result.is_success(), &result.message);
    if let Err(e) = run_hooks(&config.hooks, HookEvent::PostRun, &ctx, &hook_dir) {
        tracing::error!("post-run hook failed: {}", e);
    }

    Ok(result)
}

fn connect(config: &DeliveryConfig) -> Result<HttpStore> {
    Ok(HttpStore::new(config.server.store_config()?)?)
}
