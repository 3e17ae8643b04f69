//! SyncEngine: one delivery pass from checkout to checkpoint

use delivery_fs::NormalizedPath;
use delivery_git::VcsProvider;
use delivery_store::RemoteStore;
use serde::{Deserialize, Serialize};

use crate::Result;
use crate::applier::{ApplyOptions, ApplyReport, SyncApplier};
use crate::category::Layout;
use crate::changeset::classify;
use crate::checkpoint::CheckpointStore;
use crate::config::DeliveryConfig;
use crate::differ::RevisionDiffer;
use crate::error::Error;
use crate::hooks::{HookConfig, HookContext, HookEvent, run_hooks};
use crate::local::LocalRepo;
use crate::verify::UploadVerifier;

/// Terminal status of a pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PassStatus {
    Success,
    Failure,
}

/// Why a pass failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureKind {
    /// The checkpoint (or head) revision is not in the repository history
    UnknownRevision,
    Other,
}

impl FailureKind {
    fn of(error: &Error) -> Self {
        if error.is_reference() {
            Self::UnknownRevision
        } else {
            Self::Other
        }
    }
}

/// Outcome of [`SyncEngine::run`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassResult {
    pub status: PassStatus,
    pub message: String,
    /// Head revision the pass delivered, if it got that far
    pub revision: Option<String>,
    /// Nodes whose checkpoint tag still did not match after re-uploads
    pub unverified: Vec<String>,
    /// Mutations performed or, in dry-run, intended
    pub actions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,
}

impl PassResult {
    pub fn success(message: impl Into<String>, revision: Option<String>) -> Self {
        Self {
            status: PassStatus::Success,
            message: message.into(),
            revision,
            unverified: Vec::new(),
            actions: Vec::new(),
            failure: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self::failed(message, FailureKind::Other)
    }

    pub fn failed(message: impl Into<String>, kind: FailureKind) -> Self {
        Self {
            status: PassStatus::Failure,
            message: message.into(),
            revision: None,
            unverified: Vec::new(),
            actions: Vec::new(),
            failure: Some(kind),
        }
    }

    /// Failed because a revision did not resolve.
    pub fn is_unknown_revision(&self) -> bool {
        self.failure == Some(FailureKind::UnknownRevision)
    }

    pub fn is_success(&self) -> bool {
        self.status == PassStatus::Success
    }
}

/// Settings the engine needs from the configuration
#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub dry_run: bool,
    pub repo_url: Option<String>,
    pub checkpoint_attribute: String,
    pub verify_retries: u32,
    pub hooks: Vec<HookConfig>,
    /// Directory hooks run in by default
    pub work_dir: NormalizedPath,
}

impl EngineOptions {
    pub fn from_config(config: &DeliveryConfig) -> Self {
        Self {
            dry_run: config.dry_run,
            repo_url: config.repo_url.clone(),
            checkpoint_attribute: config.checkpoint_attribute.clone(),
            verify_retries: config.verify_retries,
            hooks: config.hooks.clone(),
            work_dir: NormalizedPath::new(&config.master_path),
        }
    }
}

/// Runs delivery passes against one repository and one store.
pub struct SyncEngine {
    vcs: Box<dyn VcsProvider>,
    store: Box<dyn RemoteStore>,
    local: LocalRepo,
    checkpoint: CheckpointStore,
    options: EngineOptions,
}

impl SyncEngine {
    pub fn new(
        vcs: Box<dyn VcsProvider>,
        store: Box<dyn RemoteStore>,
        local: LocalRepo,
        checkpoint: CheckpointStore,
        options: EngineOptions,
    ) -> Self {
        Self {
            vcs,
            store,
            local,
            checkpoint,
            options,
        }
    }

    /// Engine for the repository and checkpoint described by `config`.
    pub fn from_config(
        config: &DeliveryConfig,
        vcs: Box<dyn VcsProvider>,
        store: Box<dyn RemoteStore>,
    ) -> Self {
        let local = LocalRepo::new(config.repo_path(), Layout::from_paths(&config.paths));
        let checkpoint = CheckpointStore::new(config.checkpoint_path());
        Self::new(vcs, store, local, checkpoint, EngineOptions::from_config(config))
    }

    pub fn layout(&self) -> &Layout {
        self.local.layout()
    }

    /// Run one pass. Errors never escape; they become a failed result and
    /// the checkpoint is left as it was.
    pub fn run(&self) -> PassResult {
        match self.run_inner() {
            Ok(result) => result,
            Err(e) => {
                tracing::error!("Delivery failed: {}", e);
                PassResult::failed(e.to_string(), FailureKind::of(&e))
            }
        }
    }

    fn run_inner(&self) -> Result<PassResult> {
        let dry_run = self.options.dry_run;
        self.hooks(HookEvent::PreRun)?;

        let had_repo = self.vcs.exists();
        if had_repo {
            action(dry_run, "Updating repo");
            if !dry_run {
                self.vcs.update()?;
            }
        } else {
            let url = self.options.repo_url.as_deref().ok_or_else(|| Error::NoRepository {
                path: self.local.root().to_native(),
            })?;
            action(dry_run, &format!("Cloning repo from {url}"));
            if !dry_run {
                self.vcs.checkout(url)?;
            }
        }

        self.hooks(HookEvent::PostRepoUp)?;

        if dry_run && !self.vcs.exists() {
            tracing::warn!("In dryrun mode, with no repo, there's not much I can dryrun");
            return Ok(PassResult::success("dryrun mode", None));
        }

        let checkpoint = self.checkpoint.read()?;
        let head = self.vcs.head_revision()?;

        if checkpoint.as_deref() == Some(head.as_str()) {
            tracing::warn!("Repo has not changed, nothing to do...");
            self.write_checkpoint(&head)?;
            return Ok(PassResult::success(format!("Success at {head}"), Some(head)));
        }

        let applier = SyncApplier::new(
            self.store.as_ref(),
            &self.local,
            ApplyOptions {
                dry_run,
                checkpoint_attribute: self.options.checkpoint_attribute.clone(),
            },
        );

        let report = match checkpoint {
            None => {
                tracing::warn!("No checkpoint found, uploading everything at {}", head);
                applier.full_sync(&head)?
            }
            Some(old) => {
                tracing::warn!("Determining changes from {} to {}", old, head);
                let differ = RevisionDiffer::new(self.vcs.as_ref(), self.local.layout());
                let records = differ.diff(&old, &head)?.collect::<Result<Vec<_>>>()?;
                let changeset = classify(head.as_str(), records);
                for line in changeset.summary() {
                    tracing::warn!("{}", line);
                }
                applier.apply(&changeset)?
            }
        };

        let unverified = if dry_run {
            Vec::new()
        } else {
            self.verify_nodes(&applier, &report, &head)?
        };

        self.write_checkpoint(&head)?;

        let mut result = PassResult::success(format!("Success at {head}"), Some(head));
        result.unverified = unverified;
        result.actions = report.actions;
        Ok(result)
    }

    /// Re-read every uploaded node and re-upload those whose tag does not
    /// match, up to the configured number of retries.
    fn verify_nodes(
        &self,
        applier: &SyncApplier<'_>,
        report: &ApplyReport,
        head: &str,
    ) -> Result<Vec<String>> {
        let verifier = UploadVerifier::new(self.store.as_ref(), &self.options.checkpoint_attribute);
        let mut unverified = Vec::new();

        for node in &report.uploaded_nodes {
            let mut verified = verifier.verify(&node.name, head);
            let mut attempts = 0;
            while !verified && attempts < self.options.verify_retries {
                attempts += 1;
                tracing::info!(
                    "Node {} not at {}, re-uploading (attempt {})",
                    node.name,
                    head,
                    attempts
                );
                applier.upload_node(node, head)?;
                verified = verifier.verify(&node.name, head);
            }
            if !verified {
                tracing::warn!("Node {} could not be verified at {}", node.name, head);
                unverified.push(node.name.clone());
            }
        }
        Ok(unverified)
    }

    fn write_checkpoint(&self, revision: &str) -> Result<()> {
        if self.options.dry_run {
            tracing::warn!("[DRYRUN] Would write checkpoint {}", revision);
            return Ok(());
        }
        self.checkpoint.write(revision)
    }

    fn hooks(&self, event: HookEvent) -> Result<()> {
        let ctx = HookContext::for_pass(self.options.dry_run);
        run_hooks(
            &self.options.hooks,
            event,
            &ctx,
            &self.options.work_dir.to_native(),
        )?;
        Ok(())
    }
}

fn action(dry_run: bool, message: &str) {
    if dry_run {
        tracing::warn!("[DRYRUN] Would do: {}", message);
    } else {
        tracing::warn!("{}", message);
    }
}
