//! Per-generation lifecycle: install, activate, then intercept.

use std::sync::Arc;
use tracing::{info, warn};

use crate::cache::CacheResult;
use crate::error::{LifecycleError, ProxyError};
use crate::net::ProxyRequest;

use super::hooks::IntegrationHooks;
use super::install::install;
use super::manifest::Manifest;
use super::router::Router;
use super::sweep::sweep;
use super::Generation;

/// Lifecycle state of a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
  Parsed,
  Installing,
  Installed,
  Activating,
  Activated,
  /// Install failed; the generation must not go live
  Redundant,
}

impl WorkerState {
  pub fn as_str(&self) -> &'static str {
    match self {
      WorkerState::Parsed => "parsed",
      WorkerState::Installing => "installing",
      WorkerState::Installed => "installed",
      WorkerState::Activating => "activating",
      WorkerState::Activated => "activated",
      WorkerState::Redundant => "redundant",
    }
  }
}

/// Outcome of a successful install.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallOutcome {
  /// Manifest fetched and written
  Seeded(usize),
  /// The generation's static store already existed
  AlreadyInstalled,
}

/// The cache proxy for one generation.
///
/// Install and activation take `&mut self`, so they can never interleave with
/// traffic, which is only accepted once the worker is `Activated`.
pub struct Worker {
  state: WorkerState,
  router: Router,
  manifest: Manifest,
  hooks: Arc<dyn IntegrationHooks>,
}

impl Worker {
  pub fn new(router: Router, manifest: Manifest, hooks: Arc<dyn IntegrationHooks>) -> Self {
    Self {
      state: WorkerState::Parsed,
      router,
      manifest,
      hooks,
    }
  }

  pub fn state(&self) -> WorkerState {
    self.state
  }

  pub fn router(&self) -> &Router {
    &self.router
  }

  pub fn generation(&self) -> &Generation {
    self.router.generation()
  }

  /// Seed the static store. A failure leaves the worker `Redundant`; install
  /// may then be retried.
  pub async fn install(&mut self) -> Result<InstallOutcome, LifecycleError> {
    if !matches!(self.state, WorkerState::Parsed | WorkerState::Redundant) {
      return Err(self.invalid("install"));
    }
    self.state = WorkerState::Installing;

    let caches = self.router.caches();
    let static_store = self.generation().static_store();
    match caches.has(&static_store).await {
      Ok(true) => {
        info!(generation = %self.generation(), "static cache present, skipping install");
        self.state = WorkerState::Installed;
        return Ok(InstallOutcome::AlreadyInstalled);
      }
      Ok(false) => {}
      Err(e) => warn!(store = %static_store, error = %e, "could not check for existing cache"),
    }

    match install(caches, self.router.network(), self.generation(), &self.manifest).await {
      Ok(count) => {
        self.state = WorkerState::Installed;
        info!(generation = %self.generation(), "installed");
        Ok(InstallOutcome::Seeded(count))
      }
      Err(e) => {
        self.state = WorkerState::Redundant;
        warn!(generation = %self.generation(), error = %e, "install failed");
        Err(e.into())
      }
    }
  }

  /// Go live and sweep stores of older generations. Returns the deleted names.
  pub async fn activate(&mut self) -> Result<Vec<String>, LifecycleError> {
    if self.state != WorkerState::Installed {
      return Err(self.invalid("activate"));
    }
    self.state = WorkerState::Activating;

    // The new stores are usable from here on; a failed sweep only delays
    // reclamation.
    let deleted = match sweep(self.router.caches(), self.generation()).await {
      Ok(deleted) => deleted,
      Err(e) => {
        warn!(error = %e, "cache sweep failed");
        Vec::new()
      }
    };

    self.state = WorkerState::Activated;
    info!(generation = %self.generation(), swept = deleted.len(), "activated");
    Ok(deleted)
  }

  /// Install (if needed) and activate.
  pub async fn start(&mut self) -> Result<Vec<String>, LifecycleError> {
    self.install().await?;
    self.activate().await
  }

  /// Sweep stores of other generations outside of activation.
  ///
  /// Refused until this generation's static store exists, so the previous
  /// generation's stores are never removed before their replacement is ready.
  pub async fn sweep(&self) -> Result<Vec<String>, LifecycleError> {
    let caches = self.router.caches();
    let ready = self.state == WorkerState::Activated
      || self.manifest.is_empty()
      || caches.has(&self.generation().static_store()).await?;
    if !ready {
      return Err(LifecycleError::NotInstalled(self.generation().to_string()));
    }
    Ok(sweep(caches, self.generation()).await?)
  }

  /// Intercept a request.
  pub async fn fetch(&self, request: ProxyRequest) -> Result<CacheResult, ProxyError> {
    if self.state != WorkerState::Activated {
      return Err(ProxyError::NotActive(self.state.as_str()));
    }
    self.router.route(request).await
  }

  /// Forward a background-sync event.
  pub async fn sync(&self, tag: &str) {
    self.hooks.on_sync(tag).await;
  }

  /// Forward a push event.
  pub async fn push(&self, payload: Option<serde_json::Value>) {
    self.hooks.on_push(payload).await;
  }

  fn invalid(&self, action: &'static str) -> LifecycleError {
    LifecycleError::InvalidState {
      action,
      state: self.state.as_str(),
    }
  }
}
