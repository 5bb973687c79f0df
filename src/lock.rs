//! Workspace mutual exclusion.
//!
//! While an import is active its target workspace is a single mutable
//! resource: no second import may start against it, and the presentation
//! layer is expected to disable destructive file operations for the duration.
//! The registry hands out RAII guards so the lock is released exactly once on
//! every terminal path, including panics and cancellation.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use crate::error::ImportError;

/// Process-wide registry of locked workspaces, keyed by `"{owner}/{name}"`.
#[derive(Clone, Default)]
pub struct WorkspaceLocks {
    active: Arc<Mutex<HashSet<String>>>,
}

impl WorkspaceLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attempts to lock a workspace.
    ///
    /// Fails immediately with `ImportError::Locked` if an import is already
    /// active for the same workspace; never blocks.
    pub fn try_lock(&self, workspace: &str) -> Result<WorkspaceLockGuard, ImportError> {
        let mut active = self.active.lock().expect("workspace lock registry poisoned");

        if !active.insert(workspace.to_string()) {
            return Err(ImportError::Locked { workspace: workspace.to_string() });
        }

        Ok(WorkspaceLockGuard {
            registry: self.active.clone(),
            workspace: workspace.to_string(),
        })
    }

    /// Returns true if the workspace is currently locked.
    pub fn is_locked(&self, workspace: &str) -> bool {
        self.active
            .lock()
            .expect("workspace lock registry poisoned")
            .contains(workspace)
    }
}

/// Exclusive hold on one workspace; released on drop.
#[derive(Debug)]
pub struct WorkspaceLockGuard {
    registry: Arc<Mutex<HashSet<String>>>,
    workspace: String,
}

impl WorkspaceLockGuard {
    pub fn workspace(&self) -> &str {
        &self.workspace
    }
}

impl Drop for WorkspaceLockGuard {
    fn drop(&mut self) {
        if let Ok(mut active) = self.registry.lock() {
            active.remove(&self.workspace);
        }
    }
}
