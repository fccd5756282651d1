use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::utils::secret::Secret;

/// Values that have to survive a restart of the tracker.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DurableState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github_token: Option<Secret>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sync_time: Option<DateTime<Utc>>,
    /// Present only while a session is running. A value found at startup means the previous run
    /// ended without a clean stop.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_start: Option<DateTime<Utc>>,
}

/// Small durable key-value store kept next to, but outside of, the git working tree.
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn load(&self) -> Result<DurableState> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) if contents.trim().is_empty() => Ok(DurableState::default()),
            Ok(contents) => serde_json::from_str(&contents)
                .with_context(|| format!("Invalid state file {:?}", self.path)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(DurableState::default()),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn save(&self, state: &DurableState) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let buffer = serde_json::to_vec_pretty(state)?;
        tokio::fs::write(&self.path, buffer)
            .await
            .with_context(|| format!("Failed to write state file {:?}", self.path))?;
        restrict_permissions(&self.path).await?;
        Ok(())
    }

    /// Loads, changes and writes back the state in one go.
    pub async fn update(&self, change: impl FnOnce(&mut DurableState)) -> Result<DurableState> {
        let mut state = self.load().await?;
        change(&mut state);
        self.save(&state).await?;
        Ok(state)
    }
}

/// The file holds the access token, so only the owner may read it.
#[cfg(unix)]
async fn restrict_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).await?;
    Ok(())
}

#[cfg(not(unix))]
async fn restrict_permissions(_path: &Path) -> Result<()> {
    Ok(())
}
