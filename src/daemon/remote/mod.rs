//! Everything that leaves the machine. [RemoteSync] pairs the hosting provider (identity and
//! repository provisioning) with the local working tree (commit and push).

pub mod git;
pub mod github;

use std::sync::{Arc, Mutex, TryLockError};

use anyhow::{anyhow, Result};
use git::{Author, CommitOutcome, VersionControl};
use github::{HostingProvider, Identity, RepositoryCreation};
use tracing::{debug, info};
use url::Url;

use crate::{daemon::errors::TrackingError, utils::secret::Secret};

pub const REMOTE_NAME: &str = "origin";
pub const REPOSITORY_DESCRIPTION: &str = "Private repo for code tracking";

/// Where the record gets pushed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTarget {
    pub host: String,
    pub owner: String,
    pub repository: String,
    pub branch: String,
    pub token: Secret,
}

impl RemoteTarget {
    /// Https url with the token embedded as user name. Never log the result.
    pub fn url(&self) -> Result<String> {
        let mut url = Url::parse(&format!(
            "https://{}/{}/{}.git",
            self.host, self.owner, self.repository
        ))?;
        url.set_username(self.token.expose())
            .map_err(|_| anyhow!("Remote url for {} can't carry credentials", self.host))?;
        Ok(url.into())
    }

    fn author(&self) -> Author {
        Author::for_login(&self.owner)
    }
}

type SharedWorkTree = Arc<Mutex<Box<dyn VersionControl>>>;

pub struct RemoteSync {
    provider: Box<dyn HostingProvider>,
    work_tree: SharedWorkTree,
    target: Option<RemoteTarget>,
    identity: Option<Identity>,
}

impl RemoteSync {
    pub fn new(provider: Box<dyn HostingProvider>, work_tree: Box<dyn VersionControl>) -> Self {
        Self {
            provider,
            work_tree: Arc::new(Mutex::new(work_tree)),
            target: None,
            identity: None,
        }
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    pub fn target(&self) -> Option<&RemoteTarget> {
        self.target.as_ref()
    }

    /// Asks the provider who owns `token` and caches the answer.
    pub async fn resolve_identity(&mut self, token: &Secret) -> Result<Identity, TrackingError> {
        let identity = self
            .provider
            .current_user(token)
            .await
            .map_err(TrackingError::AuthInvalid)?;
        self.identity = Some(identity.clone());
        Ok(identity)
    }

    pub async fn ensure_repository(
        &self,
        token: &Secret,
        name: &str,
    ) -> Result<RepositoryCreation, TrackingError> {
        let creation = self
            .provider
            .create_private_repository(token, name, REPOSITORY_DESCRIPTION)
            .await
            .map_err(|source| TrackingError::RemoteProvisionFailed {
                repository: name.to_owned(),
                source,
            })?;
        info!("Remote repository {name}: {creation:?}");
        Ok(creation)
    }

    /// Prepares the working tree for `target`: initializes it if needed and refreshes an
    /// existing remote whose url went stale. A missing remote is added lazily by
    /// [RemoteSync::commit_and_push].
    pub async fn attach(&mut self, target: RemoteTarget) -> Result<(), TrackingError> {
        let url = target.url().map_err(TrackingError::LocalWriteFailed)?;
        let branch = target.branch.clone();
        self.with_work_tree(move |tree| {
            tree.ensure_initialized(&branch)?;
            match tree.remote_url(REMOTE_NAME)? {
                Some(existing) if existing != url => tree.configure_remote(REMOTE_NAME, &url),
                _ => Ok(()),
            }
        })
        .await
        .map_err(TrackingError::LocalWriteFailed)?;
        self.target = Some(target);
        Ok(())
    }

    /// Forgets the target and the cached identity.
    pub fn detach(&mut self) {
        self.target = None;
        self.identity = None;
    }

    pub async fn has_history(&self) -> Result<bool, TrackingError> {
        self.with_work_tree(|tree| tree.has_commits())
            .await
            .map_err(TrackingError::LocalReadFailed)
    }

    /// Stages everything, commits with `message` and pushes to the target branch. An unchanged
    /// tree still pushes, so commits left behind by an earlier failed push get delivered.
    pub async fn commit_and_push(&self, message: &str) -> Result<CommitOutcome, TrackingError> {
        let target = self
            .target
            .clone()
            .ok_or_else(|| TrackingError::SyncFailed(anyhow!("No remote target attached")))?;
        let message = message.to_owned();

        self.with_work_tree(move |tree| {
            if tree.remote_url(REMOTE_NAME)?.is_none() {
                tree.configure_remote(REMOTE_NAME, &target.url()?)?;
            }
            tree.stage_all()?;
            let outcome = tree.commit(&message, &target.author())?;
            if tree.has_commits()? {
                tree.push(REMOTE_NAME, &target.branch)?;
            }
            Ok(outcome)
        })
        .await
        .map_err(TrackingError::SyncFailed)
    }

    /// Runs `job` against the working tree on the blocking pool. Fails right away if a previous
    /// job still holds the tree, e.g. a push that outlived its timeout.
    async fn with_work_tree<T, F>(&self, job: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut dyn VersionControl) -> Result<T> + Send + 'static,
    {
        let work_tree = self.work_tree.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = match work_tree.try_lock() {
                Ok(guard) => guard,
                Err(TryLockError::WouldBlock) => {
                    return Err(anyhow!("A previous git operation is still running"))
                }
                Err(TryLockError::Poisoned(poisoned)) => {
                    debug!("Recovering working tree lock after a panic");
                    poisoned.into_inner()
                }
            };
            job(&mut **guard)
        })
        .await?
    }
}
