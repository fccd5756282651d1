use std::path::PathBuf;

use anyhow::{anyhow, bail, Context, Result};
use git2::{
    Commit, Cred, ErrorCode, IndexAddOption, PushOptions, RemoteCallbacks, Repository,
    RepositoryInitOptions, Signature,
};
use tracing::{debug, info};

/// Name and email used for commits made by the tracker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Author {
    pub name: String,
    pub email: String,
}

impl Author {
    /// Uses the account's noreply address so commits are attributed without exposing an email.
    pub fn for_login(login: &str) -> Self {
        Self {
            name: login.to_owned(),
            email: format!("{login}@users.noreply.github.com"),
        }
    }
}

/// Result of the commit step. An unchanged tree is a recognized outcome, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    Committed { id: String },
    NothingToCommit,
}

/// Operations the tracker needs from a version-control working tree. Implementations are
/// blocking and are always called from the blocking pool.
#[cfg_attr(test, mockall::automock)]
pub trait VersionControl: Send {
    /// Creates the repository with `branch` as initial head if the working tree has none.
    fn ensure_initialized(&mut self, branch: &str) -> Result<()>;

    fn has_commits(&self) -> Result<bool>;

    /// Url of the remote `name`, if it is configured.
    fn remote_url(&self, name: &str) -> Result<Option<String>>;

    /// Adds the remote or points an existing one at `url`.
    fn configure_remote(&mut self, name: &str, url: &str) -> Result<()>;

    fn stage_all(&mut self) -> Result<()>;

    fn commit(&mut self, message: &str, author: &Author) -> Result<CommitOutcome>;

    /// Pushes the current head to `branch` on `remote`. A rejected update is an error.
    fn push(&mut self, remote: &str, branch: &str) -> Result<()>;
}

/// [VersionControl] over a local working tree using libgit2.
pub struct GitWorkTree {
    path: PathBuf,
    repo: Option<Repository>,
}

impl GitWorkTree {
    pub fn new(path: PathBuf) -> Self {
        Self { path, repo: None }
    }

    fn repo(&self) -> Result<&Repository> {
        self.repo
            .as_ref()
            .ok_or_else(|| anyhow!("Working tree {:?} is not initialized", self.path))
    }
}

fn head_commit(repo: &Repository) -> Result<Option<Commit<'_>>> {
    match repo.head() {
        Ok(head) => Ok(Some(head.peel_to_commit()?)),
        Err(e) if e.code() == ErrorCode::UnbornBranch || e.code() == ErrorCode::NotFound => {
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

impl VersionControl for GitWorkTree {
    fn ensure_initialized(&mut self, branch: &str) -> Result<()> {
        if self.repo.is_some() {
            return Ok(());
        }
        std::fs::create_dir_all(&self.path)?;
        let repo = if self.path.join(".git").exists() {
            Repository::open(&self.path)
                .with_context(|| format!("git open {:?}", self.path))?
        } else {
            let mut options = RepositoryInitOptions::new();
            options.initial_head(branch);
            let repo = Repository::init_opts(&self.path, &options)
                .with_context(|| format!("git init {:?}", self.path))?;
            info!("Initialized repository in {:?}", self.path);
            repo
        };
        self.repo = Some(repo);
        Ok(())
    }

    fn has_commits(&self) -> Result<bool> {
        Ok(head_commit(self.repo()?)?.is_some())
    }

    fn remote_url(&self, name: &str) -> Result<Option<String>> {
        match self.repo()?.find_remote(name) {
            Ok(remote) => Ok(remote.url().map(str::to_owned)),
            Err(e) if e.code() == ErrorCode::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn configure_remote(&mut self, name: &str, url: &str) -> Result<()> {
        let repo = self.repo()?;
        if self.remote_url(name)?.is_some() {
            repo.remote_set_url(name, url)?;
            info!("Updated remote {name}");
        } else {
            repo.remote(name, url)?;
            info!("Added remote {name}");
        }
        Ok(())
    }

    fn stage_all(&mut self) -> Result<()> {
        let mut index = self.repo()?.index()?;
        index.add_all(["*"].iter(), IndexAddOption::DEFAULT, None)?;
        index.update_all(["*"].iter(), None)?;
        index.write()?;
        Ok(())
    }

    fn commit(&mut self, message: &str, author: &Author) -> Result<CommitOutcome> {
        let repo = self.repo()?;
        let tree_id = repo.index()?.write_tree()?;
        let tree = repo.find_tree(tree_id)?;
        let parent = head_commit(repo)?;

        let unchanged = match &parent {
            Some(parent) => parent.tree_id() == tree_id,
            None => tree.len() == 0,
        };
        if unchanged {
            debug!("Tree {tree_id} has no changes to commit");
            return Ok(CommitOutcome::NothingToCommit);
        }

        let signature = Signature::now(&author.name, &author.email)?;
        let parents = parent.iter().collect::<Vec<_>>();
        let id = repo.commit(
            Some("HEAD"),
            &signature,
            &signature,
            message,
            &tree,
            &parents,
        )?;
        debug!("Created commit {id}");
        Ok(CommitOutcome::Committed { id: id.to_string() })
    }

    fn push(&mut self, remote: &str, branch: &str) -> Result<()> {
        let repo = self.repo()?;
        let head = repo.head().context("Nothing to push, the branch has no commits")?;
        let head_name = head
            .name()
            .ok_or_else(|| anyhow!("invalid reference name"))?
            .to_owned();
        let refspec = format!("{head_name}:refs/heads/{branch}");

        let mut rejected = None;
        {
            let mut callbacks = RemoteCallbacks::new();
            // The token travels as the url user name. libgit2 asks again after a rejected
            // credential, so only answer once.
            let mut offered = false;
            callbacks.credentials(move |_, username, _| match username {
                Some(username) if !offered => {
                    offered = true;
                    Cred::userpass_plaintext(username, "")
                }
                _ => Err(git2::Error::from_str("Remote rejected the access token")),
            });
            callbacks.push_update_reference(|reference, status| {
                if let Some(status) = status {
                    rejected = Some(format!("{reference}: {status}"));
                }
                Ok(())
            });
            let mut options = PushOptions::new();
            options.remote_callbacks(callbacks);

            repo.find_remote(remote)?
                .push(&[refspec.as_str()], Some(&mut options))
                .with_context(|| format!("git push {remote} {branch}"))?;
        }

        if let Some(reason) = rejected {
            bail!("Remote rejected the push of {reason}");
        }
        debug!("Pushed {head_name} to {remote}/{branch}");
        Ok(())
    }
}
