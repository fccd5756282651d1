use std::{
    env, io,
    path::{Path, PathBuf},
};

use anyhow::{anyhow, Result};

const APPLICATION_NAME: &str = "codetally";

/// Resolves the default application directory. Prefers the platform state directory
/// ($XDG_STATE_HOME on linux), falls back to local data and finally $HOME/.local/state.
pub fn create_application_default_path() -> Result<PathBuf> {
    let mut path = dirs::state_dir()
        .or_else(dirs::data_local_dir)
        .or_else(|| {
            env::var_os("HOME").map(|home| {
                let mut path = PathBuf::from(home);
                path.push(".local/state");
                path
            })
        })
        .ok_or_else(|| anyhow!("Couldn't find a state directory nor HOME"))?;
    path.push(APPLICATION_NAME);

    create_dir(&path)?;
    Ok(path)
}

fn create_dir(path: &Path) -> Result<()> {
    match std::fs::create_dir_all(path) {
        Ok(_) => Ok(()),
        Err(v) if v.kind() == io::ErrorKind::AlreadyExists => Ok(()),
        Err(v) => Err(v.into()),
    }
}

/// Locations of everything the tracker keeps on disk.
#[derive(Debug, Clone)]
pub struct AppLayout {
    root: PathBuf,
}

impl AppLayout {
    /// Uses `dir` when given, otherwise the default application directory.
    pub fn resolve(dir: Option<PathBuf>) -> Result<Self> {
        match dir {
            Some(dir) => Self::new(dir),
            None => Self::new(create_application_default_path()?),
        }
    }

    /// The root is made absolute, the daemon changes its working directory when detaching.
    pub fn new(root: PathBuf) -> Result<Self> {
        create_dir(&root)?;
        Ok(Self {
            root: std::path::absolute(root)?,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_file(&self) -> PathBuf {
        self.root.join("config.toml")
    }

    pub fn state_file(&self) -> PathBuf {
        self.root.join("state.json")
    }

    pub fn status_file(&self) -> PathBuf {
        self.root.join("status.json")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    /// Git working tree. Only the tracking record lives here, so staging everything is safe.
    pub fn repo_dir(&self) -> PathBuf {
        self.root.join("repo")
    }

    pub fn data_file(&self) -> PathBuf {
        self.repo_dir().join("coding-data.json")
    }
}
