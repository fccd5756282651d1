//! User facing configuration. Lives in `config.toml` inside the application directory and is
//! re-read by the daemon on every evaluation, so edits apply without a restart.

use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

pub const DEFAULT_REPOSITORY_NAME: &str = "code-tracking-stats";
pub const DEFAULT_COMMIT_INTERVAL_MS: u64 = 30 * 60 * 1000;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 60 * 1000;
pub const DEFAULT_SYNC_TIMEOUT_MS: u64 = 2 * 60 * 1000;
/// One year. Longer intervals are clamped, they would overflow date arithmetic.
pub const MAX_COMMIT_INTERVAL_MS: u64 = 365 * 24 * 60 * 60 * 1000;
pub const MIN_SYNC_TIMEOUT_MS: u64 = 1000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    /// Name of the private repository the record is pushed to.
    pub repository_name: String,
    /// Minimum time between two commit cycles, in milliseconds.
    pub commit_interval: u64,
    /// Period of the tick that checks whether a commit cycle is due, in milliseconds.
    pub poll_interval: u64,
    /// Upper bound for a single commit and push, in milliseconds.
    pub sync_timeout: u64,
    pub branch: String,
    /// Base url of the hosting provider's REST api. Only read when the daemon starts.
    pub api_url: String,
    pub git_host: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            repository_name: DEFAULT_REPOSITORY_NAME.into(),
            commit_interval: DEFAULT_COMMIT_INTERVAL_MS,
            poll_interval: DEFAULT_POLL_INTERVAL_MS,
            sync_timeout: DEFAULT_SYNC_TIMEOUT_MS,
            branch: "main".into(),
            api_url: "https://api.github.com".into(),
            git_host: "github.com".into(),
        }
    }
}

impl Settings {
    pub fn commit_interval(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(self.commit_interval.min(MAX_COMMIT_INTERVAL_MS) as i64)
    }

    /// A zero poll interval would spin the daemon, so it is clamped to one millisecond.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval.max(1))
    }

    /// Clamped to a second, a zero timeout would fail every sync before it starts.
    pub fn sync_timeout(&self) -> Duration {
        Duration::from_millis(self.sync_timeout.max(MIN_SYNC_TIMEOUT_MS))
    }
}

/// Provides the settings in effect for the current evaluation.
pub trait SettingsSource: Send {
    fn current(&mut self) -> Settings;
}

impl SettingsSource for Settings {
    fn current(&mut self) -> Settings {
        self.clone()
    }
}

/// Settings backed by a toml file. A file that disappears or fails to parse keeps the last
/// good settings in effect.
pub struct SettingsFile {
    path: PathBuf,
    cached: Settings,
}

impl SettingsFile {
    pub fn load(path: PathBuf) -> Result<Self> {
        let cached = read_settings(&path)?;
        Ok(Self { path, cached })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn save(path: &Path, settings: &Settings) -> Result<()> {
        let contents = toml::to_string_pretty(settings)?;
        std::fs::write(path, contents)
            .with_context(|| format!("Failed to write settings to {path:?}"))?;
        Ok(())
    }
}

impl SettingsSource for SettingsFile {
    fn current(&mut self) -> Settings {
        match read_settings(&self.path) {
            Ok(settings) if settings != self.cached => {
                info!(
                    repository = %settings.repository_name,
                    commit_interval = settings.commit_interval,
                    poll_interval = settings.poll_interval,
                    "Loaded new settings"
                );
                self.cached = settings;
            }
            Ok(_) => {}
            Err(e) => warn!("Keeping previous settings, {:?} is unreadable: {e:?}", self.path),
        }
        self.cached.clone()
    }
}

fn read_settings(path: &Path) -> Result<Settings> {
    match std::fs::read_to_string(path) {
        Ok(contents) => {
            toml::from_str(&contents).with_context(|| format!("Invalid settings in {path:?}"))
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(Settings::default()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use tempfile::tempdir;

    use std::time::Duration;

    use super::{
        Settings, SettingsFile, SettingsSource, DEFAULT_COMMIT_INTERVAL_MS, MAX_COMMIT_INTERVAL_MS,
        MIN_SYNC_TIMEOUT_MS,
    };

    #[test]
    fn missing_file_gives_defaults() -> Result<()> {
        let dir = tempdir()?;
        let mut settings = SettingsFile::load(dir.path().join("config.toml"))?;
        let current = settings.current();
        assert_eq!(current.repository_name, "code-tracking-stats");
        assert_eq!(current.commit_interval, DEFAULT_COMMIT_INTERVAL_MS);
        Ok(())
    }

    #[test]
    fn partial_file_keeps_other_defaults() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "commitInterval = 60000\n")?;
        let mut settings = SettingsFile::load(path)?;
        let current = settings.current();
        assert_eq!(current.commit_interval, 60000);
        assert_eq!(current.branch, "main");
        Ok(())
    }

    #[test]
    fn edits_are_picked_up_on_next_read() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("config.toml");
        let mut settings = SettingsFile::load(path.clone())?;
        assert_eq!(settings.current().repository_name, "code-tracking-stats");

        SettingsFile::save(
            &path,
            &Settings {
                repository_name: "elsewhere".into(),
                ..Settings::default()
            },
        )?;
        assert_eq!(settings.current().repository_name, "elsewhere");
        Ok(())
    }

    #[test]
    fn broken_file_keeps_last_good_settings() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "commitInterval = 1000\n")?;
        let mut settings = SettingsFile::load(path.clone())?;
        assert_eq!(settings.current().commit_interval, 1000);

        std::fs::write(&path, "commitInterval = \"soon\"\n")?;
        assert_eq!(settings.current().commit_interval, 1000);
        Ok(())
    }

    #[test]
    fn out_of_range_values_are_clamped() {
        let settings = Settings {
            commit_interval: 10_000_000_000_000_000,
            sync_timeout: 0,
            ..Settings::default()
        };
        assert_eq!(
            settings.commit_interval(),
            chrono::Duration::milliseconds(MAX_COMMIT_INTERVAL_MS as i64)
        );
        assert_eq!(
            settings.sync_timeout(),
            Duration::from_millis(MIN_SYNC_TIMEOUT_MS)
        );

        let wrapping = Settings {
            commit_interval: 1 << 63,
            ..Settings::default()
        };
        assert!(wrapping.commit_interval() > chrono::Duration::zero());
    }
}
