use std::{
    future::Future,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use fs4::tokio::AsyncFileExt;
use tokio::{
    fs::File,
    io::{AsyncRead, AsyncReadExt, AsyncSeek, AsyncSeekExt, AsyncWriteExt},
};
use tracing::debug;

use super::entities::{SessionDraft, TrackingRecord};

/// Interface for abstracting storage of the tracking record.
pub trait TrackingLog {
    /// Reads the current record. A missing file is an empty record, never an error.
    fn load(&self) -> impl Future<Output = Result<TrackingRecord>>;

    /// Adds a session to the record and rewrites the whole record. Returns the record as written.
    fn append(&self, draft: SessionDraft) -> impl Future<Output = Result<TrackingRecord>>;

    /// Makes sure the record exists on disk, writing an empty one if needed.
    fn initialize(&self) -> impl Future<Output = Result<TrackingRecord>>;
}

/// The main realization of [TrackingLog]. Keeps the record as a single pretty printed json file.
/// Readers take a shared lock and writers an exclusive one, so the cli can read while the
/// daemon writes.
#[derive(Debug, Clone)]
pub struct JsonTrackingLog {
    path: PathBuf,
}

impl JsonTrackingLog {
    pub fn new(path: PathBuf) -> Result<Self, std::io::Error> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn update(&self, change: impl FnOnce(&mut TrackingRecord)) -> Result<TrackingRecord> {
        let mut file = File::options()
            .write(true)
            .create(true)
            .read(true)
            .truncate(false)
            .open(&self.path)
            .await
            .with_context(|| format!("Failed to open {:?}", self.path))?;

        // Semi-safe acquire-release for a file
        file.lock_exclusive()?;
        let result = Self::update_with_file(&mut file, change).await;
        file.unlock_async().await?;
        result
    }

    async fn update_with_file(
        file: &mut File,
        change: impl FnOnce(&mut TrackingRecord),
    ) -> Result<TrackingRecord> {
        let mut record = read_record(file).await?;
        change(&mut record);

        let buffer = serde_json::to_vec_pretty(&record)?;
        file.rewind().await?;
        file.set_len(0).await?;
        file.write_all(&buffer).await?;
        file.flush().await?;
        file.sync_data().await?;
        Ok(record)
    }
}

impl TrackingLog for JsonTrackingLog {
    async fn load(&self) -> Result<TrackingRecord> {
        let mut file = match File::open(&self.path).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No record at {:?}, starting from zero", self.path);
                return Ok(TrackingRecord::default());
            }
            Err(e) => Err(e)?,
        };

        file.lock_shared()?;
        let result = read_record(&mut file).await;
        file.unlock_async().await?;
        result.with_context(|| format!("Failed to read record {:?}", self.path))
    }

    async fn append(&self, draft: SessionDraft) -> Result<TrackingRecord> {
        debug!("Appending {:?} to {:?}", draft, self.path);
        self.update(move |record| {
            record.push(draft);
        })
        .await
    }

    async fn initialize(&self) -> Result<TrackingRecord> {
        self.update(|_| ()).await
    }
}

async fn read_record(file: &mut (impl AsyncRead + AsyncSeek + Unpin)) -> Result<TrackingRecord> {
    file.rewind().await?;
    let mut contents = String::new();
    file.read_to_string(&mut contents).await?;
    if contents.trim().is_empty() {
        return Ok(TrackingRecord::default());
    }
    Ok(serde_json::from_str(&contents)?)
}
