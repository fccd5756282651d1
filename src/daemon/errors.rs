use thiserror::Error;

use super::remote::github::ProviderError;

/// Failures surfaced by the tracking controller. Every variant ends up as a notification on the
/// status board; only [TrackingError::SyncFailed] leaves the session running untouched.
#[derive(Debug, Error)]
pub enum TrackingError {
    #[error("no access token available, pass one with `codetally start --token <TOKEN>`")]
    CredentialMissing,
    #[error("the access token was rejected")]
    AuthInvalid(#[source] ProviderError),
    #[error("could not provision repository `{repository}`")]
    RemoteProvisionFailed {
        repository: String,
        #[source]
        source: ProviderError,
    },
    #[error("could not sync coding stats")]
    SyncFailed(#[source] anyhow::Error),
    #[error("could not write tracking data")]
    LocalWriteFailed(#[source] anyhow::Error),
    #[error("could not read tracking data")]
    LocalReadFailed(#[source] anyhow::Error),
}

impl TrackingError {
    /// Sync failures are retried on the next tick, everything else needs the user.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::SyncFailed(_))
    }
}
