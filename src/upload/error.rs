use super::RunReport;
use crate::remote::RemoteError;

/// Errors that stop a run.
///
/// Everything else (unreadable files, bad sidecars, rejected uploads, album
/// failures) is recorded in the [`RunReport`] and the run carries on.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("invalid configuration: {0}")]
    Config(String),
    /// The server became unusable. `report` holds what happened up to then.
    #[error("run aborted: {source}")]
    Fatal {
        #[source]
        source: RemoteError,
        report: Box<RunReport>,
    },
}

impl UploadError {
    /// The partial report of an aborted run.
    pub fn report(&self) -> Option<&RunReport> {
        match self {
            Self::Fatal { report, .. } => Some(report),
            Self::Config(_) => None,
        }
    }
}
