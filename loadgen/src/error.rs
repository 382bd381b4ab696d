use std::path::PathBuf;

pub(crate) type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(thiserror::Error, Debug)]
pub(crate) enum Error {
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("failed to write {file_name} at {}: {source}", .path.display())]
    WriteFailure {
        file_name: String,
        path: PathBuf,
        #[source]
        source: BoxError,
    },
    #[error("worker running {file_name} exited before reporting an outcome")]
    TaskLost { file_name: String },
}

impl Error {
    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        Error::InvalidConfiguration(reason.into())
    }
}
