use std::path::PathBuf;

use thiserror::Error;

use crate::session::SessionState;

#[derive(Debug, Error)]
pub enum Error {
    #[error("product `{0}` has no image path")]
    MissingImagePath(String),

    #[error("overlay image not found at {}", .0.display())]
    AssetNotFound(PathBuf),

    #[error("failed to decode overlay image {}: {source}", path.display())]
    AssetDecode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("overlay image {} has zero width or height", .0.display())]
    EmptyAsset(PathBuf),

    #[error("capture device unavailable: {0}")]
    CaptureUnavailable(String),

    #[error("landmark detector unavailable: {0}")]
    DetectorUnavailable(String),

    #[error("display window failed: {0}")]
    Display(String),

    #[error("landmark detection failed: {0}")]
    Detection(String),

    #[error("failed to write snapshot {}: {reason}", path.display())]
    SnapshotWrite { path: PathBuf, reason: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("no product with id {0} in catalog")]
    ProductNotFound(u64),

    #[error("operation not valid while session is {0:?}")]
    InvalidState(SessionState),
}

impl Error {
    /// True for errors that end a session. The others only cost one frame or one capture.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Error::Detection(_) | Error::SnapshotWrite { .. })
    }
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Error::Config(value.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
