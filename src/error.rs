use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("album not found")]
    AlbumNotFound,

    #[error("artwork not found")]
    ArtworkNotFound,

    #[error("playlist not found")]
    PlaylistNotFound,

    /// Lookup miss for an artist, album, track or file path.
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("file '{}' not found", .0.display())]
    FileNotFound(PathBuf),

    #[error("unsupported file '{}'", .0.display())]
    Unsupported(PathBuf),

    #[error("can't read metadata from '{}': {reason}", path.display())]
    Metadata { path: PathBuf, reason: String },

    #[error("artwork is larger than {0} bytes")]
    ArtworkTooLarge(usize),

    #[error("unsupported schema version: got {found}, expected {expected}")]
    SchemaVersion { found: u32, expected: u32 },

    #[error("operation canceled")]
    Canceled,

    #[error("deadline exceeded")]
    DeadlineExceeded,

    #[error("library is closed")]
    Closed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
}

impl Error {
    /// True for the expected "nothing there" outcomes, as opposed to system
    /// failures.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Error::AlbumNotFound
                | Error::ArtworkNotFound
                | Error::PlaylistNotFound
                | Error::NotFound(_)
                | Error::FileNotFound(_)
        )
    }

    pub fn is_canceled(&self) -> bool {
        matches!(self, Error::Canceled | Error::DeadlineExceeded)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
