#[macro_use]
extern crate log;

pub mod artwork;
pub mod catalog;
pub mod config;
pub mod context;
pub mod db_meta;
pub mod error;
pub mod format;
pub mod fs;
pub mod library;
pub mod logger;
pub mod media_info;
pub mod playlists;
pub mod query;
pub mod scaler;
pub mod scan;
pub mod schema;

#[cfg(test)]
mod test_util;

pub use artwork::{ArtFinder, ImageSize, NoFinder};
pub use catalog::{Album, FileInfo, TrackInfo};
pub use config::{Config, StoreLocation};
pub use context::Context;
pub use error::{Error, Result};
pub use format::is_supported;
pub use fs::{Filesystem, MemFilesystem, OsFilesystem};
pub use library::{Library, LibraryBuilder};
pub use media_info::{MediaInfo, MediaMetadata, TagReader};
pub use playlists::{Playlist, Playlists, UpdateArgs};
pub use query::SearchArgs;
pub use scaler::{ImageScaler, Scaler};
pub use scan::{ScanStat, ScanThread};

pub const MUSICD_CATALOG_VERSION: &str = env!("CARGO_PKG_VERSION");
