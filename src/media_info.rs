use std::path::Path;
use std::time::Duration;

use lofty::file::{AudioFile, TaggedFileExt};
use lofty::probe::Probe;
use lofty::tag::Accessor;

use crate::error::{Error, Result};

pub const UNKNOWN_ARTIST: &str = "Unknown Artist";
pub const UNKNOWN_ALBUM: &str = "Unknown Album";

/// Tags of one audio file.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaInfo {
    pub artist: String,
    pub album: String,
    pub title: String,
    pub track: i64,
    pub duration: Duration,
}

/// Reads the tags of an audio file.
pub trait MediaMetadata: Send + Sync {
    fn read(&self, path: &Path) -> Result<MediaInfo>;
}

/// Tag reader backed by lofty.
#[derive(Debug, Default)]
pub struct TagReader;

impl MediaMetadata for TagReader {
    fn read(&self, path: &Path) -> Result<MediaInfo> {
        trace!("read tags '{}'", path.to_string_lossy());

        let metadata_error = |reason: String| Error::Metadata {
            path: path.to_path_buf(),
            reason,
        };

        let tagged_file = Probe::open(path)
            .map_err(|e| metadata_error(e.to_string()))?
            .guess_file_type()
            .map_err(|e| metadata_error(e.to_string()))?
            .read()
            .map_err(|e| metadata_error(e.to_string()))?;

        let duration = tagged_file.properties().duration();

        let tag = match tagged_file.primary_tag() {
            Some(t) => Some(t),
            None => tagged_file.first_tag(),
        };

        let (artist, album, title, track) = match tag {
            Some(tag) => (
                tag.artist().map(|s| s.trim().to_string()),
                tag.album().map(|s| s.trim().to_string()),
                tag.title().map(|s| s.trim().to_string()),
                tag.track(),
            ),
            None => (None, None, None, None),
        };

        Ok(MediaInfo::with_fallbacks(
            path,
            artist,
            album,
            title,
            i64::from(track.unwrap_or(0)),
            duration,
        ))
    }
}

impl MediaInfo {
    /// Fills in missing or blank tags: title falls back to the file stem,
    /// artist and album to placeholder names.
    pub fn with_fallbacks(
        path: &Path,
        artist: Option<String>,
        album: Option<String>,
        title: Option<String>,
        track: i64,
        duration: Duration,
    ) -> MediaInfo {
        let non_empty = |s: Option<String>| s.filter(|s| !s.is_empty());

        MediaInfo {
            artist: non_empty(artist).unwrap_or_else(|| UNKNOWN_ARTIST.to_string()),
            album: non_empty(album).unwrap_or_else(|| UNKNOWN_ALBUM.to_string()),
            title: non_empty(title).unwrap_or_else(|| {
                path.file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_default()
            }),
            track,
            duration,
        }
    }
}
