use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use crate::artwork::{ArtFinder, NoFinder};
use crate::catalog::{self, Album, Catalog, Change, FileInfo, TrackInfo};
use crate::config::{Config, StoreLocation};
use crate::context::Context;
use crate::db_meta;
use crate::error::{Error, Result};
use crate::format;
use crate::fs::{Filesystem, OsFilesystem};
use crate::media_info::{MediaInfo, MediaMetadata, TagReader};
use crate::playlists::Playlists;
use crate::scaler::{ImageScaler, Scaler};
use crate::schema;

/// A music library: the catalog connection, the scan roots and the
/// capabilities used to fill the catalog and resolve artwork.
pub struct Library {
    pub(crate) catalog: Catalog,
    store: StoreLocation,
    roots: RwLock<Vec<PathBuf>>,
    pub(crate) scan_workers: usize,
    pub(crate) small_artwork_width: u32,
    pub(crate) metadata: Arc<dyn MediaMetadata>,
    pub(crate) finder: Arc<dyn ArtFinder>,
    pub(crate) scaler: Arc<dyn Scaler>,
    pub(crate) fs: Arc<dyn Filesystem>,
}

pub struct LibraryBuilder {
    config: Config,
    metadata: Arc<dyn MediaMetadata>,
    finder: Arc<dyn ArtFinder>,
    scaler: Arc<dyn Scaler>,
    fs: Arc<dyn Filesystem>,
}

impl LibraryBuilder {
    pub fn new(config: Config) -> LibraryBuilder {
        LibraryBuilder {
            config,
            metadata: Arc::new(TagReader),
            finder: Arc::new(NoFinder),
            scaler: Arc::new(ImageScaler),
            fs: Arc::new(OsFilesystem),
        }
    }

    pub fn metadata(mut self, metadata: Arc<dyn MediaMetadata>) -> LibraryBuilder {
        self.metadata = metadata;
        self
    }

    pub fn art_finder(mut self, finder: Arc<dyn ArtFinder>) -> LibraryBuilder {
        self.finder = finder;
        self
    }

    pub fn scaler(mut self, scaler: Arc<dyn Scaler>) -> LibraryBuilder {
        self.scaler = scaler;
        self
    }

    pub fn filesystem(mut self, fs: Arc<dyn Filesystem>) -> LibraryBuilder {
        self.fs = fs;
        self
    }

    /// Opens the store. The schema is created by `Library::initialize`.
    pub fn open(self) -> Result<Library> {
        let LibraryBuilder {
            config,
            metadata,
            finder,
            scaler,
            fs,
        } = self;

        let catalog = Catalog::open(&config.store)?;

        Ok(Library {
            catalog,
            store: config.store,
            roots: RwLock::new(config.roots),
            scan_workers: config.scan_workers.max(1),
            small_artwork_width: config.small_artwork_width,
            metadata,
            finder,
            scaler,
            fs,
        })
    }
}

impl Library {
    pub fn builder(config: Config) -> LibraryBuilder {
        LibraryBuilder::new(config)
    }

    pub fn initialize(&self) -> Result<()> {
        self.catalog
            .with_conn(|conn| db_meta::ensure_schema(conn, schema::LIBRARY_SCHEMA))
    }

    pub fn close(&self) -> Result<()> {
        self.catalog.close()
    }

    /// Closes the library and deletes its database.
    pub fn truncate(&self) -> Result<()> {
        self.close()?;

        if let StoreLocation::File(db_path) = &self.store {
            info!("removing '{}'", db_path.to_string_lossy());

            for suffix in ["-wal", "-shm"].iter() {
                let mut side_file = db_path.clone().into_os_string();
                side_file.push(suffix);
                let _ = std::fs::remove_file(side_file);
            }

            std::fs::remove_file(db_path)?;
        }

        Ok(())
    }

    pub fn add_library_path<P: Into<PathBuf>>(&self, path: P) {
        let path = path.into();
        debug!("add library path '{}'", path.display());

        self.roots
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(path);
    }

    pub fn library_paths(&self) -> Vec<PathBuf> {
        self.roots.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn playlists(&self) -> Playlists<'_> {
        Playlists::new(&self.catalog)
    }

    /// Adds or refreshes a single file.
    pub fn add_media<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let (info, file) = read_media_file(self.metadata.as_ref(), path.as_ref())?;
        self.insert_media(&info, &file)?;
        Ok(())
    }

    /// Writes already-read media to the catalog, returning the track id.
    pub fn insert_media(&self, info: &MediaInfo, file: &FileInfo) -> Result<i64> {
        Ok(self.write_media(info, file)?.0)
    }

    pub(crate) fn write_media(&self, info: &MediaInfo, file: &FileInfo) -> Result<(i64, Change)> {
        self.catalog
            .with_conn(|conn| catalog::insert_media(conn, info, file))
    }

    pub fn remove_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();

        if self
            .catalog
            .with_conn(|conn| catalog::delete_track_by_path(conn, path))?
        {
            debug!("removed '{}'", path.display());
        }

        Ok(())
    }

    pub fn get_artist_id(&self, name: &str) -> Result<i64> {
        self.catalog
            .with_conn(|conn| catalog::artist_id(conn, name))?
            .ok_or(Error::NotFound("artist"))
    }

    pub fn get_album_id<P: AsRef<Path>>(&self, name: &str, fs_path: P) -> Result<i64> {
        self.catalog
            .with_conn(|conn| catalog::album_id(conn, name, fs_path.as_ref()))?
            .ok_or(Error::NotFound("album"))
    }

    pub fn get_track_id(&self, title: &str, artist_id: i64, album_id: i64) -> Result<i64> {
        self.catalog
            .with_conn(|conn| catalog::track_id(conn, title, artist_id, album_id))?
            .ok_or(Error::NotFound("track"))
    }

    /// Directories of every album with this name.
    pub fn get_album_fs_path_by_name(&self, name: &str) -> Result<Vec<PathBuf>> {
        let paths = self
            .catalog
            .with_conn(|conn| catalog::album_fs_paths_by_name(conn, name))?;

        if paths.is_empty() {
            return Err(Error::NotFound("album"));
        }

        Ok(paths)
    }

    pub fn get_album_files(&self, ctx: &Context, album_id: i64) -> Result<Vec<TrackInfo>> {
        ctx.check()?;
        self.catalog
            .with_conn(|conn| catalog::album_tracks(conn, album_id))
    }

    pub fn get_artist_albums(&self, ctx: &Context, artist_id: i64) -> Result<Vec<Album>> {
        ctx.check()?;
        self.catalog
            .with_conn(|conn| catalog::artist_albums(conn, artist_id))
    }

    pub fn get_file_path(&self, ctx: &Context, track_id: i64) -> Result<PathBuf> {
        ctx.check()?;
        self.catalog
            .with_conn(|conn| catalog::track_path(conn, track_id))?
            .ok_or(Error::NotFound("track"))
    }
}

/// Classifies, stats and reads the tags of one file. Nothing is written.
pub(crate) fn read_media_file(
    metadata: &dyn MediaMetadata,
    path: &Path,
) -> Result<(MediaInfo, FileInfo)> {
    if !format::is_supported(path) {
        return Err(Error::Unsupported(path.to_path_buf()));
    }

    let file = match FileInfo::from_path(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(Error::FileNotFound(path.to_path_buf()));
        }
        Err(e) => return Err(e.into()),
    };

    if !path.is_file() {
        return Err(Error::Unsupported(path.to_path_buf()));
    }

    let info = metadata.read(path)?;

    Ok((info, file))
}
