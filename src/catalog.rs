use std::ffi::OsStr;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, UNIX_EPOCH};

use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use serde::Serialize;

use crate::config::StoreLocation;
use crate::error::{Error, Result};
use crate::media_info::MediaInfo;

/// File system facts about a cataloged file.
#[derive(Debug, Clone, PartialEq)]
pub struct FileInfo {
    pub path: PathBuf,
    pub size: i64,
    /// Seconds since the unix epoch.
    pub modified: i64,
}

impl FileInfo {
    pub fn from_path(path: &Path) -> std::io::Result<FileInfo> {
        let metadata = std::fs::metadata(path)?;

        let modified = metadata
            .modified()?
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::from_secs(0))
            .as_secs() as i64;

        Ok(FileInfo {
            path: path.to_path_buf(),
            size: metadata.len() as i64,
            modified,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackInfo {
    pub id: i64,
    pub artist_id: i64,
    pub artist: String,
    pub album_id: i64,
    pub album: String,
    pub title: String,
    pub track_number: i64,
    pub duration_ms: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Album {
    pub id: i64,
    pub name: String,
    pub artist: String,
    pub song_count: i64,
    pub duration_ms: i64,
}

#[derive(Debug, Clone)]
pub struct AlbumRow {
    pub id: i64,
    pub name: String,
    pub fs_path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct StoredFile {
    pub track_id: i64,
    pub path: PathBuf,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Change {
    Added,
    Updated,
    Unchanged,
}

/// The store connection. All access is serialized through one mutex; the
/// connection is dropped on close.
pub struct Catalog {
    conn: Mutex<Option<Connection>>,
}

impl Catalog {
    pub fn open(location: &StoreLocation) -> Result<Catalog> {
        let conn = match location {
            StoreLocation::Memory => {
                debug!("using in-memory database");
                Connection::open_in_memory()?
            }
            StoreLocation::File(db_path) => {
                info!("using '{}'", db_path.to_string_lossy());

                let conn = match Connection::open(db_path) {
                    Ok(c) => c,
                    Err(e) => {
                        error!(
                            "can't open sqlite database '{}': {}",
                            db_path.to_string_lossy(),
                            e
                        );
                        return Err(e.into());
                    }
                };

                conn.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))?;
                conn
            }
        };

        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.busy_timeout(Duration::from_secs(5))?;

        Ok(Catalog {
            conn: Mutex::new(Some(conn)),
        })
    }

    pub fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T>,
    {
        let mut guard = self.conn.lock().unwrap_or_else(|e| e.into_inner());

        match guard.as_mut() {
            Some(conn) => f(conn),
            None => Err(Error::Closed),
        }
    }

    pub fn close(&self) -> Result<()> {
        let mut guard = self.conn.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(conn) = guard.take() {
            debug!("close");

            if let Err((_conn, e)) = conn.close() {
                return Err(e.into());
            }
        }

        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.conn
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_none()
    }
}

pub fn path_bytes(path: &Path) -> &[u8] {
    path.as_os_str().as_bytes()
}

pub fn path_from_bytes(bytes: &[u8]) -> PathBuf {
    Path::new(OsStr::from_bytes(bytes)).to_path_buf()
}

/// Album identity is the containing directory, not the artist.
pub fn album_directory(file_path: &Path) -> &Path {
    file_path.parent().unwrap_or_else(|| Path::new(""))
}

pub fn artist_id(conn: &Connection, name: &str) -> Result<Option<i64>> {
    trace!("get artist name={}", name);

    Ok(conn
        .query_row("SELECT id FROM artists WHERE name = ?1", [name], |row| {
            row.get(0)
        })
        .optional()?)
}

pub fn ensure_artist(conn: &Connection, name: &str) -> Result<i64> {
    let created = conn.execute(
        "INSERT INTO artists (name) VALUES (?1) ON CONFLICT(name) DO NOTHING",
        [name],
    )?;

    if created > 0 {
        debug!("create artist '{}'", name);
    }

    artist_id(conn, name)?.ok_or(Error::NotFound("artist"))
}

pub fn album_id(conn: &Connection, name: &str, fs_path: &Path) -> Result<Option<i64>> {
    trace!("get album name={} fs_path='{}'", name, fs_path.display());

    Ok(conn
        .query_row(
            "SELECT id FROM albums WHERE name = ?1 AND fs_path = ?2",
            params![name, path_bytes(fs_path)],
            |row| row.get(0),
        )
        .optional()?)
}

pub fn ensure_album(conn: &Connection, name: &str, fs_path: &Path) -> Result<i64> {
    let created = conn.execute(
        "INSERT INTO albums (name, fs_path) VALUES (?1, ?2)
        ON CONFLICT(name, fs_path) DO NOTHING",
        params![name, path_bytes(fs_path)],
    )?;

    if created > 0 {
        debug!("create album '{}' in '{}'", name, fs_path.display());
    }

    album_id(conn, name, fs_path)?.ok_or(Error::NotFound("album"))
}

pub fn album(conn: &Connection, album_id: i64) -> Result<Option<AlbumRow>> {
    trace!("get album album_id={}", album_id);

    Ok(conn
        .query_row(
            "SELECT id, name, fs_path FROM albums WHERE id = ?1",
            [album_id],
            |row| {
                let fs_path: Vec<u8> = row.get(2)?;
                Ok(AlbumRow {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    fs_path: path_from_bytes(&fs_path),
                })
            },
        )
        .optional()?)
}

pub fn album_fs_paths_by_name(conn: &Connection, name: &str) -> Result<Vec<PathBuf>> {
    let mut st = conn.prepare("SELECT fs_path FROM albums WHERE name = ?1 ORDER BY id")?;

    let mut rows = st.query([name])?;
    let mut result = Vec::new();

    while let Some(row) = rows.next()? {
        let fs_path: Vec<u8> = row.get(0)?;
        result.push(path_from_bytes(&fs_path));
    }

    Ok(result)
}

/// The artist with most tracks on the album.
pub fn album_artist(conn: &Connection, album_id: i64) -> Result<Option<String>> {
    Ok(conn
        .query_row(
            "SELECT artists.name
            FROM tracks
            INNER JOIN artists ON artists.id = tracks.artist_id
            WHERE tracks.album_id = ?1
            GROUP BY tracks.artist_id
            ORDER BY count(tracks.id) DESC, artists.name ASC
            LIMIT 1",
            [album_id],
            |row| row.get(0),
        )
        .optional()?)
}

pub fn track_id(
    conn: &Connection,
    title: &str,
    artist_id: i64,
    album_id: i64,
) -> Result<Option<i64>> {
    Ok(conn
        .query_row(
            "SELECT id FROM tracks WHERE name = ?1 AND artist_id = ?2 AND album_id = ?3",
            params![title, artist_id, album_id],
            |row| row.get(0),
        )
        .optional()?)
}

pub fn track_path(conn: &Connection, track_id: i64) -> Result<Option<PathBuf>> {
    let fs_path: Option<Vec<u8>> = conn
        .query_row(
            "SELECT fs_path FROM tracks WHERE id = ?1",
            [track_id],
            |row| row.get(0),
        )
        .optional()?;

    Ok(fs_path.map(|p| path_from_bytes(&p)))
}

pub const TRACK_INFO_SELECT: &str = "
    SELECT
        tracks.id,
        tracks.artist_id,
        artists.name,
        tracks.album_id,
        albums.name,
        tracks.name,
        tracks.number,
        tracks.duration
    FROM tracks
    INNER JOIN artists ON artists.id = tracks.artist_id
    INNER JOIN albums ON albums.id = tracks.album_id";

pub fn _get_track_info(row: &Row) -> rusqlite::Result<TrackInfo> {
    Ok(TrackInfo {
        id: row.get(0)?,
        artist_id: row.get(1)?,
        artist: row.get(2)?,
        album_id: row.get(3)?,
        album: row.get(4)?,
        title: row.get(5)?,
        track_number: row.get(6)?,
        duration_ms: row.get(7)?,
    })
}

pub fn album_tracks(conn: &Connection, album_id: i64) -> Result<Vec<TrackInfo>> {
    let mut st = conn.prepare(&format!(
        "{} WHERE tracks.album_id = ?1 ORDER BY tracks.number, tracks.id",
        TRACK_INFO_SELECT
    ))?;

    let tracks = st
        .query_map([album_id], _get_track_info)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(tracks)
}

pub fn artist_albums(conn: &Connection, artist_id: i64) -> Result<Vec<Album>> {
    let mut st = conn.prepare(
        "SELECT
            albums.id,
            albums.name,
            artists.name,
            (SELECT count(t.id) FROM tracks t WHERE t.album_id = albums.id) AS song_count,
            (SELECT coalesce(sum(t.duration), 0) FROM tracks t WHERE t.album_id = albums.id) AS duration
        FROM albums
        INNER JOIN artists ON artists.id = ?1
        WHERE albums.id IN (SELECT album_id FROM tracks WHERE artist_id = ?1)
        ORDER BY albums.name, albums.id",
    )?;

    let albums = st
        .query_map([artist_id], |row| {
            Ok(Album {
                id: row.get(0)?,
                name: row.get(1)?,
                artist: row.get(2)?,
                song_count: row.get(3)?,
                duration_ms: row.get(4)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(albums)
}

pub fn track_files(conn: &Connection) -> Result<Vec<StoredFile>> {
    let mut st = conn.prepare("SELECT id, fs_path FROM tracks ORDER BY id")?;

    let files = st
        .query_map([], |row| {
            let fs_path: Vec<u8> = row.get(1)?;
            Ok(StoredFile {
                track_id: row.get(0)?,
                path: path_from_bytes(&fs_path),
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(files)
}

pub fn delete_track(conn: &Connection, track_id: i64) -> Result<()> {
    trace!("delete track track_id={}", track_id);

    conn.execute("DELETE FROM tracks WHERE id = ?1", [track_id])?;
    Ok(())
}

pub fn delete_track_by_path(conn: &Connection, path: &Path) -> Result<bool> {
    trace!("delete track path='{}'", path.display());

    let deleted = conn.execute(
        "DELETE FROM tracks WHERE fs_path = ?1",
        [path_bytes(path)],
    )?;

    Ok(deleted > 0)
}

#[derive(Debug, PartialEq)]
struct TrackRow {
    name: String,
    number: i64,
    duration: i64,
    size: i64,
    modified: i64,
    artist_id: i64,
    album_id: i64,
}

/// Inserts the track at `file.path`, or brings the existing row in line with
/// `info`. Artist and album rows are resolved in the same transaction.
pub fn insert_media(
    conn: &mut Connection,
    info: &MediaInfo,
    file: &FileInfo,
) -> Result<(i64, Change)> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let wanted = TrackRow {
        name: info.title.clone(),
        number: info.track,
        duration: info.duration.as_millis() as i64,
        size: file.size,
        modified: file.modified,
        artist_id: ensure_artist(&tx, &info.artist)?,
        album_id: ensure_album(&tx, &info.album, album_directory(&file.path))?,
    };

    let existing: Option<(i64, TrackRow)> = tx
        .query_row(
            "SELECT id, name, number, duration, size, modified, artist_id, album_id
            FROM tracks
            WHERE fs_path = ?1",
            [path_bytes(&file.path)],
            |row| {
                Ok((
                    row.get(0)?,
                    TrackRow {
                        name: row.get(1)?,
                        number: row.get(2)?,
                        duration: row.get(3)?,
                        size: row.get(4)?,
                        modified: row.get(5)?,
                        artist_id: row.get(6)?,
                        album_id: row.get(7)?,
                    },
                ))
            },
        )
        .optional()?;

    let result = match existing {
        Some((id, ref row)) if *row == wanted => (id, Change::Unchanged),
        Some((id, _)) => {
            tx.execute(
                "UPDATE tracks
                SET name = ?1, number = ?2, duration = ?3, size = ?4, modified = ?5,
                    artist_id = ?6, album_id = ?7
                WHERE id = ?8",
                params![
                    wanted.name,
                    wanted.number,
                    wanted.duration,
                    wanted.size,
                    wanted.modified,
                    wanted.artist_id,
                    wanted.album_id,
                    id
                ],
            )?;

            debug!("update track {} '{}'", id, file.path.display());

            (id, Change::Updated)
        }
        None => {
            tx.execute(
                "INSERT INTO tracks
                    (name, number, duration, fs_path, size, modified, artist_id, album_id)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    wanted.name,
                    wanted.number,
                    wanted.duration,
                    path_bytes(&file.path),
                    wanted.size,
                    wanted.modified,
                    wanted.artist_id,
                    wanted.album_id
                ],
            )?;

            let id = tx.last_insert_rowid();

            debug!("create track {} '{}'", id, file.path.display());

            (id, Change::Added)
        }
    };

    tx.commit()?;

    Ok(result)
}

pub fn artwork(conn: &Connection, album_id: i64, size: i64) -> Result<Option<Vec<u8>>> {
    trace!("get artwork album_id={} size={}", album_id, size);

    Ok(conn
        .query_row(
            "SELECT image FROM artwork WHERE album_id = ?1 AND size = ?2",
            [album_id, size],
            |row| row.get(0),
        )
        .optional()?)
}

pub fn set_artwork(conn: &Connection, album_id: i64, size: i64, image: &[u8]) -> Result<()> {
    trace!(
        "set artwork album_id={} size={} bytes={}",
        album_id,
        size,
        image.len()
    );

    conn.execute(
        "INSERT INTO artwork (album_id, size, image, updated_at)
        VALUES (?1, ?2, ?3, strftime('%s','now'))
        ON CONFLICT(album_id, size) DO UPDATE
        SET image = excluded.image, updated_at = excluded.updated_at",
        params![album_id, size, image],
    )?;

    Ok(())
}

/// Stores `image` as the only artwork of the album under `size`, dropping
/// every other cached variant.
pub fn replace_artwork(conn: &mut Connection, album_id: i64, size: i64, image: &[u8]) -> Result<()> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    tx.execute("DELETE FROM artwork WHERE album_id = ?1", [album_id])?;
    set_artwork(&tx, album_id, size, image)?;

    tx.commit()?;

    Ok(())
}

pub fn delete_artwork(conn: &Connection, album_id: i64) -> Result<usize> {
    trace!("delete artwork album_id={}", album_id);

    Ok(conn.execute("DELETE FROM artwork WHERE album_id = ?1", [album_id])?)
}
