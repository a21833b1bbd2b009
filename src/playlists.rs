use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use serde::Serialize;

use crate::catalog::{self, Catalog, TrackInfo};
use crate::context::Context;
use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Playlist {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub public: bool,
    pub duration_ms: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub tracks_count: i64,
    /// Empty when listing all playlists.
    pub tracks: Vec<TrackInfo>,
}

/// Changes applied by `Playlists::update`. Unset fields are left alone.
#[derive(Debug, Clone, Default)]
pub struct UpdateArgs {
    pub name: Option<String>,
    pub description: Option<String>,
    pub public: Option<bool>,
    /// Track ids appended after removals are done.
    pub add_tracks: Vec<i64>,
    /// Zero-based positions in the current order. Out of range positions are
    /// ignored.
    pub remove_tracks: Vec<usize>,
    pub remove_all_tracks: bool,
}

pub struct Playlists<'a> {
    catalog: &'a Catalog,
}

const PLAYLIST_SELECT: &str = "
    SELECT
        playlists.id,
        playlists.name,
        playlists.description,
        playlists.public,
        playlists.created_at,
        playlists.updated_at,
        (SELECT count(*) FROM playlists_tracks pt WHERE pt.playlist_id = playlists.id),
        (SELECT coalesce(sum(t.duration), 0)
            FROM playlists_tracks pt
            INNER JOIN tracks t ON t.id = pt.track_id
            WHERE pt.playlist_id = playlists.id)
    FROM playlists";

fn timestamp(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or_default()
}

fn _get_playlist(row: &Row) -> rusqlite::Result<Playlist> {
    Ok(Playlist {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        public: row.get(3)?,
        created_at: timestamp(row.get(4)?),
        updated_at: timestamp(row.get(5)?),
        tracks_count: row.get(6)?,
        duration_ms: row.get(7)?,
        tracks: Vec::new(),
    })
}

fn playlist_tracks(conn: &Connection, playlist_id: i64) -> Result<Vec<TrackInfo>> {
    let mut st = conn.prepare(&format!(
        "{}
        INNER JOIN playlists_tracks ON playlists_tracks.track_id = tracks.id
        WHERE playlists_tracks.playlist_id = ?1
        ORDER BY playlists_tracks.idx",
        catalog::TRACK_INFO_SELECT
    ))?;

    let tracks = st
        .query_map([playlist_id], catalog::_get_track_info)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(tracks)
}

fn playlist_track_ids(conn: &Connection, playlist_id: i64) -> Result<Vec<i64>> {
    let mut st = conn.prepare(
        "SELECT track_id FROM playlists_tracks WHERE playlist_id = ?1 ORDER BY idx",
    )?;

    let ids = st
        .query_map([playlist_id], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<i64>>>()?;

    Ok(ids)
}

fn set_playlist_tracks(conn: &Connection, playlist_id: i64, track_ids: &[i64]) -> Result<()> {
    conn.execute(
        "DELETE FROM playlists_tracks WHERE playlist_id = ?1",
        [playlist_id],
    )?;

    let mut st = conn.prepare(
        "INSERT INTO playlists_tracks (playlist_id, track_id, idx) VALUES (?1, ?2, ?3)",
    )?;

    for (idx, track_id) in track_ids.iter().enumerate() {
        st.execute(params![playlist_id, track_id, idx as i64])?;
    }

    Ok(())
}

impl<'a> Playlists<'a> {
    pub(crate) fn new(catalog: &'a Catalog) -> Playlists<'a> {
        Playlists { catalog }
    }

    /// Creates a playlist holding `tracks` in order and returns its id.
    pub fn create(&self, ctx: &Context, name: &str, tracks: &[i64]) -> Result<i64> {
        ctx.check()?;

        self.catalog.with_conn(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let now = Utc::now().timestamp();

            tx.execute(
                "INSERT INTO playlists (name, created_at, updated_at) VALUES (?1, ?2, ?2)",
                params![name, now],
            )?;

            let id = tx.last_insert_rowid();

            set_playlist_tracks(&tx, id, tracks)?;

            tx.commit()?;

            debug!("create playlist {} '{}' with {} tracks", id, name, tracks.len());

            Ok(id)
        })
    }

    pub fn get(&self, ctx: &Context, id: i64) -> Result<Playlist> {
        ctx.check()?;

        self.catalog.with_conn(|conn| {
            let mut playlist = conn
                .query_row(
                    &format!("{} WHERE playlists.id = ?1", PLAYLIST_SELECT),
                    [id],
                    _get_playlist,
                )
                .optional()?
                .ok_or(Error::PlaylistNotFound)?;

            playlist.tracks = playlist_tracks(conn, id)?;

            Ok(playlist)
        })
    }

    /// Every playlist, without tracks.
    pub fn get_all(&self, ctx: &Context) -> Result<Vec<Playlist>> {
        ctx.check()?;

        self.catalog.with_conn(|conn| {
            let mut st = conn.prepare(&format!("{} ORDER BY playlists.id", PLAYLIST_SELECT))?;

            let playlists = st
                .query_map([], _get_playlist)?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            Ok(playlists)
        })
    }

    pub fn update(&self, ctx: &Context, id: i64, args: UpdateArgs) -> Result<()> {
        ctx.check()?;

        self.catalog.with_conn(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let exists = tx
                .query_row("SELECT id FROM playlists WHERE id = ?1", [id], |row| {
                    row.get::<_, i64>(0)
                })
                .optional()?;

            if exists.is_none() {
                return Err(Error::PlaylistNotFound);
            }

            if let Some(name) = &args.name {
                tx.execute("UPDATE playlists SET name = ?1 WHERE id = ?2", params![name, id])?;
            }

            if let Some(description) = &args.description {
                tx.execute(
                    "UPDATE playlists SET description = ?1 WHERE id = ?2",
                    params![description, id],
                )?;
            }

            if let Some(public) = args.public {
                tx.execute(
                    "UPDATE playlists SET public = ?1 WHERE id = ?2",
                    params![public, id],
                )?;
            }

            if args.remove_all_tracks || !args.remove_tracks.is_empty() || !args.add_tracks.is_empty() {
                let mut track_ids: Vec<i64> = if args.remove_all_tracks {
                    Vec::new()
                } else {
                    let removed: BTreeSet<usize> = args.remove_tracks.iter().cloned().collect();

                    playlist_track_ids(&tx, id)?
                        .into_iter()
                        .enumerate()
                        .filter(|(position, _)| !removed.contains(position))
                        .map(|(_, track_id)| track_id)
                        .collect()
                };

                track_ids.extend_from_slice(&args.add_tracks);

                set_playlist_tracks(&tx, id, &track_ids)?;
            }

            tx.execute(
                "UPDATE playlists SET updated_at = ?1 WHERE id = ?2",
                params![Utc::now().timestamp(), id],
            )?;

            tx.commit()?;

            debug!("update playlist {}", id);

            Ok(())
        })
    }

    pub fn delete(&self, ctx: &Context, id: i64) -> Result<()> {
        ctx.check()?;

        let deleted = self.catalog.with_conn(|conn| {
            Ok(conn.execute("DELETE FROM playlists WHERE id = ?1", [id])?)
        })?;

        if deleted == 0 {
            return Err(Error::PlaylistNotFound);
        }

        debug!("delete playlist {}", id);

        Ok(())
    }
}
