pub const SCHEMA_VERSION: u32 = 1;

pub const META_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS library_meta (
    key TEXT PRIMARY KEY,
    value);
";

pub const LIBRARY_SCHEMA: &str = "
CREATE TABLE artists (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE);

CREATE TABLE albums (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    fs_path BLOB NOT NULL,
    UNIQUE(name, fs_path));

CREATE TABLE tracks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    number INTEGER NOT NULL,
    duration INTEGER NOT NULL,
    fs_path BLOB NOT NULL UNIQUE,
    size INTEGER NOT NULL,
    modified INTEGER NOT NULL,
    artist_id INTEGER NOT NULL,
    album_id INTEGER NOT NULL,
    FOREIGN KEY(artist_id) REFERENCES artists(id),
    FOREIGN KEY(album_id) REFERENCES albums(id));

CREATE INDEX tracks_artist_id ON tracks (artist_id);
CREATE INDEX tracks_album_id ON tracks (album_id);

CREATE TABLE artwork (
    album_id INTEGER NOT NULL,
    size INTEGER NOT NULL,
    image BLOB NOT NULL,
    updated_at INTEGER NOT NULL,
    PRIMARY KEY(album_id, size),
    FOREIGN KEY(album_id) REFERENCES albums(id) ON DELETE CASCADE);

CREATE TABLE playlists (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    public INTEGER NOT NULL DEFAULT 1,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL);

CREATE TABLE playlists_tracks (
    playlist_id INTEGER NOT NULL,
    track_id INTEGER NOT NULL,
    idx INTEGER NOT NULL,
    PRIMARY KEY(playlist_id, idx),
    FOREIGN KEY(playlist_id) REFERENCES playlists(id) ON DELETE CASCADE,
    FOREIGN KEY(track_id) REFERENCES tracks(id) ON DELETE CASCADE);

CREATE INDEX playlists_tracks_track_id ON playlists_tracks (track_id);
";
