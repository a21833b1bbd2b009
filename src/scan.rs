use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Instant;

use serde::Serialize;
use threadpool::ThreadPool;

use crate::catalog::{self, Change};
use crate::context::Context;
use crate::error::Result;
use crate::format;
use crate::library::{read_media_file, Library};

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Serialize)]
pub struct ScanStat {
    pub added: u64,
    pub updated: u64,
    pub unchanged: u64,
    pub removed: u64,
    pub failed: u64,
}

impl ScanStat {
    fn count(&mut self, change: Change) {
        match change {
            Change::Added => self.added += 1,
            Change::Updated => self.updated += 1,
            Change::Unchanged => self.unchanged += 1,
        }
    }

    pub fn changed(&self) -> bool {
        self.added > 0 || self.updated > 0 || self.removed > 0
    }
}

/// Runs a rescan of a library on its own thread.
pub struct ScanThread {
    ctx: Mutex<Context>,
    join_handle: Mutex<Option<JoinHandle<Result<ScanStat>>>>,
}

impl Default for ScanThread {
    fn default() -> ScanThread {
        ScanThread::new()
    }
}

impl ScanThread {
    pub fn new() -> ScanThread {
        ScanThread {
            ctx: Mutex::new(Context::background()),
            join_handle: Mutex::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        match &*self.join_handle.lock().unwrap_or_else(|e| e.into_inner()) {
            Some(handle) => !handle.is_finished(),
            None => false,
        }
    }

    /// Starts a rescan unless one is already running.
    pub fn start(&self, library: Arc<Library>) {
        let mut join_handle = self.join_handle.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(handle) = &*join_handle {
            if !handle.is_finished() {
                debug!("already running");
                return;
            }
        }

        let ctx = Context::background();
        *self.ctx.lock().unwrap_or_else(|e| e.into_inner()) = ctx.clone();

        *join_handle = Some(std::thread::spawn(move || library.rescan(&ctx)));
    }

    /// Interrupts the running scan and waits for it.
    pub fn stop(&self) -> Option<Result<ScanStat>> {
        self.ctx.lock().unwrap_or_else(|e| e.into_inner()).cancel();
        self.wait()
    }

    /// Waits for the scan to finish. `None` if no scan was started.
    pub fn wait(&self) -> Option<Result<ScanStat>> {
        let handle = self
            .join_handle
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()?;

        match handle.join() {
            Ok(result) => Some(result),
            Err(_) => {
                error!("scan thread panicked");
                None
            }
        }
    }
}

/// Supported files under `dir`, recursively. Unreadable directories are
/// logged and skipped.
fn collect_files(ctx: &Context, dir: &Path, files: &mut BTreeSet<PathBuf>) -> Result<()> {
    ctx.check()?;

    let entries = match std::fs::read_dir(dir) {
        Ok(e) => e,
        Err(e) => {
            error!("can't read directory '{}': {}", dir.to_string_lossy(), e);
            return Ok(());
        }
    };

    for entry in entries {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                error!("can't read entry in '{}': {}", dir.to_string_lossy(), e);
                continue;
            }
        };

        let path = entry.path();

        // Follows symlinks
        let metadata = match std::fs::metadata(&path) {
            Ok(m) => m,
            Err(e) => {
                warn!("metadata error '{}': {}", path.to_string_lossy(), e);
                continue;
            }
        };

        if metadata.is_dir() {
            collect_files(ctx, &path, files)?;
        } else if metadata.is_file() && format::is_supported(&path) {
            files.insert(path);
        }
    }

    Ok(())
}

impl Library {
    fn collect_root_files(&self, ctx: &Context) -> Result<BTreeSet<PathBuf>> {
        let mut files = BTreeSet::new();

        for root in self.library_paths() {
            if !root.is_dir() {
                warn!("root '{}' is not a directory, skipping", root.to_string_lossy());
                continue;
            }

            debug!("root '{}'", root.to_string_lossy());

            collect_files(ctx, &root, &mut files)?;
        }

        Ok(files)
    }

    /// Reads `files` on the worker pool and writes the results from this
    /// thread. Cancellation is checked before every write.
    fn process_files(&self, ctx: &Context, files: BTreeSet<PathBuf>, stat: &mut ScanStat) -> Result<()> {
        if files.is_empty() {
            return Ok(());
        }

        let pool = ThreadPool::with_name("scan".to_string(), self.scan_workers);
        let (tx, rx) = mpsc::sync_channel(self.scan_workers * 2);

        for path in files {
            let tx = tx.clone();
            let ctx = ctx.clone();
            let metadata = self.metadata.clone();

            pool.execute(move || {
                if ctx.is_done() {
                    return;
                }

                let result = read_media_file(metadata.as_ref(), &path);

                // Receiver is gone when the writer stopped
                let _ = tx.send((path, result));
            });
        }

        drop(tx);

        let mut outcome = Ok(());

        for (path, result) in rx.iter() {
            if let Err(e) = ctx.check() {
                debug!("interrupt noted, stopping");
                outcome = Err(e);
                break;
            }

            match result {
                Ok((info, file)) => match self.write_media(&info, &file) {
                    Ok((_, change)) => stat.count(change),
                    Err(e) => {
                        error!("can't write '{}': {}", path.to_string_lossy(), e);
                        outcome = Err(e);
                        break;
                    }
                },
                Err(e) => {
                    warn!("skipping '{}': {}", path.to_string_lossy(), e);
                    stat.failed += 1;
                }
            }
        }

        drop(rx);
        pool.join();

        // Jobs skipped after a cancel send nothing
        if outcome.is_ok() {
            outcome = ctx.check();
        }

        outcome
    }

    fn scan_with(&self, ctx: &Context) -> Result<ScanStat> {
        let start_instant = Instant::now();
        let mut stat = ScanStat::default();

        let files = self.collect_root_files(ctx)?;
        debug!("found {} files", files.len());

        self.process_files(ctx, files, &mut stat)?;

        info!("done in {}s: {:?}", start_instant.elapsed().as_secs(), stat);

        Ok(stat)
    }

    /// Adds every supported file under the library paths.
    pub fn scan(&self) -> Result<ScanStat> {
        info!("scan started");
        self.scan_with(&Context::background())
    }

    /// Brings the catalog in line with the file system: tracks whose file is
    /// gone are removed, remaining files are read again and new files added.
    pub fn rescan(&self, ctx: &Context) -> Result<ScanStat> {
        info!("rescan started");

        ctx.check()?;

        let start_instant = Instant::now();
        let mut stat = ScanStat::default();

        let stored = self.catalog.with_conn(|conn| catalog::track_files(conn))?;
        let mut files = BTreeSet::new();

        for file in stored {
            ctx.check()?;

            if file.path.is_file() {
                files.insert(file.path);
                continue;
            }

            debug!("file '{}' is gone", file.path.to_string_lossy());

            self.catalog
                .with_conn(|conn| catalog::delete_track(conn, file.track_id))?;
            stat.removed += 1;
        }

        files.extend(self.collect_root_files(ctx)?);

        self.process_files(ctx, files, &mut stat)?;

        info!("done in {}s: {:?}", start_instant.elapsed().as_secs(), stat);

        Ok(stat)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::Config;
    use crate::error::Error;
    use crate::library::LibraryBuilder;
    use crate::media_info::{MediaInfo, MediaMetadata};
    use crate::test_util::{media, memory_library, FakeMetadata};

    fn touch(root: &Path, relative: &str) -> PathBuf {
        let path = root.join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, relative.as_bytes()).unwrap();
        path
    }

    fn track_count(lib: &Library) -> i64 {
        lib.catalog
            .with_conn(|conn| Ok(conn.query_row("SELECT count(id) FROM tracks", [], |r| r.get(0))?))
            .unwrap()
    }

    struct Fixture {
        dir: tempfile::TempDir,
        metadata: Arc<FakeMetadata>,
        lib: Library,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let metadata = Arc::new(FakeMetadata::new());

        let files = [
            ("a/1.mp3", "Artist", "First", "One", 1),
            ("a/2.FLAC", "Artist", "First", "Two", 2),
            ("b/c/3.ogg", "Other", "Second", "Three", 1),
        ];

        for (relative, artist, album, title, track) in files.iter() {
            let path = touch(dir.path(), relative);
            metadata.put_file(path, media(artist, album, title, *track, 100));
        }

        touch(dir.path(), "a/notes.txt");
        touch(dir.path(), "a/cover.jpg");
        // Supported but without readable tags
        touch(dir.path(), "b/broken.mp3");

        let lib = memory_library(metadata.clone());
        lib.add_library_path(dir.path());
        lib.add_library_path(dir.path().join("not-there"));

        Fixture { dir, metadata, lib }
    }

    #[test]
    fn scan_adds_supported_files() {
        let f = fixture();

        let stat = f.lib.scan().unwrap();

        assert_eq!(
            stat,
            ScanStat {
                added: 3,
                failed: 1,
                ..Default::default()
            }
        );
        assert_eq!(track_count(&f.lib), 3);
        assert_eq!(f.metadata.reads(), 4);

        let album_id = f.lib.get_album_id("First", f.dir.path().join("a")).unwrap();
        let tracks = f
            .lib
            .get_album_files(&Context::background(), album_id)
            .unwrap();
        assert_eq!(tracks.len(), 2);
    }

    #[test]
    fn rescan_is_idempotent() {
        let f = fixture();

        f.lib.scan().unwrap();
        let stat = f.lib.rescan(&Context::background()).unwrap();

        assert_eq!(stat.unchanged, 3);
        assert!(!stat.changed());
        assert_eq!(track_count(&f.lib), 3);
    }

    #[test]
    fn rescan_repairs_modified_rows() {
        let f = fixture();
        f.lib.scan().unwrap();

        f.lib
            .catalog
            .with_conn(|conn| {
                conn.execute("UPDATE tracks SET name = 'corrupted' WHERE name = 'Two'", [])?;
                Ok(())
            })
            .unwrap();

        let stat = f.lib.rescan(&Context::background()).unwrap();
        assert_eq!(stat.updated, 1);

        let artist_id = f.lib.get_artist_id("Artist").unwrap();
        let album_id = f.lib.get_album_id("First", f.dir.path().join("a")).unwrap();
        assert!(f.lib.get_track_id("Two", artist_id, album_id).is_ok());
        assert!(f
            .lib
            .get_track_id("corrupted", artist_id, album_id)
            .unwrap_err()
            .is_not_found());
    }

    #[test]
    fn rescan_removes_and_adds() {
        let f = fixture();
        f.lib.scan().unwrap();

        std::fs::remove_file(f.dir.path().join("a/1.mp3")).unwrap();

        let new_file = touch(f.dir.path(), "b/c/4.opus");
        f.metadata
            .put_file(new_file, media("Other", "Second", "Four", 2, 100));

        let stat = f.lib.rescan(&Context::background()).unwrap();

        assert_eq!(stat.removed, 1);
        assert_eq!(stat.added, 1);
        assert_eq!(stat.unchanged, 2);
        assert_eq!(track_count(&f.lib), 3);
    }

    #[test]
    fn rescan_keeps_files_outside_roots() {
        let f = fixture();
        let other = tempfile::tempdir().unwrap();

        let outside = touch(other.path(), "loose.mp3");
        f.metadata
            .put_file(&outside, media("Loose", "Loose", "Loose", 1, 10));
        f.lib.add_media(&outside).unwrap();

        let stat = f.lib.rescan(&Context::background()).unwrap();

        assert_eq!(stat.unchanged, 1);
        assert_eq!(stat.added, 3);
    }

    #[test]
    fn rescan_honours_canceled_context() {
        let f = fixture();
        let ctx = Context::background();
        ctx.cancel();

        assert!(matches!(f.lib.rescan(&ctx), Err(Error::Canceled)));
        assert_eq!(track_count(&f.lib), 0);
        assert_eq!(f.metadata.reads(), 0);
    }

    struct CancelOnRead {
        inner: Arc<FakeMetadata>,
        ctx: Context,
    }

    impl MediaMetadata for CancelOnRead {
        fn read(&self, path: &Path) -> Result<MediaInfo> {
            self.ctx.cancel();
            self.inner.read(path)
        }
    }

    #[test]
    fn rescan_canceled_while_reading() {
        let f = fixture();
        let ctx = Context::background();

        let lib = LibraryBuilder::new(Config::memory())
            .metadata(Arc::new(CancelOnRead {
                inner: f.metadata.clone(),
                ctx: ctx.clone(),
            }))
            .open()
            .unwrap();
        lib.initialize().unwrap();
        lib.add_library_path(f.dir.path());

        assert!(matches!(lib.rescan(&ctx), Err(Error::Canceled)));
        assert_eq!(track_count(&lib), 0);
    }

    #[test]
    fn cancel_is_reported_when_every_read_is_skipped() {
        let f = fixture();
        let ctx = Context::background();
        ctx.cancel();

        let files: BTreeSet<PathBuf> = [f.dir.path().join("a/1.mp3"), f.dir.path().join("b/c/3.ogg")]
            .into_iter()
            .collect();
        let mut stat = ScanStat::default();

        assert!(matches!(
            f.lib.process_files(&ctx, files, &mut stat),
            Err(Error::Canceled)
        ));
        assert_eq!(stat, ScanStat::default());
        assert_eq!(f.metadata.reads(), 0);
    }

    #[test]
    fn parallel_readers_share_album() {
        let dir = tempfile::tempdir().unwrap();
        let metadata = Arc::new(FakeMetadata::new());

        for i in 0..50 {
            let path = touch(dir.path(), &format!("album/{:02}.mp3", i));
            metadata.put_file(
                path,
                media(&format!("artist {}", i % 5), "Compilation", &format!("song {}", i), i, 60),
            );
        }

        let lib = memory_library(metadata);
        lib.add_library_path(dir.path());

        assert_eq!(lib.scan().unwrap().added, 50);

        let paths = lib.get_album_fs_path_by_name("Compilation").unwrap();
        assert_eq!(paths.len(), 1);
    }

    #[test]
    fn scan_thread() {
        let f = fixture();
        let lib = Arc::new(f.lib);

        let scan_thread = ScanThread::new();
        assert!(scan_thread.wait().is_none());

        scan_thread.start(lib.clone());
        let stat = scan_thread.wait().unwrap().unwrap();

        assert_eq!(stat.added, 3);
        assert!(!scan_thread.is_running());
        assert_eq!(track_count(&lib), 3);
    }
}
