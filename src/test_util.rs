use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::artwork::ArtFinder;
use crate::config::Config;
use crate::context::Context;
use crate::error::{Error, Result};
use crate::library::{Library, LibraryBuilder};
use crate::media_info::{MediaInfo, MediaMetadata};
use crate::scaler::Scaler;

pub fn media(artist: &str, album: &str, title: &str, track: i64, secs: u64) -> MediaInfo {
    MediaInfo {
        artist: artist.to_string(),
        album: album.to_string(),
        title: title.to_string(),
        track,
        duration: Duration::from_secs(secs),
    }
}

pub fn memory_library(metadata: Arc<FakeMetadata>) -> Library {
    let lib = LibraryBuilder::new(Config::memory())
        .metadata(metadata)
        .art_finder(Arc::new(FakeFinder::new()))
        .scaler(Arc::new(FakeScaler::new(b"small")))
        .open()
        .unwrap();
    lib.initialize().unwrap();
    lib
}

/// Tags keyed by path. Unknown paths fail like unreadable files do.
#[derive(Default)]
pub struct FakeMetadata {
    files: Mutex<HashMap<PathBuf, MediaInfo>>,
    reads: AtomicUsize,
}

impl FakeMetadata {
    pub fn new() -> FakeMetadata {
        Default::default()
    }

    pub fn put_file<P: Into<PathBuf>>(&self, path: P, info: MediaInfo) {
        self.files.lock().unwrap().insert(path.into(), info);
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

impl MediaMetadata for FakeMetadata {
    fn read(&self, path: &Path) -> Result<MediaInfo> {
        self.reads.fetch_add(1, Ordering::SeqCst);

        match self.files.lock().unwrap().get(path) {
            Some(info) => Ok(info.clone()),
            None => Err(Error::Metadata {
                path: path.to_path_buf(),
                reason: "no tags".to_string(),
            }),
        }
    }
}

#[derive(Default)]
pub struct FakeFinder {
    images: Mutex<HashMap<(String, String), Vec<u8>>>,
    calls: AtomicUsize,
}

impl FakeFinder {
    pub fn new() -> FakeFinder {
        Default::default()
    }

    pub fn put(&self, artist: &str, album: &str, image: &[u8]) {
        self.images
            .lock()
            .unwrap()
            .insert((artist.to_string(), album.to_string()), image.to_vec());
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ArtFinder for FakeFinder {
    fn get_front_image(
        &self,
        _ctx: &Context,
        artist: &str,
        album: &str,
    ) -> Result<Option<Vec<u8>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        Ok(self
            .images
            .lock()
            .unwrap()
            .get(&(artist.to_string(), album.to_string()))
            .cloned())
    }
}

/// Answers every request with the same bytes, recording what it was given.
pub struct FakeScaler {
    output: Vec<u8>,
    requests: Mutex<Vec<(Vec<u8>, u32)>>,
}

impl FakeScaler {
    pub fn new(output: &[u8]) -> FakeScaler {
        FakeScaler {
            output: output.to_vec(),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn widths(&self) -> Vec<u32> {
        self.requests.lock().unwrap().iter().map(|r| r.1).collect()
    }

    pub fn inputs(&self) -> Vec<Vec<u8>> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.0.clone())
            .collect()
    }
}

impl Scaler for FakeScaler {
    fn scale(&self, _ctx: &Context, image: &mut dyn Read, width: u32) -> Result<Vec<u8>> {
        let mut input = Vec::new();
        image.read_to_end(&mut input)?;

        assert!(!input.is_empty(), "input image is empty");

        self.requests.lock().unwrap().push((input, width));

        Ok(self.output.clone())
    }
}
