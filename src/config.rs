use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq)]
pub enum StoreLocation {
    Memory,
    File(PathBuf),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub store: StoreLocation,
    pub roots: Vec<PathBuf>,
    /// Number of threads reading tags during scans.
    pub scan_workers: usize,
    /// Width in pixels of the small artwork variant.
    pub small_artwork_width: u32,
}

pub const DEFAULT_SMALL_ARTWORK_WIDTH: u32 = 60;

impl Config {
    pub fn new(store: StoreLocation) -> Config {
        Config {
            store,
            roots: Vec::new(),
            scan_workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            small_artwork_width: DEFAULT_SMALL_ARTWORK_WIDTH,
        }
    }

    pub fn memory() -> Config {
        Config::new(StoreLocation::Memory)
    }
}
