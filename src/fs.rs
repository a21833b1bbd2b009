use std::collections::BTreeMap;
use std::ffi::OsString;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::RwLock;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: OsString,
    pub is_dir: bool,
}

/// Read-only view of the file system used for cover discovery.
pub trait Filesystem: Send + Sync {
    /// Immediate children of `path`, sorted by name.
    fn read_dir(&self, path: &Path) -> io::Result<Vec<DirEntry>>;
    fn read(&self, path: &Path) -> io::Result<Vec<u8>>;
}

#[derive(Debug, Default)]
pub struct OsFilesystem;

impl Filesystem for OsFilesystem {
    fn read_dir(&self, path: &Path) -> io::Result<Vec<DirEntry>> {
        let mut entries = Vec::new();

        for entry in std::fs::read_dir(path)? {
            let entry = entry?;
            entries.push(DirEntry {
                name: entry.file_name(),
                is_dir: entry.file_type()?.is_dir(),
            });
        }

        entries.sort_by(|a, b| a.name.cmp(&b.name));

        Ok(entries)
    }

    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        std::fs::read(path)
    }
}

/// In-memory file tree keyed by file path. Directories exist implicitly
/// through the files under them.
#[derive(Debug, Default)]
pub struct MemFilesystem {
    files: RwLock<BTreeMap<PathBuf, Vec<u8>>>,
}

impl MemFilesystem {
    pub fn new() -> MemFilesystem {
        Default::default()
    }

    pub fn insert<P: Into<PathBuf>>(&self, path: P, data: &[u8]) {
        self.files
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(path.into(), data.to_vec());
    }

    pub fn remove(&self, path: &Path) {
        self.files
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(path);
    }
}

impl Filesystem for MemFilesystem {
    fn read_dir(&self, path: &Path) -> io::Result<Vec<DirEntry>> {
        let files = self.files.read().unwrap_or_else(|e| e.into_inner());

        let mut children: BTreeMap<OsString, bool> = BTreeMap::new();
        let mut found = false;

        for file in files.keys() {
            let rest = match file.strip_prefix(path) {
                Ok(r) => r,
                Err(_) => continue,
            };

            let mut components = rest.components();
            let name = match components.next() {
                Some(Component::Normal(name)) => name.to_os_string(),
                // `path` is a file itself
                _ => continue,
            };

            found = true;

            let is_dir = components.next().is_some();
            let entry = children.entry(name).or_insert(is_dir);
            *entry = *entry || is_dir;
        }

        if !found {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("directory '{}' not found", path.display()),
            ));
        }

        Ok(children
            .into_iter()
            .map(|(name, is_dir)| DirEntry { name, is_dir })
            .collect())
    }

    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        let files = self.files.read().unwrap_or_else(|e| e.into_inner());

        match files.get(path) {
            Some(data) => Ok(data.clone()),
            None => Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("file '{}' not found", path.display()),
            )),
        }
    }
}
