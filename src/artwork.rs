use std::io::{Cursor, ErrorKind, Read};
use std::path::Path;
use std::str::FromStr;

use crate::catalog::{self, AlbumRow};
use crate::context::Context;
use crate::error::{Error, Result};
use crate::fs::Filesystem;
use crate::library::Library;

/// Largest artwork accepted by `save_album_artwork`.
pub const MAX_ARTWORK_SIZE: usize = 5 * 1024 * 1024;

// This list is what extensions image crate recognizes
const IMAGE_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "webp", "tif", "tiff", "tga", "bmp", "ico", "hdr", "pbm", "pam",
    "ppm", "pgm",
];

// SQL LIKE patterns (`%` only) matched in memory against the lowercased file
// stem, since covers are listed through `Filesystem`. Earlier patterns win.
const COVER_PATTERNS: &[&str] = &[
    "cover",
    "front",
    "folder",
    "album cover",
    "albumcover",
    "albumart",
    "album",
    "cover%",
    "front%",
    "folder%",
    "%cover%",
    "%front%",
    "%folder%",
    "%albumart%",
    "%artwork%",
    "%album%",
    "%jacket%",
    "%card%",
];

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ImageSize {
    Original,
    Small,
}

impl ImageSize {
    pub fn as_i64(self) -> i64 {
        match self {
            ImageSize::Original => 0,
            ImageSize::Small => 1,
        }
    }
}

impl FromStr for ImageSize {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<ImageSize, String> {
        match s {
            "original" => Ok(ImageSize::Original),
            "small" => Ok(ImageSize::Small),
            _ => Err(format!("unknown image size '{}'", s)),
        }
    }
}

/// Remote lookup of album front covers. `Ok(None)` means the provider has no
/// image for the album.
pub trait ArtFinder: Send + Sync {
    fn get_front_image(&self, ctx: &Context, artist: &str, album: &str)
        -> Result<Option<Vec<u8>>>;
}

/// Finder for libraries without a remote provider.
#[derive(Debug, Default)]
pub struct NoFinder;

impl ArtFinder for NoFinder {
    fn get_front_image(
        &self,
        _ctx: &Context,
        artist: &str,
        album: &str,
    ) -> Result<Option<Vec<u8>>> {
        trace!("no finder for '{}' by '{}'", album, artist);
        Ok(None)
    }
}

/// SQL LIKE semantics for `%` only, `s` is expected lowercased.
fn like(pattern: &str, s: &str) -> bool {
    match pattern.find('%') {
        None => pattern == s,
        Some(0) => {
            let rest = &pattern[1..];
            if rest.is_empty() {
                return true;
            }
            s.char_indices()
                .map(|(i, _)| i)
                .chain(std::iter::once(s.len()))
                .any(|i| like(rest, &s[i..]))
        }
        Some(i) => s.starts_with(&pattern[..i]) && like(&pattern[i..], &s[i..]),
    }
}

fn cover_rank(file_name: &str) -> Option<usize> {
    if file_name.starts_with('.') {
        return None;
    }

    let file_path = Path::new(file_name);

    let extension = file_path.extension()?.to_str()?.to_lowercase();
    if !IMAGE_EXTENSIONS.iter().any(|&e| e == extension) {
        return None;
    }

    let stem = file_path.file_stem()?.to_str()?.to_lowercase();

    COVER_PATTERNS.iter().position(|p| like(p, &stem))
}

/// Looks for a cover image directly inside `dir`.
pub fn find_cover(fs: &dyn Filesystem, dir: &Path) -> Result<Option<Vec<u8>>> {
    let entries = match fs.read_dir(dir) {
        Ok(e) => e,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            trace!("album directory '{}' not found", dir.display());
            return Ok(None);
        }
        Err(e) => return Err(e.into()),
    };

    let mut best: Option<(usize, String)> = None;

    for entry in entries.iter().filter(|e| !e.is_dir) {
        let name = match entry.name.to_str() {
            Some(n) => n,
            None => continue,
        };

        let rank = match cover_rank(name) {
            Some(r) => r,
            None => continue,
        };

        let better = match &best {
            Some((best_rank, best_name)) => (rank, name) < (*best_rank, best_name.as_str()),
            None => true,
        };

        if better {
            best = Some((rank, name.to_string()));
        }
    }

    match best {
        Some((_, name)) => {
            let cover_path = dir.join(name);
            debug!("found cover '{}'", cover_path.display());
            Ok(Some(fs.read(&cover_path)?))
        }
        None => Ok(None),
    }
}

impl Library {
    fn album_row(&self, album_id: i64) -> Result<AlbumRow> {
        self.catalog
            .with_conn(|conn| catalog::album(conn, album_id))?
            .ok_or(Error::AlbumNotFound)
    }

    fn cached_artwork(&self, album_id: i64, size: ImageSize) -> Result<Option<Vec<u8>>> {
        self.catalog
            .with_conn(|conn| catalog::artwork(conn, album_id, size.as_i64()))
    }

    fn store_artwork(&self, album_id: i64, size: ImageSize, image: &[u8]) -> Result<()> {
        self.catalog
            .with_conn(|conn| catalog::set_artwork(conn, album_id, size.as_i64(), image))
    }

    fn find_original(&self, ctx: &Context, album: &AlbumRow) -> Result<Vec<u8>> {
        if let Some(cover) = find_cover(self.fs.as_ref(), &album.fs_path)? {
            return Ok(cover);
        }

        ctx.check()?;

        let artist = self
            .catalog
            .with_conn(|conn| catalog::album_artist(conn, album.id))?
            .unwrap_or_default();

        debug!("asking finder for '{}' by '{}'", album.name, artist);

        match self.finder.get_front_image(ctx, &artist, &album.name)? {
            Some(image) => Ok(image),
            None => Err(Error::ArtworkNotFound),
        }
    }

    /// Artwork of the album in `size`. Missing images are looked up in the
    /// album directory, then with the finder, and cached.
    pub fn find_and_save_album_artwork(
        &self,
        ctx: &Context,
        album_id: i64,
        size: ImageSize,
    ) -> Result<Box<dyn Read + Send>> {
        ctx.check()?;

        let album = self.album_row(album_id)?;

        if let Some(image) = self.cached_artwork(album_id, size)? {
            trace!("artwork cache hit album_id={} size={:?}", album_id, size);
            return Ok(Box::new(Cursor::new(image)));
        }

        let original = match self.cached_artwork(album_id, ImageSize::Original)? {
            Some(image) => image,
            None => {
                let image = self.find_original(ctx, &album)?;
                ctx.check()?;
                self.store_artwork(album_id, ImageSize::Original, &image)?;
                image
            }
        };

        if size == ImageSize::Original {
            return Ok(Box::new(Cursor::new(original)));
        }

        let scaled = self
            .scaler
            .scale(ctx, &mut original.as_slice(), self.small_artwork_width)?;

        ctx.check()?;
        self.store_artwork(album_id, size, &scaled)?;

        Ok(Box::new(Cursor::new(scaled)))
    }

    /// Replaces the album's artwork with the image read from `reader`.
    pub fn save_album_artwork(
        &self,
        ctx: &Context,
        album_id: i64,
        reader: &mut dyn Read,
    ) -> Result<()> {
        ctx.check()?;
        self.album_row(album_id)?;

        let mut image = Vec::new();
        reader
            .take(MAX_ARTWORK_SIZE as u64 + 1)
            .read_to_end(&mut image)?;

        if image.len() > MAX_ARTWORK_SIZE {
            return Err(Error::ArtworkTooLarge(MAX_ARTWORK_SIZE));
        }

        ctx.check()?;

        debug!("save artwork album_id={} bytes={}", album_id, image.len());

        self.catalog.with_conn(|conn| {
            catalog::replace_artwork(conn, album_id, ImageSize::Original.as_i64(), &image)
        })
    }

    pub fn remove_album_artwork(&self, ctx: &Context, album_id: i64) -> Result<()> {
        ctx.check()?;
        self.album_row(album_id)?;

        let removed = self
            .catalog
            .with_conn(|conn| catalog::delete_artwork(conn, album_id))?;

        debug!("removed {} artwork rows of album {}", removed, album_id);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::Arc;

    use super::*;
    use crate::catalog::FileInfo;
    use crate::fs::MemFilesystem;
    use crate::test_util::{media, FakeFinder, FakeMetadata, FakeScaler};
    use crate::{Config, LibraryBuilder};

    const BIG_IMAGE: &[u8] = b"big-image-is-really-bigger-than-the-small";
    const SECOND_BIG_IMAGE: &[u8] = b"second-album-original-image";
    const SMALL_IMAGE: &[u8] = b"small-image";
    const THIRD_ALBUM_COVER: &[u8] = b"expected-cover-file-contents";

    struct Fixture {
        lib: Library,
        finder: Arc<FakeFinder>,
        scaler: Arc<FakeScaler>,
        fs: Arc<MemFilesystem>,
    }

    fn fixture() -> Fixture {
        let finder = Arc::new(FakeFinder::new());
        finder.put("Testy Testov", "The Test Strikes Back", BIG_IMAGE);

        let scaler = Arc::new(FakeScaler::new(SMALL_IMAGE));

        let fs = Arc::new(MemFilesystem::new());
        fs.insert("path/to/albums/1/first.mp3", b"some-file");
        fs.insert("path/to/albums/3/third.mp3", b"third-file");
        fs.insert("path/to/albums/3/inner/cover.png", b"inner/cover.png");
        fs.insert("path/to/albums/3/.cover.png", b".cover.png");
        fs.insert("path/to/albums/3/cover-me-baby.jpeg", b"cover-me-baby.jpeg");
        fs.insert("path/to/albums/3/some-artwork-here.jpg", b"some-artwork-here.jpg");
        fs.insert("path/to/albums/3/cover.png", THIRD_ALBUM_COVER);

        let lib = LibraryBuilder::new(Config::memory())
            .metadata(Arc::new(FakeMetadata::new()))
            .art_finder(finder.clone())
            .scaler(scaler.clone())
            .filesystem(fs.clone())
            .open()
            .unwrap();
        lib.initialize().unwrap();

        let files = [
            ("Testy Testov", "The Test Strikes Back", "One Final Bug", "path/to/albums/1/first.mp3"),
            ("Unit Runner", "The Test Strikes Back", "Good Coverage", "path/to/albums/2/second.mp3"),
            ("Unit Runner", "Into The New Regressions We Go", "Forever More", "path/to/albums/3/third.mp3"),
        ];

        for (i, (artist, album, title, path)) in files.iter().enumerate() {
            lib.insert_media(
                &media(artist, album, title, i as i64 + 1, 334),
                &FileInfo {
                    path: PathBuf::from(path),
                    size: 1,
                    modified: 1,
                },
            )
            .unwrap();
        }

        Fixture {
            lib,
            finder,
            scaler,
            fs,
        }
    }

    fn read_artwork(lib: &Library, album_id: i64, size: ImageSize) -> Result<Vec<u8>> {
        let mut reader = lib.find_and_save_album_artwork(&Context::background(), album_id, size)?;
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        Ok(data)
    }

    #[test]
    fn finder_fallback_then_cache() {
        let f = fixture();

        assert_eq!(read_artwork(&f.lib, 1, ImageSize::Small).unwrap(), SMALL_IMAGE);
        assert_eq!(f.finder.calls(), 1);
        assert_eq!(f.scaler.widths(), vec![60]);

        // Original was stored while creating the small one
        assert_eq!(read_artwork(&f.lib, 1, ImageSize::Original).unwrap(), BIG_IMAGE);
        assert_eq!(read_artwork(&f.lib, 1, ImageSize::Small).unwrap(), SMALL_IMAGE);

        assert_eq!(f.finder.calls(), 1);
        assert_eq!(f.scaler.calls(), 1);
    }

    #[test]
    fn missing_album() {
        let f = fixture();

        assert!(matches!(
            read_artwork(&f.lib, 42, ImageSize::Original),
            Err(Error::AlbumNotFound)
        ));
    }

    #[test]
    fn saved_original_is_scaled_once() {
        let f = fixture();
        let ctx = Context::background();

        f.lib
            .save_album_artwork(&ctx, 2, &mut &SECOND_BIG_IMAGE[..])
            .unwrap();

        assert_eq!(read_artwork(&f.lib, 2, ImageSize::Original).unwrap(), SECOND_BIG_IMAGE);
        assert_eq!(read_artwork(&f.lib, 2, ImageSize::Small).unwrap(), SMALL_IMAGE);
        assert_eq!(read_artwork(&f.lib, 2, ImageSize::Small).unwrap(), SMALL_IMAGE);

        assert_eq!(f.scaler.calls(), 1);
        assert_eq!(f.finder.calls(), 0);
    }

    #[test]
    fn save_replaces_variants() {
        let f = fixture();
        let ctx = Context::background();

        read_artwork(&f.lib, 1, ImageSize::Small).unwrap();

        f.lib
            .save_album_artwork(&ctx, 1, &mut &SECOND_BIG_IMAGE[..])
            .unwrap();

        assert_eq!(read_artwork(&f.lib, 1, ImageSize::Original).unwrap(), SECOND_BIG_IMAGE);
        read_artwork(&f.lib, 1, ImageSize::Small).unwrap();
        assert_eq!(f.scaler.calls(), 2);
        assert_eq!(f.scaler.inputs().last().unwrap().as_slice(), SECOND_BIG_IMAGE);
    }

    #[test]
    fn filesystem_cover() {
        let f = fixture();

        assert_eq!(
            read_artwork(&f.lib, 3, ImageSize::Original).unwrap(),
            THIRD_ALBUM_COVER
        );
        assert_eq!(f.finder.calls(), 0);
    }

    #[test]
    fn remove_then_resolve_runs_chain_again() {
        let f = fixture();
        let ctx = Context::background();

        f.lib
            .save_album_artwork(&ctx, 2, &mut &SECOND_BIG_IMAGE[..])
            .unwrap();
        f.lib.remove_album_artwork(&ctx, 2).unwrap();

        assert!(matches!(
            read_artwork(&f.lib, 2, ImageSize::Original),
            Err(Error::ArtworkNotFound)
        ));
        assert_eq!(f.finder.calls(), 1);

        // Nothing was cached for the failed lookup
        assert!(matches!(
            read_artwork(&f.lib, 2, ImageSize::Small),
            Err(Error::ArtworkNotFound)
        ));
        assert_eq!(f.finder.calls(), 2);
    }

    #[test]
    fn removed_cover_file_keeps_cached_original() {
        let f = fixture();

        read_artwork(&f.lib, 3, ImageSize::Original).unwrap();
        f.fs.remove(Path::new("path/to/albums/3/cover.png"));

        assert_eq!(
            read_artwork(&f.lib, 3, ImageSize::Original).unwrap(),
            THIRD_ALBUM_COVER
        );
    }

    #[test]
    fn save_too_large() {
        let f = fixture();
        let big = vec![0u8; MAX_ARTWORK_SIZE + 1];

        assert!(matches!(
            f.lib
                .save_album_artwork(&Context::background(), 1, &mut big.as_slice()),
            Err(Error::ArtworkTooLarge(_))
        ));
        assert!(matches!(
            f.lib
                .save_album_artwork(&Context::background(), 42, &mut &b"x"[..]),
            Err(Error::AlbumNotFound)
        ));
    }

    #[test]
    fn canceled_context() {
        let f = fixture();
        let ctx = Context::background();
        ctx.cancel();

        assert!(matches!(
            f.lib.find_and_save_album_artwork(&ctx, 1, ImageSize::Small),
            Err(Error::Canceled)
        ));
        assert_eq!(f.finder.calls(), 0);
    }

    #[test]
    fn cover_patterns() {
        assert_eq!(cover_rank("cover.png"), Some(0));
        assert_eq!(cover_rank("Cover.JPG"), Some(0));
        assert_eq!(cover_rank(".cover.png"), None);
        assert_eq!(cover_rank("cover.txt"), None);
        assert_eq!(cover_rank("cover-me-baby.jpeg"), Some(7));
        assert!(cover_rank("some-artwork-here.jpg").is_some());
        assert_eq!(cover_rank("track01.jpg"), None);

        assert!(like("%cover%", "the cover art"));
        assert!(like("front%", "front"));
        assert!(!like("front%", "the front"));
    }

    #[test]
    fn find_cover_ignores_nested_and_missing() {
        let fs = MemFilesystem::new();
        fs.insert("a/inner/cover.png", b"inner");
        fs.insert("a/folder.jpg", b"folder");
        fs.insert("a/Front.jpg", b"front");

        assert_eq!(find_cover(&fs, Path::new("a")).unwrap(), Some(b"front".to_vec()));
        assert_eq!(find_cover(&fs, Path::new("b")).unwrap(), None);
    }
}
