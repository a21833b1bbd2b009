use std::path::Path;

const SUPPORTED_EXTENSIONS: &[&str] = &["mp3", "ogg", "wav", "fla", "flac", "opus", "webm"];

/// Whether the file name looks like an audio file the library can catalog.
/// Only the name is inspected.
pub fn is_supported(path: &Path) -> bool {
    let stem = match path.file_stem() {
        Some(s) => s,
        None => return false,
    };

    if stem.is_empty() {
        return false;
    }

    // `.mp3` has the stem ".mp3" and no extension
    let extension = match path.extension().and_then(|e| e.to_str()) {
        Some(e) => e.to_ascii_lowercase(),
        None => return false,
    };

    SUPPORTED_EXTENSIONS.iter().any(|&e| e == extension)
}
