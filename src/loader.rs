use std::{fs, path::Path};

use tracing::debug;

use crate::diagnostics::{PeslError, Result};

const SOURCE_SUFFIX: &str = ".pesl";

/// Checks and reads each path in listing order, joining the contents with one
/// space. The first bad or unreadable path stops loading.
pub fn load_sources<P: AsRef<str>>(paths: &[P]) -> Result<String> {
    let mut contents = Vec::with_capacity(paths.len());
    for path in paths {
        let path = path.as_ref();
        if !is_source_file(Path::new(path)) {
            return Err(PeslError::FileValidation {
                path: path.to_string(),
            });
        }
        let text = fs::read_to_string(path).map_err(|source| PeslError::FileRead {
            path: path.to_string(),
            source,
        })?;
        debug!(path, chars = text.chars().count(), "loaded source file");
        contents.push(text);
    }
    Ok(contents.join(" "))
}

/// A regular file named `<stem>.pesl` with a non-empty stem.
pub fn is_source_file(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
        return false;
    };
    path.is_file() && name.ends_with(SOURCE_SUFFIX) && name.chars().count() > SOURCE_SUFFIX.len()
}
