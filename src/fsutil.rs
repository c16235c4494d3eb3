use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};

/// Error that occurs when a file cannot be opened or read.
#[derive(Debug, thiserror::Error)]
#[error("failed to {op} file `{path}`: {source}")]
pub struct FileError {
    pub op: &'static str,
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

impl FileError {
    pub(crate) fn new(op: &'static str, path: &Path, source: io::Error) -> Self {
        Self {
            op,
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Opens a file at the given path and wraps it in a [`BufReader`].
///
/// # Errors
///
/// Returns a [`FileError`] if the file cannot be opened.
///
/// # Example
/// ```no_run
/// # use ctrace::fsutil;
/// let reader = fsutil::open_file_reader("/some/file.txt")?;
/// # Ok::<(), fsutil::FileError>(())
/// ```
pub fn open_file_reader(path: impl AsRef<Path>) -> Result<BufReader<File>, FileError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| FileError::new("open", path, source))?;
    Ok(BufReader::new(file))
}

/// Reads all lines of the file at `path`.
///
/// Returns `Ok(None)` if the file does not exist, which callers treat as
/// "no data" rather than as a failure.
pub fn read_lines_if_exists(path: impl AsRef<Path>) -> Result<Option<Vec<String>>, FileError> {
    let path = path.as_ref();
    let reader = match File::open(path) {
        Ok(file) => BufReader::new(file),
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(source) => return Err(FileError::new("open", path, source)),
    };

    reader
        .lines()
        .collect::<io::Result<Vec<_>>>()
        .map(Some)
        .map_err(|source| FileError::new("read", path, source))
}

/// Writes `contents` to `path`, creating missing parent directories.
pub fn write_file(path: impl AsRef<Path>, contents: impl AsRef<[u8]>) -> Result<(), FileError> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .map_err(|source| FileError::new("create parent directory of", path, source))?;
    }
    std::fs::write(path, contents).map_err(|source| FileError::new("write", path, source))
}

/// Returns the first path in `candidates` that exists, or the first candidate if none do.
pub fn first_existing(candidates: &[PathBuf]) -> Option<PathBuf> {
    candidates
        .iter()
        .find(|path| path.exists())
        .or_else(|| candidates.first())
        .cloned()
}
