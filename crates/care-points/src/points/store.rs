use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Error raised while writing (or explicitly reading) a CSV table.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid table data: {0}")]
    Csv(#[from] csv::Error),
}

/// How the backing file looked when a table was read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SourceState {
    #[default]
    Missing,
    Loaded,
    Unreadable,
}

/// Rows decoded from one CSV file plus the rows that could not be decoded.
#[derive(Debug, Clone)]
pub struct Table<T> {
    pub rows: Vec<T>,
    pub skipped: usize,
    pub source: SourceState,
}

impl<T> Default for Table<T> {
    fn default() -> Self {
        Self {
            rows: Vec::new(),
            skipped: 0,
            source: SourceState::Missing,
        }
    }
}

/// Reads a headed CSV table with every field trimmed. Never fails: a missing
/// or unreadable file is an empty table and undecodable rows are counted and
/// dropped.
pub fn read_table<T: DeserializeOwned>(path: &Path) -> Table<T> {
    read_table_with(path, csv::Trim::All)
}

/// [`read_table`] with an explicit trimming mode.
pub fn read_table_with<T: DeserializeOwned>(path: &Path, trim: csv::Trim) -> Table<T> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "table file absent, starting empty");
            return Table::default();
        }
        Err(err) => {
            warn!(path = %path.display(), error = %err, "table file unreadable, treating as empty");
            return Table {
                source: SourceState::Unreadable,
                ..Table::default()
            };
        }
    };

    let text = String::from_utf8_lossy(&bytes);
    let text = text.trim_start_matches('\u{feff}');
    let mut reader = csv::ReaderBuilder::new()
        .trim(trim)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut table = Table {
        rows: Vec::new(),
        skipped: 0,
        source: SourceState::Loaded,
    };
    for (index, row) in reader.deserialize::<T>().enumerate() {
        match row {
            Ok(row) => table.rows.push(row),
            Err(err) => {
                warn!(path = %path.display(), row = index + 1, error = %err, "skipping undecodable row");
                table.skipped += 1;
            }
        }
    }

    debug!(path = %path.display(), rows = table.rows.len(), skipped = table.skipped, "table loaded");
    table
}

/// Serializes `rows` under `headers` and atomically replaces the file at `path`.
pub fn write_table<T: Serialize>(
    path: &Path,
    headers: &[&str],
    rows: &[T],
) -> Result<(), StoreError> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    writer.write_record(headers)?;
    for row in rows {
        writer.serialize(row)?;
    }
    let bytes = writer.into_inner().map_err(|err| StoreError::Io {
        path: path.to_path_buf(),
        source: err.into_error(),
    })?;

    write_atomic(path, &bytes)?;
    debug!(path = %path.display(), rows = rows.len(), "table saved");
    Ok(())
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let io_error = |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    };
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&parent).map_err(io_error)?;

    let tmp = parent.join(format!(
        ".{}.tmp.{}",
        path.file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("table"),
        std::process::id()
    ));
    {
        let mut file = std::fs::File::create(&tmp).map_err(io_error)?;
        file.write_all(bytes).map_err(io_error)?;
        file.sync_all().map_err(io_error)?;
    }
    std::fs::rename(&tmp, path).map_err(io_error)?;
    if let Ok(dir) = std::fs::File::open(&parent) {
        let _ = dir.sync_all();
    }
    Ok(())
}
