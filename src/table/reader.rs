use std::{fs::File, io::Read, path::Path};

use csv::ReaderBuilder;
use tracing::debug;

use super::Table;
use crate::error::{EnrichError, Result};

/// Open `path` and load the whole CSV into memory.
pub fn read_path(path: &Path) -> Result<Table> {
    let file = File::open(path).map_err(|source| EnrichError::Input {
        path: path.to_path_buf(),
        source,
    })?;
    read_all(file, path)
}

/// Parse every record from `src`. The first record is the header.
///
/// Records must all have the header's field count; a ragged record is a
/// format error rather than being padded or truncated. `path` is only used
/// to label errors.
pub fn read_all<R: Read>(src: R, path: &Path) -> Result<Table> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(false)
        .flexible(false)
        .from_reader(src);

    let mut records = rdr.records();
    let headers: Vec<String> = match records.next() {
        Some(first) => first
            .map_err(|source| format_error(path, source))?
            .iter()
            .map(|s| s.to_string())
            .collect(),
        None => {
            return Err(EnrichError::EmptyInput {
                path: path.to_path_buf(),
            })
        }
    };

    let mut rows = Vec::new();
    for result in records {
        let record = result.map_err(|source| format_error(path, source))?;
        rows.push(record.iter().map(|s| s.to_string()).collect());
    }

    debug!(path = %path.display(), columns = headers.len(), rows = rows.len(), "parsed csv");
    Ok(Table { headers, rows })
}

fn format_error(path: &Path, source: csv::Error) -> EnrichError {
    EnrichError::Format {
        path: path.to_path_buf(),
        source,
    }
}
