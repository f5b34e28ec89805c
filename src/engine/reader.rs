//! Input discovery, line validation and JSONL decoding into frames.

use super::EngineError;
use polars::prelude::{DataFrame, JsonFormat, JsonReader, SerReader};
use serde::Deserialize;
use serde_json::Value;
use std::io::{BufRead, BufReader, Cursor, Read};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// What to do with a line that is not a JSON object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MalformedMode {
    /// Abort the load on the first bad line.
    #[default]
    FailFast,
    /// Log and skip bad lines.
    DropMalformed,
}

fn is_glob(path: &Path) -> bool {
    path.to_string_lossy().contains(['*', '?', '['])
}

/// Job markers (`_SUCCESS`) and hidden files are not data.
fn is_data_file(path: &Path) -> bool {
    match path.file_name().and_then(|n| n.to_str()) {
        Some(name) => !name.starts_with('_') && !name.starts_with('.'),
        None => false,
    }
}

/// Resolve an input path (file, directory or glob pattern) to the list of files to read.
pub fn resolve_input_files(path: &Path) -> Result<Vec<PathBuf>, EngineError> {
    let roots = if is_glob(path) {
        let pattern = path.to_string_lossy().into_owned();
        let matches = glob::glob(&pattern).map_err(|e| EngineError::Pattern {
            pattern: pattern.clone(),
            source: e,
        })?;
        let mut roots = Vec::new();
        for entry in matches {
            let root = entry.map_err(|e| EngineError::Io {
                path: e.path().to_path_buf(),
                source: e.into_error(),
            })?;
            roots.push(root);
        }
        if roots.is_empty() {
            return Err(EngineError::PathNotFound {
                path: path.to_path_buf(),
            });
        }
        roots
    } else {
        if !path.exists() {
            return Err(EngineError::PathNotFound {
                path: path.to_path_buf(),
            });
        }
        vec![path.to_path_buf()]
    };

    let mut files = Vec::new();
    for root in roots {
        if root.is_dir() {
            files.extend(list_dir(&root)?);
        } else if is_data_file(&root) {
            files.push(root);
        }
    }
    files.sort();
    files.dedup();
    debug!(input = %path.display(), files = files.len(), "resolved input files");
    Ok(files)
}

fn list_dir(dir: &Path) -> Result<Vec<PathBuf>, EngineError> {
    let entries = std::fs::read_dir(dir).map_err(|e| EngineError::Io {
        path: dir.to_path_buf(),
        source: e,
    })?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| EngineError::Io {
            path: dir.to_path_buf(),
            source: e,
        })?;
        let path = entry.path();
        if path.is_file() && is_data_file(&path) {
            files.push(path);
        }
    }
    Ok(files)
}

fn open(path: &Path) -> std::io::Result<Box<dyn BufRead>> {
    let file = std::fs::File::open(path)?;
    let reader: Box<dyn Read> = if path.extension().is_some_and(|ext| ext == "zst") {
        Box::new(zstd::stream::read::Decoder::new(file)?)
    } else {
        Box::new(file)
    };
    Ok(Box::new(BufReader::new(reader)))
}

/// Lines that passed validation, ready for [`read_frame`].
#[derive(Debug, Default)]
pub struct ValidatedLines {
    pub buf: Vec<u8>,
    pub records: usize,
    pub dropped: usize,
}

/// Collect every non-blank line of `files` that holds a JSON object.
///
/// Line numbers in errors are 1-based and count blank lines.
pub fn read_lines(files: &[PathBuf], mode: MalformedMode) -> Result<ValidatedLines, EngineError> {
    let mut out = ValidatedLines::default();

    for path in files {
        let reader = open(path).map_err(|e| EngineError::Io {
            path: path.clone(),
            source: e,
        })?;

        for (idx, line) in reader.lines().enumerate() {
            let line = line.map_err(|e| EngineError::Io {
                path: path.clone(),
                source: e,
            })?;
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let line_no = idx + 1;

            let err = match serde_json::from_str::<Value>(trimmed) {
                Ok(Value::Object(_)) => {
                    out.buf.extend_from_slice(trimmed.as_bytes());
                    out.buf.push(b'\n');
                    out.records += 1;
                    continue;
                }
                Ok(_) => EngineError::NotAnObject {
                    path: path.clone(),
                    line: line_no,
                },
                Err(e) => EngineError::Malformed {
                    path: path.clone(),
                    line: line_no,
                    source: e,
                },
            };

            match mode {
                MalformedMode::FailFast => return Err(err),
                MalformedMode::DropMalformed => {
                    warn!(error = %err, "dropping malformed record");
                    out.dropped += 1;
                }
            }
        }
    }

    if out.dropped > 0 {
        warn!(dropped = out.dropped, "malformed records dropped during load");
    }
    Ok(out)
}

/// Decode JSONL bytes into a frame. The schema is inferred from every line,
/// so a key that first shows up late still becomes a column.
pub fn read_frame(buf: Vec<u8>) -> Result<DataFrame, EngineError> {
    let df = JsonReader::new(Cursor::new(buf))
        .with_json_format(JsonFormat::JsonLines)
        .infer_schema_len(None)
        .finish()?;
    Ok(df)
}
