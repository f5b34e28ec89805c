//! Overwrite-mode JSONL output.
//!
//! The output path is a directory holding one part file and a `_SUCCESS`
//! marker. It is assembled in a staging directory next to the destination
//! and renamed into place, so readers never see a partial write. Whatever
//! was at the destination before is moved aside first and only removed once
//! the new output is in place.

use super::EngineError;
use polars::prelude::{DataFrame, JsonFormat, JsonWriter, SerWriter};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const PART_FILE: &str = "part-00000.json";
const SUCCESS_MARKER: &str = "_SUCCESS";

/// Output settings for [`write_overwrite`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteOptions {
    /// zstd-compress the part file (`part-00000.json.zst`).
    pub compress: bool,
    pub compression_level: i32,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            compress: false,
            compression_level: 3,
        }
    }
}

/// What ended up on disk.
#[derive(Debug, Clone)]
pub struct WriteSummary {
    pub path: PathBuf,
    pub part_file: PathBuf,
    pub records: usize,
    pub bytes: u64,
}

/// Serialize a frame as JSONL, one object per row in schema order.
pub fn encode_jsonl(df: &mut DataFrame) -> Result<Vec<u8>, EngineError> {
    let mut buf = Vec::new();
    JsonWriter::new(&mut buf)
        .with_json_format(JsonFormat::JsonLines)
        .finish(df)?;
    Ok(buf)
}

fn write_err(path: &Path) -> impl FnOnce(std::io::Error) -> EngineError + '_ {
    move |source| EngineError::Write {
        path: path.to_path_buf(),
        source,
    }
}

fn remove_any(path: &Path) -> std::io::Result<()> {
    if path.is_dir() {
        std::fs::remove_dir_all(path)
    } else {
        std::fs::remove_file(path)
    }
}

/// Move `staged` to `dest`. An existing `dest` is renamed to `backup` first
/// and put back if the final rename fails.
fn swap_into_place(staged: &Path, dest: &Path, backup: &Path) -> Result<(), EngineError> {
    let had_previous = dest.exists();
    if had_previous {
        if backup.exists() {
            remove_any(backup).map_err(write_err(backup))?;
        }
        std::fs::rename(dest, backup).map_err(write_err(dest))?;
    }

    if let Err(e) = std::fs::rename(staged, dest) {
        if had_previous {
            if let Err(restore) = std::fs::rename(backup, dest) {
                warn!(
                    backup = %backup.display(),
                    error = %restore,
                    "could not restore previous output"
                );
            }
        }
        return Err(write_err(dest)(e));
    }

    if had_previous {
        if let Err(e) = remove_any(backup) {
            warn!(backup = %backup.display(), error = %e, "could not remove previous output");
        }
    }
    Ok(())
}

/// Write `df` to the directory `dest`, replacing anything already there.
pub fn write_overwrite(
    dest: &Path,
    df: &mut DataFrame,
    options: &WriteOptions,
) -> Result<WriteSummary, EngineError> {
    let parent = match dest.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&parent).map_err(write_err(&parent))?;

    let staging = tempfile::Builder::new()
        .prefix(".trace-flywheel-staging-")
        .tempdir_in(&parent)
        .map_err(write_err(&parent))?;

    let records = df.height();
    let mut data = encode_jsonl(df)?;
    let part_name = if options.compress {
        data = zstd::encode_all(data.as_slice(), options.compression_level)
            .map_err(write_err(staging.path()))?;
        format!("{PART_FILE}.zst")
    } else {
        PART_FILE.to_string()
    };

    let staged_part = staging.path().join(&part_name);
    std::fs::write(&staged_part, &data).map_err(write_err(&staged_part))?;
    let staged_marker = staging.path().join(SUCCESS_MARKER);
    std::fs::write(&staged_marker, b"").map_err(write_err(&staged_marker))?;

    let dest_name = dest
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    let backup = parent.join(format!(
        ".trace-flywheel-previous-{dest_name}.{}",
        std::process::id()
    ));

    // The staging guard's cleanup finds nothing once the rename succeeds.
    swap_into_place(staging.path(), dest, &backup)?;

    debug!(
        dest = %dest.display(),
        records,
        bytes = data.len(),
        "wrote output"
    );

    Ok(WriteSummary {
        path: dest.to_path_buf(),
        part_file: dest.join(part_name),
        records,
        bytes: data.len() as u64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::reader::read_frame;
    use crate::engine::{col, lit};
    use polars::prelude::IntoLazy;
    use serde_json::Value;
    use tempfile::tempdir;

    fn frame(lines: &[&str]) -> DataFrame {
        read_frame(lines.join("\n").into_bytes()).unwrap()
    }

    fn read_records(path: &Path) -> Vec<Value> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[test]
    fn writes_part_file_and_marker() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("out");
        let mut df = frame(&[r#"{"traceId":"1","totalLatency":10}"#]);

        let summary = write_overwrite(&dest, &mut df, &WriteOptions::default()).unwrap();

        assert_eq!(summary.records, 1);
        assert_eq!(summary.part_file, dest.join("part-00000.json"));
        assert!(dest.join("_SUCCESS").exists());
        let records = read_records(&summary.part_file);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["traceId"], "1");
        assert_eq!(records[0]["totalLatency"], 10);
    }

    #[test]
    fn missing_fields_are_written_as_null() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("out");
        let mut df = frame(&[r#"{"traceId":"1"}"#, r#"{"traceId":"2","error":false}"#]);

        let summary = write_overwrite(&dest, &mut df, &WriteOptions::default()).unwrap();
        let records = read_records(&summary.part_file);
        assert!(records[0]["error"].is_null());
        assert_eq!(records[1]["error"], false);
    }

    #[test]
    fn replaces_existing_directory() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("out");
        std::fs::create_dir(&dest).unwrap();
        std::fs::write(dest.join("stale.json"), "old").unwrap();

        write_overwrite(&dest, &mut frame(&[r#"{"a":1}"#]), &WriteOptions::default()).unwrap();

        assert!(!dest.join("stale.json").exists());
        assert!(dest.join("part-00000.json").exists());
    }

    #[test]
    fn replaces_existing_file() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("out");
        std::fs::write(&dest, "a plain file").unwrap();

        write_overwrite(&dest, &mut frame(&[r#"{"a":1}"#]), &WriteOptions::default()).unwrap();
        assert!(dest.is_dir());
    }

    #[test]
    fn rewriting_does_not_accumulate() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("out");
        let mut df = frame(&[r#"{"a":1}"#, r#"{"a":2}"#]);

        write_overwrite(&dest, &mut df, &WriteOptions::default()).unwrap();
        let first = std::fs::read(dest.join("part-00000.json")).unwrap();
        write_overwrite(&dest, &mut df, &WriteOptions::default()).unwrap();
        let second = std::fs::read(dest.join("part-00000.json")).unwrap();

        assert_eq!(first, second);
        assert_eq!(std::fs::read_dir(&dest).unwrap().count(), 2);
    }

    #[test]
    fn empty_frame_still_writes_part_file() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("out");
        let mut empty = frame(&[r#"{"a":1}"#])
            .lazy()
            .filter(col("a").gt(lit(5)))
            .collect()
            .unwrap();

        let summary = write_overwrite(&dest, &mut empty, &WriteOptions::default()).unwrap();

        assert_eq!(summary.records, 0);
        assert!(summary.part_file.exists());
        assert!(read_records(&summary.part_file).is_empty());
    }

    #[test]
    fn compressed_output_is_valid_zstd() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("out");
        let options = WriteOptions {
            compress: true,
            ..Default::default()
        };

        let summary = write_overwrite(&dest, &mut frame(&[r#"{"a":1}"#]), &options).unwrap();

        assert_eq!(summary.part_file, dest.join("part-00000.json.zst"));
        let compressed = std::fs::read(&summary.part_file).unwrap();
        let decompressed = zstd::decode_all(compressed.as_slice()).unwrap();
        let record: Value =
            serde_json::from_str(String::from_utf8(decompressed).unwrap().trim()).unwrap();
        assert_eq!(record["a"], 1);
    }

    #[test]
    fn no_staging_or_backup_left_behind() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("out");
        write_overwrite(&dest, &mut frame(&[r#"{"a":1}"#]), &WriteOptions::default()).unwrap();
        write_overwrite(&dest, &mut frame(&[r#"{"a":2}"#]), &WriteOptions::default()).unwrap();

        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .flatten()
            .filter(|e| e.file_name().to_string_lossy().starts_with(".trace-flywheel"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn failed_swap_restores_previous_output() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("out");
        std::fs::create_dir(&dest).unwrap();
        std::fs::write(dest.join("part-00000.json"), "previous run\n").unwrap();
        let missing_stage = dir.path().join(".trace-flywheel-staging-gone");
        let backup = dir.path().join(".trace-flywheel-previous-out");

        let err = swap_into_place(&missing_stage, &dest, &backup).unwrap_err();

        assert!(matches!(err, EngineError::Write { .. }));
        assert_eq!(
            std::fs::read_to_string(dest.join("part-00000.json")).unwrap(),
            "previous run\n"
        );
        assert!(!backup.exists());
    }

    #[test]
    fn swap_replaces_stale_backup() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("out");
        let staged = dir.path().join("staged");
        let backup = dir.path().join(".trace-flywheel-previous-out");
        std::fs::create_dir(&dest).unwrap();
        std::fs::create_dir(&staged).unwrap();
        std::fs::write(staged.join("part-00000.json"), "new\n").unwrap();
        std::fs::write(&backup, "left over from a crash").unwrap();

        swap_into_place(&staged, &dest, &backup).unwrap();

        assert_eq!(
            std::fs::read_to_string(dest.join("part-00000.json")).unwrap(),
            "new\n"
        );
        assert!(!backup.exists());
        assert!(!staged.exists());
    }
}
