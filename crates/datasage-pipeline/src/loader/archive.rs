//! Payload normalisation: archives, workbooks and legacy encodings.
//!
//! Each helper turns an input the readers cannot take directly into a plain
//! file inside a fresh [`TempDir`]. The directory travels with the loaded
//! table so deferred plans can keep scanning the file.

use crate::error::{PipelineError, Result};
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info};

/// A normalised file and the scratch directory that owns it.
#[derive(Debug)]
pub struct StagedFile {
    pub dir: TempDir,
    pub path: PathBuf,
}

// ============================================================================
// Zip archives
// ============================================================================

/// Extract the first file entry of a zip archive.
///
/// Directory entries and names containing `..` are skipped. An archive with
/// no usable entry is a validation failure; a malformed one is a load failure.
pub fn extract_first_entry(path: &Path) -> Result<StagedFile> {
    let file = File::open(path)?;
    let mut archive = zip::ZipArchive::new(file)
        .map_err(|e| PipelineError::LoadFailed(format!("Invalid zip archive: {e}")))?;

    let dir = tempfile::tempdir()?;
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let name = entry.name().to_string();
        if name.contains("..") {
            debug!("Skipping archive entry with parent traversal: {}", name);
            continue;
        }
        if entry.is_dir() {
            continue;
        }

        let file_name = Path::new(&name)
            .file_name()
            .map(|n| n.to_os_string())
            .ok_or_else(|| PipelineError::LoadFailed(format!("Bad archive entry '{name}'")))?;
        let out_path = dir.path().join(file_name);

        let mut buf = Vec::new();
        entry.read_to_end(&mut buf)?;
        fs::write(&out_path, &buf)?;

        info!("Extracted '{}' ({} bytes) from archive", name, buf.len());
        return Ok(StagedFile {
            dir,
            path: out_path,
        });
    }

    Err(PipelineError::ValidationFailed("ZIP file is empty".to_string()))
}

// ============================================================================
// Workbooks
// ============================================================================

/// Convert the first worksheet of a workbook into a CSV file.
///
/// All cells are written as text so the CSV reader's own inference decides
/// the final dtypes, exactly as for a delimited upload.
#[cfg(feature = "excel")]
pub fn workbook_to_csv(path: &Path) -> Result<StagedFile> {
    use calamine::{Data, Reader, open_workbook_auto};
    use polars::prelude::*;

    let mut workbook = open_workbook_auto(path)
        .map_err(|e| PipelineError::LoadFailed(format!("Unreadable workbook: {e}")))?;
    let sheet = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| PipelineError::ValidationFailed("Workbook has no worksheets".into()))?;
    let range = workbook
        .worksheet_range(&sheet)
        .map_err(|e| PipelineError::LoadFailed(format!("Unreadable worksheet '{sheet}': {e}")))?;

    let mut rows = range.rows();
    let header: Vec<String> = match rows.next() {
        Some(cells) => cells
            .iter()
            .enumerate()
            .map(|(i, cell)| match cell {
                Data::Empty => format!("column_{}", i + 1),
                other => other.to_string(),
            })
            .collect(),
        None => {
            return Err(PipelineError::ValidationFailed(
                "Dataset is empty or format unrecognized.".to_string(),
            ));
        }
    };

    let mut values: Vec<Vec<Option<String>>> = vec![Vec::new(); header.len()];
    for row in rows {
        for (i, column) in values.iter_mut().enumerate() {
            let cell = match row.get(i) {
                None | Some(Data::Empty) => None,
                Some(Data::String(s)) => Some(s.clone()),
                Some(other) => Some(other.to_string()),
            };
            column.push(cell);
        }
    }

    let columns: Vec<Column> = header
        .iter()
        .zip(values)
        .map(|(name, cells)| Series::new(name.as_str().into(), cells).into())
        .collect();
    let mut df = DataFrame::new(columns)
        .map_err(|e| PipelineError::LoadFailed(format!("Malformed worksheet '{sheet}': {e}")))?;

    let dir = tempfile::tempdir()?;
    let out_path = dir.path().join("worksheet.csv");
    let file = File::create(&out_path)?;
    CsvWriter::new(file).include_header(true).finish(&mut df)?;

    info!(
        "Converted worksheet '{}' ({} rows) to CSV",
        sheet,
        df.height()
    );
    Ok(StagedFile {
        dir,
        path: out_path,
    })
}

#[cfg(not(feature = "excel"))]
pub fn workbook_to_csv(_path: &Path) -> Result<StagedFile> {
    Err(PipelineError::UnsupportedFormat(
        "excel (built without the `excel` feature)".to_string(),
    ))
}

// ============================================================================
// Encodings
// ============================================================================

/// Resolve an encoding name to a decoder.
///
/// Accepts WHATWG labels plus the common Python and chardet spellings
/// (`latin-1`, `latin_1`, `MacRoman`, `utf-8-sig`).
pub fn lookup_encoding(label: &str) -> Option<&'static encoding_rs::Encoding> {
    let normalized = label.trim().to_ascii_lowercase().replace('_', "-");
    let alias = match normalized.as_str() {
        "latin-1" | "latin" | "iso-8859-1" | "iso8859-1" => "windows-1252",
        "macroman" | "mac-roman" => "macintosh",
        "utf-8-sig" | "utf8-sig" => "utf-8",
        "shift-jis" | "sjis" => "shift_jis",
        other => other,
    };
    encoding_rs::Encoding::for_label(alias.as_bytes())
}

/// Re-encode a text file from `encoding` to UTF-8.
pub fn transcode_to_utf8(
    path: &Path,
    encoding: &'static encoding_rs::Encoding,
) -> Result<StagedFile> {
    let bytes = fs::read(path)?;
    let (text, _, had_errors) = encoding.decode(&bytes);
    if had_errors {
        debug!("Replaced undecodable bytes while reading {} input", encoding.name());
    }
    stage_text(path, &text)
}

/// Decode a text file as latin-1, where every byte maps to a character.
pub fn latin1_fallback(path: &Path) -> Result<StagedFile> {
    let bytes = fs::read(path)?;
    let (text, _, _) = encoding_rs::WINDOWS_1252.decode(&bytes);
    stage_text(path, &text)
}

fn stage_text(original: &Path, text: &str) -> Result<StagedFile> {
    let dir = tempfile::tempdir()?;
    let name = original
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "payload.csv".into());
    let out_path = dir.path().join(name);
    fs::write(&out_path, text.as_bytes())?;
    Ok(StagedFile {
        dir,
        path: out_path,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_zip(entries: &[(&str, &[u8])]) -> (TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bundle.zip");
        let file = File::create(&path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        for (name, content) in entries {
            writer
                .start_file(*name, zip::write::SimpleFileOptions::default())
                .unwrap();
            writer.write_all(content).unwrap();
        }
        writer.finish().unwrap();
        (dir, path)
    }

    #[test]
    fn test_extract_first_entry() {
        let (_dir, path) = write_zip(&[("data/sales.csv", b"a,b\n1,2\n"), ("other.csv", b"x\n1\n")]);
        let staged = extract_first_entry(&path).unwrap();
        assert_eq!(staged.path.file_name().unwrap(), "sales.csv");
        assert_eq!(fs::read_to_string(&staged.path).unwrap(), "a,b\n1,2\n");
    }

    #[test]
    fn test_extract_skips_traversal_entries() {
        let (_dir, path) = write_zip(&[("../evil.csv", b"x\n1\n"), ("good.csv", b"y\n2\n")]);
        let staged = extract_first_entry(&path).unwrap();
        assert_eq!(staged.path.file_name().unwrap(), "good.csv");
    }

    #[test]
    fn test_empty_archive_is_validation_failure() {
        let (_dir, path) = write_zip(&[]);
        let err = extract_first_entry(&path).unwrap_err();
        assert!(err.is_validation_failure());
    }

    #[test]
    fn test_corrupt_archive_is_load_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.zip");
        fs::write(&path, b"PK\x03\x04 definitely not a zip").unwrap();
        let err = extract_first_entry(&path).unwrap_err();
        assert!(err.is_load_failure());
    }

    #[test]
    fn test_transcode_latin1() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("names.csv");
        fs::write(&path, b"name\nJos\xe9\n").unwrap();

        let encoding = lookup_encoding("latin-1").unwrap();
        let staged = transcode_to_utf8(&path, encoding).unwrap();
        assert_eq!(fs::read_to_string(&staged.path).unwrap(), "name\nJos\u{e9}\n");

        let fallback = latin1_fallback(&path).unwrap();
        assert_eq!(fs::read_to_string(&fallback.path).unwrap(), "name\nJos\u{e9}\n");
    }

    #[test]
    fn test_lookup_encoding_aliases() {
        for label in ["latin-1", "latin_1", "Latin1", "ISO-8859-1", "cp1252"] {
            assert_eq!(
                lookup_encoding(label),
                Some(encoding_rs::WINDOWS_1252),
                "{label}"
            );
        }
        assert_eq!(lookup_encoding("MacRoman"), Some(encoding_rs::MACINTOSH));
        assert_eq!(lookup_encoding("utf-8-sig"), Some(encoding_rs::UTF_8));
        assert_eq!(lookup_encoding("klingon-8"), None);
    }
}
