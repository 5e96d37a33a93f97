//! File format descriptors and content sniffing.
//!
//! Callers normally hand the loader a descriptor produced by their own
//! detection layer. [`FormatDescriptor::sniff`] covers the cases where the
//! loader has to look at bytes itself: archive payloads and CLI input.

use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Bytes inspected when sniffing.
const SNIFF_BYTES: usize = 100 * 1024;

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const PARQUET_MAGIC: &[u8] = b"PAR1";
const WORKBOOK_EXTENSIONS: [&str; 4] = ["xlsx", "xls", "xlsm", "ods"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileFormat {
    Csv,
    Tsv,
    Json,
    Parquet,
    Excel,
    Zip,
}

impl FileFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Tsv => "tsv",
            Self::Json => "json",
            Self::Parquet => "parquet",
            Self::Excel => "excel",
            Self::Zip => "zip",
        }
    }

    /// Delimited text formats go through the CSV reader.
    pub fn is_delimited(&self) -> bool {
        matches!(self, Self::Csv | Self::Tsv)
    }
}

impl fmt::Display for FileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for FileFormat {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "csv" => Ok(Self::Csv),
            "tsv" => Ok(Self::Tsv),
            "json" | "jsonl" | "ndjson" => Ok(Self::Json),
            "parquet" => Ok(Self::Parquet),
            "excel" | "xlsx" | "xls" => Ok(Self::Excel),
            "zip" => Ok(Self::Zip),
            other => Err(PipelineError::UnsupportedFormat(other.to_string())),
        }
    }
}

/// `{format, delimiter, encoding}` as produced by format detection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatDescriptor {
    pub format: FileFormat,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delimiter: Option<u8>,
    #[serde(default = "default_encoding")]
    pub encoding: String,
}

fn default_encoding() -> String {
    "utf-8".to_string()
}

impl FormatDescriptor {
    pub fn new(format: FileFormat) -> Self {
        let delimiter = match format {
            FileFormat::Csv => Some(b','),
            FileFormat::Tsv => Some(b'\t'),
            _ => None,
        };
        Self {
            format,
            delimiter,
            encoding: default_encoding(),
        }
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = Some(delimiter);
        self
    }

    pub fn with_encoding(mut self, encoding: impl Into<String>) -> Self {
        self.encoding = encoding.into();
        self
    }

    /// The delimiter to use for text formats.
    pub fn separator(&self) -> u8 {
        self.delimiter.unwrap_or(match self.format {
            FileFormat::Tsv => b'\t',
            _ => b',',
        })
    }

    /// Whether the encoding is some spelling of UTF-8.
    pub fn is_utf8(&self) -> bool {
        matches!(
            self.encoding.trim().to_ascii_lowercase().as_str(),
            "utf-8" | "utf8" | "ascii" | "us-ascii"
        )
    }

    /// Detect the format of a file from its leading bytes.
    pub fn sniff(path: &Path) -> Result<Self> {
        let mut file = File::open(path)?;
        let mut sample = Vec::with_capacity(SNIFF_BYTES);
        file.by_ref()
            .take(SNIFF_BYTES as u64)
            .read_to_end(&mut sample)?;

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();

        Ok(Self::sniff_bytes(&sample, &extension))
    }

    /// Detect the format from a byte sample and the file extension.
    pub fn sniff_bytes(sample: &[u8], extension: &str) -> Self {
        if sample.starts_with(b"PK") {
            if sample.starts_with(ZIP_MAGIC) && WORKBOOK_EXTENSIONS.contains(&extension) {
                return Self::new(FileFormat::Excel);
            }
            return Self::new(FileFormat::Zip);
        }
        if sample.starts_with(PARQUET_MAGIC) {
            return Self::new(FileFormat::Parquet);
        }

        // skip whitespace and a UTF-8 byte order mark
        let first = sample
            .iter()
            .copied()
            .find(|b| !(b.is_ascii_whitespace() || matches!(*b, 0xEF | 0xBB | 0xBF)));
        if matches!(first, Some(b'{') | Some(b'[')) {
            return Self::new(FileFormat::Json);
        }

        let tabs = sample.iter().filter(|b| **b == b'\t').count();
        let commas = sample.iter().filter(|b| **b == b',').count();
        if tabs > 0 && tabs > commas {
            Self::new(FileFormat::Tsv)
        } else {
            Self::new(FileFormat::Csv)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_sniff_delimited_text() {
        let csv = FormatDescriptor::sniff_bytes(b"a,b,c\n1,2,3\n", "csv");
        assert_eq!(csv.format, FileFormat::Csv);
        assert_eq!(csv.separator(), b',');

        let tsv = FormatDescriptor::sniff_bytes(b"a\tb\tc\n1\t2,5\t3\n", "txt");
        assert_eq!(tsv.format, FileFormat::Tsv);
        assert_eq!(tsv.separator(), b'\t');
    }

    #[test]
    fn test_sniff_magic_bytes() {
        assert_eq!(
            FormatDescriptor::sniff_bytes(b"PAR1\x15\x04", "bin").format,
            FileFormat::Parquet
        );
        assert_eq!(
            FormatDescriptor::sniff_bytes(b"PK\x03\x04rest", "zip").format,
            FileFormat::Zip
        );
        assert_eq!(
            FormatDescriptor::sniff_bytes(b"PK\x03\x04rest", "xlsx").format,
            FileFormat::Excel
        );
    }

    #[test]
    fn test_sniff_json() {
        assert_eq!(
            FormatDescriptor::sniff_bytes(b"  [{\"a\": 1}]", "txt").format,
            FileFormat::Json
        );
        assert_eq!(
            FormatDescriptor::sniff_bytes(b"{\"a\": 1}\n{\"a\": 2}\n", "jsonl").format,
            FileFormat::Json
        );
    }

    #[test]
    fn test_format_from_str() {
        assert_eq!("CSV".parse::<FileFormat>().unwrap(), FileFormat::Csv);
        assert_eq!("ndjson".parse::<FileFormat>().unwrap(), FileFormat::Json);
        assert!(matches!(
            "feather".parse::<FileFormat>(),
            Err(PipelineError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_descriptor_serde_defaults() {
        let descriptor: FormatDescriptor = serde_json::from_str(r#"{"format": "tsv"}"#).unwrap();
        assert_eq!(descriptor.encoding, "utf-8");
        assert!(descriptor.is_utf8());
        assert_eq!(descriptor.separator(), b'\t');
    }
}
