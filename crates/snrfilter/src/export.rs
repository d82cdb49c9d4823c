//! Writing result sets to CSV or JSON

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use tracing::info;

use crate::error::{Error, Result};
use crate::record::Record;

/// Serializes records to a writer
pub trait Exporter {
    /// Write every record, in order
    fn write_records<W: Write>(&self, records: &[Record], writer: W) -> Result<()>;

    /// Create (or truncate) `path` and write every record to it
    fn export_to_path(&self, records: &[Record], path: &Path) -> Result<()> {
        let file = File::create(path)?;
        self.write_records(records, BufWriter::new(file))
    }
}

/// CSV with a `pre,main,post,snr` header row
#[derive(Debug, Clone, Copy, Default)]
pub struct CsvExporter;

impl Exporter for CsvExporter {
    fn write_records<W: Write>(&self, records: &[Record], writer: W) -> Result<()> {
        let mut writer = csv::Writer::from_writer(writer);
        if records.is_empty() {
            writer.write_record(["pre", "main", "post", "snr"])?;
        }
        for record in records {
            writer.serialize(record)?;
        }
        writer.flush()?;
        Ok(())
    }
}

/// JSON array of `{pre, main, post, snr}` objects
///
/// JSON has no NaN or infinity, so a result set holding one is rejected
/// before anything is written. CSV keeps them as `NaN` and `inf`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonExporter {
    /// Indent the output
    pub pretty: bool,
}

impl Exporter for JsonExporter {
    fn write_records<W: Write>(&self, records: &[Record], mut writer: W) -> Result<()> {
        if let Some((row, record)) = records.iter().enumerate().find(|(_, r)| !r.snr.is_finite()) {
            return Err(Error::NonFiniteSnr {
                row,
                value: record.snr,
            });
        }
        if self.pretty {
            serde_json::to_writer_pretty(&mut writer, records)?;
        } else {
            serde_json::to_writer(&mut writer, records)?;
        }
        writer.flush()?;
        Ok(())
    }
}

/// Supported export formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    /// Comma separated values
    Csv,
    /// JSON array
    Json,
}

impl ExportFormat {
    /// Pick a format from the file extension (case-insensitive)
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "csv" => Some(ExportFormat::Csv),
            "json" => Some(ExportFormat::Json),
            _ => None,
        }
    }
}

/// Write `records` to `path` in the format implied by its extension
pub fn export(records: &[Record], path: &Path) -> Result<()> {
    match ExportFormat::from_path(path) {
        Some(ExportFormat::Csv) => CsvExporter.export_to_path(records, path)?,
        Some(ExportFormat::Json) => JsonExporter { pretty: true }.export_to_path(records, path)?,
        None => return Err(Error::UnsupportedFormat(path.display().to_string())),
    }
    info!("Exported {} records to {}", records.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn records() -> Vec<Record> {
        vec![Record::new(1, 2, 3, 10.5), Record::new(4097, -1, 0, 26.0)]
    }

    #[test]
    fn test_csv_export() {
        let mut out = Vec::new();
        CsvExporter.write_records(&records(), &mut out).unwrap();

        let text = String::from_utf8(out).unwrap();
        assert_eq!(text, "pre,main,post,snr\n1,2,3,10.5\n4097,-1,0,26.0\n");
    }

    #[test]
    fn test_csv_export_empty_keeps_header() {
        let mut out = Vec::new();
        CsvExporter.write_records(&[], &mut out).unwrap();

        assert_eq!(String::from_utf8(out).unwrap(), "pre,main,post,snr\n");
    }

    #[test]
    fn test_json_export_parses_back() {
        let mut out = Vec::new();
        JsonExporter::default().write_records(&records(), &mut out).unwrap();

        let parsed: Vec<Record> = serde_json::from_slice(&out).unwrap();
        assert_eq!(parsed, records());
    }

    #[test]
    fn test_json_rejects_non_finite_snr() {
        let mut data = records();
        data.push(Record::new(7, 7, 7, f64::NAN));
        let mut out = Vec::new();

        let err = JsonExporter::default().write_records(&data, &mut out).unwrap_err();

        assert!(matches!(err, Error::NonFiniteSnr { row: 2, .. }));
        assert!(out.is_empty());
    }

    #[test]
    fn test_csv_keeps_non_finite_snr() {
        let data = vec![Record::new(1, 1, 1, f64::NAN), Record::new(2, 2, 2, f64::INFINITY)];
        let mut out = Vec::new();
        CsvExporter.write_records(&data, &mut out).unwrap();

        let mut reader = csv::Reader::from_reader(out.as_slice());
        let parsed: Vec<Record> = reader.deserialize().collect::<std::result::Result<_, _>>().unwrap();
        assert!(parsed[0].snr.is_nan());
        assert_eq!(parsed[1].snr, f64::INFINITY);
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(ExportFormat::from_path(Path::new("a.CSV")), Some(ExportFormat::Csv));
        assert_eq!(ExportFormat::from_path(Path::new("out/a.json")), Some(ExportFormat::Json));
        assert_eq!(ExportFormat::from_path(Path::new("a.txt")), None);
        assert_eq!(ExportFormat::from_path(Path::new("noext")), None);
    }

    #[test]
    fn test_export_to_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("result.csv");

        export(&records(), &path).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("pre,main,post,snr\n"));
        assert_eq!(text.lines().count(), 3);
    }

    #[test]
    fn test_export_unknown_extension() {
        let dir = TempDir::new().unwrap();
        let err = export(&records(), &dir.path().join("result.xml")).unwrap_err();
        assert!(matches!(err, Error::UnsupportedFormat(_)));
    }
}
