//! CSV loading for measurement files

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use snrfilter::{parse_int, Record};

/// One CSV row before integer decoding
#[derive(Debug, Deserialize)]
struct RawRow {
    pre: String,
    main: String,
    post: String,
    snr: f64,
}

impl RawRow {
    fn into_record(self) -> Result<Record> {
        let field = |name: &str, text: &str| {
            parse_int(text).ok_or_else(|| anyhow!("invalid {} value '{}'", name, text))
        };
        Ok(Record::new(
            field("pre", &self.pre)?,
            field("main", &self.main)?,
            field("post", &self.post)?,
            self.snr,
        ))
    }
}

/// Read every record from a CSV with a `pre,main,post,snr` header
pub fn load_csv(path: &Path) -> Result<Vec<Record>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("failed to open {}", path.display()))?;

    let mut records = Vec::new();
    for (i, row) in reader.deserialize::<RawRow>().enumerate() {
        // Header is line 1
        let line = i + 2;
        let row = row.with_context(|| format!("{}:{}: malformed row", path.display(), line))?;
        let record = row
            .into_record()
            .with_context(|| format!("{}:{}", path.display(), line))?;
        records.push(record);
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn csv_file(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_csv() {
        let file = csv_file("pre,main,post,snr\n1, 0x10 ,-2,26.5\n0x3,-0x4,5,10\n");

        let records = load_csv(file.path()).unwrap();

        assert_eq!(
            records,
            vec![Record::new(1, 16, -2, 26.5), Record::new(3, -4, 5, 10.0)]
        );
    }

    #[test]
    fn test_load_csv_reports_line() {
        let file = csv_file("pre,main,post,snr\n1,2,3,4.0\n1,zz,3,4.0\n");

        let err = load_csv(file.path()).unwrap_err();

        let message = format!("{:#}", err);
        assert!(message.contains(":3"), "{}", message);
        assert!(message.contains("invalid main value 'zz'"), "{}", message);
    }

    #[test]
    fn test_load_missing_file() {
        assert!(load_csv(Path::new("/nonexistent/data.csv")).is_err());
    }
}
