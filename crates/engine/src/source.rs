//! Interaction data sources pulled on every retrain.

use flrec_core::config::DataConfig;
use flrec_core::error::{RecError, RecResult};
use flrec_core::types::RawInteraction;
use parking_lot::RwLock;
use std::path::PathBuf;
use tracing::{info, warn};

/// A periodic pull of `(item, user, count)` records. Called from a blocking
/// thread, so implementations may do synchronous I/O.
pub trait InteractionSource: Send + Sync {
    fn load(&self) -> RecResult<Vec<RawInteraction>>;

    /// Human-readable origin for logs.
    fn describe(&self) -> String;
}

/// Headerless (by default) delimited log file. Rows with missing identifier
/// fields or an unparseable count are skipped, not fatal.
#[derive(Debug, Clone)]
pub struct CsvFileSource {
    path: PathBuf,
    delimiter: u8,
    item_column: usize,
    user_column: usize,
    count_column: Option<usize>,
    has_headers: bool,
}

impl CsvFileSource {
    pub fn from_config(config: &DataConfig) -> RecResult<Self> {
        if !config.delimiter.is_ascii() {
            return Err(RecError::Config(format!(
                "data.delimiter must be a single ASCII character, got {:?}",
                config.delimiter
            )));
        }
        Ok(Self {
            path: PathBuf::from(&config.path),
            delimiter: config.delimiter as u8,
            item_column: config.item_column,
            user_column: config.user_column,
            count_column: config.count_column,
            has_headers: config.has_headers,
        })
    }
}

impl InteractionSource for CsvFileSource {
    fn load(&self) -> RecResult<Vec<RawInteraction>> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(self.has_headers)
            .delimiter(self.delimiter)
            .flexible(true)
            .from_path(&self.path)
            .map_err(|e| RecError::Source(format!("{}: {e}", self.path.display())))?;

        let mut records = Vec::new();
        let mut skipped = 0usize;

        for row in reader.records() {
            let row = match row {
                Ok(row) => row,
                Err(_) => {
                    skipped += 1;
                    continue;
                }
            };

            let item = row.get(self.item_column).map(str::trim).unwrap_or_default();
            let user = row.get(self.user_column).map(str::trim).unwrap_or_default();
            if item.is_empty() || user.is_empty() {
                skipped += 1;
                continue;
            }

            let count = match self.count_column {
                Some(col) => match row.get(col).and_then(|c| c.trim().parse::<u32>().ok()) {
                    Some(count) => count,
                    None => {
                        skipped += 1;
                        continue;
                    }
                },
                None => 1,
            };

            records.push(RawInteraction::new(item, user, count));
        }

        if skipped > 0 {
            warn!(path = %self.path.display(), skipped = skipped, "Skipped malformed log rows");
        }
        info!(path = %self.path.display(), rows = records.len(), "Interaction log loaded");

        Ok(records)
    }

    fn describe(&self) -> String {
        format!("csv:{}", self.path.display())
    }
}

/// In-memory records that can be swapped between retrains.
#[derive(Debug, Default)]
pub struct MemorySource {
    records: RwLock<Vec<RawInteraction>>,
}

impl MemorySource {
    pub fn new(records: Vec<RawInteraction>) -> Self {
        Self {
            records: RwLock::new(records),
        }
    }

    pub fn set_records(&self, records: Vec<RawInteraction>) {
        *self.records.write() = records;
    }
}

impl InteractionSource for MemorySource {
    fn load(&self) -> RecResult<Vec<RawInteraction>> {
        Ok(self.records.read().clone())
    }

    fn describe(&self) -> String {
        format!("memory:{} rows", self.records.read().len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_log(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    fn config_for(file: &tempfile::NamedTempFile) -> DataConfig {
        DataConfig {
            path: file.path().to_string_lossy().into_owned(),
            ..DataConfig::default()
        }
    }

    #[test]
    fn test_default_layout_reads_item_and_user_columns() {
        let file = write_log(
            "1001,article-a,x,user-1\n\
             1002,article-b,x,user-1\n\
             1003,article-a,x,user-2\n",
        );
        let source = CsvFileSource::from_config(&config_for(&file)).unwrap();
        let records = source.load().unwrap();
        assert_eq!(
            records,
            vec![
                RawInteraction::new("article-a", "user-1", 1),
                RawInteraction::new("article-b", "user-1", 1),
                RawInteraction::new("article-a", "user-2", 1),
            ]
        );
    }

    #[test]
    fn test_malformed_rows_are_skipped() {
        let file = write_log(
            "1,a,x,u1\n\
             2,b\n\
             3,,x,u2\n\
             4,c,x,u3,extra\n",
        );
        let source = CsvFileSource::from_config(&config_for(&file)).unwrap();
        let records = source.load().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1], RawInteraction::new("c", "u3", 1));
    }

    #[test]
    fn test_count_column_and_custom_delimiter() {
        let file = write_log("a\tu1\t3\nb\tu1\tnot-a-number\nc\tu2\t2\n");
        let config = DataConfig {
            delimiter: '\t',
            item_column: 0,
            user_column: 1,
            count_column: Some(2),
            ..config_for(&file)
        };
        let records = CsvFileSource::from_config(&config).unwrap().load().unwrap();
        assert_eq!(
            records,
            vec![
                RawInteraction::new("a", "u1", 3),
                RawInteraction::new("c", "u2", 2),
            ]
        );
    }

    #[test]
    fn test_missing_file_is_source_error() {
        let config = DataConfig {
            path: "/definitely/not/here.csv".to_string(),
            ..DataConfig::default()
        };
        let source = CsvFileSource::from_config(&config).unwrap();
        assert!(matches!(source.load(), Err(RecError::Source(_))));
    }

    #[test]
    fn test_memory_source_swaps_records() {
        let source = MemorySource::new(vec![RawInteraction::new("a", "u", 1)]);
        assert_eq!(source.load().unwrap().len(), 1);
        source.set_records(Vec::new());
        assert!(source.load().unwrap().is_empty());
    }
}
