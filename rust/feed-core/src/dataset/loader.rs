// rust/feed-core/src/dataset/loader.rs

use std::fs::File;
use std::path::{Path, PathBuf};

use crate::config::DatasetConfig;
use crate::error::{FeedError, Result};

use super::row::Dataset;

/// Source of immutable datasets.
pub trait DatasetLoader: Send + Sync {
    /// Load the dataset at `path`.
    ///
    /// # Errors
    ///
    /// Returns a load error if the resource is missing, unreadable,
    /// malformed (a record whose field count differs from the header), or
    /// has no data rows.
    fn load(&self, path: &Path) -> Result<Dataset>;
}

/// Loads delimited text files whose first record is the header row.
#[derive(Debug, Clone)]
pub struct CsvLoader {
    base_path: PathBuf,
    delimiter: u8,
}

impl Default for CsvLoader {
    fn default() -> Self {
        Self::new(".")
    }
}

impl CsvLoader {
    /// Create a loader resolving relative paths against `base_path`.
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
            delimiter: b',',
        }
    }

    /// Create a loader from the dataset section of the configuration.
    ///
    /// # Errors
    ///
    /// Returns a config error if the delimiter is not a single ASCII character.
    pub fn from_config(config: &DatasetConfig) -> Result<Self> {
        if !config.delimiter.is_ascii() {
            return Err(FeedError::config(
                "dataset.delimiter must be a single ASCII character",
            ));
        }
        Ok(Self::new(&config.base_path).with_delimiter(config.delimiter as u8))
    }

    #[must_use]
    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_path.join(path)
        }
    }
}

impl DatasetLoader for CsvLoader {
    fn load(&self, path: &Path) -> Result<Dataset> {
        let full_path = self.resolve(path);
        let file = File::open(&full_path).map_err(|e| {
            FeedError::load_with_source(&full_path, "failed to open dataset", e)
        })?;

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .delimiter(self.delimiter)
            .flexible(false)
            .from_reader(file);

        let headers: Vec<String> = reader
            .headers()
            .map_err(|e| FeedError::load_with_source(&full_path, "failed to read header row", e))?
            .iter()
            .map(String::from)
            .collect();

        if headers.is_empty() {
            return Err(FeedError::load(&full_path, "missing header row"));
        }

        let mut rows: Vec<Vec<String>> = Vec::new();
        for record in reader.records() {
            let record = record
                .map_err(|e| FeedError::load_with_source(&full_path, "malformed record", e))?;
            rows.push(record.iter().map(String::from).collect());
        }

        if rows.is_empty() {
            return Err(FeedError::load(&full_path, "dataset has no data rows"));
        }

        let dataset = Dataset::new(path.to_string_lossy(), headers, rows)?;

        tracing::debug!(
            path = %full_path.display(),
            rows = dataset.len(),
            columns = dataset.headers().len(),
            "loaded dataset"
        );

        Ok(dataset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_file(dir: &TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        let mut file = File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_load_relative_to_base_path() {
        let dir = TempDir::new().unwrap();
        write_file(&dir, "users.csv", "user,password\nalice,a1\nbob,b2\n");

        let loader = CsvLoader::new(dir.path());
        let dataset = loader.load(Path::new("users.csv")).unwrap();

        assert_eq!(dataset.name(), "users.csv");
        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.headers(), &["user".to_string(), "password".to_string()]);
        assert_eq!(dataset.row(0).unwrap().get("user"), Some("alice"));
        assert_eq!(dataset.row(1).unwrap().get("password"), Some("b2"));
    }

    #[test]
    fn test_load_absolute_path() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "data.csv", "id\n1\n");

        let loader = CsvLoader::new("/does/not/matter");
        let dataset = loader.load(&path).unwrap();
        assert_eq!(dataset.len(), 1);
    }

    #[test]
    fn test_load_quoted_fields() {
        let dir = TempDir::new().unwrap();
        write_file(
            &dir,
            "quoted.csv",
            "name,address\n\"Smith, Jane\",\"1 Main St\"\n",
        );

        let dataset = CsvLoader::new(dir.path())
            .load(Path::new("quoted.csv"))
            .unwrap();
        assert_eq!(dataset.row(0).unwrap().get("name"), Some("Smith, Jane"));
    }

    #[test]
    fn test_load_custom_delimiter() {
        let dir = TempDir::new().unwrap();
        write_file(&dir, "semi.csv", "a;b\n1;2\n");

        let dataset = CsvLoader::new(dir.path())
            .with_delimiter(b';')
            .load(Path::new("semi.csv"))
            .unwrap();
        assert_eq!(dataset.row(0).unwrap().get("b"), Some("2"));
    }

    #[test]
    fn test_load_missing_file() {
        let dir = TempDir::new().unwrap();
        let err = CsvLoader::new(dir.path())
            .load(Path::new("missing.csv"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Load);
    }

    #[test]
    fn test_load_malformed_row() {
        let dir = TempDir::new().unwrap();
        write_file(&dir, "bad.csv", "a,b\n1,2\n3\n");

        let err = CsvLoader::new(dir.path())
            .load(Path::new("bad.csv"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Load);
        assert!(err.to_string().contains("malformed record"));
    }

    #[test]
    fn test_load_header_only() {
        let dir = TempDir::new().unwrap();
        write_file(&dir, "empty.csv", "a,b\n");

        let err = CsvLoader::new(dir.path())
            .load(Path::new("empty.csv"))
            .unwrap_err();
        assert!(err.to_string().contains("no data rows"));
    }

    #[test]
    fn test_load_empty_file() {
        let dir = TempDir::new().unwrap();
        write_file(&dir, "blank.csv", "");

        let err = CsvLoader::new(dir.path())
            .load(Path::new("blank.csv"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Load);
    }

    #[test]
    fn test_load_is_idempotent() {
        let dir = TempDir::new().unwrap();
        write_file(&dir, "users.csv", "user\nalice\nbob\ncarol\n");

        let loader = CsvLoader::new(dir.path());
        let first = loader.load(Path::new("users.csv")).unwrap();
        let second = loader.load(Path::new("users.csv")).unwrap();

        assert_eq!(first.len(), second.len());
        assert_eq!(first.rows(), second.rows());
    }

    #[test]
    fn test_from_config() {
        let config = DatasetConfig {
            base_path: PathBuf::from("/fixtures"),
            delimiter: '\t',
        };
        let loader = CsvLoader::from_config(&config).unwrap();
        assert_eq!(loader.base_path(), Path::new("/fixtures"));
        assert_eq!(loader.delimiter, b'\t');

        let config = DatasetConfig {
            delimiter: 'é',
            ..Default::default()
        };
        assert!(CsvLoader::from_config(&config).is_err());
    }
}
