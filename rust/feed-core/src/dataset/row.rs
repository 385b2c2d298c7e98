// rust/feed-core/src/dataset/row.rs

use std::sync::Arc;

use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::error::{FeedError, Result};

/// One data row: column name to string value, in header order.
///
/// The header is shared with the owning [`Dataset`], so cloning a row is two
/// reference-count bumps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    headers: Arc<[String]>,
    values: Arc<[String]>,
}

impl Row {
    /// Value of the named column.
    pub fn get(&self, column: &str) -> Option<&str> {
        self.headers
            .iter()
            .position(|h| h == column)
            .map(|i| self.values[i].as_str())
    }

    /// Value at a column position.
    pub fn value(&self, position: usize) -> Option<&str> {
        self.values.get(position).map(String::as_str)
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn values(&self) -> &[String] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// `(column, value)` pairs in header order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers
            .iter()
            .zip(self.values.iter())
            .map(|(h, v)| (h.as_str(), v.as_str()))
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (column, value) in self.iter() {
            map.serialize_entry(column, value)?;
        }
        map.end()
    }
}

/// An immutable, zero-indexed table of rows sharing one header.
#[derive(Debug, Clone)]
pub struct Dataset {
    name: String,
    headers: Arc<[String]>,
    rows: Vec<Row>,
}

impl Dataset {
    /// Build a dataset, checking that every row matches the header arity.
    ///
    /// `name` is the resource path the rows came from; the remote cursor
    /// strategy derives its per-dataset token from it.
    pub fn new(
        name: impl Into<String>,
        headers: Vec<String>,
        rows: Vec<Vec<String>>,
    ) -> Result<Self> {
        let name = name.into();
        if headers.is_empty() {
            return Err(FeedError::load(&name, "header row has no columns"));
        }

        let headers: Arc<[String]> = headers.into();
        let rows = rows
            .into_iter()
            .enumerate()
            .map(|(i, values)| {
                if values.len() != headers.len() {
                    return Err(FeedError::load(
                        &name,
                        format!(
                            "row {} has {} fields, header has {}",
                            i,
                            values.len(),
                            headers.len()
                        ),
                    ));
                }
                Ok(Row {
                    headers: headers.clone(),
                    values: values.into(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            name,
            headers,
            rows,
        })
    }

    /// Resource path this dataset was loaded from.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn row(&self, index: usize) -> Option<&Row> {
        self.rows.get(index)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Cursor key fragment identifying this dataset to the coordination service.
    pub fn token(&self) -> String {
        dataset_token(&self.name)
    }
}

/// Normalize a resource path into a token usable inside a cursor key.
///
/// Dots and path separators are dropped: `data/users.csv` becomes
/// `datauserscsv`.
pub fn dataset_token(path: &str) -> String {
    path.chars()
        .filter(|c| !matches!(c, '.' | '/' | '\\'))
        .collect()
}
