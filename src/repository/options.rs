//! Typed building blocks for repository calls: read projections, sort
//! direction, increments and identifier parsing.

use crate::error::{RepositoryError, Result};
use mongodb::bson::{oid::ObjectId, Document};

/// Field hidden from reads unless the caller picks another projection.
pub const DEFAULT_EXCLUDED_FIELD: &str = "address";

/// Parses a 24-character hex string into an [`ObjectId`].
///
/// Every operation that takes an identifier string goes through here.
///
/// ```
/// use docrepo::repository::parse_object_id;
///
/// assert!(parse_object_id("64ac6f32b67c7e456e72a062").is_ok());
/// assert!(parse_object_id("not-an-id").is_err());
/// ```
pub fn parse_object_id(value: &str) -> Result<ObjectId> {
    ObjectId::parse_str(value).map_err(|source| RepositoryError::InvalidIdentifier {
        value: value.to_string(),
        source,
    })
}

/// Which fields reads return. `_id` is always suppressed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Projection {
    /// Return everything except these fields
    Exclude(Vec<String>),
    /// Return only these fields
    Include(Vec<String>),
}

impl Projection {
    pub fn exclude<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Projection::Exclude(fields.into_iter().map(Into::into).collect())
    }

    pub fn include<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Projection::Include(fields.into_iter().map(Into::into).collect())
    }

    /// Only `_id` is hidden.
    pub fn all_fields() -> Self {
        Projection::Exclude(Vec::new())
    }

    /// The projection document sent to the store.
    pub fn to_document(&self) -> Document {
        let mut projection = Document::new();
        projection.insert("_id", 0);
        match self {
            Projection::Exclude(fields) => {
                for field in fields.iter().filter(|f| f.as_str() != "_id") {
                    projection.insert(field.as_str(), 0);
                }
            }
            Projection::Include(fields) => {
                for field in fields.iter().filter(|f| f.as_str() != "_id") {
                    projection.insert(field.as_str(), 1);
                }
            }
        }
        projection
    }
}

impl Default for Projection {
    fn default() -> Self {
        Projection::exclude([DEFAULT_EXCLUDED_FIELD])
    }
}

/// Direction for ordered selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

impl SortOrder {
    /// `1` or `-1`, as the store expects.
    pub fn as_i32(self) -> i32 {
        match self {
            SortOrder::Ascending => 1,
            SortOrder::Descending => -1,
        }
    }
}

/// Field → signed delta mapping for `$inc` updates.
///
/// ```
/// use docrepo::repository::Increment;
///
/// let inc = Increment::new().field("requests.pizza", 2).field("stock", -1);
/// assert_eq!(inc.len(), 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Increment {
    deltas: Vec<(String, i64)>,
}

impl Increment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `delta` to `field`. A repeated field keeps the last delta.
    pub fn field(mut self, field: impl Into<String>, delta: i64) -> Self {
        let field = field.into();
        self.deltas.retain(|(existing, _)| *existing != field);
        self.deltas.push((field, delta));
        self
    }

    pub fn len(&self) -> usize {
        self.deltas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deltas.is_empty()
    }

    /// The `{"$inc": {...}}` update document.
    pub fn to_update(&self) -> Document {
        let mut fields = Document::new();
        for (field, delta) in &self.deltas {
            fields.insert(field.as_str(), *delta);
        }
        let mut update = Document::new();
        update.insert("$inc", fields);
        update
    }
}

impl<K: Into<String>> FromIterator<(K, i64)> for Increment {
    fn from_iter<T: IntoIterator<Item = (K, i64)>>(iter: T) -> Self {
        iter.into_iter()
            .fold(Increment::new(), |inc, (field, delta)| inc.field(field, delta))
    }
}
