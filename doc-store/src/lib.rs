use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;

/// An open mapping of string keys to arbitrary JSON values. Documents carry
/// whatever fields the caller supplies and round-trip untouched; the store
/// never injects metadata into them.
pub type Document = serde_json::Map<String, Value>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("duplicate value for unique key `{key}`: {value}")]
    DuplicateKey { key: String, value: Value },
}

/// Outcome of a replace operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplaceOutcome {
    /// An existing document matched and was replaced wholesale.
    Replaced,
    /// Nothing matched; the new document was inserted (upsert mode only).
    Upserted,
    /// Nothing matched and upsert was not requested.
    NoMatch,
}

/// A list of schemaless documents with optional unique-key constraints.
///
/// Documents keep their insertion order; key-addressed operations act on the
/// first match. Constraints are enforced inside `insert_one` itself, so a
/// caller holding the database lock gets check-and-insert as one step.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Collection {
    docs: Vec<Document>,
    unique_keys: Vec<String>,
}

impl Collection {
    /// Register a unique constraint on `key`. Idempotent. Documents already
    /// present are not re-validated; the constraint gates later inserts.
    pub fn create_unique_index(&mut self, key: impl Into<String>) {
        let key = key.into();
        if !self.unique_keys.contains(&key) {
            self.unique_keys.push(key);
        }
    }

    /// Append a document, enforcing every registered unique constraint
    /// against the documents already stored.
    pub fn insert_one(&mut self, doc: Document) -> Result<(), StoreError> {
        for key in &self.unique_keys {
            if let Some(value) = doc.get(key) {
                if self.docs.iter().any(|d| d.get(key) == Some(value)) {
                    return Err(StoreError::DuplicateKey {
                        key: key.clone(),
                        value: value.clone(),
                    });
                }
            }
        }
        self.docs.push(doc);
        Ok(())
    }

    /// First document whose field `key` equals `value`.
    pub fn find_one(&self, key: &str, value: &Value) -> Option<&Document> {
        self.docs.iter().find(|d| d.get(key) == Some(value))
    }

    /// First document in insertion order, for singleton collections.
    pub fn find_first(&self) -> Option<&Document> {
        self.docs.first()
    }

    /// Replace the first document whose field `key` equals `value` with
    /// `doc`, wholesale. With `upsert`, inserts `doc` when nothing matches.
    /// Unique constraints are not re-checked here; only inserts through
    /// [`Collection::insert_one`] enforce them.
    pub fn replace_one(
        &mut self,
        key: &str,
        value: &Value,
        doc: Document,
        upsert: bool,
    ) -> ReplaceOutcome {
        match self.docs.iter_mut().find(|d| d.get(key) == Some(value)) {
            Some(existing) => {
                *existing = doc;
                ReplaceOutcome::Replaced
            }
            None if upsert => {
                self.docs.push(doc);
                ReplaceOutcome::Upserted
            }
            None => ReplaceOutcome::NoMatch,
        }
    }

    /// Replace the first document, or insert `doc` when the collection is
    /// empty. Singleton-collection replace.
    pub fn replace_first(&mut self, doc: Document) -> ReplaceOutcome {
        match self.docs.first_mut() {
            Some(existing) => {
                *existing = doc;
                ReplaceOutcome::Replaced
            }
            None => {
                self.docs.push(doc);
                ReplaceOutcome::Upserted
            }
        }
    }

    /// Remove the first document whose field `key` equals `value`. Returns
    /// whether a document was removed.
    pub fn delete_one(&mut self, key: &str, value: &Value) -> bool {
        match self.docs.iter().position(|d| d.get(key) == Some(value)) {
            Some(idx) => {
                self.docs.remove(idx);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    pub fn clear(&mut self) {
        self.docs.clear();
    }
}

/// Named collections, created on first access.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Database {
    collections: HashMap<String, Collection>,
}

impl Database {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn collection(&self, name: &str) -> Option<&Collection> {
        self.collections.get(name)
    }

    pub fn collection_mut(&mut self, name: &str) -> &mut Collection {
        self.collections.entry(name.to_string()).or_default()
    }
}
