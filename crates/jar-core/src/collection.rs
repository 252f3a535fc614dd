use std::collections::HashSet;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{JarError, Result};
use crate::memory::MemoryRecord;

/// Ordered set of memories: insertion order is creation order and ids are
/// unique.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<MemoryRecord>", into = "Vec<MemoryRecord>")]
pub struct MemoryCollection {
    records: Vec<MemoryRecord>,
}

impl MemoryCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from already-ordered records, rejecting duplicate ids.
    pub fn from_records(records: Vec<MemoryRecord>) -> Result<Self> {
        let mut seen = HashSet::with_capacity(records.len());
        for rec in &records {
            if !seen.insert(rec.id()) {
                return Err(JarError::DuplicateId(rec.id().to_string()));
            }
        }
        Ok(Self { records })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[MemoryRecord] {
        &self.records
    }

    pub fn contains(&self, id: &str) -> bool {
        self.records.iter().any(|r| r.id() == id)
    }

    pub fn get(&self, id: &str) -> Option<&MemoryRecord> {
        self.records.iter().find(|r| r.id() == id)
    }

    /// Append at the end. Duplicate ids are rejected and leave the
    /// collection untouched.
    pub fn push(&mut self, record: MemoryRecord) -> Result<()> {
        if self.contains(record.id()) {
            return Err(JarError::DuplicateId(record.id().to_string()));
        }
        self.records.push(record);
        Ok(())
    }

    /// Uniform random pick.
    pub fn pick_random<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<&MemoryRecord> {
        if self.records.is_empty() {
            return Err(JarError::EmptyCollection);
        }
        let idx = rng.random_range(0..self.records.len());
        Ok(&self.records[idx])
    }
}

impl TryFrom<Vec<MemoryRecord>> for MemoryCollection {
    type Error = JarError;

    fn try_from(records: Vec<MemoryRecord>) -> Result<Self> {
        Self::from_records(records)
    }
}

impl From<MemoryCollection> for Vec<MemoryRecord> {
    fn from(collection: MemoryCollection) -> Self {
        collection.records
    }
}

/// The durable owner of the collection, as seen by the session machine.
///
/// `append` must be all-or-nothing: when it returns an error the visible
/// collection is exactly what it was before the call.
pub trait MemoryRepository {
    fn collection(&self) -> &MemoryCollection;

    fn append(&mut self, record: MemoryRecord) -> Result<()>;

    fn len(&self) -> usize {
        self.collection().len()
    }

    fn is_empty(&self) -> bool {
        self.collection().is_empty()
    }

    fn pick_random<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<&MemoryRecord> {
        self.collection().pick_random(rng)
    }
}

/// A bare collection is a repository whose writes cannot fail.
impl MemoryRepository for MemoryCollection {
    fn collection(&self) -> &MemoryCollection {
        self
    }

    fn append(&mut self, record: MemoryRecord) -> Result<()> {
        self.push(record)
    }
}
