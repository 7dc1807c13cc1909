use std::{
    collections::HashMap,
    fs::File,
    io::{BufRead, BufReader, BufWriter, Write as _},
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{signature::DumpSignature, Result};

pub type TestId = String;
pub type BugId = u64;

/// The persisted form of one test case's crash dump.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoredSignature {
    pub test_id: TestId,
    pub bug_id: BugId,
    /// Seconds since the Unix epoch.
    pub timestamp: i64,
    pub component_order: Vec<String>,
    pub func_blocks: Vec<Vec<String>>,
}

impl StoredSignature {
    pub fn new(test_id: TestId, bug_id: BugId, timestamp: i64, signature: DumpSignature) -> Self {
        let (component_order, func_blocks) = signature.into_parts();
        StoredSignature {
            test_id,
            bug_id,
            timestamp,
            component_order,
            func_blocks,
        }
    }

    pub fn signature(&self) -> Result<DumpSignature> {
        DumpSignature::from_parts(&self.test_id, self.component_order.clone(), self.func_blocks.clone())
    }
}

pub trait SignatureStore {
    fn read(&self, test_id: &str) -> Result<Option<StoredSignature>>;

    /// Inserts or replaces the record of `record.test_id`.
    fn write(&mut self, record: StoredSignature) -> Result<()>;

    /// `(test_id, bug_id)` of every record, in storage order.
    fn bug_reports(&self) -> Result<Vec<(TestId, BugId)>>;

    /// Another test case whose record has exactly `record.func_blocks`.
    fn same_blocks_as(&self, record: &StoredSignature) -> Result<Option<TestId>>;
}

/// What [`admit`] did with a record.
#[derive(Debug, PartialEq, Eq)]
pub enum Admission {
    Stored,
    /// The dump yielded no frames, so the record carries nothing to compare.
    Empty,
    /// Another test case already stored the same function blocks.
    Duplicate(TestId),
}

/// Writes `record` unless it is empty or repeats the function blocks of
/// another stored test case. Either would skew the labelled pairs.
pub fn admit(store: &mut dyn SignatureStore, record: StoredSignature) -> Result<Admission> {
    if record.func_blocks.is_empty() {
        warn!(test_id = %record.test_id, "empty signature, not stored");
        return Ok(Admission::Empty);
    }
    if let Some(existing) = store.same_blocks_as(&record)? {
        warn!(test_id = %record.test_id, %existing, "signature already stored, not stored again");
        return Ok(Admission::Duplicate(existing));
    }
    store.write(record)?;
    Ok(Admission::Stored)
}

/// Records kept in memory and mirrored to a JSON-lines file, one record per
/// line.
#[derive(Default)]
pub struct JsonLinesStore {
    path: Option<PathBuf>,
    records: Vec<StoredSignature>,
    index: HashMap<TestId, usize>,
}

impl JsonLinesStore {
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Opens `path`, which may not exist yet.
    pub fn open(path: &Path) -> Result<Self> {
        let mut store = JsonLinesStore {
            path: Some(path.to_owned()),
            ..Self::default()
        };
        if !path.exists() {
            return Ok(store);
        }
        for line in BufReader::new(File::open(path)?).lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            store.insert(serde_json::from_str(&line)?);
        }
        debug!(records = store.records.len(), path = %path.display(), "loaded signature store");
        Ok(store)
    }

    fn insert(&mut self, record: StoredSignature) {
        match self.index.get(&record.test_id) {
            Some(&position) => self.records[position] = record,
            None => {
                self.index.insert(record.test_id.clone(), self.records.len());
                self.records.push(record);
            }
        }
    }

    fn flush(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let temporary = path.with_extension("tmp");
        let mut output = BufWriter::new(File::create(&temporary)?);
        for record in &self.records {
            serde_json::to_writer(&mut output, record)?;
            output.write_all(b"\n")?;
        }
        output.flush()?;
        drop(output);
        std::fs::rename(&temporary, path)?;
        Ok(())
    }
}

impl SignatureStore for JsonLinesStore {
    fn read(&self, test_id: &str) -> Result<Option<StoredSignature>> {
        Ok(self.index.get(test_id).map(|&position| self.records[position].clone()))
    }

    fn write(&mut self, record: StoredSignature) -> Result<()> {
        self.insert(record);
        self.flush()
    }

    fn bug_reports(&self) -> Result<Vec<(TestId, BugId)>> {
        Ok(self
            .records
            .iter()
            .map(|record| (record.test_id.clone(), record.bug_id))
            .collect())
    }

    fn same_blocks_as(&self, record: &StoredSignature) -> Result<Option<TestId>> {
        Ok(self
            .records
            .iter()
            .find(|stored| stored.test_id != record.test_id && stored.func_blocks == record.func_blocks)
            .map(|stored| stored.test_id.clone()))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn record(test_id: &str, bug_id: BugId) -> StoredSignature {
        StoredSignature {
            test_id: test_id.to_owned(),
            bug_id,
            timestamp: 1_600_000_000,
            component_order: vec!["X".to_owned()],
            func_blocks: vec![vec!["f".to_owned()]],
        }
    }

    #[test]
    fn write_replaces_existing_record() {
        let mut store = JsonLinesStore::in_memory();
        store.write(record("1", 10)).unwrap();
        store.write(record("2", 20)).unwrap();
        store.write(record("1", 30)).unwrap();
        assert_eq!(store.read("1").unwrap().unwrap().bug_id, 30);
        assert_eq!(store.read("3").unwrap(), None);
        assert_eq!(
            store.bug_reports().unwrap(),
            vec![("1".to_owned(), 30), ("2".to_owned(), 20)]
        );
    }

    #[test]
    fn file_round_trip() {
        let directory = tempfile::tempdir().unwrap();
        let path = directory.path().join("signatures.jsonl");
        {
            let mut store = JsonLinesStore::open(&path).unwrap();
            store.write(record("1", 10)).unwrap();
            store.write(record("2", 20)).unwrap();
        }
        let store = JsonLinesStore::open(&path).unwrap();
        assert_eq!(store.read("2").unwrap(), Some(record("2", 20)));
        assert_eq!(store.read("1").unwrap().unwrap().signature().unwrap().len(), 1);
    }

    #[test]
    fn admit_skips_empty_signatures() {
        let mut store = JsonLinesStore::in_memory();
        let empty = StoredSignature::new("1".to_owned(), 10, 0, DumpSignature::default());
        assert_eq!(admit(&mut store, empty).unwrap(), Admission::Empty);
        assert!(store.bug_reports().unwrap().is_empty());
    }

    #[test]
    fn admit_skips_repeated_blocks() {
        let mut store = JsonLinesStore::in_memory();
        assert_eq!(admit(&mut store, record("1", 10)).unwrap(), Admission::Stored);
        assert_eq!(admit(&mut store, record("2", 20)).unwrap(), Admission::Duplicate("1".to_owned()));
        // Re-ingesting the same test case replaces its record.
        assert_eq!(admit(&mut store, record("1", 30)).unwrap(), Admission::Stored);

        let mut other = record("3", 20);
        other.func_blocks = vec![vec!["g".to_owned()]];
        assert_eq!(admit(&mut store, other).unwrap(), Admission::Stored);
        assert_eq!(
            store.bug_reports().unwrap(),
            vec![("1".to_owned(), 30), ("3".to_owned(), 20)]
        );
    }

    #[test]
    fn corrupt_record_is_rejected_on_use() {
        let mut corrupt = record("1", 10);
        corrupt.func_blocks.clear();
        assert!(corrupt.signature().is_err());
    }
}
