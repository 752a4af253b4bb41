use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use log::warn;
use serde::{Deserialize, Serialize};

use crate::score::ScoreReport;
use crate::types::StudentId;

/// One persisted evaluation, keyed by student and save time. Subject names
/// travel with every record because the schema varies per answer key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredResult {
    pub student: StudentId,
    pub saved_at_secs: u64,
    pub subject_names: Vec<String>,
    pub per_subject: Vec<u32>,
    pub total: u32,
}

#[derive(Debug)]
pub enum StoreError {
    Io(std::io::Error),
    Serialize(serde_json::Error),
}

/// Persistence boundary for finished evaluations. The pipeline hands
/// reports to an implementation and knows nothing else about storage.
pub trait ResultStore {
    fn save(
        &mut self,
        student: &StudentId,
        report: &ScoreReport,
        subject_names: &[String],
    ) -> Result<(), StoreError>;

    fn load_all(&self) -> Result<Vec<StoredResult>, StoreError>;
}

/// Append-only JSON-lines store, one record per line. The save time is
/// assigned here, at write time.
pub struct JsonlStore {
    path: PathBuf,
}

impl JsonlStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ResultStore for JsonlStore {
    fn save(
        &mut self,
        student: &StudentId,
        report: &ScoreReport,
        subject_names: &[String],
    ) -> Result<(), StoreError> {
        let record = StoredResult {
            student: student.clone(),
            saved_at_secs: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|elapsed| elapsed.as_secs())
                .unwrap_or(0),
            subject_names: subject_names.to_vec(),
            per_subject: report.per_subject.clone(),
            total: report.total,
        };
        let line = serde_json::to_string(&record).map_err(StoreError::Serialize)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(StoreError::Io)?;
        writeln!(file, "{line}").map_err(StoreError::Io)
    }

    fn load_all(&self) -> Result<Vec<StoredResult>, StoreError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let file = File::open(&self.path).map_err(StoreError::Io)?;
        let mut records = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line.map_err(StoreError::Io)?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<StoredResult>(&line) {
                Ok(record) => records.push(record),
                // A corrupt line loses one record, not the whole history.
                Err(e) => warn!("skipping unreadable result line: {e}"),
            }
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(per_subject: Vec<u32>) -> ScoreReport {
        let total = per_subject.iter().sum();
        ScoreReport { per_subject, total }
    }

    #[test]
    fn saved_results_round_trip_with_their_subject_names() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut store = JsonlStore::new(dir.path().join("results.jsonl"));
        let subjects = vec!["PYTHON".to_string(), "MySQL".to_string()];

        store
            .save(
                &StudentId::from("alpha".to_string()),
                &report(vec![18, 11]),
                &subjects,
            )
            .expect("save succeeds");
        store
            .save(
                &StudentId::from("beta".to_string()),
                &report(vec![20, 20]),
                &subjects,
            )
            .expect("save succeeds");

        let records = store.load_all().expect("load succeeds");
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].student, StudentId::from("alpha".to_string()));
        assert_eq!(records[0].subject_names, subjects);
        assert_eq!(records[0].per_subject, vec![18, 11]);
        assert_eq!(records[0].total, 29);
        assert_eq!(records[1].total, 40);
    }

    #[test]
    fn missing_file_reads_as_empty_history() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = JsonlStore::new(dir.path().join("nothing-here.jsonl"));
        assert!(store.load_all().expect("load succeeds").is_empty());
    }

    #[test]
    fn corrupt_lines_are_skipped_not_fatal() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("results.jsonl");
        std::fs::write(&path, "this is not json\n").expect("seed file");

        let mut store = JsonlStore::new(path);
        store
            .save(
                &StudentId::from("gamma".to_string()),
                &report(vec![5]),
                &["ONLY".to_string()],
            )
            .expect("save succeeds");

        let records = store.load_all().expect("load succeeds");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].total, 5);
    }
}
