//! Decision log storage: append and load the shared JSONL log.

use std::{fs, io};

// Traits must be in scope for `.lines()` on BufReader and `.write_all()` on File.
use io::{BufRead, Write};

use jiff::Timestamp;

use crate::model::{DecisionDraft, DecisionLogEntry};

use super::{Result, Store, StorageError};

impl Store {
    /// Appends a decision, assigning the next per-day sequence id
    /// (`D-YYYYMMDD-NNN`). Counting and appending happen under the log
    /// guard so two instances never mint the same id.
    pub fn append_decision(&self, draft: DecisionDraft) -> Result<DecisionLogEntry> {
        let path = self.decisions_path();
        let _guard = self.guard(&path)?;

        let now = Timestamp::now();
        let date = now.strftime("%Y%m%d").to_string();
        let prefix = format!("D-{date}-");
        let seq = self
            .load_decisions()?
            .iter()
            .filter(|e| e.decision_id.starts_with(&prefix))
            .count()
            + 1;

        let entry = DecisionLogEntry {
            decision_id: format!("{prefix}{seq:03}"),
            category: draft.category,
            title: draft.title,
            description: draft.description,
            scope: draft.scope,
            timestamp: now,
            author_instance_id: draft.author_instance_id,
        };

        let mut file = fs::OpenOptions::new().create(true).append(true).open(&path)?;
        let mut line = serde_json::to_string(&entry)?;
        line.push('\n');
        file.write_all(line.as_bytes())?;

        Ok(entry)
    }

    /// Loads the whole decision log in append order.
    pub fn load_decisions(&self) -> Result<Vec<DecisionLogEntry>> {
        let path = self.decisions_path();
        let file = match fs::File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let reader = io::BufReader::new(file);
        let mut entries = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str(&line) {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    return Err(StorageError::Corrupt {
                        path,
                        detail: e.to_string(),
                    });
                }
            }
        }
        Ok(entries)
    }
}
