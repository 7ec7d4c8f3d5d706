//! Record sinks for finished people.
//!
//! The scheduler hands every kept person (never a discarded retry) to a
//! [`RecordSink`]. Sinks are called concurrently from worker threads.

use crate::error::SimError;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use statesim_core::{AttributeValue, ModuleHistory, Person, Timestamp};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use uuid::Uuid;

/// Exported form of one finished person.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonRecord {
    pub index: usize,
    pub id: Uuid,
    pub seed: u64,
    pub birth: Timestamp,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub death: Option<Timestamp>,
    pub attributes: BTreeMap<String, AttributeValue>,
    /// Per-module histories, most recent entry first.
    pub histories: BTreeMap<String, ModuleHistory>,
}

impl PersonRecord {
    pub fn from_person(person: &Person) -> Self {
        Self {
            index: person.index(),
            id: person.id(),
            seed: person.seed(),
            birth: person.birth(),
            death: person.death(),
            attributes: person.attributes().clone(),
            histories: person.histories().clone(),
        }
    }
}

/// Receives each finished person.
pub trait RecordSink: Send + Sync {
    fn accept(&self, person: &Person) -> Result<(), SimError>;

    /// Called once after the last person.
    fn finish(&self) -> Result<(), SimError> {
        Ok(())
    }
}

/// Writes one JSON object per person, one per line.
pub struct JsonLinesSink {
    writer: Mutex<BufWriter<File>>,
}

impl JsonLinesSink {
    pub fn create(path: impl AsRef<Path>) -> Result<Self, SimError> {
        let file = File::create(path)?;
        Ok(Self {
            writer: Mutex::new(BufWriter::new(file)),
        })
    }
}

impl RecordSink for JsonLinesSink {
    fn accept(&self, person: &Person) -> Result<(), SimError> {
        let line = serde_json::to_string(&PersonRecord::from_person(person))?;
        let mut writer = self.writer.lock();
        writer.write_all(line.as_bytes())?;
        writer.write_all(b"\n")?;
        Ok(())
    }

    fn finish(&self) -> Result<(), SimError> {
        self.writer.lock().flush()?;
        Ok(())
    }
}

/// Keeps every record in memory.
#[derive(Default)]
pub struct CollectingSink {
    records: Mutex<Vec<PersonRecord>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collected records, ordered by population index.
    pub fn records(&self) -> Vec<PersonRecord> {
        let mut records = self.records.lock().clone();
        records.sort_by_key(|r| r.index);
        records
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

impl RecordSink for CollectingSink {
    fn accept(&self, person: &Person) -> Result<(), SimError> {
        self.records.lock().push(PersonRecord::from_person(person));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_collecting_sink_orders_by_index() {
        let sink = CollectingSink::new();
        let mut late = Person::new(5, 1);
        late.set_attribute("gender", "F");
        sink.accept(&late).unwrap();
        sink.accept(&Person::new(2, 2)).unwrap();

        let records = sink.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].index, 2);
        assert_eq!(records[1].attributes.get("gender"), Some(&AttributeValue::from("F")));
    }

    #[test]
    fn test_json_lines_sink() {
        let path = std::env::temp_dir().join(format!("statesim-sink-{}.jsonl", std::process::id()));
        let sink = JsonLinesSink::create(&path).unwrap();
        let mut person = Person::new(0, 3);
        person.record_death(10);
        sink.accept(&person).unwrap();
        sink.accept(&Person::new(1, 4)).unwrap();
        sink.finish().unwrap();

        let text = fs::read_to_string(&path).unwrap();
        let records: Vec<PersonRecord> = text.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].death, Some(10));
        assert_eq!(records[1].death, None);
        assert_eq!(records[0].id, person.id());

        fs::remove_file(&path).unwrap();
    }
}
