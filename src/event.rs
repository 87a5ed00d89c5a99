//! Event records and the datasources that produce them.
//!
//! A datasource is a finite, ordered stream of flat records. Acquisition
//! failures are reported per record so a single bad line does not end a run.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::error::SourceError;
use crate::value::{Record, Value};

/// One flat event: field name → scalar.
pub type EventRecord = Record;

/// A lazy, finite sequence of event records.
pub trait DataSource {
    /// Short identifier, recorded in exported graph metadata.
    fn name(&self) -> &str;

    /// Descriptive metadata stored alongside the exported graph.
    fn metadata(&self) -> Record {
        crate::value::record([("source", self.name())])
    }

    fn events(&mut self) -> Box<dyn Iterator<Item = Result<EventRecord, SourceError>> + '_>;
}

/// Events read from JSON lines: one object per line.
pub struct JsonLinesSource {
    name: String,
    reader: Option<Box<dyn BufRead + Send>>,
}

impl JsonLinesSource {
    pub fn open(path: &Path) -> Result<Self, SourceError> {
        let file = File::open(path).map_err(|e| SourceError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        Ok(Self::from_reader(
            path.display().to_string(),
            Box::new(BufReader::new(file)),
        ))
    }

    pub fn from_reader(name: impl Into<String>, reader: Box<dyn BufRead + Send>) -> Self {
        Self {
            name: name.into(),
            reader: Some(reader),
        }
    }
}

impl DataSource for JsonLinesSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn metadata(&self) -> Record {
        crate::value::record([("source", self.name.as_str()), ("format", "jsonl")])
    }

    /// Stream the remaining lines. The reader is consumed: calling this a
    /// second time yields nothing.
    fn events(&mut self) -> Box<dyn Iterator<Item = Result<EventRecord, SourceError>> + '_> {
        let Some(reader) = self.reader.take() else {
            return Box::new(std::iter::empty());
        };
        let path = self.name.clone();
        Box::new(
            reader
                .lines()
                .enumerate()
                .filter_map(move |(i, line)| {
                    let line_no = i + 1;
                    match line {
                        Ok(line) if line.trim().is_empty() => None,
                        Ok(line) => Some(parse_line(line_no, &line)),
                        Err(e) => Some(Err(SourceError::Io {
                            path: format!("{path}:{line_no}"),
                            source: e,
                        })),
                    }
                }),
        )
    }
}

fn parse_line(line: usize, text: &str) -> Result<EventRecord, SourceError> {
    let object: serde_json::Map<String, serde_json::Value> =
        serde_json::from_str(text).map_err(|e| SourceError::Parse {
            line,
            message: e.to_string(),
        })?;

    let mut record = EventRecord::new();
    for (field, value) in object {
        match Value::from_json(value) {
            Some(Value::Null) => {}
            Some(value) => {
                record.insert(field, value);
            }
            None => return Err(SourceError::NonScalarField { line, field }),
        }
    }
    Ok(record)
}

/// Events held in memory, mostly for tests and embedding.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    name: String,
    events: Vec<EventRecord>,
}

impl MemorySource {
    pub fn new(name: impl Into<String>, events: Vec<EventRecord>) -> Self {
        Self {
            name: name.into(),
            events,
        }
    }
}

impl DataSource for MemorySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn events(&mut self) -> Box<dyn Iterator<Item = Result<EventRecord, SourceError>> + '_> {
        Box::new(std::mem::take(&mut self.events).into_iter().map(Ok))
    }
}
