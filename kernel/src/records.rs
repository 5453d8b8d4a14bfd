// Built-in Journal Records
//
// Metadata records written by the server itself. `TableEvent` uses a
// hand-written, versioned binary layout; `SchemaChange` is persisted
// through the structured-text fallback.

use std::collections::BTreeMap;
use std::io::{Read, Write};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CodecError;
use crate::primitive::{
    read_fixed, read_u64, read_u8, write_fixed, write_u64, write_u8, TextCodec,
};
use crate::registry::{ReaderRegistry, RecordType, RegistryError};
use crate::replay::write_record;
use crate::writable::{FallbackPersist, Readable, Writable};

/// Logical version of a table.
pub type Version = u64;

pub const TABLE_EVENT: RecordType = RecordType(1);
pub const SCHEMA_CHANGE: RecordType = RecordType(2);

/// Stable identifier for a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TableId(pub Uuid);

impl TableId {
    /// A fresh random id.
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

/// 16 raw bytes.
impl Writable for TableId {
    fn write_to<W: Write + ?Sized>(&self, sink: &mut W) -> Result<(), CodecError> {
        write_fixed(sink, self.0.as_bytes())
    }
}

impl Readable for TableId {
    fn read_from<R: Read + ?Sized>(source: &mut R) -> Result<Self, CodecError> {
        Ok(TableId(Uuid::from_bytes(read_fixed::<16, _>(source)?)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    TableCreated,
    SchemaUpdated,
    SnapshotAdded,
    SnapshotRemoved,
}

impl EventType {
    /// On-disk code. Codes are never reused.
    pub fn code(self) -> u8 {
        match self {
            EventType::TableCreated => 1,
            EventType::SchemaUpdated => 2,
            EventType::SnapshotAdded => 3,
            EventType::SnapshotRemoved => 4,
        }
    }

    pub fn from_code(code: u8) -> Result<Self, CodecError> {
        match code {
            1 => Ok(EventType::TableCreated),
            2 => Ok(EventType::SchemaUpdated),
            3 => Ok(EventType::SnapshotAdded),
            4 => Ok(EventType::SnapshotRemoved),
            other => Err(CodecError::CodecFailure(format!(
                "unknown event type code {other}"
            ))),
        }
    }
}

/// A versioned change to a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableEvent {
    pub table_id: TableId,
    pub version: Version,
    pub event_type: EventType,
    pub payload: Vec<u8>,
}

impl TableEvent {
    /// Layout version written as the first byte of every record.
    pub const FORMAT_VERSION: u8 = 1;
}

/// Layout (format 1):
///
/// ```text
/// [format: u8][table id: 16 bytes][version: u64][event type: u8][payload: i32 length + bytes]
/// ```
impl Writable for TableEvent {
    fn write_to<W: Write + ?Sized>(&self, sink: &mut W) -> Result<(), CodecError> {
        write_u8(sink, Self::FORMAT_VERSION)?;
        self.table_id.write_to(sink)?;
        write_u64(sink, self.version)?;
        write_u8(sink, self.event_type.code())?;
        TextCodec::default().write_bytes(sink, &self.payload)
    }
}

impl Readable for TableEvent {
    fn read_from<R: Read + ?Sized>(source: &mut R) -> Result<Self, CodecError> {
        let format = read_u8(source)?;
        if format != Self::FORMAT_VERSION {
            return Err(CodecError::SchemaMismatch(format!(
                "unsupported TableEvent format {format}"
            )));
        }

        let table_id = TableId::read_from(source)?;
        let version = read_u64(source)?;
        let event_type = EventType::from_code(read_u8(source)?)?;
        let payload = TextCodec::default().read_bytes(source)?;

        Ok(TableEvent {
            table_id,
            version,
            event_type,
            payload,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    pub data_type: String,
    #[serde(default = "nullable_default")]
    pub nullable: bool,
}

fn nullable_default() -> bool {
    true
}

/// New schema for a table, persisted as a structured-text document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaChange {
    pub table_id: TableId,
    pub schema_name: String,
    pub columns: Vec<ColumnDef>,
    pub comment: Option<String>,

    /// Added after the first release; older documents decode with no properties.
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

impl FallbackPersist for SchemaChange {
    fn after_read(&mut self) -> Result<(), CodecError> {
        let mut seen = std::collections::BTreeSet::new();
        for column in &self.columns {
            if !seen.insert(column.name.as_str()) {
                return Err(CodecError::SchemaMismatch(format!(
                    "duplicate column `{}` in schema `{}`",
                    column.name, self.schema_name
                )));
            }
        }
        Ok(())
    }
}

/// Any record the server writes to its journal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JournalRecord {
    TableEvent(TableEvent),
    SchemaChange(SchemaChange),
}

impl JournalRecord {
    pub fn record_type(&self) -> RecordType {
        match self {
            JournalRecord::TableEvent(_) => TABLE_EVENT,
            JournalRecord::SchemaChange(_) => SCHEMA_CHANGE,
        }
    }

    /// Write the record with its type tag in front.
    pub fn write_tagged<W: Write + ?Sized>(&self, sink: &mut W) -> Result<(), CodecError> {
        match self {
            JournalRecord::TableEvent(event) => write_record(sink, TABLE_EVENT, event),
            JournalRecord::SchemaChange(change) => write_record(sink, SCHEMA_CHANGE, change),
        }
    }
}

/// Registry with every built-in record type.
pub fn journal_registry() -> Result<ReaderRegistry<JournalRecord>, RegistryError> {
    let mut registry = ReaderRegistry::new();
    registry.register(TABLE_EVENT, JournalRecord::TableEvent)?;
    registry.register(SCHEMA_CHANGE, JournalRecord::SchemaChange)?;
    Ok(registry)
}
