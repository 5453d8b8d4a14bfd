// Record Replay
//
// Reads a stream of tagged records and rebuilds each one through the
// registry. Framing per record:
//
//   [record type: u16 big-endian][record bytes as written by the type]
//
// Any failure aborts the whole replay. A record is never skipped: dropping
// one silently would leave durable state inconsistent.

use std::io::{Read, Write};

use tracing::{debug, warn};

use crate::error::CodecError;
use crate::primitive::{read_u8, write_u16};
use crate::registry::{ReaderRegistry, RecordType, RegistryError};
use crate::writable::Writable;

/// Errors that can occur during replay.
#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    #[error("replay aborted at record {index}: {source}")]
    Record {
        index: usize,
        source: RegistryError,
    },
}

impl ReplayError {
    /// Position of the record that could not be rebuilt.
    pub fn index(&self) -> usize {
        match self {
            ReplayError::Record { index, .. } => *index,
        }
    }
}

/// Append one tagged record to `sink`.
pub fn write_record<W, T>(sink: &mut W, tag: RecordType, record: &T) -> Result<(), CodecError>
where
    W: Write + ?Sized,
    T: Writable + ?Sized,
{
    write_u16(sink, tag.0)?;
    record.write_to(sink)
}

/// Read the next record type, or `None` at a clean end of stream.
fn read_tag(source: &mut dyn Read) -> Result<Option<RecordType>, CodecError> {
    let high = match read_u8(source) {
        Ok(byte) => byte,
        Err(CodecError::TruncatedStream { available: 0, .. }) => return Ok(None),
        Err(e) => return Err(e),
    };

    let low = match read_u8(source) {
        Ok(byte) => byte,
        Err(CodecError::TruncatedStream { .. }) => {
            return Err(CodecError::TruncatedStream {
                needed: 2,
                available: 1,
            })
        }
        Err(e) => return Err(e),
    };

    Ok(Some(RecordType(u16::from_be_bytes([high, low]))))
}

/// Replay every record in `source` until a clean end of stream.
///
/// This is the only supported way to rebuild records from a tagged stream.
pub fn replay_records<R>(
    source: &mut dyn Read,
    registry: &ReaderRegistry<R>,
) -> Result<Vec<R>, ReplayError> {
    let mut records = Vec::new();

    loop {
        let index = records.len();
        let abort = |source: RegistryError| {
            warn!(index, error = %source, "aborting replay");
            ReplayError::Record { index, source }
        };

        let tag = match read_tag(source) {
            Ok(Some(tag)) => tag,
            Ok(None) => break,
            Err(e) => return Err(abort(e.into())),
        };

        let record = registry.read(tag, source).map_err(abort)?;
        records.push(record);
    }

    debug!(records = records.len(), "replay complete");
    Ok(records)
}
