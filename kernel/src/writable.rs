// Writable / Readable Contract
//
// `Writable` is the one polymorphic capability: "serialize this instance
// to a sink". `Readable` is its read-side partner, an associated
// constructor with no receiver, so reconstruction is resolved by type
// rather than by dispatch on an existing value.
//
// A type persists itself in one of two ways:
// - hand-written `Writable` + `Readable` impls over the primitive codec,
//   owning their own layout and version tags
// - `impl FallbackPersist for T {}` on a serde type, which provides both
//   halves through the structured-text fallback

use std::io::{Read, Write};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::CodecError;
use crate::fallback;

/// Serialize this instance to a sink.
///
/// Implementations must be deterministic: the same logical state always
/// produces the same bytes.
pub trait Writable {
    fn write_to<W: Write + ?Sized>(&self, sink: &mut W) -> Result<(), CodecError>;
}

/// Reconstruct a fresh instance from a source.
///
/// Must read exactly what the matching `Writable` impl wrote, in the same
/// order.
pub trait Readable: Sized {
    fn read_from<R: Read + ?Sized>(source: &mut R) -> Result<Self, CodecError>;
}

/// A type with both halves of the contract.
pub trait Persistable: Writable + Readable {}

impl<T: Writable + Readable> Persistable for T {}

/// Opt-in to persistence through the structured-text fallback.
///
/// Durable state must not contain hash-ordered maps; use `BTreeMap` so the
/// rendered document stays deterministic.
pub trait FallbackPersist: Serialize + DeserializeOwned {
    /// Runs on every freshly decoded instance, e.g. to rebuild derived
    /// state that is not persisted or to reject inconsistent documents.
    fn after_read(&mut self) -> Result<(), CodecError> {
        Ok(())
    }
}

impl<T: FallbackPersist> Writable for T {
    fn write_to<W: Write + ?Sized>(&self, sink: &mut W) -> Result<(), CodecError> {
        fallback::write_document(sink, self)
    }
}

impl<T: FallbackPersist> Readable for T {
    fn read_from<R: Read + ?Sized>(source: &mut R) -> Result<Self, CodecError> {
        let mut value: T = fallback::read_document(source)?;
        value.after_read()?;
        Ok(value)
    }
}

/// Encode one record into a new buffer.
pub fn encode_to_vec<T: Writable + ?Sized>(value: &T) -> Result<Vec<u8>, CodecError> {
    let mut buf = Vec::new();
    value.write_to(&mut buf)?;
    Ok(buf)
}

/// Decode one record that must span the whole slice.
pub fn decode_from_slice<T: Readable>(bytes: &[u8]) -> Result<T, CodecError> {
    let mut source = bytes;
    let value = T::read_from(&mut source)?;
    if !source.is_empty() {
        return Err(CodecError::CodecFailure(format!(
            "{} trailing bytes after record",
            source.len()
        )));
    }
    Ok(value)
}
