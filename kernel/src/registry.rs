// Record Type Registry
//
// Maps a record type tag (taken from the surrounding journal or checkpoint
// format) to the reconstruction routine of the concrete type stored at
// that position. The caller resolves the tag first; the registry never
// guesses a type from the bytes.

use std::collections::HashMap;
use std::fmt;
use std::io::Read;

use serde::{Deserialize, Serialize};

use crate::error::CodecError;
use crate::writable::Readable;

/// Tag identifying the concrete type of a journal record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordType(pub u16);

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "record type {}", self.0)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("{0} is already registered")]
    DuplicateRecordType(RecordType),

    #[error("no reader registered for {0}")]
    UnknownRecordType(RecordType),

    #[error("decode failed: {0}")]
    Codec(#[from] CodecError),
}

type Factory<R> = Box<dyn Fn(&mut dyn Read) -> Result<R, CodecError> + Send + Sync>;

/// Tag → factory lookup producing values of the caller's record enum `R`.
///
/// Built once at startup, then read-only.
pub struct ReaderRegistry<R> {
    factories: HashMap<RecordType, Factory<R>>,
}

impl<R> Default for ReaderRegistry<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> ReaderRegistry<R> {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register `T` under `tag`; decoded values are wrapped into `R` by `wrap`.
    pub fn register<T, F>(&mut self, tag: RecordType, wrap: F) -> Result<(), RegistryError>
    where
        T: Readable + 'static,
        F: Fn(T) -> R + Send + Sync + 'static,
    {
        if self.factories.contains_key(&tag) {
            return Err(RegistryError::DuplicateRecordType(tag));
        }

        self.factories.insert(
            tag,
            Box::new(move |source: &mut dyn Read| T::read_from(source).map(&wrap)),
        );
        Ok(())
    }

    /// Decode the record at the current position of `source` as `tag`.
    pub fn read(&self, tag: RecordType, source: &mut dyn Read) -> Result<R, RegistryError> {
        let factory = self
            .factories
            .get(&tag)
            .ok_or(RegistryError::UnknownRecordType(tag))?;
        Ok(factory(source)?)
    }

    pub fn contains(&self, tag: RecordType) -> bool {
        self.factories.contains_key(&tag)
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl<R> fmt::Debug for ReaderRegistry<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut tags: Vec<_> = self.factories.keys().map(|t| t.0).collect();
        tags.sort_unstable();
        f.debug_struct("ReaderRegistry")
            .field("record_types", &tags)
            .finish()
    }
}
