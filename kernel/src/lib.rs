// Persist Kernel
//
// Serialization contract for durable metadata objects: how a value is
// written to the journal or a checkpoint, and how it is rebuilt on replay.

pub mod config;
pub mod error;
pub mod fallback;
pub mod primitive;
pub mod records;
pub mod registry;
pub mod replay;
pub mod writable;

pub use config::{CodecConfig, HeaderWidth};
pub use error::CodecError;
pub use registry::{ReaderRegistry, RecordType, RegistryError};
pub use writable::{FallbackPersist, Persistable, Readable, Writable};
