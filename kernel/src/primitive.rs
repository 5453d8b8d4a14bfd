// Primitive Codec
//
// Fixed-width big-endian primitives and length-prefixed text over a
// caller-owned sink/source. Every other encoding is built on this.
//
// Layout of a text value:
//
//   [length header: 2 or 4 bytes, big-endian][UTF-8 bytes, exactly `length`]

use std::io::{self, Read, Write};

use byteorder::{BigEndian, ByteOrder, WriteBytesExt};
use tracing::trace;

use crate::config::{CodecConfig, HeaderWidth};
use crate::error::CodecError;

/// Fill `buf` completely or report how far the source got.
///
/// Used instead of `ReadBytesExt`, whose `read_exact` drops the number of
/// bytes that did arrive. Both a zero-length read and `UnexpectedEof`
/// from the source count as the end of the stream.
fn fill<R: Read + ?Sized>(source: &mut R, buf: &mut [u8]) -> Result<(), CodecError> {
    let mut filled = 0;
    while filled < buf.len() {
        match source.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e.into()),
        }
    }

    if filled < buf.len() {
        return Err(CodecError::TruncatedStream {
            needed: buf.len() as u64,
            available: filled as u64,
        });
    }
    Ok(())
}

/// Drain up to `limit` bytes into `out` (or discard them), stopping early at
/// end of stream. Returns how many bytes were consumed.
fn drain<R: Read + ?Sized>(
    source: &mut R,
    limit: u64,
    mut out: Option<&mut Vec<u8>>,
) -> Result<u64, CodecError> {
    let mut limited = Read::take(&mut *source, limit);
    let mut scratch = [0u8; 8192];
    let mut consumed = 0u64;
    loop {
        match limited.read(&mut scratch) {
            Ok(0) => break,
            Ok(n) => {
                if let Some(out) = out.as_deref_mut() {
                    out.extend_from_slice(&scratch[..n]);
                }
                consumed += n as u64;
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(consumed)
}

/// Write raw bytes with no header; the reader must know the width.
pub fn write_fixed<W: Write + ?Sized>(sink: &mut W, bytes: &[u8]) -> Result<(), CodecError> {
    sink.write_all(bytes)?;
    Ok(())
}

pub fn read_fixed<const N: usize, R: Read + ?Sized>(source: &mut R) -> Result<[u8; N], CodecError> {
    let mut buf = [0u8; N];
    fill(source, &mut buf)?;
    Ok(buf)
}

pub fn write_u8<W: Write + ?Sized>(sink: &mut W, value: u8) -> Result<(), CodecError> {
    sink.write_u8(value)?;
    Ok(())
}

pub fn read_u8<R: Read + ?Sized>(source: &mut R) -> Result<u8, CodecError> {
    let mut buf = [0u8; 1];
    fill(source, &mut buf)?;
    Ok(buf[0])
}

pub fn write_bool<W: Write + ?Sized>(sink: &mut W, value: bool) -> Result<(), CodecError> {
    write_u8(sink, u8::from(value))
}

/// Booleans are a single 0/1 byte; anything else is corruption.
pub fn read_bool<R: Read + ?Sized>(source: &mut R) -> Result<bool, CodecError> {
    match read_u8(source)? {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(CodecError::CodecFailure(format!(
            "invalid boolean byte {other:#04x}"
        ))),
    }
}

pub fn write_u16<W: Write + ?Sized>(sink: &mut W, value: u16) -> Result<(), CodecError> {
    sink.write_u16::<BigEndian>(value)?;
    Ok(())
}

pub fn read_u16<R: Read + ?Sized>(source: &mut R) -> Result<u16, CodecError> {
    let mut buf = [0u8; 2];
    fill(source, &mut buf)?;
    Ok(BigEndian::read_u16(&buf))
}

pub fn write_i16<W: Write + ?Sized>(sink: &mut W, value: i16) -> Result<(), CodecError> {
    sink.write_i16::<BigEndian>(value)?;
    Ok(())
}

pub fn read_i16<R: Read + ?Sized>(source: &mut R) -> Result<i16, CodecError> {
    let mut buf = [0u8; 2];
    fill(source, &mut buf)?;
    Ok(BigEndian::read_i16(&buf))
}

pub fn write_i32<W: Write + ?Sized>(sink: &mut W, value: i32) -> Result<(), CodecError> {
    sink.write_i32::<BigEndian>(value)?;
    Ok(())
}

pub fn read_i32<R: Read + ?Sized>(source: &mut R) -> Result<i32, CodecError> {
    let mut buf = [0u8; 4];
    fill(source, &mut buf)?;
    Ok(BigEndian::read_i32(&buf))
}

pub fn write_i64<W: Write + ?Sized>(sink: &mut W, value: i64) -> Result<(), CodecError> {
    sink.write_i64::<BigEndian>(value)?;
    Ok(())
}

pub fn read_i64<R: Read + ?Sized>(source: &mut R) -> Result<i64, CodecError> {
    let mut buf = [0u8; 8];
    fill(source, &mut buf)?;
    Ok(BigEndian::read_i64(&buf))
}

pub fn write_u64<W: Write + ?Sized>(sink: &mut W, value: u64) -> Result<(), CodecError> {
    sink.write_u64::<BigEndian>(value)?;
    Ok(())
}

pub fn read_u64<R: Read + ?Sized>(source: &mut R) -> Result<u64, CodecError> {
    let mut buf = [0u8; 8];
    fill(source, &mut buf)?;
    Ok(BigEndian::read_u64(&buf))
}

pub fn write_f32<W: Write + ?Sized>(sink: &mut W, value: f32) -> Result<(), CodecError> {
    sink.write_f32::<BigEndian>(value)?;
    Ok(())
}

pub fn read_f32<R: Read + ?Sized>(source: &mut R) -> Result<f32, CodecError> {
    let mut buf = [0u8; 4];
    fill(source, &mut buf)?;
    Ok(BigEndian::read_f32(&buf))
}

pub fn write_f64<W: Write + ?Sized>(sink: &mut W, value: f64) -> Result<(), CodecError> {
    sink.write_f64::<BigEndian>(value)?;
    Ok(())
}

pub fn read_f64<R: Read + ?Sized>(source: &mut R) -> Result<f64, CodecError> {
    let mut buf = [0u8; 8];
    fill(source, &mut buf)?;
    Ok(BigEndian::read_f64(&buf))
}

/// Length-prefixed text and byte codec for one header configuration.
///
/// Stateless; safe to share across threads. Callers still own the
/// sink/source exclusively for the duration of a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextCodec {
    header_width: HeaderWidth,
    max_len: u64,
}

impl Default for TextCodec {
    fn default() -> Self {
        Self::new(&CodecConfig::default())
    }
}

impl TextCodec {
    pub fn new(config: &CodecConfig) -> Self {
        Self {
            header_width: config.header_width,
            max_len: config.effective_max_len(),
        }
    }

    pub fn header_width(&self) -> HeaderWidth {
        self.header_width
    }

    pub fn max_len(&self) -> u64 {
        self.max_len
    }

    /// Write `text` as `[header][utf-8 bytes]`.
    pub fn write_text<W: Write + ?Sized>(&self, sink: &mut W, text: &str) -> Result<(), CodecError> {
        self.write_bytes(sink, text.as_bytes())
    }

    /// Read one text value written by [`TextCodec::write_text`].
    pub fn read_text<R: Read + ?Sized>(&self, source: &mut R) -> Result<String, CodecError> {
        let bytes = self.read_bytes(source)?;
        String::from_utf8(bytes)
            .map_err(|e| CodecError::CodecFailure(format!("invalid utf-8 in text value: {e}")))
    }

    /// Same framing as text, without UTF-8 validation.
    ///
    /// Fails before writing anything if the value is too long.
    pub fn write_bytes<W: Write + ?Sized>(&self, sink: &mut W, bytes: &[u8]) -> Result<(), CodecError> {
        let len = bytes.len() as u64;
        if len > self.max_len {
            return Err(CodecError::EncodingOverflow {
                len,
                max: self.max_len,
            });
        }

        self.write_header(sink, len)?;
        sink.write_all(bytes)?;
        trace!(len, header = self.header_width.size(), "wrote length-prefixed value");
        Ok(())
    }

    pub fn read_bytes<R: Read + ?Sized>(&self, source: &mut R) -> Result<Vec<u8>, CodecError> {
        let len = self.read_header(source)?;

        // Grow with what actually arrives; a corrupt header must not
        // trigger a huge allocation.
        let mut buf = Vec::new();
        let read = drain(source, len, Some(&mut buf))?;
        if read < len {
            return Err(CodecError::TruncatedStream {
                needed: len,
                available: read,
            });
        }
        Ok(buf)
    }

    /// Consume one text value without decoding it. Returns its content length.
    pub fn skip_text<R: Read + ?Sized>(&self, source: &mut R) -> Result<u64, CodecError> {
        let len = self.read_header(source)?;
        let skipped = drain(source, len, None)?;
        if skipped < len {
            return Err(CodecError::TruncatedStream {
                needed: len,
                available: skipped,
            });
        }
        Ok(len)
    }

    fn write_header<W: Write + ?Sized>(&self, sink: &mut W, len: u64) -> Result<(), CodecError> {
        // `len` is already bounded by `max_len`, which never exceeds the header range.
        match self.header_width {
            HeaderWidth::Short => write_u16(sink, len as u16),
            HeaderWidth::Int => write_i32(sink, len as i32),
        }
    }

    fn read_header<R: Read + ?Sized>(&self, source: &mut R) -> Result<u64, CodecError> {
        let len = match self.header_width {
            HeaderWidth::Short => u64::from(read_u16(source)?),
            HeaderWidth::Int => {
                let raw = read_i32(source)?;
                if raw < 0 {
                    return Err(CodecError::CodecFailure(format!(
                        "negative length header {raw}"
                    )));
                }
                raw as u64
            }
        };

        if len > self.max_len {
            return Err(CodecError::CodecFailure(format!(
                "declared length {len} exceeds limit {}",
                self.max_len
            )));
        }
        Ok(len)
    }
}

/// Write length-prefixed text with the default 4-byte header.
pub fn write_text<W: Write + ?Sized>(sink: &mut W, text: &str) -> Result<(), CodecError> {
    TextCodec::default().write_text(sink, text)
}

/// Read length-prefixed text with the default 4-byte header.
pub fn read_text<R: Read + ?Sized>(source: &mut R) -> Result<String, CodecError> {
    TextCodec::default().read_text(source)
}

/// Presence flag, then the text if present.
pub fn write_optional_text<W: Write + ?Sized>(
    sink: &mut W,
    text: Option<&str>,
) -> Result<(), CodecError> {
    write_bool(sink, text.is_some())?;
    match text {
        Some(text) => write_text(sink, text),
        None => Ok(()),
    }
}

pub fn read_optional_text<R: Read + ?Sized>(source: &mut R) -> Result<Option<String>, CodecError> {
    if read_bool(source)? {
        read_text(source).map(Some)
    } else {
        Ok(None)
    }
}

/// Write a 4-byte element count, then each element through `write_item`.
pub fn write_seq<W, T, F>(sink: &mut W, items: &[T], mut write_item: F) -> Result<(), CodecError>
where
    W: Write + ?Sized,
    F: FnMut(&mut W, &T) -> Result<(), CodecError>,
{
    let count = i32::try_from(items.len()).map_err(|_| CodecError::EncodingOverflow {
        len: items.len() as u64,
        max: i32::MAX as u64,
    })?;

    write_i32(sink, count)?;
    for item in items {
        write_item(sink, item)?;
    }
    Ok(())
}

pub fn read_seq<R, T, F>(source: &mut R, mut read_item: F) -> Result<Vec<T>, CodecError>
where
    R: Read + ?Sized,
    F: FnMut(&mut R) -> Result<T, CodecError>,
{
    let count = read_i32(source)?;
    if count < 0 {
        return Err(CodecError::CodecFailure(format!(
            "negative element count {count}"
        )));
    }

    let mut items = Vec::with_capacity((count as usize).min(1024));
    for _ in 0..count {
        items.push(read_item(source)?);
    }
    Ok(items)
}
