// Structured-Text Fallback Codec
//
// Default persistence for types without a hand-written binary layout.
// The value is rendered to a JSON document (fields in declaration order,
// enumerated at compile time by serde derive) and written as one
// length-prefixed text value.
//
// Compatibility rules:
// - a field added later with `#[serde(default)]` decodes old documents
// - fields present in a document but unknown to the type are ignored
// - a missing required field, or a value of the wrong shape, is a
//   schema mismatch
// - renaming a field breaks old documents; that is not solved here

use std::io::{Read, Write};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::error::Category;
use tracing::{debug, trace, warn};

use crate::error::CodecError;
use crate::primitive::TextCodec;

/// Render `value` to its structured-text document.
///
/// Struct fields come out in declaration order, so the same state always
/// renders to the same bytes as long as the type avoids hash-ordered maps.
///
/// NaN and infinities have no JSON form (serde_json would write `null` and
/// the record could never be read back), so they are rejected here, before
/// anything reaches a sink.
pub fn render_document<T: Serialize + ?Sized>(value: &T) -> Result<String, CodecError> {
    value
        .serialize(finite::FiniteFloats)
        .map_err(|e| CodecError::CodecFailure(format!("failed to render document: {e}")))?;

    serde_json::to_string(value)
        .map_err(|e| CodecError::CodecFailure(format!("failed to render document: {e}")))
}

/// Build a fresh `T` from a structured-text document.
pub fn parse_document<T: DeserializeOwned>(text: &str) -> Result<T, CodecError> {
    serde_json::from_str(text).map_err(|e| classify(e, std::any::type_name::<T>()))
}

fn classify(err: serde_json::Error, target: &str) -> CodecError {
    match err.classify() {
        Category::Data => {
            warn!(target_type = target, error = %err, "fallback document does not fit target type");
            CodecError::SchemaMismatch(format!("{target}: {err}"))
        }
        Category::Syntax | Category::Eof | Category::Io => {
            CodecError::CodecFailure(format!("malformed document for {target}: {err}"))
        }
    }
}

impl TextCodec {
    /// Write `value` as a single length-prefixed document.
    pub fn write_document<W, T>(&self, sink: &mut W, value: &T) -> Result<(), CodecError>
    where
        W: Write + ?Sized,
        T: Serialize + ?Sized,
    {
        let text = render_document(value)?;
        trace!(bytes = text.len(), "rendered fallback document");
        self.write_text(sink, &text)
    }

    /// Read one length-prefixed document into a fresh `T`.
    ///
    /// Only parses; `FallbackPersist::after_read` runs in the `Readable`
    /// impl built on top of this.
    pub fn read_document<R, T>(&self, source: &mut R) -> Result<T, CodecError>
    where
        R: Read + ?Sized,
        T: DeserializeOwned,
    {
        let text = self.read_text(source)?;
        debug!(
            bytes = text.len(),
            target_type = std::any::type_name::<T>(),
            "decoding fallback document"
        );
        parse_document(&text)
    }

    /// Read a document without a target type.
    ///
    /// Useful for inspecting old records or for best-effort migration
    /// when the current type no longer fits.
    pub fn read_raw_document<R: Read + ?Sized>(
        &self,
        source: &mut R,
    ) -> Result<serde_json::Value, CodecError> {
        let text = self.read_text(source)?;
        parse_document(&text)
    }
}

mod finite {
    // A serializer that renders nothing and only checks every float it
    // is handed.

    use std::fmt;

    use serde::ser::{
        self, Serialize, SerializeMap, SerializeSeq, SerializeStruct, SerializeStructVariant,
        SerializeTuple, SerializeTupleStruct, SerializeTupleVariant, Serializer,
    };

    #[derive(Debug, thiserror::Error)]
    #[error("{0}")]
    pub(super) struct FloatCheckError(String);

    impl ser::Error for FloatCheckError {
        fn custom<T: fmt::Display>(msg: T) -> Self {
            FloatCheckError(msg.to_string())
        }
    }

    #[derive(Debug, Clone, Copy)]
    pub(super) struct FiniteFloats;

    fn check(finite: bool, value: f64) -> Result<(), FloatCheckError> {
        if finite {
            Ok(())
        } else {
            Err(FloatCheckError(format!(
                "non-finite float {value} cannot be represented"
            )))
        }
    }

    impl Serializer for FiniteFloats {
        type Ok = ();
        type Error = FloatCheckError;
        type SerializeSeq = Self;
        type SerializeTuple = Self;
        type SerializeTupleStruct = Self;
        type SerializeTupleVariant = Self;
        type SerializeMap = Self;
        type SerializeStruct = Self;
        type SerializeStructVariant = Self;

        fn serialize_bool(self, _v: bool) -> Result<(), FloatCheckError> {
            Ok(())
        }

        fn serialize_i8(self, _v: i8) -> Result<(), FloatCheckError> {
            Ok(())
        }

        fn serialize_i16(self, _v: i16) -> Result<(), FloatCheckError> {
            Ok(())
        }

        fn serialize_i32(self, _v: i32) -> Result<(), FloatCheckError> {
            Ok(())
        }

        fn serialize_i64(self, _v: i64) -> Result<(), FloatCheckError> {
            Ok(())
        }

        fn serialize_i128(self, _v: i128) -> Result<(), FloatCheckError> {
            Ok(())
        }

        fn serialize_u8(self, _v: u8) -> Result<(), FloatCheckError> {
            Ok(())
        }

        fn serialize_u16(self, _v: u16) -> Result<(), FloatCheckError> {
            Ok(())
        }

        fn serialize_u32(self, _v: u32) -> Result<(), FloatCheckError> {
            Ok(())
        }

        fn serialize_u64(self, _v: u64) -> Result<(), FloatCheckError> {
            Ok(())
        }

        fn serialize_u128(self, _v: u128) -> Result<(), FloatCheckError> {
            Ok(())
        }

        fn serialize_f32(self, v: f32) -> Result<(), FloatCheckError> {
            check(v.is_finite(), f64::from(v))
        }

        fn serialize_f64(self, v: f64) -> Result<(), FloatCheckError> {
            check(v.is_finite(), v)
        }

        fn serialize_char(self, _v: char) -> Result<(), FloatCheckError> {
            Ok(())
        }

        fn serialize_str(self, _v: &str) -> Result<(), FloatCheckError> {
            Ok(())
        }

        fn serialize_bytes(self, _v: &[u8]) -> Result<(), FloatCheckError> {
            Ok(())
        }

        fn serialize_none(self) -> Result<(), FloatCheckError> {
            Ok(())
        }

        fn serialize_some<T: ?Sized + Serialize>(self, value: &T) -> Result<(), FloatCheckError> {
            value.serialize(self)
        }

        fn serialize_unit(self) -> Result<(), FloatCheckError> {
            Ok(())
        }

        fn serialize_unit_struct(self, _name: &'static str) -> Result<(), FloatCheckError> {
            Ok(())
        }

        fn serialize_unit_variant(
            self,
            _name: &'static str,
            _index: u32,
            _variant: &'static str,
        ) -> Result<(), FloatCheckError> {
            Ok(())
        }

        fn serialize_newtype_struct<T: ?Sized + Serialize>(
            self,
            _name: &'static str,
            value: &T,
        ) -> Result<(), FloatCheckError> {
            value.serialize(self)
        }

        fn serialize_newtype_variant<T: ?Sized + Serialize>(
            self,
            _name: &'static str,
            _index: u32,
            _variant: &'static str,
            value: &T,
        ) -> Result<(), FloatCheckError> {
            value.serialize(self)
        }

        fn serialize_seq(self, _len: Option<usize>) -> Result<Self, FloatCheckError> {
            Ok(self)
        }

        fn serialize_tuple(self, _len: usize) -> Result<Self, FloatCheckError> {
            Ok(self)
        }

        fn serialize_tuple_struct(
            self,
            _name: &'static str,
            _len: usize,
        ) -> Result<Self, FloatCheckError> {
            Ok(self)
        }

        fn serialize_tuple_variant(
            self,
            _name: &'static str,
            _index: u32,
            _variant: &'static str,
            _len: usize,
        ) -> Result<Self, FloatCheckError> {
            Ok(self)
        }

        fn serialize_map(self, _len: Option<usize>) -> Result<Self, FloatCheckError> {
            Ok(self)
        }

        fn serialize_struct(
            self,
            _name: &'static str,
            _len: usize,
        ) -> Result<Self, FloatCheckError> {
            Ok(self)
        }

        fn serialize_struct_variant(
            self,
            _name: &'static str,
            _index: u32,
            _variant: &'static str,
            _len: usize,
        ) -> Result<Self, FloatCheckError> {
            Ok(self)
        }
    }

    impl SerializeSeq for FiniteFloats {
        type Ok = ();
        type Error = FloatCheckError;

        fn serialize_element<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), FloatCheckError> {
            value.serialize(FiniteFloats)
        }

        fn end(self) -> Result<(), FloatCheckError> {
            Ok(())
        }
    }

    impl SerializeTuple for FiniteFloats {
        type Ok = ();
        type Error = FloatCheckError;

        fn serialize_element<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), FloatCheckError> {
            value.serialize(FiniteFloats)
        }

        fn end(self) -> Result<(), FloatCheckError> {
            Ok(())
        }
    }

    impl SerializeTupleStruct for FiniteFloats {
        type Ok = ();
        type Error = FloatCheckError;

        fn serialize_field<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), FloatCheckError> {
            value.serialize(FiniteFloats)
        }

        fn end(self) -> Result<(), FloatCheckError> {
            Ok(())
        }
    }

    impl SerializeTupleVariant for FiniteFloats {
        type Ok = ();
        type Error = FloatCheckError;

        fn serialize_field<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), FloatCheckError> {
            value.serialize(FiniteFloats)
        }

        fn end(self) -> Result<(), FloatCheckError> {
            Ok(())
        }
    }

    impl SerializeMap for FiniteFloats {
        type Ok = ();
        type Error = FloatCheckError;

        fn serialize_key<T: ?Sized + Serialize>(&mut self, key: &T) -> Result<(), FloatCheckError> {
            key.serialize(FiniteFloats)
        }

        fn serialize_value<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), FloatCheckError> {
            value.serialize(FiniteFloats)
        }

        fn end(self) -> Result<(), FloatCheckError> {
            Ok(())
        }
    }

    impl SerializeStruct for FiniteFloats {
        type Ok = ();
        type Error = FloatCheckError;

        fn serialize_field<T: ?Sized + Serialize>(
            &mut self,
            _key: &'static str,
            value: &T,
        ) -> Result<(), FloatCheckError> {
            value.serialize(FiniteFloats)
        }

        fn end(self) -> Result<(), FloatCheckError> {
            Ok(())
        }
    }

    impl SerializeStructVariant for FiniteFloats {
        type Ok = ();
        type Error = FloatCheckError;

        fn serialize_field<T: ?Sized + Serialize>(
            &mut self,
            _key: &'static str,
            value: &T,
        ) -> Result<(), FloatCheckError> {
            value.serialize(FiniteFloats)
        }

        fn end(self) -> Result<(), FloatCheckError> {
            Ok(())
        }
    }
}

/// [`TextCodec::write_document`] with the default header.
pub fn write_document<W, T>(sink: &mut W, value: &T) -> Result<(), CodecError>
where
    W: Write + ?Sized,
    T: Serialize + ?Sized,
{
    TextCodec::default().write_document(sink, value)
}

/// [`TextCodec::read_document`] with the default header.
pub fn read_document<R, T>(source: &mut R) -> Result<T, CodecError>
where
    R: Read + ?Sized,
    T: DeserializeOwned,
{
    TextCodec::default().read_document(source)
}

/// [`TextCodec::read_raw_document`] with the default header.
pub fn read_raw_document<R: Read + ?Sized>(
    source: &mut R,
) -> Result<serde_json::Value, CodecError> {
    TextCodec::default().read_raw_document(source)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CodecConfig, HeaderWidth};
    use crate::primitive::write_text;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Counter {
        name: String,
        count: i64,
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct CounterV2 {
        name: String,
        count: i64,
        #[serde(default)]
        tags: Vec<String>,
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Nested {
        id: u32,
        parts: Vec<Counter>,
        parent: Option<Box<Nested>>,
    }

    #[test]
    fn fields_render_in_declaration_order() {
        let doc = render_document(&Counter {
            name: "t1".into(),
            count: 2,
        })
        .unwrap();
        assert_eq!(doc, r#"{"name":"t1","count":2}"#);
    }

    #[test]
    fn document_is_one_length_prefixed_text() {
        let mut sink = Vec::new();
        write_document(
            &mut sink,
            &Counter {
                name: "t1".into(),
                count: 2,
            },
        )
        .unwrap();

        let body = br#"{"name":"t1","count":2}"#;
        assert_eq!(&sink[..4], &(body.len() as i32).to_be_bytes());
        assert_eq!(&sink[4..], body);
    }

    #[test]
    fn nested_structure_round_trips() {
        let value = Nested {
            id: 1,
            parts: vec![
                Counter {
                    name: "a".into(),
                    count: -1,
                },
                Counter {
                    name: "b".into(),
                    count: 0,
                },
            ],
            parent: Some(Box::new(Nested {
                id: 0,
                parts: vec![],
                parent: None,
            })),
        };

        let mut sink = Vec::new();
        write_document(&mut sink, &value).unwrap();
        let decoded: Nested = read_document(&mut sink.as_slice()).unwrap();
        assert_eq!(decoded, value);
    }

    #[test]
    fn new_optional_field_defaults_for_old_documents() {
        let mut sink = Vec::new();
        write_document(
            &mut sink,
            &Counter {
                name: "old".into(),
                count: 9,
            },
        )
        .unwrap();

        let decoded: CounterV2 = read_document(&mut sink.as_slice()).unwrap();
        assert_eq!(
            decoded,
            CounterV2 {
                name: "old".into(),
                count: 9,
                tags: vec![],
            }
        );
    }

    #[test]
    fn newer_documents_ignore_unknown_fields() {
        let mut sink = Vec::new();
        write_document(
            &mut sink,
            &CounterV2 {
                name: "new".into(),
                count: 1,
                tags: vec!["x".into()],
            },
        )
        .unwrap();

        let decoded: Counter = read_document(&mut sink.as_slice()).unwrap();
        assert_eq!(decoded.name, "new");
    }

    #[test]
    fn missing_required_field_is_schema_mismatch() {
        let mut sink = Vec::new();
        write_text(&mut sink, r#"{"name":"t1"}"#).unwrap();

        let err = read_document::<_, Counter>(&mut sink.as_slice()).unwrap_err();
        assert!(matches!(err, CodecError::SchemaMismatch(_)), "{err}");
    }

    #[test]
    fn wrong_value_type_is_schema_mismatch() {
        let mut sink = Vec::new();
        write_text(&mut sink, r#"{"name":"t1","count":"two"}"#).unwrap();

        let err = read_document::<_, Counter>(&mut sink.as_slice()).unwrap_err();
        assert!(matches!(err, CodecError::SchemaMismatch(_)));
    }

    #[test]
    fn malformed_text_is_codec_failure() {
        let mut sink = Vec::new();
        write_text(&mut sink, r#"{"name":"t1","#).unwrap();

        let err = read_document::<_, Counter>(&mut sink.as_slice()).unwrap_err();
        assert!(matches!(err, CodecError::CodecFailure(_)));
    }

    #[test]
    fn truncated_document_is_truncation() {
        let mut sink = Vec::new();
        write_document(
            &mut sink,
            &Counter {
                name: "t1".into(),
                count: 2,
            },
        )
        .unwrap();
        sink.truncate(sink.len() - 3);

        let err = read_document::<_, Counter>(&mut sink.as_slice()).unwrap_err();
        assert!(err.is_truncation());
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Gauge {
        name: String,
        ratio: f64,
        samples: Vec<f32>,
        peak: Option<f64>,
    }

    fn gauge(ratio: f64, samples: Vec<f32>, peak: Option<f64>) -> Gauge {
        Gauge {
            name: "g".into(),
            ratio,
            samples,
            peak,
        }
    }

    #[test]
    fn finite_floats_round_trip() {
        let value = gauge(0.25, vec![-1.5e3, 0.0], Some(-0.5));

        let mut sink = Vec::new();
        write_document(&mut sink, &value).unwrap();
        let decoded: Gauge = read_document(&mut sink.as_slice()).unwrap();
        assert_eq!(decoded, value);
    }

    #[test]
    fn nan_is_rejected_before_writing() {
        let mut sink = Vec::new();
        let err = write_document(&mut sink, &gauge(f64::NAN, vec![], None)).unwrap_err();

        assert!(matches!(err, CodecError::CodecFailure(_)), "{err}");
        assert!(sink.is_empty(), "nothing may reach the sink");
    }

    #[test]
    fn nested_infinities_are_rejected() {
        let err = render_document(&gauge(1.0, vec![0.5, f32::INFINITY], None)).unwrap_err();
        assert!(err.to_string().contains("non-finite"));

        let err = render_document(&gauge(1.0, vec![], Some(f64::NEG_INFINITY))).unwrap_err();
        assert!(matches!(err, CodecError::CodecFailure(_)));
    }

    #[test]
    fn raw_document_can_be_inspected() {
        let mut sink = Vec::new();
        write_document(
            &mut sink,
            &Counter {
                name: "t1".into(),
                count: 2,
            },
        )
        .unwrap();

        let doc = read_raw_document(&mut sink.as_slice()).unwrap();
        assert_eq!(doc["name"], "t1");
        assert_eq!(doc["count"], 2);
    }

    #[test]
    fn configured_header_is_used() {
        let codec = TextCodec::new(&CodecConfig::with_header_width(HeaderWidth::Short));
        let value = Counter {
            name: "s".into(),
            count: 3,
        };

        let mut sink = Vec::new();
        codec.write_document(&mut sink, &value).unwrap();
        let body_len = sink.len() - 2;
        assert_eq!(&sink[..2], &(body_len as u16).to_be_bytes());

        let decoded: Counter = codec.read_document(&mut sink.as_slice()).unwrap();
        assert_eq!(decoded, value);
    }
}
