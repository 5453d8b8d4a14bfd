// Codec properties over generated inputs.

use persist_kernel::config::{CodecConfig, HeaderWidth};
use persist_kernel::primitive::{read_text, write_text, TextCodec};
use persist_kernel::records::{ColumnDef, EventType, SchemaChange, TableEvent, TableId};
use persist_kernel::writable::{decode_from_slice, encode_to_vec};
use persist_kernel::CodecError;
use proptest::prelude::*;
use std::collections::BTreeMap;
use uuid::Uuid;

fn event_type() -> impl Strategy<Value = EventType> {
    prop_oneof![
        Just(EventType::TableCreated),
        Just(EventType::SchemaUpdated),
        Just(EventType::SnapshotAdded),
        Just(EventType::SnapshotRemoved),
    ]
}

fn table_event() -> impl Strategy<Value = TableEvent> {
    (
        any::<[u8; 16]>(),
        any::<u64>(),
        event_type(),
        prop::collection::vec(any::<u8>(), 0..64),
    )
        .prop_map(|(id, version, event_type, payload)| TableEvent {
            table_id: TableId(Uuid::from_bytes(id)),
            version,
            event_type,
            payload,
        })
}

fn schema_change() -> impl Strategy<Value = SchemaChange> {
    (
        any::<[u8; 16]>(),
        "[a-z_]{1,12}",
        prop::collection::btree_map("[a-z]{1,8}", "[A-Z]{3,10}", 0..6),
        prop::option::of(".{0,24}"),
        prop::collection::btree_map("[a-z.]{1,8}", ".{0,8}", 0..4),
    )
        .prop_map(|(id, schema_name, columns, comment, properties)| SchemaChange {
            table_id: TableId(Uuid::from_bytes(id)),
            schema_name,
            // map keys keep column names unique
            columns: columns
                .into_iter()
                .map(|(name, data_type)| ColumnDef {
                    name,
                    data_type,
                    nullable: true,
                })
                .collect(),
            comment,
            properties,
        })
}

proptest! {
    #[test]
    fn text_consumes_header_plus_content(s in ".{0,200}", tail in prop::collection::vec(any::<u8>(), 0..8)) {
        let mut bytes = Vec::new();
        write_text(&mut bytes, &s).unwrap();
        prop_assert_eq!(bytes.len(), 4 + s.len());
        bytes.extend_from_slice(&tail);

        let mut source = bytes.as_slice();
        prop_assert_eq!(read_text(&mut source).unwrap(), s);
        prop_assert_eq!(source, tail.as_slice());
    }

    #[test]
    fn short_reads_never_succeed(s in ".{1,64}", cut in 1usize..8) {
        let codec = TextCodec::new(&CodecConfig::with_header_width(HeaderWidth::Short));
        let mut bytes = Vec::new();
        codec.write_text(&mut bytes, &s).unwrap();

        let keep = bytes.len().saturating_sub(cut);
        let err = codec.read_text(&mut &bytes[..keep]).unwrap_err();
        prop_assert!(matches!(err, CodecError::TruncatedStream { .. }), "expected TruncatedStream, got {:?}", err);
    }

    #[test]
    fn table_event_round_trips(event in table_event()) {
        let bytes = encode_to_vec(&event).unwrap();
        prop_assert_eq!(&bytes, &encode_to_vec(&event.clone()).unwrap());
        prop_assert_eq!(decode_from_slice::<TableEvent>(&bytes).unwrap(), event);
    }

    #[test]
    fn schema_change_round_trips(change in schema_change()) {
        let bytes = encode_to_vec(&change).unwrap();
        prop_assert_eq!(&bytes, &encode_to_vec(&change.clone()).unwrap());
        prop_assert_eq!(decode_from_slice::<SchemaChange>(&bytes).unwrap(), change);
    }
}

#[test]
fn empty_properties_still_deterministic() {
    let change = SchemaChange {
        table_id: TableId(Uuid::nil()),
        schema_name: "t".into(),
        columns: vec![],
        comment: None,
        properties: BTreeMap::new(),
    };
    assert_eq!(
        encode_to_vec(&change).unwrap(),
        encode_to_vec(&change).unwrap()
    );
}
