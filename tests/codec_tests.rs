//! Plutus data codec: reference encodings, decoder strictness and round trips.

use num_bigint::BigInt;
use plutus_escrow_lab::sdk::data::{self, MAX_DEPTH, from_json, to_json};
use plutus_escrow_lab::sdk::{CodecError, Credential, PlutusData, owner_datum, owner_of};
use proptest::prelude::*;

fn hex_of(data: &PlutusData) -> String {
    data.to_hex().unwrap()
}

fn from_hex(s: &str) -> PlutusData {
    data::from_hex(s).unwrap()
}

// ---------------------------------------------------------------------------
// Reference encodings
// ---------------------------------------------------------------------------

mod reference {
    use super::*;

    #[test]
    fn empty_constructor() {
        assert_eq!(hex_of(&PlutusData::constr(0, vec![])), "d87980");
    }

    #[test]
    fn hello_world_redeemer() {
        let redeemer = PlutusData::constr(0, vec![PlutusData::bytes_from_utf8("Hello, World!")]);
        assert_eq!(hex_of(&redeemer), "d8799f4d48656c6c6f2c20576f726c6421ff");
    }

    #[test]
    fn constructor_tag_ranges() {
        assert_eq!(hex_of(&PlutusData::constr(1, vec![PlutusData::integer(42)])), "d87a9f182aff");
        assert_eq!(hex_of(&PlutusData::constr(6, vec![])), "d87f80");
        assert_eq!(hex_of(&PlutusData::constr(7, vec![])), "d9050080");
        assert_eq!(hex_of(&PlutusData::constr(127, vec![])), "d9057880");
        assert_eq!(hex_of(&PlutusData::constr(128, vec![])), "d86682188080");
    }

    #[test]
    fn small_integers() {
        assert_eq!(hex_of(&PlutusData::integer(0)), "00");
        assert_eq!(hex_of(&PlutusData::integer(-1)), "20");
        assert_eq!(hex_of(&PlutusData::integer(23)), "17");
        assert_eq!(hex_of(&PlutusData::integer(24)), "1818");
        assert_eq!(hex_of(&PlutusData::integer(1_000_000)), "1a000f4240");
        assert_eq!(hex_of(&PlutusData::integer(-1_000_000)), "3a000f423f");
    }

    #[test]
    fn integer_range_edges() {
        let max = PlutusData::integer(u64::MAX);
        assert_eq!(hex_of(&max), "1bffffffffffffffff");

        let min_nint = PlutusData::integer(-(BigInt::from(u64::MAX)) - 1);
        assert_eq!(hex_of(&min_nint), "3bffffffffffffffff");
    }

    #[test]
    fn bignums() {
        let two_64: BigInt = BigInt::from(u64::MAX) + 1;
        assert_eq!(
            hex_of(&PlutusData::integer(two_64.clone())),
            "c249010000000000000000"
        );
        assert_eq!(
            hex_of(&PlutusData::integer(-two_64 - 1)),
            "c349010000000000000000"
        );
    }

    #[test]
    fn lists_and_maps() {
        assert_eq!(hex_of(&PlutusData::List(vec![])), "80");
        assert_eq!(
            hex_of(&PlutusData::List(vec![PlutusData::integer(1), PlutusData::integer(2)])),
            "9f0102ff"
        );
        assert_eq!(
            hex_of(&PlutusData::Map(vec![(PlutusData::integer(1), PlutusData::bytes(vec![]))])),
            "a10140"
        );
        assert_eq!(hex_of(&PlutusData::Map(vec![])), "a0");
    }

    #[test]
    fn bytes_at_chunk_boundary() {
        let b64 = vec![0xab; 64];
        assert_eq!(hex_of(&PlutusData::bytes(b64)), format!("5840{}", "ab".repeat(64)));
    }

    #[test]
    fn long_bytes_are_chunked() {
        let b65 = vec![0xcd; 65];
        assert_eq!(
            hex_of(&PlutusData::bytes(b65)),
            format!("5f5840{}41cdff", "cd".repeat(64))
        );
    }

    #[test]
    fn owner_datum_layout() {
        let owner = Credential::from_bytes([0x11; 28]);
        let datum = owner_datum(&owner);
        assert_eq!(hex_of(&datum), format!("d8799f581c{}ff", "11".repeat(28)));
        assert_eq!(owner_of(&datum), Some(owner));
    }

    #[test]
    fn owner_of_rejects_other_shapes() {
        assert_eq!(owner_of(&PlutusData::constr(1, vec![vec![0u8; 28].into()])), None);
        assert_eq!(owner_of(&PlutusData::constr(0, vec![vec![0u8; 27].into()])), None);
        assert_eq!(owner_of(&PlutusData::constr(0, vec![])), None);
        assert_eq!(owner_of(&PlutusData::bytes(vec![0u8; 28])), None);
    }
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

mod decoding {
    use super::*;

    #[test]
    fn accepts_definite_field_lists() {
        // Same value as d8799f182aff, written with a definite array.
        assert_eq!(
            from_hex("d87981182a"),
            PlutusData::constr(0, vec![PlutusData::integer(42)])
        );
    }

    #[test]
    fn accepts_general_constructor_form_for_small_tags() {
        assert_eq!(from_hex("d866820080"), PlutusData::constr(0, vec![]));
    }

    #[test]
    fn accepts_chunked_bytes() {
        assert_eq!(from_hex("5f4201024103ff"), PlutusData::bytes(vec![1, 2, 3]));
    }

    #[test]
    fn accepts_indefinite_maps() {
        assert_eq!(
            from_hex("bf0102ff"),
            PlutusData::Map(vec![(PlutusData::integer(1), PlutusData::integer(2))])
        );
    }

    #[test]
    fn rejects_trailing_bytes() {
        assert_eq!(data::decode(&[0x00, 0x00]), Err(CodecError::TrailingBytes(1)));
    }

    #[test]
    fn rejects_truncated_input() {
        assert!(matches!(
            data::decode(&hex::decode("d8799f").unwrap()),
            Err(CodecError::UnexpectedEof(_))
        ));
        assert!(matches!(
            data::decode(&hex::decode("4d4865").unwrap()),
            Err(CodecError::UnexpectedEof(_))
        ));
        assert!(matches!(data::decode(&[]), Err(CodecError::UnexpectedEof(0))));
    }

    #[test]
    fn rejects_text_strings() {
        assert_eq!(
            data::decode(&hex::decode("6161").unwrap()),
            Err(CodecError::UnexpectedMajor { major: 3, offset: 0 })
        );
    }

    #[test]
    fn rejects_floats_and_simple_values() {
        assert!(data::decode(&hex::decode("f93c00").unwrap()).is_err());
        assert!(data::decode(&hex::decode("f5").unwrap()).is_err());
        assert!(data::decode(&hex::decode("f6").unwrap()).is_err());
    }

    #[test]
    fn rejects_unknown_tags() {
        assert_eq!(
            data::decode(&hex::decode("d82000").unwrap()),
            Err(CodecError::UnsupportedTag(32))
        );
    }

    #[test]
    fn rejects_bad_hex() {
        assert!(matches!(data::from_hex("zz"), Err(CodecError::InvalidHex(_))));
    }

    #[test]
    fn nesting_limit_on_decode() {
        let mut bytes = vec![0x81; MAX_DEPTH + 10];
        bytes.push(0x00);
        assert_eq!(data::decode(&bytes), Err(CodecError::DepthExceeded(MAX_DEPTH)));
    }

    #[test]
    fn nesting_limit_on_encode() {
        let mut value = PlutusData::integer(0);
        for _ in 0..MAX_DEPTH + 10 {
            value = PlutusData::List(vec![value]);
        }
        assert_eq!(value.encode(), Err(CodecError::DepthExceeded(MAX_DEPTH)));
    }

    #[test]
    fn moderate_nesting_round_trips() {
        let mut value = PlutusData::bytes(vec![7]);
        for i in 0..100 {
            value = PlutusData::constr(i % 3, vec![value]);
        }
        assert_eq!(data::decode(&value.encode().unwrap()).unwrap(), value);
    }
}

// ---------------------------------------------------------------------------
// JSON view
// ---------------------------------------------------------------------------

mod json_view {
    use super::*;
    use serde_json::json;

    #[test]
    fn detailed_schema() {
        let value = PlutusData::constr(
            0,
            vec![
                PlutusData::bytes_from_utf8("Hi"),
                PlutusData::integer(42),
                PlutusData::List(vec![]),
                PlutusData::Map(vec![(PlutusData::integer(1), PlutusData::integer(2))]),
            ],
        );
        assert_eq!(
            to_json(&value),
            json!({
                "constructor": 0,
                "fields": [
                    {"bytes": "4869"},
                    {"int": 42},
                    {"list": []},
                    {"map": [{"k": {"int": 1}, "v": {"int": 2}}]},
                ]
            })
        );
        assert_eq!(from_json(&to_json(&value)).unwrap(), value);
    }

    #[test]
    fn big_integers_are_strings() {
        let big = PlutusData::integer(BigInt::from(u64::MAX) * 4);
        let json = to_json(&big);
        assert!(json["int"].is_string());
        assert_eq!(from_json(&json).unwrap(), big);
    }

    #[test]
    fn serde_goes_through_the_json_view() {
        let value = PlutusData::constr(3, vec![PlutusData::integer(-5)]);
        let text = serde_json::to_string(&value).unwrap();
        assert_eq!(serde_json::from_str::<PlutusData>(&text).unwrap(), value);
    }

    #[test]
    fn rejects_unknown_shapes() {
        assert!(matches!(
            from_json(&json!({"text": "nope"})),
            Err(CodecError::InvalidJson(_))
        ));
        assert!(matches!(from_json(&json!(1)), Err(CodecError::InvalidJson(_))));
        assert!(matches!(
            from_json(&json!({"bytes": "xyz"})),
            Err(CodecError::InvalidHex(_))
        ));
    }
}

// ---------------------------------------------------------------------------
// Round trips
// ---------------------------------------------------------------------------

fn arb_integer() -> impl Strategy<Value = BigInt> {
    prop_oneof![
        any::<i64>().prop_map(BigInt::from),
        any::<u64>().prop_map(BigInt::from),
        proptest::collection::vec(any::<u8>(), 9..24).prop_map(|b| BigInt::from_signed_bytes_be(&b)),
    ]
}

fn arb_data() -> impl Strategy<Value = PlutusData> {
    let leaf = prop_oneof![
        arb_integer().prop_map(PlutusData::Integer),
        proptest::collection::vec(any::<u8>(), 0..150).prop_map(PlutusData::Bytes),
    ];
    leaf.prop_recursive(6, 64, 5, |inner| {
        prop_oneof![
            (
                prop_oneof![0u64..7, 7u64..128, 128u64..10_000],
                proptest::collection::vec(inner.clone(), 0..5)
            )
                .prop_map(|(tag, fields)| PlutusData::constr(tag, fields)),
            proptest::collection::vec(inner.clone(), 0..5).prop_map(PlutusData::List),
            proptest::collection::vec((inner.clone(), inner), 0..4).prop_map(PlutusData::Map),
        ]
    })
}

proptest! {
    #[test]
    fn decode_inverts_encode(value in arb_data()) {
        let bytes = value.encode().unwrap();
        prop_assert_eq!(data::decode(&bytes).unwrap(), value);
    }

    #[test]
    fn encoding_is_deterministic(value in arb_data()) {
        prop_assert_eq!(value.encode().unwrap(), value.clone().encode().unwrap());
    }

    #[test]
    fn json_view_round_trips(value in arb_data()) {
        prop_assert_eq!(from_json(&to_json(&value)).unwrap(), value);
    }
}
