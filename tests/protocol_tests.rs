//! Wire protocol tests: framing, request codec roundtrips, response
//! payload layouts, and malformed input rejection.

use std::io::Cursor;

use quartzkv::index::SearchMode;
use quartzkv::protocol::{
    decode_request, encode_request, read_frame, write_frame, Request, Response, StatusCode,
};

// =============================================================================
// Framing
// =============================================================================

#[test]
fn test_frame_roundtrip() {
    let mut wire = Vec::new();
    write_frame(&mut wire, b"hello").unwrap();
    write_frame(&mut wire, &[0xAB; 300]).unwrap();

    let mut cursor = Cursor::new(wire);
    assert_eq!(read_frame(&mut cursor).unwrap().unwrap(), b"hello");
    assert_eq!(read_frame(&mut cursor).unwrap().unwrap(), vec![0xAB; 300]);
    assert!(read_frame(&mut cursor).unwrap().is_none());
}

#[test]
fn test_frame_rejects_zero_length() {
    let mut cursor = Cursor::new(vec![0u8, 0, 0, 0]);
    assert!(read_frame(&mut cursor).is_err());
}

#[test]
fn test_frame_rejects_oversize_length() {
    let mut cursor = Cursor::new(vec![0xFF, 0xFF, 0xFF, 0xFF]);
    assert!(read_frame(&mut cursor).is_err());
}

// =============================================================================
// Request Codec
// =============================================================================

#[test]
fn test_set_request_roundtrip() {
    let encoded = encode_request(&Request::Set {
        key: b"user:1".to_vec(),
        value: b"Alice".to_vec(),
    });
    assert_eq!(encoded[0], 0x01);

    match decode_request(&encoded).unwrap() {
        Request::Set { key, value } => {
            assert_eq!(key, b"user:1");
            assert_eq!(value, b"Alice");
        }
        other => panic!("wrong request: {other:?}"),
    }
}

#[test]
fn test_get_and_delete_roundtrip() {
    for (request, tag) in [
        (Request::Get { key: b"k".to_vec() }, 0x02u8),
        (Request::Delete { key: b"k".to_vec() }, 0x03u8),
    ] {
        let encoded = encode_request(&request);
        assert_eq!(encoded[0], tag);
        let decoded = decode_request(&encoded).unwrap();
        match decoded {
            Request::Get { key } | Request::Delete { key } => assert_eq!(key, b"k"),
            other => panic!("wrong request: {other:?}"),
        }
    }
}

#[test]
fn test_bulk_set_roundtrip() {
    let pairs = vec![
        (b"x".to_vec(), b"10".to_vec()),
        (b"y".to_vec(), b"20".to_vec()),
    ];
    let encoded = encode_request(&Request::BulkSet {
        pairs: pairs.clone(),
    });
    assert_eq!(encoded[0], 0x04);

    match decode_request(&encoded).unwrap() {
        Request::BulkSet { pairs: decoded } => assert_eq!(decoded, pairs),
        other => panic!("wrong request: {other:?}"),
    }
}

#[test]
fn test_search_roundtrip_preserves_mode() {
    for (mode, byte) in [(SearchMode::And, 0u8), (SearchMode::Or, 1u8)] {
        let encoded = encode_request(&Request::Search {
            mode,
            query: "quick brown".to_string(),
        });
        assert_eq!(encoded[0], 0x05);
        assert_eq!(encoded[1], byte);

        match decode_request(&encoded).unwrap() {
            Request::Search {
                mode: decoded_mode,
                query,
            } => {
                assert_eq!(decoded_mode, mode);
                assert_eq!(query, "quick brown");
            }
            other => panic!("wrong request: {other:?}"),
        }
    }
}

#[test]
fn test_semsearch_roundtrip() {
    let encoded = encode_request(&Request::SemSearch {
        k: 5,
        threshold: 0.25,
        query: "hello word".to_string(),
    });
    assert_eq!(encoded[0], 0x06);

    match decode_request(&encoded).unwrap() {
        Request::SemSearch {
            k,
            threshold,
            query,
        } => {
            assert_eq!(k, 5);
            assert!((threshold - 0.25).abs() < f32::EPSILON);
            assert_eq!(query, "hello word");
        }
        other => panic!("wrong request: {other:?}"),
    }
}

#[test]
fn test_decode_rejects_unknown_tag() {
    assert!(decode_request(&[0x7F, 0, 0, 0, 0]).is_err());
}

#[test]
fn test_decode_rejects_truncated_payload() {
    let mut encoded = encode_request(&Request::Set {
        key: b"key".to_vec(),
        value: b"value".to_vec(),
    });
    encoded.truncate(encoded.len() - 2);
    assert!(decode_request(&encoded).is_err());
}

#[test]
fn test_decode_rejects_trailing_bytes() {
    let mut encoded = encode_request(&Request::Get { key: b"k".to_vec() });
    encoded.push(0x00);
    assert!(decode_request(&encoded).is_err());
}

// =============================================================================
// Response Payload Layouts
// =============================================================================

#[test]
fn test_status_ok_is_single_byte() {
    assert_eq!(Response::ok().encode(), vec![0]);
    assert_eq!(Response::io_error().encode(), vec![2]);
    assert_eq!(Response::malformed().encode(), vec![3]);
}

#[test]
fn test_not_primary_carries_hint() {
    let encoded = Response::not_primary(Some("127.0.0.1:7420".to_string())).encode();
    assert_eq!(encoded[0], StatusCode::NotPrimary as u8);
    assert_eq!(&encoded[1..5], &14u32.to_be_bytes());
    assert_eq!(&encoded[5..], b"127.0.0.1:7420");

    // No known leader: zero-length hint.
    let encoded = Response::not_primary(None).encode();
    assert_eq!(encoded, vec![1, 0, 0, 0, 0]);
}

#[test]
fn test_value_response_layouts() {
    assert_eq!(Response::Value { value: None }.encode(), vec![0]);

    let encoded = Response::Value {
        value: Some(b"data".to_vec()),
    }
    .encode();
    assert_eq!(encoded[0], 1);
    assert_eq!(&encoded[1..5], &4u32.to_be_bytes());
    assert_eq!(&encoded[5..], b"data");
}

#[test]
fn test_delete_status_layout() {
    let encoded = Response::DeleteStatus {
        code: StatusCode::Ok,
        existed: true,
        leader_hint: None,
    }
    .encode();
    assert_eq!(encoded, vec![0, 1]);
}

#[test]
fn test_keylist_layout() {
    let encoded = Response::Keys {
        keys: vec![b"doc1".to_vec(), b"doc2".to_vec()],
    }
    .encode();

    assert_eq!(&encoded[0..4], &2u32.to_be_bytes());
    assert_eq!(&encoded[4..8], &4u32.to_be_bytes());
    assert_eq!(&encoded[8..12], b"doc1");
    assert_eq!(&encoded[12..16], &4u32.to_be_bytes());
    assert_eq!(&encoded[16..20], b"doc2");
}

#[test]
fn test_scoredlist_layout() {
    let encoded = Response::Scored {
        hits: vec![(b"k1".to_vec(), 0.75f32)],
    }
    .encode();

    assert_eq!(&encoded[0..4], &1u32.to_be_bytes());
    assert_eq!(&encoded[4..8], &2u32.to_be_bytes());
    assert_eq!(&encoded[8..10], b"k1");
    assert_eq!(&encoded[10..14], &0.75f32.to_be_bytes());
}
