use crate::encoding::{
    Decode, Encode, EncodingError, MAX_BYTE_LEN, decode_vec, encode_to_vec, encode_vec,
};

#[test]
fn u8_round_trip() {
    for value in [0u8, 1, 0x7f, 0xff] {
        let bytes = encode_to_vec(&value).unwrap();
        assert_eq!(bytes.len(), 1);
        let (decoded, consumed) = u8::decode_from(&bytes).unwrap();
        assert_eq!(decoded, value);
        assert_eq!(consumed, 1);
    }
}

#[test]
fn u32_is_little_endian() {
    let bytes = encode_to_vec(&0x0403_0201u32).unwrap();
    assert_eq!(bytes, vec![0x01, 0x02, 0x03, 0x04]);
}

#[test]
fn u64_round_trip() {
    for value in [0u64, 1, u64::MAX, 0xdead_beef_cafe_babe] {
        let bytes = encode_to_vec(&value).unwrap();
        assert_eq!(bytes.len(), 8);
        let (decoded, consumed) = u64::decode_from(&bytes).unwrap();
        assert_eq!(decoded, value);
        assert_eq!(consumed, 8);
    }
}

#[test]
fn byte_vec_round_trip() {
    let value: Vec<u8> = b"hello wal".to_vec();
    let bytes = encode_to_vec(&value).unwrap();
    assert_eq!(bytes.len(), 4 + value.len());
    let (decoded, consumed) = Vec::<u8>::decode_from(&bytes).unwrap();
    assert_eq!(decoded, value);
    assert_eq!(consumed, bytes.len());
}

#[test]
fn byte_vec_rejects_oversized_length() {
    let mut bytes = Vec::new();
    (MAX_BYTE_LEN + 1).encode_to(&mut bytes).unwrap();
    let err = Vec::<u8>::decode_from(&bytes).unwrap_err();
    assert!(matches!(err, EncodingError::LengthOverflow(_)));
}

#[test]
fn truncated_input_reports_eof() {
    let err = u64::decode_from(&[0x01, 0x02]).unwrap_err();
    assert!(matches!(
        err,
        EncodingError::UnexpectedEof {
            needed: 8,
            available: 2
        }
    ));
}

#[test]
fn option_round_trip() {
    let some: Option<u64> = Some(42);
    let none: Option<u64> = None;

    let bytes = encode_to_vec(&some).unwrap();
    assert_eq!(bytes.len(), 9);
    assert_eq!(Option::<u64>::decode_from(&bytes).unwrap().0, Some(42));

    let bytes = encode_to_vec(&none).unwrap();
    assert_eq!(bytes, vec![0]);
    assert_eq!(Option::<u64>::decode_from(&bytes).unwrap().0, None);
}

#[test]
fn option_rejects_unknown_tag() {
    let err = Option::<u64>::decode_from(&[2]).unwrap_err();
    assert!(matches!(err, EncodingError::InvalidTag { tag: 2, .. }));
}

#[test]
fn generic_vec_round_trip() {
    let values: Vec<u64> = vec![1, 2, 3, u64::MAX];
    let mut bytes = Vec::new();
    encode_vec(&values, &mut bytes).unwrap();
    let (decoded, consumed) = decode_vec::<u64>(&bytes).unwrap();
    assert_eq!(decoded, values);
    assert_eq!(consumed, bytes.len());
}
