use crate::encoding::{EncodingError, read_uvarint, write_uvarint};

#[test]
fn small_values_use_one_byte() {
    for value in [0u64, 1, 5, 0x7f] {
        let mut buf = Vec::new();
        write_uvarint(value, &mut buf);
        assert_eq!(buf.len(), 1);
        assert_eq!(read_uvarint(&buf).unwrap(), (value, 1));
    }
}

#[test]
fn multi_byte_round_trip() {
    for value in [0x80u64, 0x3fff, 0x4000, 1 << 32, u64::MAX] {
        let mut buf = Vec::new();
        write_uvarint(value, &mut buf);
        let (decoded, consumed) = read_uvarint(&buf).unwrap();
        assert_eq!(decoded, value);
        assert_eq!(consumed, buf.len());
    }
}

#[test]
fn max_value_is_ten_bytes() {
    let mut buf = Vec::new();
    write_uvarint(u64::MAX, &mut buf);
    assert_eq!(buf.len(), 10);
}

#[test]
fn empty_input_reports_eof() {
    let err = read_uvarint(&[]).unwrap_err();
    assert!(matches!(err, EncodingError::UnexpectedEof { .. }));
}

#[test]
fn unterminated_varint_reports_eof() {
    let err = read_uvarint(&[0x80, 0x80]).unwrap_err();
    assert!(matches!(err, EncodingError::UnexpectedEof { .. }));
}

#[test]
fn overlong_varint_is_rejected() {
    let buf = [0xff; 11];
    let err = read_uvarint(&buf).unwrap_err();
    assert!(matches!(err, EncodingError::VarintOverflow));
}
