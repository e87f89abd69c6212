use crate::encoding::{Decode, EncodingError, decode_vec};

#[test]
fn truncated_integer_reports_eof() {
    let err = u32::decode_from(&[1, 2]).unwrap_err();
    match err {
        EncodingError::UnexpectedEof { needed, available } => {
            assert_eq!(needed, 4);
            assert_eq!(available, 2);
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn truncated_byte_vector_reports_eof() {
    // claims 100 bytes, provides 2
    let mut buf = vec![100, 0, 0, 0];
    buf.extend_from_slice(&[1, 2]);
    assert!(matches!(
        Vec::<u8>::decode_from(&buf),
        Err(EncodingError::UnexpectedEof { .. })
    ));
}

#[test]
fn oversized_byte_length_rejected() {
    // length field far above MAX_BYTE_LEN
    let buf = u32::MAX.to_le_bytes().to_vec();
    assert!(matches!(
        Vec::<u8>::decode_from(&buf),
        Err(EncodingError::LengthOverflow(_))
    ));
}

#[test]
fn oversized_vec_count_rejected() {
    let buf = u32::MAX.to_le_bytes().to_vec();
    assert!(matches!(
        decode_vec::<u64>(&buf),
        Err(EncodingError::LengthOverflow(_))
    ));
}

#[test]
fn empty_buffer_rejected() {
    assert!(u8::decode_from(&[]).is_err());
    assert!(u64::decode_from(&[]).is_err());
}
