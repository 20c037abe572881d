/// TLV (Type-Length-Value) codec for NDN packet format 0.3
///
/// Wire format:
/// - Type: variable-length number (1, 3, 5 or 9 bytes)
/// - Length: variable-length number (1, 3, 5 or 9 bytes)
/// - Value: `length` bytes
///
/// Variable-length numbers below 253 take one byte; larger values are
/// prefixed with 0xFD (u16), 0xFE (u32) or 0xFF (u64), all big-endian.

/// TLV type numbers understood by the forwarder and its clients
pub mod tlv_types {
    pub const IMPLICIT_SHA256_DIGEST_COMPONENT: u32 = 0x01;
    pub const PARAMETERS_SHA256_DIGEST_COMPONENT: u32 = 0x02;
    pub const INTEREST: u32 = 0x05;
    pub const DATA: u32 = 0x06;
    pub const NAME: u32 = 0x07;
    pub const GENERIC_NAME_COMPONENT: u32 = 0x08;
    pub const NONCE: u32 = 0x0A;
    pub const INTEREST_LIFETIME: u32 = 0x0C;
    pub const MUST_BE_FRESH: u32 = 0x12;
    pub const META_INFO: u32 = 0x14;
    pub const CONTENT: u32 = 0x15;
    pub const SIGNATURE_INFO: u32 = 0x16;
    pub const SIGNATURE_VALUE: u32 = 0x17;
    pub const CONTENT_TYPE: u32 = 0x18;
    pub const FRESHNESS_PERIOD: u32 = 0x19;
    pub const FINAL_BLOCK_ID: u32 = 0x1A;
    pub const SIGNATURE_TYPE: u32 = 0x1B;
    pub const KEY_LOCATOR: u32 = 0x1C;
    pub const CAN_BE_PREFIX: u32 = 0x21;
    pub const HOP_LIMIT: u32 = 0x22;
    pub const APPLICATION_PARAMETERS: u32 = 0x24;

    /// Range of valid name component types
    pub const MIN_NAME_COMPONENT: u32 = 0x01;
    pub const MAX_NAME_COMPONENT: u32 = 0xFFFF;
}

/// Errors that can occur during TLV encoding/decoding
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TlvError {
    #[error("Buffer too short")]
    BufferTooShort,
    #[error("Invalid variable-length number")]
    InvalidVarNumber,
    #[error("TLV type {0:#x} does not fit in 32 bits")]
    TypeOutOfRange(u64),
    #[error("Unexpected TLV type: expected {expected:#x}, got {actual:#x}")]
    WrongType { expected: u32, actual: u32 },
    #[error("TLV length mismatch: declared {declared}, available {available}")]
    WrongLength { declared: usize, available: usize },
    #[error("Missing required element {0:#x}")]
    MissingElement(u32),
    #[error("Invalid non-negative integer width: {0} bytes")]
    InvalidInteger(usize),
}

/// A single decoded TLV element
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlvElement {
    pub type_: u32,
    pub value: Vec<u8>,
}

impl TlvElement {
    /// Create a new TLV element
    pub fn new(type_: u32, value: Vec<u8>) -> Self {
        Self { type_, value }
    }

    /// Get the total encoded length of this TLV element
    pub fn encoded_length(&self) -> usize {
        var_number_size(self.type_ as u64) + var_number_size(self.value.len() as u64) + self.value.len()
    }

    /// Encode this TLV element to bytes
    pub fn encode(&self) -> Vec<u8> {
        let mut buffer = Vec::with_capacity(self.encoded_length());
        self.encode_to(&mut buffer);
        buffer
    }

    /// Append this TLV element to `buffer`
    pub fn encode_to(&self, buffer: &mut Vec<u8>) {
        encode_var_number(self.type_ as u64, buffer);
        encode_var_number(self.value.len() as u64, buffer);
        buffer.extend_from_slice(&self.value);
    }

    /// Decode a TLV element from the front of `data`, returning it with the
    /// number of bytes consumed
    pub fn decode(data: &[u8]) -> Result<(Self, usize), TlvError> {
        let mut reader = TlvReader::new(data);
        let element = reader.read_element()?;
        Ok((element, reader.offset()))
    }
}

/// Cursor over a TLV buffer.
///
/// `get_type` and `get_length` advance the cursor, so the forwarder can peek
/// at the outer header of a packet without decoding the rest of it.
#[derive(Debug, Clone)]
pub struct TlvReader<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> TlvReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    /// Bytes consumed so far
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Bytes left after the cursor
    pub fn remaining(&self) -> usize {
        self.data.len() - self.offset
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Read a TLV type number
    pub fn get_type(&mut self) -> Result<u32, TlvError> {
        let value = self.get_var_number()?;
        u32::try_from(value).map_err(|_| TlvError::TypeOutOfRange(value))
    }

    /// Read a TLV length
    pub fn get_length(&mut self) -> Result<usize, TlvError> {
        let value = self.get_var_number()?;
        usize::try_from(value).map_err(|_| TlvError::InvalidVarNumber)
    }

    /// Read `len` raw bytes
    pub fn get_bytes(&mut self, len: usize) -> Result<&'a [u8], TlvError> {
        if self.remaining() < len {
            return Err(TlvError::WrongLength {
                declared: len,
                available: self.remaining(),
            });
        }
        let bytes = &self.data[self.offset..self.offset + len];
        self.offset += len;
        Ok(bytes)
    }

    /// Read one complete element
    pub fn read_element(&mut self) -> Result<TlvElement, TlvError> {
        let type_ = self.get_type()?;
        let length = self.get_length()?;
        let value = self.get_bytes(length)?.to_vec();
        Ok(TlvElement::new(type_, value))
    }

    fn get_var_number(&mut self) -> Result<u64, TlvError> {
        let (value, consumed) = decode_var_number(&self.data[self.offset..])?;
        self.offset += consumed;
        Ok(value)
    }
}

/// Append `value` as an NDN variable-length number
pub fn encode_var_number(value: u64, buffer: &mut Vec<u8>) {
    if value < 253 {
        buffer.push(value as u8);
    } else if value <= u16::MAX as u64 {
        buffer.push(0xFD);
        buffer.extend_from_slice(&(value as u16).to_be_bytes());
    } else if value <= u32::MAX as u64 {
        buffer.push(0xFE);
        buffer.extend_from_slice(&(value as u32).to_be_bytes());
    } else {
        buffer.push(0xFF);
        buffer.extend_from_slice(&value.to_be_bytes());
    }
}

/// Size needed to encode `value` as a variable-length number
pub fn var_number_size(value: u64) -> usize {
    if value < 253 {
        1
    } else if value <= u16::MAX as u64 {
        3
    } else if value <= u32::MAX as u64 {
        5
    } else {
        9
    }
}

/// Decode a variable-length number, returning it with the bytes consumed
pub fn decode_var_number(data: &[u8]) -> Result<(u64, usize), TlvError> {
    let first = *data.first().ok_or(TlvError::BufferTooShort)?;
    let width = match first {
        0..=252 => return Ok((first as u64, 1)),
        0xFD => 2,
        0xFE => 4,
        0xFF => 8,
    };
    if data.len() < 1 + width {
        return Err(TlvError::BufferTooShort);
    }
    let value = data[1..1 + width]
        .iter()
        .fold(0u64, |acc, byte| (acc << 8) | *byte as u64);
    // Non-minimal encodings are rejected
    if var_number_size(value) != 1 + width {
        return Err(TlvError::InvalidVarNumber);
    }
    Ok((value, 1 + width))
}

/// Encode a non-negative integer using the shortest of 1, 2, 4 or 8 bytes
pub fn encode_nonneg_integer(value: u64) -> Vec<u8> {
    if value <= u8::MAX as u64 {
        vec![value as u8]
    } else if value <= u16::MAX as u64 {
        (value as u16).to_be_bytes().to_vec()
    } else if value <= u32::MAX as u64 {
        (value as u32).to_be_bytes().to_vec()
    } else {
        value.to_be_bytes().to_vec()
    }
}

/// Decode a non-negative integer of 1, 2, 4 or 8 bytes
pub fn decode_nonneg_integer(data: &[u8]) -> Result<u64, TlvError> {
    match data.len() {
        1 | 2 | 4 | 8 => Ok(data.iter().fold(0u64, |acc, byte| (acc << 8) | *byte as u64)),
        other => Err(TlvError::InvalidInteger(other)),
    }
}

/// Check that `data` is exactly one TLV element of type `expected`.
///
/// Only the outer header is inspected: the type must match and the declared
/// length must cover the rest of the buffer precisely.
pub fn check_outer_tlv(data: &[u8], expected: u32) -> Result<(), TlvError> {
    let mut reader = TlvReader::new(data);
    let actual = reader.get_type()?;
    if actual != expected {
        return Err(TlvError::WrongType { expected, actual });
    }
    let declared = reader.get_length()?;
    if declared != reader.remaining() {
        return Err(TlvError::WrongLength {
            declared,
            available: reader.remaining(),
        });
    }
    Ok(())
}

/// Encode multiple TLV elements into a single buffer
pub fn encode_tlv_sequence(elements: &[TlvElement]) -> Vec<u8> {
    let total_size = elements.iter().map(|e| e.encoded_length()).sum();
    let mut buffer = Vec::with_capacity(total_size);

    for element in elements {
        element.encode_to(&mut buffer);
    }

    buffer
}

/// Decode multiple TLV elements from a buffer
pub fn decode_tlv_sequence(data: &[u8]) -> Result<Vec<TlvElement>, TlvError> {
    let mut reader = TlvReader::new(data);
    let mut elements = Vec::new();

    while !reader.is_empty() {
        elements.push(reader.read_element()?);
    }

    Ok(elements)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_tlv_encoding() {
        let element = TlvElement::new(1, vec![0x01, 0x02, 0x03]);
        assert_eq!(element.encode(), vec![1, 3, 0x01, 0x02, 0x03]);
    }

    #[test]
    fn test_basic_tlv_decoding() {
        let data = vec![1, 3, 0x01, 0x02, 0x03];
        let (element, consumed) = TlvElement::decode(&data).unwrap();

        assert_eq!(element.type_, 1);
        assert_eq!(element.value, vec![0x01, 0x02, 0x03]);
        assert_eq!(consumed, 5);
    }

    #[test]
    fn test_large_value_uses_big_endian_length() {
        let element = TlvElement::new(0x15, vec![0xAA; 300]);
        let encoded = element.encode();

        assert_eq!(encoded[0], 0x15);
        assert_eq!(encoded[1], 0xFD);
        assert_eq!(u16::from_be_bytes([encoded[2], encoded[3]]), 300);
        assert_eq!(encoded.len(), 4 + 300);
    }

    #[test]
    fn test_var_number_widths() {
        let cases: Vec<(u64, Vec<u8>)> = vec![
            (0, vec![0]),
            (252, vec![252]),
            (253, vec![0xFD, 0x00, 0xFD]),
            (65535, vec![0xFD, 0xFF, 0xFF]),
            (65536, vec![0xFE, 0x00, 0x01, 0x00, 0x00]),
        ];

        for (value, expected) in cases {
            let mut buffer = Vec::new();
            encode_var_number(value, &mut buffer);
            assert_eq!(buffer, expected);
            assert_eq!(decode_var_number(&buffer).unwrap(), (value, expected.len()));
        }
    }

    #[test]
    fn test_non_minimal_var_number_rejected() {
        assert_eq!(decode_var_number(&[0xFD, 0x00, 0x05]), Err(TlvError::InvalidVarNumber));
    }

    #[test]
    fn test_buffer_too_short() {
        let data = vec![1, 5, 0x01, 0x02];
        assert_eq!(
            TlvElement::decode(&data),
            Err(TlvError::WrongLength { declared: 5, available: 2 })
        );
        assert_eq!(decode_var_number(&[0xFE, 0x01]), Err(TlvError::BufferTooShort));
    }

    #[test]
    fn test_nonneg_integer() {
        assert_eq!(encode_nonneg_integer(4000), vec![0x0F, 0xA0]);
        assert_eq!(decode_nonneg_integer(&[0x0F, 0xA0]).unwrap(), 4000);
        assert_eq!(encode_nonneg_integer(70000).len(), 4);
        assert_eq!(decode_nonneg_integer(&[1, 2, 3]), Err(TlvError::InvalidInteger(3)));
    }

    #[test]
    fn test_check_outer_tlv() {
        let element = TlvElement::new(tlv_types::NAME, vec![0x08, 0x01, b'a']).encode();
        assert!(check_outer_tlv(&element, tlv_types::NAME).is_ok());
        assert_eq!(
            check_outer_tlv(&element, tlv_types::INTEREST),
            Err(TlvError::WrongType { expected: tlv_types::INTEREST, actual: tlv_types::NAME })
        );

        let mut padded = element.clone();
        padded.push(0);
        assert_eq!(
            check_outer_tlv(&padded, tlv_types::NAME),
            Err(TlvError::WrongLength { declared: 3, available: 4 })
        );

        assert_eq!(check_outer_tlv(&[], tlv_types::NAME), Err(TlvError::BufferTooShort));
    }

    #[test]
    fn test_sequence_encoding() {
        let elements = vec![
            TlvElement::new(1, vec![0x01]),
            TlvElement::new(2, vec![0x02, 0x03]),
            TlvElement::new(3, vec![]),
        ];

        let encoded = encode_tlv_sequence(&elements);
        assert_eq!(decode_tlv_sequence(&encoded).unwrap(), elements);
    }

    #[test]
    fn test_reader_header_peek() {
        let encoded = TlvElement::new(tlv_types::DATA, vec![0; 10]).encode();
        let mut reader = TlvReader::new(&encoded);
        assert_eq!(reader.get_type().unwrap(), tlv_types::DATA);
        assert_eq!(reader.get_length().unwrap(), 10);
        assert_eq!(reader.offset(), 2);
        assert_eq!(reader.remaining(), 10);
    }
}
