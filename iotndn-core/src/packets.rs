use std::time::Duration;

use log::trace;
use serde::{Deserialize, Serialize};

use crate::name::Name;
use crate::tlv::{
    check_outer_tlv, decode_nonneg_integer, encode_nonneg_integer, encode_tlv_sequence, tlv_types,
    TlvElement, TlvError, TlvReader,
};

/// Interest lifetime assumed when a packet carries none
pub const DEFAULT_INTEREST_LIFETIME: Duration = Duration::from_millis(4000);

/// Interest packet structure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interest {
    pub name: Name,
    pub can_be_prefix: bool,
    pub must_be_fresh: bool,
    pub nonce: Option<u32>,
    pub interest_lifetime: Option<Duration>,
    pub hop_limit: Option<u8>,
    pub application_parameters: Option<Vec<u8>>,
}

impl Interest {
    /// Create a new Interest with the given name
    pub fn new(name: Name) -> Self {
        Self {
            name,
            can_be_prefix: false,
            must_be_fresh: false,
            nonce: None,
            interest_lifetime: None,
            hop_limit: None,
            application_parameters: None,
        }
    }

    /// Set the nonce for this Interest
    pub fn with_nonce(mut self, nonce: u32) -> Self {
        self.nonce = Some(nonce);
        self
    }

    /// Set the interest lifetime
    pub fn with_lifetime(mut self, lifetime: Duration) -> Self {
        self.interest_lifetime = Some(lifetime);
        self
    }

    /// Set the hop limit
    pub fn with_hop_limit(mut self, hop_limit: u8) -> Self {
        self.hop_limit = Some(hop_limit);
        self
    }

    pub fn with_can_be_prefix(mut self, can_be_prefix: bool) -> Self {
        self.can_be_prefix = can_be_prefix;
        self
    }

    pub fn with_must_be_fresh(mut self, must_be_fresh: bool) -> Self {
        self.must_be_fresh = must_be_fresh;
        self
    }

    /// Set application parameters
    pub fn with_application_parameters(mut self, params: Vec<u8>) -> Self {
        self.application_parameters = Some(params);
        self
    }

    /// Lifetime carried by the packet, or [`DEFAULT_INTEREST_LIFETIME`]
    pub fn lifetime(&self) -> Duration {
        self.interest_lifetime.unwrap_or(DEFAULT_INTEREST_LIFETIME)
    }

    /// Encode Interest packet to TLV wire format
    pub fn encode(&self) -> Vec<u8> {
        let mut elements = vec![TlvElement::new(tlv_types::NAME, self.name.encode_value())];

        if self.can_be_prefix {
            elements.push(TlvElement::new(tlv_types::CAN_BE_PREFIX, vec![]));
        }
        if self.must_be_fresh {
            elements.push(TlvElement::new(tlv_types::MUST_BE_FRESH, vec![]));
        }
        if let Some(nonce) = self.nonce {
            elements.push(TlvElement::new(tlv_types::NONCE, nonce.to_be_bytes().to_vec()));
        }
        if let Some(lifetime) = self.interest_lifetime {
            let lifetime_ms = lifetime.as_millis().min(u64::MAX as u128) as u64;
            elements.push(TlvElement::new(
                tlv_types::INTEREST_LIFETIME,
                encode_nonneg_integer(lifetime_ms),
            ));
        }
        if let Some(hop_limit) = self.hop_limit {
            elements.push(TlvElement::new(tlv_types::HOP_LIMIT, vec![hop_limit]));
        }
        if let Some(params) = &self.application_parameters {
            elements.push(TlvElement::new(tlv_types::APPLICATION_PARAMETERS, params.clone()));
        }

        TlvElement::new(tlv_types::INTEREST, encode_tlv_sequence(&elements)).encode()
    }

    /// Decode Interest packet from TLV wire format
    pub fn decode(data: &[u8]) -> Result<Self, TlvError> {
        check_outer_tlv(data, tlv_types::INTEREST)?;
        let (outer, _) = TlvElement::decode(data)?;

        let mut reader = TlvReader::new(&outer.value);
        let mut name = None;
        let mut interest = Interest::new(Name::new());

        while !reader.is_empty() {
            let element = reader.read_element()?;
            match element.type_ {
                tlv_types::NAME => name = Some(Name::decode_value(&element.value)?),
                tlv_types::CAN_BE_PREFIX => interest.can_be_prefix = true,
                tlv_types::MUST_BE_FRESH => interest.must_be_fresh = true,
                tlv_types::NONCE => {
                    let bytes: [u8; 4] = element
                        .value
                        .as_slice()
                        .try_into()
                        .map_err(|_| TlvError::InvalidInteger(element.value.len()))?;
                    interest.nonce = Some(u32::from_be_bytes(bytes));
                }
                tlv_types::INTEREST_LIFETIME => {
                    let lifetime_ms = decode_nonneg_integer(&element.value)?;
                    interest.interest_lifetime = Some(Duration::from_millis(lifetime_ms));
                }
                tlv_types::HOP_LIMIT => {
                    if element.value.len() != 1 {
                        return Err(TlvError::InvalidInteger(element.value.len()));
                    }
                    interest.hop_limit = Some(element.value[0]);
                }
                tlv_types::APPLICATION_PARAMETERS => {
                    interest.application_parameters = Some(element.value);
                }
                _ => {} // Ignore unknown elements
            }
        }

        interest.name = name.ok_or(TlvError::MissingElement(tlv_types::NAME))?;
        Ok(interest)
    }
}

/// Content type for Data packets
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContentType {
    #[default]
    Blob,
    Link,
    Key,
    Nack,
    Other(u64),
}

impl ContentType {
    fn code(self) -> u64 {
        match self {
            ContentType::Blob => 0,
            ContentType::Link => 1,
            ContentType::Key => 2,
            ContentType::Nack => 3,
            ContentType::Other(code) => code,
        }
    }

    fn from_code(code: u64) -> Self {
        match code {
            0 => ContentType::Blob,
            1 => ContentType::Link,
            2 => ContentType::Key,
            3 => ContentType::Nack,
            other => ContentType::Other(other),
        }
    }
}

/// MetaInfo for Data packets
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaInfo {
    pub content_type: ContentType,
    pub freshness_period: Option<Duration>,
    pub final_block_id: Option<Vec<u8>>,
}

/// Signature information
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureInfo {
    pub signature_type: u64,
    pub key_locator: Option<Name>,
}

impl SignatureInfo {
    pub fn new(signature_type: u64) -> Self {
        Self {
            signature_type,
            key_locator: None,
        }
    }

    pub fn with_key_locator(mut self, key_name: Name) -> Self {
        self.key_locator = Some(key_name);
        self
    }
}

/// Data packet structure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Data {
    pub name: Name,
    pub meta_info: Option<MetaInfo>,
    pub content: Vec<u8>,
    pub signature_info: Option<SignatureInfo>,
    pub signature_value: Option<Vec<u8>>,
}

impl Data {
    /// Create a new Data packet with the given name and content
    pub fn new(name: Name, content: Vec<u8>) -> Self {
        Self {
            name,
            meta_info: None,
            content,
            signature_info: None,
            signature_value: None,
        }
    }

    /// Set the content type
    pub fn with_content_type(mut self, content_type: ContentType) -> Self {
        self.meta_info.get_or_insert_with(Default::default).content_type = content_type;
        self
    }

    /// Set the freshness period
    pub fn with_freshness_period(mut self, freshness_period: Duration) -> Self {
        self.meta_info.get_or_insert_with(Default::default).freshness_period = Some(freshness_period);
        self
    }

    pub fn with_signature(mut self, info: SignatureInfo, value: Vec<u8>) -> Self {
        self.signature_info = Some(info);
        self.signature_value = Some(value);
        self
    }

    /// Check if this Data packet can satisfy the given Interest
    pub fn satisfies(&self, interest: &Interest) -> bool {
        if interest.can_be_prefix {
            interest.name.is_prefix_of(&self.name)
        } else {
            interest.name == self.name
        }
    }

    /// Encode Data packet to TLV wire format
    pub fn encode(&self) -> Vec<u8> {
        let mut elements = vec![TlvElement::new(tlv_types::NAME, self.name.encode_value())];

        if let Some(meta_info) = &self.meta_info {
            elements.push(TlvElement::new(tlv_types::META_INFO, encode_meta_info(meta_info)));
        }

        elements.push(TlvElement::new(tlv_types::CONTENT, self.content.clone()));

        if let Some(sig_info) = &self.signature_info {
            elements.push(TlvElement::new(tlv_types::SIGNATURE_INFO, encode_signature_info(sig_info)));
        }
        if let Some(sig_value) = &self.signature_value {
            elements.push(TlvElement::new(tlv_types::SIGNATURE_VALUE, sig_value.clone()));
        }

        TlvElement::new(tlv_types::DATA, encode_tlv_sequence(&elements)).encode()
    }

    /// Decode Data packet from TLV wire format
    pub fn decode(data: &[u8]) -> Result<Self, TlvError> {
        check_outer_tlv(data, tlv_types::DATA)?;
        let (outer, _) = TlvElement::decode(data)?;

        let mut reader = TlvReader::new(&outer.value);
        let mut name = None;
        let mut packet = Data::new(Name::new(), Vec::new());

        while !reader.is_empty() {
            let element = reader.read_element()?;
            match element.type_ {
                tlv_types::NAME => name = Some(Name::decode_value(&element.value)?),
                tlv_types::META_INFO => packet.meta_info = Some(decode_meta_info(&element.value)?),
                tlv_types::CONTENT => packet.content = element.value,
                tlv_types::SIGNATURE_INFO => {
                    packet.signature_info = Some(decode_signature_info(&element.value)?)
                }
                tlv_types::SIGNATURE_VALUE => packet.signature_value = Some(element.value),
                _ => {}
            }
        }

        packet.name = name.ok_or(TlvError::MissingElement(tlv_types::NAME))?;
        Ok(packet)
    }
}

/// Outer packet types the forwarder dispatches on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketType {
    Interest,
    Data,
}

impl PacketType {
    pub fn tlv_type(self) -> u32 {
        match self {
            PacketType::Interest => tlv_types::INTEREST,
            PacketType::Data => tlv_types::DATA,
        }
    }
}

/// Packet types that can be sent over the network
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Packet {
    Interest(Interest),
    Data(Data),
}

impl Packet {
    /// Determine the packet type after checking the outer TLV header.
    ///
    /// Only the header is validated; the body is left undecoded.
    pub fn classify(data: &[u8]) -> Result<PacketType, TlvError> {
        let actual = TlvReader::new(data).get_type()?;
        let packet_type = match actual {
            tlv_types::INTEREST => PacketType::Interest,
            tlv_types::DATA => PacketType::Data,
            _ => {
                trace!("Unrecognised outer packet type {:#x}", actual);
                return Err(TlvError::WrongType {
                    expected: tlv_types::INTEREST,
                    actual,
                })
            }
        };
        check_outer_tlv(data, packet_type.tlv_type())?;
        Ok(packet_type)
    }

    /// Classify and fully decode a wire packet
    pub fn decode(data: &[u8]) -> Result<Self, TlvError> {
        match Self::classify(data)? {
            PacketType::Interest => Interest::decode(data).map(Packet::Interest),
            PacketType::Data => Data::decode(data).map(Packet::Data),
        }
    }

    /// Get the name of the packet
    pub fn name(&self) -> &Name {
        match self {
            Packet::Interest(interest) => &interest.name,
            Packet::Data(data) => &data.name,
        }
    }
}

impl From<Interest> for Packet {
    fn from(interest: Interest) -> Self {
        Packet::Interest(interest)
    }
}

impl From<Data> for Packet {
    fn from(data: Data) -> Self {
        Packet::Data(data)
    }
}

fn encode_meta_info(meta_info: &MetaInfo) -> Vec<u8> {
    let mut elements = Vec::new();
    if meta_info.content_type != ContentType::Blob {
        elements.push(TlvElement::new(
            tlv_types::CONTENT_TYPE,
            encode_nonneg_integer(meta_info.content_type.code()),
        ));
    }
    if let Some(freshness) = meta_info.freshness_period {
        let freshness_ms = freshness.as_millis().min(u64::MAX as u128) as u64;
        elements.push(TlvElement::new(
            tlv_types::FRESHNESS_PERIOD,
            encode_nonneg_integer(freshness_ms),
        ));
    }
    if let Some(final_block_id) = &meta_info.final_block_id {
        elements.push(TlvElement::new(tlv_types::FINAL_BLOCK_ID, final_block_id.clone()));
    }
    encode_tlv_sequence(&elements)
}

fn decode_meta_info(value: &[u8]) -> Result<MetaInfo, TlvError> {
    let mut reader = TlvReader::new(value);
    let mut meta_info = MetaInfo::default();
    while !reader.is_empty() {
        let element = reader.read_element()?;
        match element.type_ {
            tlv_types::CONTENT_TYPE => {
                meta_info.content_type = ContentType::from_code(decode_nonneg_integer(&element.value)?)
            }
            tlv_types::FRESHNESS_PERIOD => {
                meta_info.freshness_period =
                    Some(Duration::from_millis(decode_nonneg_integer(&element.value)?))
            }
            tlv_types::FINAL_BLOCK_ID => meta_info.final_block_id = Some(element.value),
            _ => {}
        }
    }
    Ok(meta_info)
}

fn encode_signature_info(sig_info: &SignatureInfo) -> Vec<u8> {
    let mut elements = vec![TlvElement::new(
        tlv_types::SIGNATURE_TYPE,
        encode_nonneg_integer(sig_info.signature_type),
    )];
    if let Some(key_name) = &sig_info.key_locator {
        elements.push(TlvElement::new(tlv_types::KEY_LOCATOR, key_name.encode()));
    }
    encode_tlv_sequence(&elements)
}

fn decode_signature_info(value: &[u8]) -> Result<SignatureInfo, TlvError> {
    let mut reader = TlvReader::new(value);
    let mut signature_type = None;
    let mut key_locator = None;
    while !reader.is_empty() {
        let element = reader.read_element()?;
        match element.type_ {
            tlv_types::SIGNATURE_TYPE => signature_type = Some(decode_nonneg_integer(&element.value)?),
            tlv_types::KEY_LOCATOR => {
                let (key_name, _) = Name::decode(&element.value)?;
                key_locator = Some(key_name);
            }
            _ => {}
        }
    }
    Ok(SignatureInfo {
        signature_type: signature_type.ok_or(TlvError::MissingElement(tlv_types::SIGNATURE_TYPE))?,
        key_locator,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(uri: &str) -> Name {
        uri.parse().unwrap()
    }

    #[test]
    fn test_interest_creation() {
        let interest = Interest::new(name("/test/interest"))
            .with_nonce(12345)
            .with_lifetime(Duration::from_secs(10))
            .with_hop_limit(64)
            .with_must_be_fresh(true);

        assert_eq!(interest.nonce, Some(12345));
        assert_eq!(interest.lifetime(), Duration::from_secs(10));
        assert_eq!(interest.hop_limit, Some(64));
        assert!(interest.must_be_fresh);
        assert!(!interest.can_be_prefix);
    }

    #[test]
    fn test_default_lifetime() {
        let interest = Interest::new(name("/a"));
        assert_eq!(interest.lifetime(), Duration::from_millis(4000));
    }

    #[test]
    fn test_interest_encoding_roundtrip() {
        let interest = Interest::new(name("/home/light/status"))
            .with_can_be_prefix(true)
            .with_nonce(0xDEADBEEF)
            .with_lifetime(Duration::from_millis(4000))
            .with_application_parameters(vec![1, 2, 3]);

        let encoded = interest.encode();
        assert_eq!(encoded[0] as u32, tlv_types::INTEREST);
        assert_eq!(Interest::decode(&encoded).unwrap(), interest);
    }

    #[test]
    fn test_interest_lifetime_is_minimal_integer() {
        let encoded = Interest::new(name("/a"))
            .with_lifetime(Duration::from_millis(4000))
            .encode();
        // Name(5 bytes) + Lifetime(2 + 2 bytes)
        assert_eq!(&encoded[encoded.len() - 4..], &[0x0C, 0x02, 0x0F, 0xA0]);
    }

    #[test]
    fn test_interest_without_name_rejected() {
        let encoded = TlvElement::new(tlv_types::INTEREST, vec![0x0A, 0x04, 0, 0, 0, 1]).encode();
        assert_eq!(Interest::decode(&encoded), Err(TlvError::MissingElement(tlv_types::NAME)));
    }

    #[test]
    fn test_data_encoding_roundtrip() {
        let data = Data::new(name("/test/data"), b"Hello, world!".to_vec())
            .with_content_type(ContentType::Key)
            .with_freshness_period(Duration::from_secs(3600))
            .with_signature(
                SignatureInfo::new(3).with_key_locator(name("/test/KEY/1")),
                vec![0xAB; 8],
            );

        let decoded = Data::decode(&data.encode()).unwrap();
        assert_eq!(decoded, data);
    }

    #[test]
    fn test_empty_content_data() {
        let data = Data::new(name("/empty"), vec![]);
        let decoded = Data::decode(&data.encode()).unwrap();
        assert!(decoded.content.is_empty());
        assert_eq!(decoded.name, data.name);
    }

    #[test]
    fn test_data_satisfies_interest() {
        let data = Data::new(name("/a/b/c"), vec![]);
        assert!(data.satisfies(&Interest::new(name("/a/b/c"))));
        assert!(!data.satisfies(&Interest::new(name("/a/b"))));
        assert!(data.satisfies(&Interest::new(name("/a/b")).with_can_be_prefix(true)));
    }

    #[test]
    fn test_packet_classification() {
        let interest = Interest::new(name("/x")).encode();
        let data = Data::new(name("/x"), b"y".to_vec()).encode();

        assert_eq!(Packet::classify(&interest).unwrap(), PacketType::Interest);
        assert!(matches!(Packet::decode(&data).unwrap(), Packet::Data(_)));
        assert_eq!(Packet::decode(&data).unwrap().name(), &name("/x"));

        let name_only = name("/x").encode();
        assert!(matches!(Packet::decode(&name_only), Err(TlvError::WrongType { .. })));
        assert!(Packet::decode(&[]).is_err());
    }

    #[test]
    fn test_truncated_packet_rejected() {
        let mut encoded = Data::new(name("/x"), b"payload".to_vec()).encode();
        encoded.truncate(encoded.len() - 2);
        assert!(matches!(Data::decode(&encoded), Err(TlvError::WrongLength { .. })));
    }
}
