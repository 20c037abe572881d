use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::tlv::{tlv_types, TlvElement, TlvError, TlvReader};

/// Hierarchical NDN name: an ordered sequence of opaque byte components
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Name {
    components: Vec<Vec<u8>>,
}

impl Name {
    /// Create a new empty name (the root prefix `/`)
    pub fn new() -> Self {
        Self {
            components: Vec::new(),
        }
    }

    pub fn from_components<I, C>(components: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<Vec<u8>>,
    {
        Self {
            components: components.into_iter().map(Into::into).collect(),
        }
    }

    /// Append a component to the name
    pub fn append(&mut self, component: impl Into<Vec<u8>>) -> &mut Self {
        self.components.push(component.into());
        self
    }

    /// Append a string component to the name
    pub fn append_str(&mut self, component: &str) -> &mut Self {
        self.components.push(component.as_bytes().to_vec());
        self
    }

    /// Builder form of [`Name::append`]
    pub fn with(mut self, component: impl Into<Vec<u8>>) -> Self {
        self.components.push(component.into());
        self
    }

    /// Get the number of components
    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Get a component by index
    pub fn get(&self, index: usize) -> Option<&[u8]> {
        self.components.get(index).map(Vec::as_slice)
    }

    pub fn components(&self) -> &[Vec<u8>] {
        &self.components
    }

    /// Check if this name is a prefix of another name
    pub fn is_prefix_of(&self, other: &Name) -> bool {
        self.len() <= other.len() && self.components[..] == other.components[..self.len()]
    }

    /// Get a prefix of this name with at most `length` components
    pub fn get_prefix(&self, length: usize) -> Name {
        let end = length.min(self.components.len());
        Name {
            components: self.components[..end].to_vec(),
        }
    }

    /// Render as an NDN URI, percent-encoding bytes outside the unreserved set
    pub fn to_uri(&self) -> String {
        if self.is_empty() {
            return "/".to_string();
        }
        let mut uri = String::new();
        for component in &self.components {
            uri.push('/');
            for &byte in component {
                if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'.' | b'_' | b'~') {
                    uri.push(byte as char);
                } else {
                    uri.push_str(&format!("%{:02X}", byte));
                }
            }
        }
        uri
    }

    /// Encode name to TLV format
    pub fn encode(&self) -> Vec<u8> {
        TlvElement::new(tlv_types::NAME, self.encode_value()).encode()
    }

    /// Encode only the component list (the value of the Name TLV)
    pub fn encode_value(&self) -> Vec<u8> {
        let mut buffer = Vec::new();
        for component in &self.components {
            TlvElement::new(tlv_types::GENERIC_NAME_COMPONENT, component.clone()).encode_to(&mut buffer);
        }
        buffer
    }

    /// Decode name from TLV format, returning it with the bytes consumed
    pub fn decode(data: &[u8]) -> Result<(Self, usize), TlvError> {
        let (element, consumed) = TlvElement::decode(data)?;
        if element.type_ != tlv_types::NAME {
            return Err(TlvError::WrongType {
                expected: tlv_types::NAME,
                actual: element.type_,
            });
        }
        Ok((Self::decode_value(&element.value)?, consumed))
    }

    /// Decode the value of a Name TLV
    pub fn decode_value(value: &[u8]) -> Result<Self, TlvError> {
        let mut reader = TlvReader::new(value);
        let mut name = Name::new();
        while !reader.is_empty() {
            let component = reader.read_element()?;
            // Typed components (segment, version, digests) are kept by value
            if !(tlv_types::MIN_NAME_COMPONENT..=tlv_types::MAX_NAME_COMPONENT).contains(&component.type_) {
                return Err(TlvError::WrongType {
                    expected: tlv_types::GENERIC_NAME_COMPONENT,
                    actual: component.type_,
                });
            }
            name.components.push(component.value);
        }
        Ok(name)
    }
}

impl FromStr for Name {
    type Err = NameParseError;

    /// Parse an NDN URI such as `/home/light/status`; `%XX` escapes are decoded
    fn from_str(uri: &str) -> Result<Self, Self::Err> {
        let path = uri.strip_prefix("ndn:").unwrap_or(uri);
        let mut name = Name::new();
        for part in path.split('/').filter(|part| !part.is_empty()) {
            name.components.push(percent_decode(part)?);
        }
        Ok(name)
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_uri())
    }
}

fn percent_decode(part: &str) -> Result<Vec<u8>, NameParseError> {
    let bytes = part.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = bytes.get(i + 1..i + 3).ok_or(NameParseError::InvalidEscape)?;
            let hex = std::str::from_utf8(hex).map_err(|_| NameParseError::InvalidEscape)?;
            out.push(u8::from_str_radix(hex, 16).map_err(|_| NameParseError::InvalidEscape)?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    Ok(out)
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NameParseError {
    #[error("Invalid percent escape in name component")]
    InvalidEscape,
}
