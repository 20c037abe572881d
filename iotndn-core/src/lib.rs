//! Wire-level building blocks shared by the forwarder and its applications:
//! the NDN TLV codec, hierarchical names and the Interest/Data packets.

pub mod name;
pub mod packets;
pub mod tlv;

pub use name::{Name, NameParseError};
pub use packets::{
    ContentType, Data, Interest, MetaInfo, Packet, PacketType, SignatureInfo,
    DEFAULT_INTEREST_LIFETIME,
};
pub use tlv::{tlv_types, TlvElement, TlvError, TlvReader};
