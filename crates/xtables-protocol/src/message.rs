//! The wire message record and the key-validation rules every caller must
//! apply before it reaches the transport layer.

use crate::error::ValidationError;

/// A request/response command, carried in every [`Message`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Command {
    Put = 0,
    Publish = 1,
    Get = 2,
    Delete = 3,
    Ping = 4,
    GetTables = 5,
    Debug = 6,
    Information = 7,
    Registry = 8,
    SubscribeUpdate = 9,
    UpdateEvent = 10,
}

impl Command {
    /// Decode a command tag from the wire. Unknown tags are rejected by the
    /// caller (the codec), not silently mapped — an unrecognized command is
    /// a protocol error, unlike an unrecognized connection-monitor event.
    pub(crate) fn from_tag(tag: u8) -> Option<Self> {
        Some(match tag {
            0 => Command::Put,
            1 => Command::Publish,
            2 => Command::Get,
            3 => Command::Delete,
            4 => Command::Ping,
            5 => Command::GetTables,
            6 => Command::Debug,
            7 => Command::Information,
            8 => Command::Registry,
            9 => Command::SubscribeUpdate,
            10 => Command::UpdateEvent,
            _ => return None,
        })
    }

    pub(crate) fn tag(self) -> u8 {
        self as u8
    }
}

/// The type tag carried alongside a `Message`'s value bytes.
///
/// `Int64` is shared between 4-byte ints and 8-byte longs — see
/// [`crate::codec`] for the disambiguation rule (byte length on read).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ValueType {
    Unknown = 0,
    Bytes = 1,
    String = 2,
    Bool = 3,
    Int64 = 4,
    Double = 5,
    DoubleList = 6,
    StringList = 7,
    IntegerList = 8,
    BytesList = 9,
    LongList = 10,
    FloatList = 11,
    BooleanList = 12,
}

impl ValueType {
    pub(crate) fn from_tag(tag: u8) -> Option<Self> {
        Some(match tag {
            0 => ValueType::Unknown,
            1 => ValueType::Bytes,
            2 => ValueType::String,
            3 => ValueType::Bool,
            4 => ValueType::Int64,
            5 => ValueType::Double,
            6 => ValueType::DoubleList,
            7 => ValueType::StringList,
            8 => ValueType::IntegerList,
            9 => ValueType::BytesList,
            10 => ValueType::LongList,
            11 => ValueType::FloatList,
            12 => ValueType::BooleanList,
            _ => return None,
        })
    }

    pub(crate) fn tag(self) -> u8 {
        self as u8
    }
}

/// The wire unit exchanged on the Push and Req transports, and used as the
/// reply/solicitation envelope on Sub.
///
/// `id` is an optional 63-bit positive correlation tag (the top bit is
/// reserved so presence can never collide with "absent", mirroring the
/// protobuf convention of a zero-or-positive field doubling as `Option`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: Option<u64>,
    pub command: Command,
    pub key: Option<String>,
    pub value: Option<Vec<u8>>,
    pub r#type: ValueType,
}

impl Message {
    /// Build a bare command message with no key/value/type (e.g. `PING`).
    pub fn new(command: Command) -> Self {
        Message {
            id: None,
            command,
            key: None,
            value: None,
            r#type: ValueType::Unknown,
        }
    }

    pub fn with_id(mut self, id: u64) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_value(mut self, value: Vec<u8>, r#type: ValueType) -> Self {
        self.value = Some(value);
        self.r#type = r#type;
        self
    }
}

/// Key-validation rules applied to every user-supplied key on
/// PUT/PUBLISH/GET/SUBSCRIBE before any I/O.
///
/// Non-empty, no space, no leading/trailing `.`, no `..`, no empty segment
/// after splitting on `.`.
pub fn validate_key(key: &str) -> Result<(), ValidationError> {
    if key.is_empty() {
        return Err(ValidationError::Empty);
    }
    if key.contains(' ') {
        return Err(ValidationError::ContainsSpace);
    }
    if key.starts_with('.') || key.ends_with('.') {
        return Err(ValidationError::LeadingOrTrailingDot);
    }
    if key.contains("..") {
        return Err(ValidationError::EmptySegment);
    }
    if key.split('.').any(str::is_empty) {
        return Err(ValidationError::EmptySegment);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_well_formed_keys() {
        assert!(validate_key("robot.enabled").is_ok());
        assert!(validate_key("a").is_ok());
        assert!(validate_key("a.b.c").is_ok());
    }

    #[test]
    fn rejects_empty() {
        assert_eq!(validate_key(""), Err(ValidationError::Empty));
    }

    #[test]
    fn rejects_space() {
        assert_eq!(
            validate_key("robot enabled"),
            Err(ValidationError::ContainsSpace)
        );
    }

    #[test]
    fn rejects_leading_trailing_dot() {
        assert_eq!(
            validate_key(".robot"),
            Err(ValidationError::LeadingOrTrailingDot)
        );
        assert_eq!(
            validate_key("robot."),
            Err(ValidationError::LeadingOrTrailingDot)
        );
    }

    #[test]
    fn rejects_empty_segment() {
        assert_eq!(validate_key("a..b"), Err(ValidationError::EmptySegment));
    }

    #[test]
    fn command_tag_round_trips() {
        for c in [
            Command::Put,
            Command::Publish,
            Command::Get,
            Command::Delete,
            Command::Ping,
            Command::GetTables,
            Command::Debug,
            Command::Information,
            Command::Registry,
            Command::SubscribeUpdate,
            Command::UpdateEvent,
        ] {
            assert_eq!(Command::from_tag(c.tag()), Some(c));
        }
    }
}
