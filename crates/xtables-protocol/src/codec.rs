//! The framed codec: the sole boundary that parses bytes. Every other
//! component deals only in [`Message`]/[`Update`] values.
//!
//! Wire layout (all multi-byte integers big-endian):
//!
//! `Message`: `command(1) id_present(1) [id(8)] key_present(1) [key_len(4)
//! key] type(1) value_present(1) [value_len(4) value]`
//!
//! `Update`: `key NUL(1) category(1) value_len(4) value` — the key is
//! NUL-terminated rather than length-prefixed, so that
//! [`encode_update_prefix`] is always a true byte-prefix of
//! [`encode_update`] for the same key. That property is what makes the
//! Sub transport's prefix filter work.

use crate::error::DecodeError;
use crate::message::{Command, Message, ValueType};
use crate::update::{Category, Update};
use bytes::{BufMut, BytesMut};

// ---------------------------------------------------------------------------
// Byte-cursor helpers (decode side)
// ---------------------------------------------------------------------------

fn take<'a>(buf: &mut &'a [u8], n: usize, field: &'static str) -> Result<&'a [u8], DecodeError> {
    if buf.len() < n {
        return Err(DecodeError::Truncated { field });
    }
    let (head, tail) = buf.split_at(n);
    *buf = tail;
    Ok(head)
}

fn take_u8(buf: &mut &[u8], field: &'static str) -> Result<u8, DecodeError> {
    Ok(take(buf, 1, field)?[0])
}

fn take_u32(buf: &mut &[u8], field: &'static str) -> Result<u32, DecodeError> {
    let b = take(buf, 4, field)?;
    Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
}

fn take_u64(buf: &mut &[u8], field: &'static str) -> Result<u64, DecodeError> {
    let b = take(buf, 8, field)?;
    Ok(u64::from_be_bytes(b.try_into().unwrap()))
}

fn take_string(buf: &mut &[u8], field: &'static str) -> Result<String, DecodeError> {
    let len = take_u32(buf, field)? as usize;
    let bytes = take(buf, len, field)?;
    String::from_utf8(bytes.to_vec()).map_err(|_| DecodeError::InvalidUtf8 { field })
}

fn take_bytes(buf: &mut &[u8], field: &'static str) -> Result<Vec<u8>, DecodeError> {
    let len = take_u32(buf, field)? as usize;
    Ok(take(buf, len, field)?.to_vec())
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

pub fn encode_message(msg: &Message) -> Vec<u8> {
    let mut out = BytesMut::with_capacity(32 + msg.value.as_ref().map_or(0, Vec::len));
    out.put_u8(msg.command.tag());
    match msg.id {
        Some(id) => {
            out.put_u8(1);
            out.put_u64(id);
        }
        None => out.put_u8(0),
    }
    match &msg.key {
        Some(key) => {
            out.put_u8(1);
            out.put_u32(key.len() as u32);
            out.put_slice(key.as_bytes());
        }
        None => out.put_u8(0),
    }
    out.put_u8(msg.r#type.tag());
    match &msg.value {
        Some(value) => {
            out.put_u8(1);
            out.put_u32(value.len() as u32);
            out.put_slice(value);
        }
        None => out.put_u8(0),
    }
    out.to_vec()
}

pub fn decode_message(data: &[u8]) -> Result<Message, DecodeError> {
    let mut buf = data;
    let command_tag = take_u8(&mut buf, "command")?;
    let command = Command::from_tag(command_tag).ok_or(DecodeError::UnknownTag {
        field: "command",
        tag: command_tag,
    })?;

    let id = match take_u8(&mut buf, "id_present")? {
        0 => None,
        _ => Some(take_u64(&mut buf, "id")?),
    };

    let key = match take_u8(&mut buf, "key_present")? {
        0 => None,
        _ => Some(take_string(&mut buf, "key")?),
    };

    let type_tag = take_u8(&mut buf, "type")?;
    let r#type = ValueType::from_tag(type_tag).ok_or(DecodeError::UnknownTag {
        field: "type",
        tag: type_tag,
    })?;

    let value = match take_u8(&mut buf, "value_present")? {
        0 => None,
        _ => Some(take_bytes(&mut buf, "value")?),
    };

    Ok(Message {
        id,
        command,
        key,
        value,
        r#type,
    })
}

// ---------------------------------------------------------------------------
// Update / subscription prefix
// ---------------------------------------------------------------------------

/// The byte-prefix installed on the Sub transport when subscribing to `key`.
///
/// The empty key (the wildcard subscription) maps to the empty prefix,
/// which matches every encoded `Update` trivially. A non-empty key is
/// terminated with a NUL byte before the rest of the frame so that key `a`
/// never prefix-matches key `ab` — keys are validated to exclude spaces and
/// bare dots but a literal NUL is not a meaningful key character in
/// practice, so it is reserved here as the internal frame delimiter.
pub fn encode_update_prefix(key: &str) -> Vec<u8> {
    if key.is_empty() {
        return Vec::new();
    }
    let mut out = Vec::with_capacity(key.len() + 1);
    out.extend_from_slice(key.as_bytes());
    out.push(0);
    out
}

pub fn encode_update(update: &Update) -> Vec<u8> {
    let mut out = BytesMut::with_capacity(16 + update.key.len() + update.value.len());
    out.put_slice(update.key.as_bytes());
    out.put_u8(0);
    out.put_u8(update.category.tag());
    out.put_u32(update.value.len() as u32);
    out.put_slice(&update.value);
    out.to_vec()
}

pub fn decode_update(data: &[u8]) -> Result<Update, DecodeError> {
    let mut buf = data;
    let nul_pos = buf
        .iter()
        .position(|&b| b == 0)
        .ok_or(DecodeError::Truncated { field: "key" })?;
    let key_bytes = take(&mut buf, nul_pos, "key")?;
    let key = std::str::from_utf8(key_bytes)
        .map_err(|_| DecodeError::InvalidUtf8 { field: "key" })?
        .to_owned();
    let _terminator = take_u8(&mut buf, "key_terminator")?;

    let category_tag = take_u8(&mut buf, "category")?;
    let category = Category::from_tag(category_tag).ok_or(DecodeError::UnknownTag {
        field: "category",
        tag: category_tag,
    })?;

    let value = take_bytes(&mut buf, "value")?;

    Ok(Update {
        category,
        key,
        value,
    })
}

// ---------------------------------------------------------------------------
// Typed scalar encodings
// ---------------------------------------------------------------------------

pub fn encode_bool(v: bool) -> Vec<u8> {
    vec![if v { 0x01 } else { 0x00 }]
}

pub fn decode_bool(data: &[u8]) -> Result<bool, DecodeError> {
    match data.first() {
        Some(0x01) => Ok(true),
        Some(0x00) => Ok(false),
        _ => Err(DecodeError::Truncated { field: "bool" }),
    }
}

/// 4-byte big-endian `int`. Shares the `Int64` tag with [`encode_i64`];
/// byte length alone disambiguates on read.
pub fn encode_i32(v: i32) -> Vec<u8> {
    v.to_be_bytes().to_vec()
}

pub fn decode_i32(data: &[u8]) -> Result<i32, DecodeError> {
    let b: [u8; 4] = data
        .try_into()
        .map_err(|_| DecodeError::Truncated { field: "int32" })?;
    Ok(i32::from_be_bytes(b))
}

/// 8-byte big-endian `long`. See [`encode_i32`] for the shared-tag note.
pub fn encode_i64(v: i64) -> Vec<u8> {
    v.to_be_bytes().to_vec()
}

pub fn decode_i64(data: &[u8]) -> Result<i64, DecodeError> {
    let b: [u8; 8] = data
        .try_into()
        .map_err(|_| DecodeError::Truncated { field: "int64" })?;
    Ok(i64::from_be_bytes(b))
}

pub fn encode_f64(v: f64) -> Vec<u8> {
    v.to_be_bytes().to_vec()
}

pub fn decode_f64(data: &[u8]) -> Result<f64, DecodeError> {
    let b: [u8; 8] = data
        .try_into()
        .map_err(|_| DecodeError::Truncated { field: "double" })?;
    Ok(f64::from_be_bytes(b))
}

pub fn encode_string(v: &str) -> Vec<u8> {
    v.as_bytes().to_vec()
}

pub fn decode_string(data: &[u8]) -> Result<String, DecodeError> {
    String::from_utf8(data.to_vec()).map_err(|_| DecodeError::InvalidUtf8 { field: "string" })
}

// ---------------------------------------------------------------------------
// List encodings: count(4) then elements. Variable-width elements
// (string/bytes) are individually length-prefixed; fixed-width elements are
// packed back-to-back.
// ---------------------------------------------------------------------------

macro_rules! fixed_width_list_codec {
    ($encode:ident, $decode:ident, $elem:ty, $width:expr, $to_be:ident, $from_be:ident, $field:expr) => {
        pub fn $encode(values: &[$elem]) -> Vec<u8> {
            let mut out = BytesMut::with_capacity(4 + values.len() * $width);
            out.put_u32(values.len() as u32);
            for v in values {
                out.put_slice(&v.$to_be());
            }
            out.to_vec()
        }

        pub fn $decode(data: &[u8]) -> Result<Vec<$elem>, DecodeError> {
            let mut buf = data;
            let count = take_u32(&mut buf, $field)? as usize;
            let mut out = Vec::with_capacity(count);
            for _ in 0..count {
                let b = take(&mut buf, $width, $field)?;
                out.push(<$elem>::$from_be(b.try_into().unwrap()));
            }
            Ok(out)
        }
    };
}

fixed_width_list_codec!(
    encode_double_list,
    decode_double_list,
    f64,
    8,
    to_be_bytes,
    from_be_bytes,
    "double_list"
);
fixed_width_list_codec!(
    encode_integer_list,
    decode_integer_list,
    i32,
    4,
    to_be_bytes,
    from_be_bytes,
    "integer_list"
);
fixed_width_list_codec!(
    encode_long_list,
    decode_long_list,
    i64,
    8,
    to_be_bytes,
    from_be_bytes,
    "long_list"
);
fixed_width_list_codec!(
    encode_float_list,
    decode_float_list,
    f32,
    4,
    to_be_bytes,
    from_be_bytes,
    "float_list"
);

pub fn encode_boolean_list(values: &[bool]) -> Vec<u8> {
    let mut out = BytesMut::with_capacity(4 + values.len());
    out.put_u32(values.len() as u32);
    for v in values {
        out.put_u8(if *v { 1 } else { 0 });
    }
    out.to_vec()
}

pub fn decode_boolean_list(data: &[u8]) -> Result<Vec<bool>, DecodeError> {
    let mut buf = data;
    let count = take_u32(&mut buf, "boolean_list")? as usize;
    let mut out = Vec::with_capacity(count);
    for _ in 0..count {
        out.push(take_u8(&mut buf, "boolean_list")? != 0);
    }
    Ok(out)
}

pub fn encode_string_list(values: &[String]) -> Vec<u8> {
    let mut out = BytesMut::new();
    out.put_u32(values.len() as u32);
    for v in values {
        out.put_u32(v.len() as u32);
        out.put_slice(v.as_bytes());
    }
    out.to_vec()
}

pub fn decode_string_list(data: &[u8]) -> Result<Vec<String>, DecodeError> {
    let mut buf = data;
    let count = take_u32(&mut buf, "string_list")? as usize;
    let mut out = Vec::with_capacity(count);
    for _ in 0..count {
        out.push(take_string(&mut buf, "string_list")?);
    }
    Ok(out)
}

pub fn encode_bytes_list(values: &[Vec<u8>]) -> Vec<u8> {
    let mut out = BytesMut::new();
    out.put_u32(values.len() as u32);
    for v in values {
        out.put_u32(v.len() as u32);
        out.put_slice(v);
    }
    out.to_vec()
}

pub fn decode_bytes_list(data: &[u8]) -> Result<Vec<Vec<u8>>, DecodeError> {
    let mut buf = data;
    let count = take_u32(&mut buf, "bytes_list")? as usize;
    let mut out = Vec::with_capacity(count);
    for _ in 0..count {
        out.push(take_bytes(&mut buf, "bytes_list")?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_round_trips_with_all_fields() {
        let msg = Message::new(Command::Put)
            .with_id(42)
            .with_key("robot.enabled")
            .with_value(encode_bool(true), ValueType::Bool);
        let encoded = encode_message(&msg);
        let decoded = decode_message(&encoded).unwrap();
        assert_eq!(msg, decoded);
    }

    #[test]
    fn message_round_trips_with_absent_fields() {
        let msg = Message::new(Command::Ping);
        let encoded = encode_message(&msg);
        let decoded = decode_message(&encoded).unwrap();
        assert_eq!(msg, decoded);
        assert!(decoded.id.is_none());
        assert!(decoded.key.is_none());
        assert!(decoded.value.is_none());
    }

    #[test]
    fn update_prefix_is_true_byte_prefix_of_full_encoding() {
        let update = Update::new(Category::Update, "robot.enabled", b"x".to_vec());
        let prefix = encode_update_prefix("robot.enabled");
        let full = encode_update(&update);
        assert!(full.starts_with(&prefix));
    }

    #[test]
    fn update_prefix_does_not_cross_match_longer_key() {
        let shorter = encode_update_prefix("robot");
        let longer_full = encode_update(&Update::new(Category::Update, "robot2", vec![]));
        assert!(!longer_full.starts_with(&shorter));
    }

    #[test]
    fn wildcard_prefix_is_empty_and_matches_everything() {
        let wildcard = encode_update_prefix("");
        assert!(wildcard.is_empty());
        let full = encode_update(&Update::new(Category::Publish, "any.key", vec![1, 2, 3]));
        assert!(full.starts_with(&wildcard));
    }

    #[test]
    fn update_round_trips() {
        let update = Update::new(Category::Log, "sys.log", b"hello".to_vec());
        let encoded = encode_update(&update);
        let decoded = decode_update(&encoded).unwrap();
        assert_eq!(update, decoded);
    }

    #[test]
    fn int64_tag_disambiguates_by_byte_length() {
        let i32_bytes = encode_i32(-7);
        let i64_bytes = encode_i64(-7);
        assert_eq!(i32_bytes.len(), 4);
        assert_eq!(i64_bytes.len(), 8);
        assert_eq!(decode_i32(&i32_bytes).unwrap(), -7);
        assert_eq!(decode_i64(&i64_bytes).unwrap(), -7);
    }

    #[test]
    fn double_round_trips() {
        let bytes = encode_f64(3.5);
        assert_eq!(decode_f64(&bytes).unwrap(), 3.5);
    }

    #[test]
    fn string_list_round_trips() {
        let values = vec!["a".to_string(), "bb".to_string(), "".to_string()];
        let bytes = encode_string_list(&values);
        assert_eq!(decode_string_list(&bytes).unwrap(), values);
    }

    #[test]
    fn integer_list_round_trips() {
        let values = vec![1, -2, 3];
        let bytes = encode_integer_list(&values);
        assert_eq!(decode_integer_list(&bytes).unwrap(), values);
    }

    #[test]
    fn truncated_message_is_rejected_not_panicking() {
        let msg = Message::new(Command::Get).with_key("a.b");
        let mut encoded = encode_message(&msg);
        encoded.truncate(encoded.len() - 1);
        assert!(decode_message(&encoded).is_err());
    }

    #[test]
    fn unknown_command_tag_is_rejected() {
        let bytes = vec![200u8, 0, 0, 0];
        assert!(matches!(
            decode_message(&bytes),
            Err(DecodeError::UnknownTag { field: "command", .. })
        ));
    }
}
