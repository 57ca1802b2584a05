//! 12-byte object identifier with a lowercase 24-character hex string form.

use std::fmt;

use crate::error::EjsonError;

/// Byte width of an [`ObjectId`]; also the fixed column width used by the
/// packed batch encoding.
pub const OBJECT_ID_LEN: usize = 12;

/// A 12-byte identifier. The canonical text form is 24 lowercase hex chars.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectId([u8; OBJECT_ID_LEN]);

impl ObjectId {
    /// Build an id from exactly 12 raw bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, EjsonError> {
        if bytes.len() != OBJECT_ID_LEN {
            return Err(EjsonError::InvalidObjectId(format!(
                "expected {OBJECT_ID_LEN} bytes, got {}",
                bytes.len()
            )));
        }
        let mut buf = [0u8; OBJECT_ID_LEN];
        buf.copy_from_slice(bytes);
        Ok(Self(buf))
    }

    /// Build an id from its 24-character hex form.
    pub fn from_hex(hex: &str) -> Result<Self, EjsonError> {
        if !Self::is_valid_hex(hex) {
            return Err(EjsonError::InvalidObjectId(hex.to_owned()));
        }
        let bytes =
            from_hex(hex).ok_or_else(|| EjsonError::InvalidObjectId(hex.to_owned()))?;
        Self::from_bytes(&bytes)
    }

    /// True iff `s` is a well-formed 24-character hex id string.
    pub fn is_valid_hex(s: &str) -> bool {
        s.len() == OBJECT_ID_LEN * 2 && s.bytes().all(|b| b.is_ascii_hexdigit())
    }

    /// Canonical lowercase hex form.
    pub fn to_hex(&self) -> String {
        to_hex(&self.0)
    }

    pub fn as_bytes(&self) -> &[u8; OBJECT_ID_LEN] {
        &self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Lowercase hex encoding of an arbitrary byte buffer.
pub(crate) fn to_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push_str(&format!("{b:02x}"));
    }
    out
}

/// Decode a hex string into bytes; `None` on odd length or non-hex chars.
pub(crate) fn from_hex(hex: &str) -> Option<Vec<u8>> {
    if hex.len() % 2 != 0 {
        return None;
    }
    let mut out = Vec::with_capacity(hex.len() / 2);
    for chunk in hex.as_bytes().chunks(2) {
        let pair = std::str::from_utf8(chunk).ok()?;
        out.push(u8::from_str_radix(pair, 16).ok()?);
    }
    Some(out)
}
