//! Compact binary form of an [`Address`].
//!
//! ```text
//! [login len][login][domain len][domain]{[marker][tag len][tag]}*[crc32 LE]
//! ```
//!
//! Lengths are single bytes; the trailer is the CRC-32 (IEEE) of every
//! preceding byte.

use thiserror::Error;

use super::domain::is_valid_domain;
use super::local::{is_valid_login, is_valid_tag_text};
use super::types::{Address, MAX_ADDRESS_LEN, PrefixTag};

const CRC_LEN: usize = 4;
/// Two length bytes, one byte each of login and domain, and the checksum.
const MIN_PAYLOAD_LEN: usize = 2 + CRC_LEN;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WireError {
    #[error("payload is too short: {len} bytes")]
    TooShort { len: usize },
    #[error("CRC-32 mismatch: expected {expected:#010x}, computed {actual:#010x}")]
    ChecksumMismatch { expected: u32, actual: u32 },
    #[error("{field} length runs past the end of the payload")]
    Truncated { field: &'static str },
    #[error("malformed payload: {reason}")]
    Malformed { reason: &'static str },
}

pub(crate) fn encode(address: &Address) -> Vec<u8> {
    let tag_bytes: usize = address.tags.iter().map(|t| 2 + t.text.len()).sum();
    let mut out = Vec::with_capacity(
        2 + address.login.len() + address.domain.len() + tag_bytes + CRC_LEN,
    );

    push_field(&mut out, address.login.as_bytes());
    push_field(&mut out, address.domain.as_bytes());
    for tag in &address.tags {
        out.push(tag.marker);
        push_field(&mut out, tag.text.as_bytes());
    }

    let crc = crc32fast::hash(&out);
    out.extend_from_slice(&crc.to_le_bytes());
    out
}

fn push_field(out: &mut Vec<u8>, bytes: &[u8]) {
    // every field of a valid Address is shorter than MAX_ADDRESS_LEN
    debug_assert!(bytes.len() <= usize::from(u8::MAX));
    out.push(bytes.len() as u8);
    out.extend_from_slice(bytes);
}

struct Reader<'a> {
    body: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn is_empty(&self) -> bool {
        self.pos >= self.body.len()
    }

    fn byte(&mut self, field: &'static str) -> Result<u8, WireError> {
        let byte = *self
            .body
            .get(self.pos)
            .ok_or(WireError::Truncated { field })?;
        self.pos += 1;
        Ok(byte)
    }

    /// A length-prefixed, non-empty field.
    fn field(&mut self, field: &'static str) -> Result<&'a [u8], WireError> {
        let len = usize::from(self.byte(field)?);
        if len == 0 {
            return Err(WireError::Malformed {
                reason: "zero-length field",
            });
        }
        let end = self.pos + len;
        let bytes = self
            .body
            .get(self.pos..end)
            .ok_or(WireError::Truncated { field })?;
        self.pos = end;
        Ok(bytes)
    }
}

/// The login and tag text are cut on separators when parsing, so neither
/// can contain one.
fn has_separator(bytes: &[u8]) -> bool {
    bytes.iter().copied().any(PrefixTag::is_marker)
}

fn ascii(bytes: &[u8]) -> Result<String, WireError> {
    std::str::from_utf8(bytes)
        .map(str::to_owned)
        .map_err(|_| WireError::Malformed {
            reason: "non-ASCII field",
        })
}

pub(crate) fn decode(data: &[u8]) -> Result<Address, WireError> {
    if data.len() < MIN_PAYLOAD_LEN {
        return Err(WireError::TooShort { len: data.len() });
    }

    let (body, trailer) = data.split_at(data.len() - CRC_LEN);
    let mut crc = [0u8; CRC_LEN];
    crc.copy_from_slice(trailer);
    let expected = u32::from_le_bytes(crc);
    let actual = crc32fast::hash(body);
    if expected != actual {
        return Err(WireError::ChecksumMismatch { expected, actual });
    }

    let mut reader = Reader { body, pos: 0 };
    let login = reader.field("login")?;
    if !is_valid_login(login) {
        return Err(WireError::Malformed {
            reason: "invalid login",
        });
    }
    if has_separator(login) {
        return Err(WireError::Malformed {
            reason: "tag separator in login",
        });
    }
    let domain = reader.field("domain")?;
    if !is_valid_domain(domain) {
        return Err(WireError::Malformed {
            reason: "invalid domain",
        });
    }

    let mut raw_len = login.len() + 1 + domain.len();
    let mut tags = Vec::new();
    while !reader.is_empty() {
        let marker = reader.byte("tag marker")?;
        if !PrefixTag::is_marker(marker) {
            return Err(WireError::Malformed {
                reason: "unknown tag marker",
            });
        }
        let text = reader.field("tag")?;
        if !is_valid_tag_text(text) {
            return Err(WireError::Malformed {
                reason: "invalid tag text",
            });
        }
        if has_separator(text) {
            return Err(WireError::Malformed {
                reason: "tag separator in tag text",
            });
        }
        raw_len += 1 + text.len();
        tags.push(PrefixTag::new(marker, ascii(text)?));
    }

    if raw_len > MAX_ADDRESS_LEN {
        return Err(WireError::Malformed {
            reason: "address longer than 254 bytes",
        });
    }

    Ok(Address {
        login: ascii(login)?,
        domain: ascii(domain)?,
        tags,
        raw_len,
    })
}
