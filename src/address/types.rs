use std::fmt;

use thiserror::Error;

/// Longest accepted input, in bytes (RFC 5321 path limit minus the brackets).
pub const MAX_ADDRESS_LEN: usize = 254;

/// Whether sub-address tags are kept while parsing.
#[cfg_attr(feature = "with-serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParseMode {
    /// Tags are collected into [`Address::tags`].
    #[default]
    Full,
    /// Tags are validated and skipped without allocating.
    Fast,
}

/// A sub-addressing suffix such as `+news` in `bob+news@example.com`.
#[cfg_attr(feature = "with-serde", derive(serde::Serialize))]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PrefixTag {
    pub(crate) marker: u8,
    pub(crate) text: String,
}

impl PrefixTag {
    /// Separator bytes that open a tag.
    pub const MARKERS: [u8; 2] = [b'+', b'='];

    pub(crate) fn new(marker: u8, text: impl Into<String>) -> Self {
        Self {
            marker,
            text: text.into(),
        }
    }

    pub fn marker(&self) -> char {
        char::from(self.marker)
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub(crate) fn is_marker(byte: u8) -> bool {
        Self::MARKERS.contains(&byte)
    }
}

impl fmt::Display for PrefixTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.marker(), self.text)
    }
}

/// A validated, lowercased e-mail address.
///
/// Built by [`Address::new`], [`Address::new_fast`] or
/// [`Address::decode`](crate::Address::decode); there is no way to build
/// one that skips validation.
#[cfg_attr(feature = "with-serde", derive(serde::Serialize))]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address {
    pub(crate) login: String,
    pub(crate) domain: String,
    pub(crate) tags: Vec<PrefixTag>,
    #[cfg_attr(feature = "with-serde", serde(skip))]
    pub(crate) raw_len: usize,
}

impl Address {
    pub fn login(&self) -> &str {
        &self.login
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Tags in order of appearance. Always empty for [`ParseMode::Fast`].
    pub fn tags(&self) -> &[PrefixTag] {
        &self.tags
    }

    /// Byte length of the input this address was parsed from.
    pub fn raw_len(&self) -> usize {
        self.raw_len
    }

    /// `login@domain`, tags dropped.
    pub fn mail(&self) -> String {
        let mut out = String::with_capacity(self.login.len() + 1 + self.domain.len());
        out.push_str(&self.login);
        out.push('@');
        out.push_str(&self.domain);
        out
    }

    /// `login{tags}@domain`, the lowercased form of the original input.
    pub fn mail_full(&self) -> String {
        if self.tags.is_empty() {
            return self.mail();
        }
        let mut out = String::with_capacity(self.raw_len);
        out.push_str(&self.login);
        for tag in &self.tags {
            out.push(tag.marker());
            out.push_str(&tag.text);
        }
        out.push('@');
        out.push_str(&self.domain);
        out
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.login)?;
        for tag in &self.tags {
            write!(f, "{tag}")?;
        }
        write!(f, "@{}", self.domain)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("too many characters: {len} > 254")]
    TooLong { len: usize },
    #[error("empty email login")]
    EmptyLogin,
    #[error("invalid email login characters")]
    InvalidLoginChars,
    #[error("invalid email domain")]
    InvalidDomain,
    #[error("invalid email domain characters")]
    InvalidDomainChars,
    #[error("too many '@'")]
    MultipleAtSigns,
    #[error("input ends inside a tag")]
    UnterminatedTag,
    #[error("no '@' found")]
    NoAtSign,
    #[error("empty tag")]
    EmptyTag,
    #[error("internal fault while scanning")]
    InternalParseFault,
}
