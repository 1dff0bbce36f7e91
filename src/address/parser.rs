use std::panic;

use super::domain::is_valid_domain;
use super::local::{is_valid_login, is_valid_tag_text};
use super::types::{Address, MAX_ADDRESS_LEN, ParseError, ParseMode, PrefixTag};

/// Fixed-capacity segment buffer. Inputs longer than its capacity are
/// rejected before scanning, so `push` failing means a scanner bug.
struct ScanBuffer {
    bytes: [u8; MAX_ADDRESS_LEN],
    len: usize,
}

impl ScanBuffer {
    fn new() -> Self {
        Self {
            bytes: [0; MAX_ADDRESS_LEN],
            len: 0,
        }
    }

    fn push(&mut self, byte: u8) -> Result<(), ParseError> {
        let slot = self
            .bytes
            .get_mut(self.len)
            .ok_or(ParseError::InternalParseFault)?;
        *slot = byte;
        self.len += 1;
        Ok(())
    }

    fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len]
    }

    fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn clear(&mut self) {
        self.len = 0;
    }

    /// Segments are cut on ASCII bytes only, so they stay valid UTF-8.
    fn take_string(&mut self) -> Result<String, ParseError> {
        let text = std::str::from_utf8(self.as_bytes())
            .map_err(|_| ParseError::InternalParseFault)?
            .to_owned();
        self.clear();
        Ok(text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    ScanningLogin,
    /// After `@`.
    ScanningDomainOrTag,
    /// After a tag separator.
    ScanningTagOrDomain,
}

struct Scanner {
    mode: ParseMode,
    state: State,
    buf: ScanBuffer,
    login: Option<String>,
    pending_tag: Option<u8>,
    at_seen: bool,
    tags: Vec<PrefixTag>,
}

impl Scanner {
    fn new(mode: ParseMode) -> Self {
        Self {
            mode,
            state: State::ScanningLogin,
            buf: ScanBuffer::new(),
            login: None,
            pending_tag: None,
            at_seen: false,
            tags: Vec::new(),
        }
    }

    fn feed(&mut self, byte: u8) -> Result<(), ParseError> {
        match byte {
            b'@' => self.on_at(),
            b if PrefixTag::is_marker(b) => self.on_separator(b),
            b => self.buf.push(b),
        }
    }

    fn on_at(&mut self) -> Result<(), ParseError> {
        if self.at_seen {
            return Err(ParseError::MultipleAtSigns);
        }
        match self.pending_tag.take() {
            Some(marker) => self.close_tag(marker)?,
            None => self.close_login()?,
        }
        self.at_seen = true;
        self.state = State::ScanningDomainOrTag;
        Ok(())
    }

    fn on_separator(&mut self, marker: u8) -> Result<(), ParseError> {
        if self.at_seen {
            // a separator in the domain can only end in UnterminatedTag
            self.buf.clear();
        } else {
            match self.pending_tag.take() {
                Some(previous) => self.close_tag(previous)?,
                None => self.close_login()?,
            }
            self.pending_tag = Some(marker);
        }
        self.state = State::ScanningTagOrDomain;
        Ok(())
    }

    fn close_login(&mut self) -> Result<(), ParseError> {
        if self.buf.is_empty() {
            return Err(ParseError::EmptyLogin);
        }
        if !is_valid_login(self.buf.as_bytes()) {
            return Err(ParseError::InvalidLoginChars);
        }
        self.login = Some(self.buf.take_string()?);
        Ok(())
    }

    fn close_tag(&mut self, marker: u8) -> Result<(), ParseError> {
        if self.buf.is_empty() {
            return Err(ParseError::EmptyTag);
        }
        if !is_valid_tag_text(self.buf.as_bytes()) {
            return Err(ParseError::InvalidLoginChars);
        }
        match self.mode {
            ParseMode::Full => {
                let text = self.buf.take_string()?;
                self.tags.push(PrefixTag::new(marker, text));
            }
            ParseMode::Fast => self.buf.clear(),
        }
        Ok(())
    }

    fn finish(mut self, raw_len: usize) -> Result<Address, ParseError> {
        match self.state {
            State::ScanningLogin => Err(ParseError::NoAtSign),
            State::ScanningTagOrDomain => Err(ParseError::UnterminatedTag),
            State::ScanningDomainOrTag => {
                if self.buf.is_empty() {
                    return Err(ParseError::InvalidDomain);
                }
                if !is_valid_domain(self.buf.as_bytes()) {
                    return Err(ParseError::InvalidDomainChars);
                }
                let domain = self.buf.take_string()?;
                let login = self.login.ok_or(ParseError::InternalParseFault)?;
                Ok(Address {
                    login,
                    domain,
                    tags: self.tags,
                    raw_len,
                })
            }
        }
    }
}

fn scan(raw: &str, mode: ParseMode) -> Result<Address, ParseError> {
    let mut scanner = Scanner::new(mode);
    for &byte in raw.as_bytes() {
        scanner.feed(byte.to_ascii_lowercase())?;
    }
    scanner.finish(raw.len())
}

/// Single-pass parse of `raw`. Length is checked before any scanning, and a
/// panic inside the scan surfaces as [`ParseError::InternalParseFault`].
pub(crate) fn parse(raw: &str, mode: ParseMode) -> Result<Address, ParseError> {
    if raw.len() > MAX_ADDRESS_LEN {
        return Err(ParseError::TooLong { len: raw.len() });
    }
    panic::catch_unwind(|| scan(raw, mode)).unwrap_or(Err(ParseError::InternalParseFault))
}
