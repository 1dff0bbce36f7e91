mod domain;
mod fingerprint;
mod local;
mod parser;
mod types;
mod wire;

pub use fingerprint::{FINGERPRINT_LEN, Fingerprint};
pub use types::{Address, MAX_ADDRESS_LEN, ParseError, ParseMode, PrefixTag};
pub use wire::WireError;

use std::str::FromStr;

use crate::mx::{MxCache, MxError};

impl Address {
    /// Parses `raw`, keeping sub-address tags.
    pub fn new(raw: &str) -> Result<Self, ParseError> {
        parser::parse(raw, ParseMode::Full)
    }

    /// Parses `raw`, validating but discarding tags; no tag is allocated.
    pub fn new_fast(raw: &str) -> Result<Self, ParseError> {
        parser::parse(raw, ParseMode::Fast)
    }

    pub fn parse(raw: &str, mode: ParseMode) -> Result<Self, ParseError> {
        parser::parse(raw, mode)
    }

    /// Binary form; see [`Address::decode`].
    pub fn encode(&self) -> Vec<u8> {
        wire::encode(self)
    }

    pub fn decode(data: &[u8]) -> Result<Self, WireError> {
        wire::decode(data)
    }

    /// Digest of login and domain.
    pub fn hash(&self) -> Fingerprint {
        fingerprint::digest(self, false)
    }

    /// Digest of login, domain and tags.
    pub fn hash_full(&self) -> Fingerprint {
        fingerprint::digest(self, true)
    }

    /// Whether the domain accepts mail, answered through `cache`.
    pub async fn has_mx(&self, cache: &MxCache) -> Result<(), MxError> {
        cache.check(&self.domain).await
    }
}

impl FromStr for Address {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}
