#![forbid(unsafe_code)]
//! puremail: single-pass e-mail address parsing and a sharded MX reachability cache.

pub mod address;
pub use address::{
    Address, FINGERPRINT_LEN, Fingerprint, MAX_ADDRESS_LEN, ParseError, ParseMode, PrefixTag,
    WireError,
};

pub mod mx;
pub use mx::{
    ConfigError, LookupMx, MxCache, MxCacheOptions, MxError, MxRecord, MxStatus, SweepStats,
    check_mx,
};
