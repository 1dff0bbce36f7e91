//! Login (local part) character rules.

const LOGIN_CHARS: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789!#$%&'*+/=?^_`{|}~-";

/// Byte-indexed membership table for login characters. Uppercase is absent:
/// the parser folds ASCII before anything reaches this table.
static LOGIN_TABLE: [bool; 256] = build_login_table();

const fn build_login_table() -> [bool; 256] {
    let mut table = [false; 256];
    let mut i = 0;
    while i < LOGIN_CHARS.len() {
        table[LOGIN_CHARS[i] as usize] = true;
        i += 1;
    }
    table
}

#[inline]
pub(crate) fn is_login_char(byte: u8) -> bool {
    LOGIN_TABLE[usize::from(byte)]
}

/// Dot-separated segments, each non-empty and made of login characters.
pub(crate) fn is_valid_login(s: &[u8]) -> bool {
    if s.is_empty() {
        return false;
    }
    s.split(|&b| b == b'.')
        .all(|segment| !segment.is_empty() && segment.iter().copied().all(is_login_char))
}

/// Tag text is part of the local part: login characters or `.`, no emptiness check here.
pub(crate) fn is_valid_tag_text(s: &[u8]) -> bool {
    s.iter().all(|&b| b == b'.' || is_login_char(b))
}
