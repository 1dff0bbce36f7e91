const MAX_LABEL_LEN: usize = 63;
const PUNYCODE_PREFIX: &[u8] = b"xn--";

#[inline]
fn is_alnum(b: u8) -> bool {
    b.is_ascii_lowercase() || b.is_ascii_digit()
}

#[inline]
fn is_label_char(b: u8) -> bool {
    is_alnum(b) || b == b'-'
}

/// One DNS label, already lowercased.
///
/// `xn--` labels only need `[a-z0-9-]` after the prefix; every other label
/// must also start and end with an alphanumeric.
pub(crate) fn is_valid_label(label: &[u8]) -> bool {
    if label.is_empty() || label.len() > MAX_LABEL_LEN {
        return false;
    }

    if let Some(rest) = label.strip_prefix(PUNYCODE_PREFIX) {
        if !rest.is_empty() {
            return rest.iter().copied().all(is_label_char);
        }
    }

    let (first, last) = (label[0], label[label.len() - 1]);
    if !is_alnum(first) || !is_alnum(last) {
        return false;
    }
    label.iter().copied().all(is_label_char)
}

pub(crate) fn is_valid_domain(domain: &[u8]) -> bool {
    !domain.is_empty() && domain.split(|&b| b == b'.').all(is_valid_label)
}
