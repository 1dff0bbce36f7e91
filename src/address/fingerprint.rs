use super::types::Address;

pub const FINGERPRINT_LEN: usize = 20;

/// Fixed-width content digest of an [`Address`].
pub type Fingerprint = [u8; FINGERPRINT_LEN];

pub(crate) fn digest(address: &Address, include_tags: bool) -> Fingerprint {
    let mut hasher = blake3::Hasher::new();
    hasher.update(address.login.as_bytes());
    hasher.update(b"@");
    hasher.update(address.domain.as_bytes());

    if include_tags {
        for tag in &address.tags {
            hasher.update(tag.text.as_bytes());
            hasher.update(&[tag.marker]);
        }
    }

    let mut out = [0u8; FINGERPRINT_LEN];
    hasher.finalize_xof().fill(&mut out);
    out
}
