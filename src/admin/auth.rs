//! Admin password check.

/// Compare an offered password with the configured one without
/// short-circuiting on the first differing byte.
pub fn password_matches(offered: &str, expected: &str) -> bool {
    let (offered, expected) = (offered.as_bytes(), expected.as_bytes());
    let mut diff = offered.len() ^ expected.len();
    for (i, &byte) in expected.iter().enumerate() {
        let other = offered.get(i).copied().unwrap_or(0);
        diff |= usize::from(byte ^ other);
    }
    diff == 0
}
