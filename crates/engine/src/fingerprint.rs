use sha2::{Digest, Sha256};

/// Canonical form used for re-encounter detection: lowercased, all
/// whitespace runs collapsed to single spaces, leading/trailing punctuation
/// trimmed.  Equal normalized text ⇒ equal fingerprint.
pub fn normalize(text: &str) -> String {
    let lowered = text.to_lowercase();
    let collapsed = lowered.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed
        .trim_matches(|c: char| c.is_ascii_punctuation() || c.is_whitespace())
        .to_string()
}

/// 16-character lowercase hex of the SHA-256 over the normalized text.
pub fn fingerprint(text: &str) -> String {
    let digest = Sha256::digest(normalize(text).as_bytes());
    let mut out = String::with_capacity(16);
    for byte in &digest[..8] {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shape_is_16_lowercase_hex() {
        let fp = fingerprint("Alice, Python & ML, NYC");
        assert_eq!(fp.len(), 16);
        assert!(fp.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn stable_under_case_and_whitespace() {
        let base = fingerprint("Alice, Python & ML, NYC");
        assert_eq!(fingerprint("alice, python & ml, nyc"), base);
        assert_eq!(fingerprint("  Alice,   Python & ML, NYC  "), base);
        assert_eq!(fingerprint("Alice,\n\nPython & ML,\nNYC"), base);
        assert_eq!(fingerprint("Alice, Python & ML, NYC\n\n\n"), base);
    }

    #[test]
    fn stable_under_edge_punctuation_only() {
        let base = fingerprint("Alice, Python & ML, NYC");
        // Trailing punctuation is trimmed; interior punctuation is content.
        assert_eq!(fingerprint("Alice, Python & ML, NYC."), base);
        assert_ne!(fingerprint("Alice Python & ML NYC"), base);
    }

    #[test]
    fn different_profiles_differ() {
        assert_ne!(
            fingerprint("Alice, Python & ML, NYC"),
            fingerprint("Bob, Go & infra, SF")
        );
    }

    #[test]
    fn normalize_empty_and_punctuation_only() {
        assert_eq!(normalize(""), "");
        assert_eq!(normalize("..."), "");
        assert_eq!(normalize("  ,  "), "");
    }
}
