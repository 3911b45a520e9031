/// 32-byte digest of `input`, used to seed `StdRng` from a settings string.
pub fn u8s_from_str(input: &str) -> [u8; 32] {
    blake3::hash(input.as_bytes()).into()
}

/// Digest of `parts` joined with `:`.
pub fn u8s_from_parts(parts: &[&str]) -> [u8; 32] {
    u8s_from_str(&parts.join(":"))
}
