// src/bot/normalize.rs - Text canonicalization for banned-word matching

/// Canonicalize raw message text for matching.
///
/// Lower-cases, strips everything that is not a word character or
/// whitespace, drops the whitespace, and collapses runs of identical
/// consecutive characters. Defeats trivial evasion such as "Kkkiiirrr!!"
/// or "k i r" while keeping the match a plain substring test.
///
/// The result is a fixed point: `normalize(normalize(s)) == normalize(s)`.
pub fn normalize(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut prev: Option<char> = None;

    for c in raw.chars().flat_map(char::to_lowercase) {
        if c.is_whitespace() {
            continue;
        }
        if !(c.is_alphanumeric() || c == '_') {
            continue;
        }
        if prev != Some(c) {
            out.push(c);
        }
        prev = Some(c);
    }

    out
}
