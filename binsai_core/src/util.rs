//! Small text helpers shared by the display and health output.

/// First `max` characters of `s` (never splits a char).
#[inline]
pub fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// "Y"/"N" flag used on the status screen.
#[inline]
pub const fn yn(flag: bool) -> char {
    if flag { 'Y' } else { 'N' }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_chars("BINSAI-A1B2C3 extra", 13), "BINSAI-A1B2C3");
        assert_eq!(truncate_chars("short", 16), "short");
        assert_eq!(truncate_chars("R₀ cal", 2), "R₀");
        assert_eq!(truncate_chars("", 3), "");
    }
}
