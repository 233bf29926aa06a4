//! Glob-style resource-name matching used by access list `name` entries.
//!
//! Grounded on `original_source/src/main.cpp` (`Reflect::PatternMatch`):
//! regex metacharacters are escaped first, then `*` becomes "any run"
//! and `%` becomes "any single character", and the whole pattern is
//! anchored with `^…$`.

use regex::Regex;

use crate::error::CommonError;

const ESCAPE_CHARS: &str = "\\+.?^$-|/{}()[]";

pub fn pattern_match(pattern: &str, text: &str) -> Result<bool, CommonError> {
    let regex = compile(pattern)?;
    Ok(regex.is_match(text))
}

fn compile(pattern: &str) -> Result<Regex, CommonError> {
    let mut escaped = String::with_capacity(pattern.len() * 2);
    for ch in pattern.chars() {
        if ESCAPE_CHARS.contains(ch) {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    let translated = escaped.replace('*', ".*").replace('%', ".");
    let anchored = format!("^{translated}$");
    Regex::new(&anchored).map_err(|e| CommonError::InvalidPattern(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn star_matches_any_run() {
        assert!(pattern_match("ch*", "ch1").unwrap());
        assert!(pattern_match("ch*", "channel-7").unwrap());
        assert!(!pattern_match("ch*", "xch1").unwrap());
    }

    #[test]
    fn percent_matches_single_char() {
        assert!(pattern_match("ch%", "ch1").unwrap());
        assert!(!pattern_match("ch%", "ch12").unwrap());
    }

    #[test]
    fn literal_metacharacters_are_escaped() {
        assert!(pattern_match("a.b", "a.b").unwrap());
        assert!(!pattern_match("a.b", "axb").unwrap());
    }

    #[test]
    fn wildcard_matches_everything() {
        assert!(pattern_match("*", "anything-at-all").unwrap());
    }
}
