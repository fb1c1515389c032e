use crate::core::{Result, TtmError};
use lru::LruCache;
use regex::{Regex, RegexBuilder};
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

const PATTERN_CACHE_SIZE: usize = 200;

lazy_static::lazy_static! {
    static ref PATTERN_CACHE: Mutex<LruCache<String, Arc<Regex>>> = Mutex::new(LruCache::new(
        NonZeroUsize::new(PATTERN_CACHE_SIZE).unwrap_or(NonZeroUsize::MIN)
    ));
}

/// Translates a LIKE pattern into an anchored regex.
fn like_to_regex(pattern: &str) -> String {
    let mut regex = String::with_capacity(pattern.len() + 2);
    regex.push('^');

    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        match c {
            '%' => regex.push_str(".*"),
            '_' => regex.push('.'),
            '\\' => match chars.next() {
                Some(escaped) => regex.push_str(&regex::escape(&escaped.to_string())),
                None => regex.push_str(r"\\"),
            },
            c => regex.push_str(&regex::escape(&c.to_string())),
        }
    }

    regex.push('$');
    regex
}

/// Answers the wildcard shapes that need no regex.
fn fast_path(text: &str, pattern: &str) -> Option<bool> {
    if pattern.contains('_') || pattern.contains('\\') {
        return None;
    }
    let wildcards = pattern.matches('%').count();
    match wildcards {
        0 => Some(text == pattern),
        1 if pattern.ends_with('%') => Some(text.starts_with(&pattern[..pattern.len() - 1])),
        1 if pattern.starts_with('%') => Some(text.ends_with(&pattern[1..])),
        2 if pattern.len() >= 2 && pattern.starts_with('%') && pattern.ends_with('%') => {
            Some(text.contains(&pattern[1..pattern.len() - 1]))
        }
        _ => None,
    }
}

fn compiled(pattern: &str, case_sensitive: bool) -> Result<Arc<Regex>> {
    let key = format!("{}:{pattern}", if case_sensitive { 's' } else { 'i' });

    if let Some(regex) = PATTERN_CACHE.lock()?.get(&key) {
        return Ok(Arc::clone(regex));
    }

    let regex = RegexBuilder::new(&like_to_regex(pattern))
        .case_insensitive(!case_sensitive)
        .build()
        .map_err(|e| TtmError::argument(format!("Invalid LIKE pattern: {e}")))?;
    let regex = Arc::new(regex);

    PATTERN_CACHE.lock()?.put(key, Arc::clone(&regex));
    Ok(regex)
}

/// Evaluates `text LIKE pattern`.
pub fn matches_like(text: &str, pattern: &str, case_sensitive: bool) -> Result<bool> {
    if case_sensitive {
        if let Some(result) = fast_path(text, pattern) {
            return Ok(result);
        }
    }
    Ok(compiled(pattern, case_sensitive)?.is_match(text))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcards_match_like_sql() {
        assert!(matches_like("widget", "wid%", true).unwrap());
        assert!(matches_like("widget", "%get", true).unwrap());
        assert!(matches_like("widget", "%dge%", true).unwrap());
        assert!(matches_like("widget", "w_dget", true).unwrap());
        assert!(!matches_like("widget", "gadget", true).unwrap());
    }

    #[test]
    fn regex_metacharacters_are_literal() {
        assert!(matches_like("a.b(c)", "a.b(%", true).unwrap());
        assert!(!matches_like("axb(c)", "a.b(%", true).unwrap());
        assert!(matches_like("100%", r"100\%", true).unwrap());
    }

    #[test]
    fn case_insensitive_uses_regex() {
        assert!(matches_like("WIDGET", "wid%", false).unwrap());
        assert!(!matches_like("WIDGET", "wid%", true).unwrap());
    }
}
