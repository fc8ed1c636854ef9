//! Pattern/Exclusion Service: glob and `regex:`-prefixed patterns, compiled lazily
//! and memoized in a bounded LRU so repeated names don't recompile the same regex.

use lru::LruCache;
use regex::Regex;
use std::num::NonZeroUsize;
use std::sync::Mutex;

use crate::config::PATTERN_CACHE_MIN_CAPACITY;

/// Holds the configured exclude patterns and a compiled-regex cache shared across lookups.
pub struct PatternService {
    patterns: Vec<String>,
    cache: Mutex<LruCache<String, Regex>>,
}

impl PatternService {
    pub fn new(patterns: Vec<String>) -> Self {
        let capacity = patterns.len().max(PATTERN_CACHE_MIN_CAPACITY);
        Self {
            patterns,
            cache: Mutex::new(LruCache::new(NonZeroUsize::new(capacity).unwrap())),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// True if `name` (the file/dir's own name) or `full_path` matches any configured pattern.
    pub fn is_excluded(&self, name: &str, full_path: &str) -> bool {
        self.patterns
            .iter()
            .any(|p| self.matches(p, name) || self.matches(p, full_path))
    }

    fn matches(&self, pattern: &str, text: &str) -> bool {
        let mut cache = self.cache.lock().unwrap();
        if let Some(re) = cache.get(pattern) {
            return re.is_match(text);
        }
        let re = compile_pattern(pattern);
        let hit = re.is_match(text);
        cache.put(pattern.to_string(), re);
        hit
    }
}

/// Compile one pattern into a `Regex`. Patterns prefixed `regex:` are used verbatim
/// (prefix stripped); everything else is treated as a glob (`*`, `?`) and translated.
fn compile_pattern(pattern: &str) -> Regex {
    let pattern = pattern.strip_prefix('!').unwrap_or(pattern);
    if let Some(raw) = pattern.strip_prefix("regex:") {
        return Regex::new(raw).unwrap_or_else(|_| never_matches());
    }
    let translated = glob_to_regex(pattern);
    Regex::new(&translated).unwrap_or_else(|_| never_matches())
}

/// A regex that matches nothing; used when a pattern fails to compile rather than
/// treating a malformed exclude as "exclude everything". `regex` has no lookaround,
/// so this relies on `[^\s\S]` requiring a character that cannot exist.
fn never_matches() -> Regex {
    Regex::new(r"^[^\s\S]$").expect("static never-matching pattern is valid regex")
}

fn glob_to_regex(glob: &str) -> String {
    let mut out = String::from("^");
    for c in glob.chars() {
        match c {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            '.' | '+' | '(' | ')' | '|' | '[' | ']' | '{' | '}' | '^' | '$' | '\\' => {
                out.push('\\');
                out.push(c);
            }
            other => out.push(other),
        }
    }
    out.push('$');
    out
}
