use crate::core::{RecordError, Result};
use lru::LruCache;
use regex::{Regex, RegexBuilder};
use std::fmt;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

const REGEX_CACHE_SIZE: usize = 200;

/// Characters that make a pattern body more than a plain literal.
const REGEX_META: &[char] = &['\\', '.', '+', '*', '?', '(', ')', '|', '[', ']', '{', '}', '^', '$', '#', '&', '-', '~'];

lazy_static::lazy_static! {
    static ref REGEX_LRU_CACHE: Mutex<LruCache<String, Arc<Regex>>> =
        Mutex::new(LruCache::new(NonZeroUsize::new(REGEX_CACHE_SIZE).unwrap_or(NonZeroUsize::MIN)));
}

/// Where a pattern is pinned to the value being matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anchor {
    /// Matches anywhere in the value.
    None,
    /// `^...`: the value must start with the pattern.
    Start,
    /// `...$`: the value must end with the pattern.
    End,
    /// `^...$`: the whole value must match.
    Full,
}

impl Anchor {
    pub fn of(source: &str) -> Self {
        let start = source.starts_with('^');
        let end = source.ends_with('$') && !source.ends_with("\\$");
        match (start, end) {
            (true, true) => Self::Full,
            (true, false) => Self::Start,
            (false, true) => Self::End,
            (false, false) => Self::None,
        }
    }
}

/// A compiled regular-expression constraint on a field.
#[derive(Clone)]
pub struct Pattern {
    source: String,
    anchor: Anchor,
    case_insensitive: bool,
    /// Pattern body with the anchors stripped, when it is a plain literal.
    literal: Option<String>,
    regex: Arc<Regex>,
}

impl Pattern {
    /// Compile `source`, reusing a cached regex when the same pattern was
    /// seen recently. Invalid expressions fail with `InvalidFilter`.
    pub fn compile(source: &str, case_insensitive: bool) -> Result<Self> {
        let regex = get_or_compile_regex(source, case_insensitive)?;
        let anchor = Anchor::of(source);
        Ok(Self {
            source: source.to_string(),
            anchor,
            case_insensitive,
            literal: literal_body(source, anchor).map(str::to_string),
            regex,
        })
    }

    /// True when `text` starts with `^` or ends with an unescaped `$`.
    pub fn is_anchored(text: &str) -> bool {
        Anchor::of(text) != Anchor::None
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Plain literals are matched without the regex engine; ignoring case
    /// that way is only exact for ASCII text.
    pub fn is_match(&self, text: &str) -> bool {
        match &self.literal {
            Some(literal) if !self.case_insensitive => {
                match_literal(self.anchor, text.as_bytes(), literal.as_bytes(), false)
            }
            Some(literal) if text.is_ascii() && literal.is_ascii() => {
                match_literal(self.anchor, text.as_bytes(), literal.as_bytes(), true)
            }
            _ => self.regex.is_match(text),
        }
    }
}

fn literal_body(source: &str, anchor: Anchor) -> Option<&str> {
    let body = match anchor {
        Anchor::None => source,
        Anchor::Start => &source[1..],
        Anchor::End => &source[..source.len() - 1],
        Anchor::Full if source.len() >= 2 => &source[1..source.len() - 1],
        Anchor::Full => return None,
    };
    (!body.contains(REGEX_META)).then_some(body)
}

/// Regex-free match of a literal body, placed according to `anchor`.
fn match_literal(anchor: Anchor, text: &[u8], literal: &[u8], ignore_case: bool) -> bool {
    let same = |a: &[u8]| if ignore_case { a.eq_ignore_ascii_case(literal) } else { a == literal };
    let n = literal.len();
    if text.len() < n {
        return false;
    }
    match anchor {
        Anchor::Start => same(&text[..n]),
        Anchor::End => same(&text[text.len() - n..]),
        Anchor::Full => text.len() == n && same(text),
        Anchor::None => n == 0 || text.windows(n).any(same),
    }
}

impl fmt::Debug for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pattern")
            .field("source", &self.source)
            .field("anchor", &self.anchor)
            .field("case_insensitive", &self.case_insensitive)
            .finish()
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source && self.case_insensitive == other.case_insensitive
    }
}

fn get_or_compile_regex(pattern: &str, case_insensitive: bool) -> Result<Arc<Regex>> {
    let cache_key = if case_insensitive {
        format!("i:{}", pattern)
    } else {
        format!("s:{}", pattern)
    };

    {
        let mut cache = REGEX_LRU_CACHE.lock()?;
        if let Some(regex) = cache.get(&cache_key) {
            return Ok(Arc::clone(regex));
        }
    }

    let compiled = RegexBuilder::new(pattern)
        .case_insensitive(case_insensitive)
        .build()
        .map_err(|e| RecordError::InvalidFilter(format!("invalid pattern '{}': {}", pattern, e)))?;
    let compiled = Arc::new(compiled);

    REGEX_LRU_CACHE.lock()?.put(cache_key, Arc::clone(&compiled));

    Ok(compiled)
}
