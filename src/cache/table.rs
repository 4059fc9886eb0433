//! Cache eligibility rules.
//!
//! A [`CacheTable`] maps request paths to TTLs. An empty table caches every
//! path at the table default; otherwise the first matching rule wins and
//! unmatched paths are not cached. A rule TTL of zero means "table default".

use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use thiserror::Error;

/// Error raised when a rule pattern does not compile.
#[derive(Debug, Clone, Error)]
#[error("invalid cache rule '{pattern}': {source}")]
pub struct CacheTableError {
    pub pattern: String,
    #[source]
    pub source: regex::Error,
}

/// One entry of a cache table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheRule {
    pub path: String,
    pub is_regex: bool,
    pub ttl: Duration,
}

impl CacheRule {
    /// Match `path` exactly.
    pub fn literal(path: impl Into<String>, ttl: Duration) -> Self {
        Self {
            path: path.into(),
            is_regex: false,
            ttl,
        }
    }

    /// Match paths against a regular expression (unanchored).
    pub fn regex(pattern: impl Into<String>, ttl: Duration) -> Self {
        Self {
            path: pattern.into(),
            is_regex: true,
            ttl,
        }
    }
}

#[derive(Debug)]
enum Matcher {
    Literal(String),
    Pattern(Regex),
}

impl Matcher {
    fn compile(rule: &CacheRule) -> Result<Self, CacheTableError> {
        if !rule.is_regex {
            return Ok(Matcher::Literal(rule.path.clone()));
        }
        Regex::new(&rule.path)
            .map(Matcher::Pattern)
            .map_err(|source| CacheTableError {
                pattern: rule.path.clone(),
                source,
            })
    }

    fn matches(&self, path: &str) -> bool {
        match self {
            Matcher::Literal(literal) => literal == path,
            Matcher::Pattern(re) => re.is_match(path),
        }
    }
}

/// Ordered rule table with lazily compiled matchers.
#[derive(Debug)]
pub struct CacheTable {
    rules: Vec<CacheRule>,
    default_ttl: Duration,
    compiled: OnceLock<Result<Vec<Matcher>, CacheTableError>>,
}

impl CacheTable {
    pub fn new(rules: Vec<CacheRule>, default_ttl: Duration) -> Self {
        Self {
            rules,
            default_ttl,
            compiled: OnceLock::new(),
        }
    }

    /// A table that caches every path at `default_ttl`.
    pub fn cache_everything(default_ttl: Duration) -> Self {
        Self::new(Vec::new(), default_ttl)
    }

    pub fn rules(&self) -> &[CacheRule] {
        &self.rules
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Compile all patterns. Idempotent; later calls reuse the first result.
    pub fn compile(&self) -> Result<(), CacheTableError> {
        self.matchers().map(|_| ()).map_err(Clone::clone)
    }

    /// Returns the TTL to cache `path` with, or `None` if it is not eligible.
    pub fn should_cache(&self, path: &str) -> Option<Duration> {
        if self.rules.is_empty() {
            return Some(self.default_ttl);
        }

        let matchers = match self.matchers() {
            Ok(matchers) => matchers,
            Err(e) => {
                tracing::warn!(error = %e, "Cache table failed to compile, caching disabled");
                return None;
            }
        };

        self.rules
            .iter()
            .zip(matchers)
            .find(|(_, matcher)| matcher.matches(path))
            .map(|(rule, _)| {
                if rule.ttl.is_zero() {
                    self.default_ttl
                } else {
                    rule.ttl
                }
            })
    }

    fn matchers(&self) -> Result<&[Matcher], &CacheTableError> {
        self.compiled
            .get_or_init(|| self.rules.iter().map(Matcher::compile).collect())
            .as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEFAULT: Duration = Duration::from_secs(900);

    #[test]
    fn test_should_cache() {
        let table = CacheTable::new(
            vec![
                CacheRule::literal("/foo", Duration::ZERO),
                CacheRule::regex(r"/foo/[\d+]", Duration::ZERO),
            ],
            DEFAULT,
        );

        for (input, expected) in [
            ("/foo", Some(DEFAULT)),
            ("/foo/123", Some(DEFAULT)),
            ("/foo/bar", None),
            ("/bar", None),
        ] {
            assert_eq!(table.should_cache(input), expected, "{}", input);
        }
    }

    #[test]
    fn test_first_match_wins() {
        let table = CacheTable::new(
            vec![
                CacheRule::literal("/api/v3/calendar", Duration::from_secs(60)),
                CacheRule::regex("^/api/v3/", Duration::from_secs(5)),
            ],
            DEFAULT,
        );
        assert_eq!(
            table.should_cache("/api/v3/calendar"),
            Some(Duration::from_secs(60))
        );
        assert_eq!(
            table.should_cache("/api/v3/movie"),
            Some(Duration::from_secs(5))
        );
    }

    #[test]
    fn test_cache_everything() {
        let table = CacheTable::cache_everything(DEFAULT);
        assert_eq!(table.should_cache("/"), Some(DEFAULT));
        assert_eq!(table.should_cache("/anything/at/all"), Some(DEFAULT));
    }

    #[test]
    fn test_invalid_pattern() {
        let table = CacheTable::new(vec![CacheRule::regex(r"/foo/[\d+", Duration::ZERO)], DEFAULT);
        let err = table.compile().unwrap_err();
        assert_eq!(err.pattern, r"/foo/[\d+");
        assert!(table.compile().is_err());
        assert_eq!(table.should_cache("/foo"), None);
    }
}
