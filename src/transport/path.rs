//! Path normalization for metric labels.
//!
//! Request paths carry entity ids (`/api/v3/movie/42`). Using them raw as a
//! label value would create one series per entity, so paths are collapsed to
//! a stable template before they are recorded.

/// Collapses variable path segments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathNormalizer {
    prefixes: Vec<String>,
}

impl PathNormalizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collapse every path below `prefix` to `prefix` itself.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefixes.push(prefix.into());
        self
    }

    pub fn prefixes(&self) -> &[String] {
        &self.prefixes
    }

    /// Normalize `path`.
    ///
    /// Configured prefixes are tried first. Otherwise trailing all-digit
    /// segments are stripped, keeping at least one leading segment.
    pub fn normalize(&self, path: &str) -> String {
        if let Some(prefix) = self
            .prefixes
            .iter()
            .find(|prefix| is_below(path, prefix))
        {
            return prefix.clone();
        }

        let mut path = path;
        while let Some((head, tail)) = path.rsplit_once('/') {
            if head.is_empty() || tail.is_empty() || !tail.bytes().all(|b| b.is_ascii_digit()) {
                break;
            }
            path = head;
        }
        path.to_string()
    }
}

fn is_below(path: &str, prefix: &str) -> bool {
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/') || prefix.ends_with('/'),
        None => false,
    }
}
