//! Access token resolution.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

// ============================================================================
// AccessToken
// ============================================================================

/// Access token for the remote aggregator.
///
/// Either a fixed value or a supplier evaluated on every request. Resolved
/// values are never cached.
#[derive(Clone)]
pub enum AccessToken {
    /// Fixed token.
    Static(String),
    /// Supplier called on each resolution.
    Provider(Arc<dyn Fn() -> String + Send + Sync>),
}

impl AccessToken {
    /// Creates a token backed by a supplier function.
    #[inline]
    #[must_use]
    pub fn from_fn<F>(supplier: F) -> Self
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        Self::Provider(Arc::new(supplier))
    }

    /// Returns the current token value.
    #[inline]
    #[must_use]
    pub fn resolve(&self) -> String {
        match self {
            Self::Static(token) => token.clone(),
            Self::Provider(supplier) => supplier(),
        }
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static(_) => f.write_str("AccessToken::Static(..)"),
            Self::Provider(_) => f.write_str("AccessToken::Provider(..)"),
        }
    }
}

impl From<String> for AccessToken {
    #[inline]
    fn from(token: String) -> Self {
        Self::Static(token)
    }
}

impl From<&str> for AccessToken {
    #[inline]
    fn from(token: &str) -> Self {
        Self::Static(token.to_string())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_static_resolves_value() {
        let token = AccessToken::from("abc");
        assert_eq!(token.resolve(), "abc");
    }

    #[test]
    fn test_provider_is_evaluated_every_time() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let token = AccessToken::from_fn(move || {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            format!("token-{n}")
        });

        assert_eq!(token.resolve(), "token-0");
        assert_eq!(token.resolve(), "token-1");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_debug_hides_secret() {
        let token = AccessToken::from("secret");
        assert!(!format!("{token:?}").contains("secret"));
    }
}
