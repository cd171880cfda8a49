use std::fmt;
use std::sync::Arc;

/// Per-call token embedded in every tuple of one serialization.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Nonce(String);

impl Nonce {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Nonce {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Produces a fresh nonce for each top-level call.
#[derive(Clone, Default)]
pub enum NonceSource {
    /// A random UUID v4 per call.
    #[default]
    Random,
    Custom(Arc<dyn Fn() -> String + Send + Sync>),
}

impl NonceSource {
    pub fn generate(&self) -> Nonce {
        match self {
            NonceSource::Random => Nonce(uuid::Uuid::new_v4().to_string()),
            NonceSource::Custom(generate) => Nonce(generate()),
        }
    }
}

impl fmt::Debug for NonceSource {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            NonceSource::Random => f.write_str("Random"),
            NonceSource::Custom(_) => f.write_str("Custom"),
        }
    }
}
