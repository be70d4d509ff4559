use std::fmt;

/// Opaque wrapper for API credentials.
///
/// Keeps tokens out of `Debug` output and log lines; the raw value is only
/// reachable through [`Token::as_str`] when building request headers.
#[derive(Clone)]
pub struct Token(String);

impl Token {
    /// Returns the raw token value.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Token {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for Token {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Token(***)")
    }
}
