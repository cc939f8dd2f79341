use std::fmt;

/// A bot token or other credential that must never reach a log line.
///
/// `Debug` and `Display` always print `[REDACTED]`. The raw value is only
/// reachable through [`SecretString::unsecure`] or the ready-made
/// authorization header.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretString(String);

impl SecretString {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Access the raw underlying string
    pub fn unsecure(&self) -> &str {
        &self.0
    }

    /// `Authorization` header value for a Discord bot
    pub fn bot_authorization(&self) -> String {
        format!("Bot {}", self.0)
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretString([REDACTED])")
    }
}

impl fmt::Display for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl From<String> for SecretString {
    fn from(s: String) -> Self {
        Self(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_never_printed() {
        let token = SecretString::new("abc.def.ghi");
        assert_eq!(format!("{}", token), "[REDACTED]");
        assert_eq!(format!("{:?}", token), "SecretString([REDACTED])");
        assert_eq!(token.bot_authorization(), "Bot abc.def.ghi");
    }
}
