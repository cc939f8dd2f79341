pub mod string;

pub use string::SecretString;

use keyring::Entry;
use regex::Regex;
use sdk::errors::EngineError;
use std::sync::OnceLock;

/// Keychain service all Middag secrets are stored under
pub const SERVICE_NAME: &str = "middag";

/// Keychain key of the Discord bot token
pub const TOKEN_KEY: &str = "discord_token";

/// SecretManager handles the bot token and secret scrubbing.
///
/// The token is looked up in the environment first, then in the OS keychain:
/// - macOS: Keychain
/// - Windows: Credential Manager
/// - Linux: Secret Service (libsecret)
///
/// Nothing is prompted for implicitly; `middag token set` is the only
/// interactive path.
pub struct SecretManager {
    service_name: String,
}

/// Regex patterns for detecting credentials in text.
/// These are compiled once and reused for performance.
static SECRET_PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();

/// Initializes and returns the secret detection patterns.
///
/// Patterns match:
/// - Discord bot tokens: three dot-separated base64url segments
/// - Authorization headers: `Bot <token>` and `Bearer <token>`
fn get_secret_patterns() -> &'static Vec<Regex> {
    SECRET_PATTERNS.get_or_init(|| {
        [
            r"Bot\s+[^\s]{20,}",
            r"Bearer\s+[^\s]{20,}",
            r"[A-Za-z0-9_\-]{23,28}\.[A-Za-z0-9_\-]{6,7}\.[A-Za-z0-9_\-]{27,}",
        ]
        .iter()
        .filter_map(|pattern| Regex::new(pattern).ok())
        .collect()
    })
}

impl SecretManager {
    /// Creates a new SecretManager with the given service name.
    ///
    /// The service name is used to namespace secrets in the OS keychain.
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
        }
    }

    fn entry(&self, key: &str) -> Result<Entry, EngineError> {
        Entry::new(&self.service_name, key).map_err(|e| {
            EngineError::KeyringError(format!("Failed to create keyring entry: {}", e))
        })
    }

    /// Retrieves a secret from the OS keychain, `None` if absent.
    ///
    /// # Errors
    /// Returns `EngineError::KeyringError` if keychain access fails
    pub fn get_secret(&self, key: &str) -> Result<Option<SecretString>, EngineError> {
        match self.entry(key)?.get_password() {
            Ok(secret) => {
                tracing::debug!("Retrieved secret '{}' from keychain", key);
                Ok(Some(SecretString::new(secret)))
            }
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(EngineError::KeyringError(format!(
                "Failed to retrieve secret '{}': {}",
                key, e
            ))),
        }
    }

    /// Stores a secret in the OS keychain.
    ///
    /// # Errors
    /// Returns `EngineError::KeyringError` if keychain access fails
    pub fn set_secret(&self, key: &str, value: &str) -> Result<(), EngineError> {
        self.entry(key)?.set_password(value).map_err(|e| {
            EngineError::KeyringError(format!("Failed to store secret '{}': {}", key, e))
        })?;

        tracing::info!("Stored secret '{}' in keychain", key);
        Ok(())
    }

    /// Deletes a secret from the OS keychain.
    ///
    /// # Errors
    /// Returns `EngineError::KeyringError` if keychain access fails
    pub fn delete_secret(&self, key: &str) -> Result<(), EngineError> {
        self.entry(key)?.delete_password().map_err(|e| {
            EngineError::KeyringError(format!("Failed to delete secret '{}': {}", key, e))
        })?;

        tracing::info!("Deleted secret '{}' from keychain", key);
        Ok(())
    }

    /// Checks if a secret exists in the OS keychain.
    pub fn has_secret(&self, key: &str) -> bool {
        matches!(self.get_secret(key), Ok(Some(_)))
    }

    /// Resolve the bot token.
    ///
    /// The environment variable `env_var` wins when set and non-empty;
    /// otherwise the keychain entry [`TOKEN_KEY`] is used.
    ///
    /// # Errors
    /// Returns `EngineError::MissingSecret` when neither source has a token
    pub fn resolve_token(&self, env_var: &str) -> Result<SecretString, EngineError> {
        if let Some(token) = token_from_env(env_var) {
            tracing::debug!("Using bot token from ${}", env_var);
            return Ok(token);
        }

        match self.get_secret(TOKEN_KEY) {
            Ok(Some(token)) if !token.unsecure().trim().is_empty() => Ok(token),
            Ok(_) => Err(EngineError::MissingSecret(format!(
                "no bot token in ${} or the '{}' keychain entry",
                env_var, TOKEN_KEY
            ))),
            Err(e) => {
                tracing::warn!("Keychain lookup failed: {}", e);
                Err(EngineError::MissingSecret(format!(
                    "no bot token in ${} and the keychain is unavailable",
                    env_var
                )))
            }
        }
    }

    /// Prompts for a secret without echoing it.
    ///
    /// The prompt is written to stderr.
    ///
    /// # Errors
    /// Returns `EngineError::Io` if the terminal cannot be read, or
    /// `EngineError::MissingSecret` if the input is empty
    pub fn prompt_for_secret(&self, key: &str) -> Result<SecretString, EngineError> {
        let input = rpassword::prompt_password_stderr(&format!("Enter value for '{}': ", key))?;
        let secret = input.trim();

        if secret.is_empty() {
            return Err(EngineError::MissingSecret(format!(
                "'{}' cannot be empty",
                key
            )));
        }

        Ok(SecretString::new(secret))
    }

    /// Scrubs credentials from text by replacing them with [REDACTED].
    ///
    /// Use this on any text that may carry request details before it is
    /// logged.
    ///
    /// # Examples
    /// ```
    /// use middag_engine::secrets::SecretManager;
    ///
    /// let manager = SecretManager::new("test");
    /// let scrubbed = manager.scrub("Authorization: Bot abcdefghijklmnopqrstuvwxyz");
    /// assert_eq!(scrubbed, "Authorization: [REDACTED]");
    /// ```
    pub fn scrub(&self, text: &str) -> String {
        let patterns = get_secret_patterns();
        let mut result = text.to_string();

        for pattern in patterns {
            result = pattern.replace_all(&result, "[REDACTED]").to_string();
        }

        result
    }
}

impl Default for SecretManager {
    fn default() -> Self {
        Self::new(SERVICE_NAME)
    }
}

fn token_from_env(env_var: &str) -> Option<SecretString> {
    std::env::var(env_var)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .map(SecretString::new)
}
