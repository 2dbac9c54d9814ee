//! Portal login credentials.
//!
//! Loaded once from the OS keyring at process start, held only in
//! memory, best-effort zeroed when dropped. Never serialized, never
//! logged (`Debug` redacts the password).

use std::fmt;

use crate::error::ConfigError;
use crate::store::keyring_store;

const USERNAME_KEY: &str = "portal_username";
const PASSWORD_KEY: &str = "portal_password";

pub struct Credentials {
    pub username: String,
    password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Load both keyring entries, failing fast when either is missing.
    pub fn load() -> Result<Self, ConfigError> {
        let username = keyring_store::get(USERNAME_KEY)
            .map_err(|e| ConfigError::ParseFailed(e.to_string()))?
            .ok_or_else(|| ConfigError::MissingKey(USERNAME_KEY.into()))?;
        let password = keyring_store::get(PASSWORD_KEY)
            .map_err(|e| ConfigError::ParseFailed(e.to_string()))?
            .ok_or_else(|| ConfigError::MissingKey(PASSWORD_KEY.into()))?;
        Ok(Self { username, password })
    }

    /// Persist credentials to the OS keyring.
    pub fn store(username: &str, password: &str) -> Result<(), ConfigError> {
        keyring_store::set(USERNAME_KEY, username)
            .and_then(|_| keyring_store::set(PASSWORD_KEY, password))
            .map_err(|e| ConfigError::ParseFailed(e.to_string()))
    }

    /// Remove stored credentials from the OS keyring.
    pub fn clear() -> Result<(), ConfigError> {
        keyring_store::delete(USERNAME_KEY)
            .and_then(|_| keyring_store::delete(PASSWORD_KEY))
            .map_err(|e| ConfigError::ParseFailed(e.to_string()))
    }

    /// Whether both entries exist in the keyring.
    pub fn is_stored() -> bool {
        matches!(keyring_store::get(USERNAME_KEY), Ok(Some(_)))
            && matches!(keyring_store::get(PASSWORD_KEY), Ok(Some(_)))
    }

    pub fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl Drop for Credentials {
    fn drop(&mut self) {
        // Overwrite the secret bytes before the allocation is freed.
        let mut bytes = std::mem::take(&mut self.password).into_bytes();
        for byte in bytes.iter_mut() {
            *byte = 0;
        }
    }
}
