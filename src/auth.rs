use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::{AuthConfig, Config};

/// A way to log into a Plex account
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    Token(String),
    Password {
        username: String,
        password: String,
        /// Two-factor verification code, if the account needs one
        verification_code: Option<String>,
    },
}

impl Credentials {
    pub fn password(username: impl Into<String>, password: impl Into<String>) -> Self {
        Credentials::Password {
            username: username.into(),
            password: password.into(),
            verification_code: None,
        }
    }

    /// Same credentials with a two-factor code attached
    pub fn with_verification_code(self, code: impl Into<String>) -> Self {
        match self {
            Credentials::Password {
                username, password, ..
            } => Credentials::Password {
                username,
                password,
                verification_code: Some(code.into()),
            },
            token => token,
        }
    }
}

// Never print secrets
impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credentials::Token(_) => write!(f, "Credentials::Token(***)"),
            Credentials::Password { username, .. } => {
                write!(f, "Credentials::Password({}, ***)", username)
            }
        }
    }
}

/// Token remembered from an earlier login
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedCredentials {
    pub token: String,
    pub username: Option<String>,
}

/// JSON file holding [`SavedCredentials`]
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    const FILE_NAME: &'static str = "credentials.json";

    /// Store next to the config file
    pub fn open_default() -> Result<Self> {
        Ok(Self::at(Config::config_dir()?.join(Self::FILE_NAME)))
    }

    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `None` if nothing was saved yet
    pub fn load(&self) -> Result<Option<SavedCredentials>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let contents = fs::read_to_string(&self.path)?;
        let creds: SavedCredentials = serde_json::from_str(&contents)
            .map_err(|e| anyhow!("Corrupt credentials file {}: {}", self.path.display(), e))?;
        Ok(Some(creds))
    }

    pub fn save(&self, creds: &SavedCredentials) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(creds)?;
        fs::write(&self.path, contents)?;
        Ok(())
    }

    /// Forget a token the server no longer accepts
    pub fn clear(&self) -> Result<()> {
        if self.path.exists() {
            fs::remove_file(&self.path)?;
        }
        Ok(())
    }
}

/// Credentials to try before asking the user, in order
pub fn stored_credentials(auth: &AuthConfig, saved: Option<&SavedCredentials>) -> Vec<Credentials> {
    let mut attempts = Vec::new();

    if let Some(token) = auth.token.as_deref().filter(|t| !t.is_empty()) {
        attempts.push(Credentials::Token(token.to_string()));
    }

    if let Some(saved) = saved {
        let duplicate = attempts
            .iter()
            .any(|c| matches!(c, Credentials::Token(t) if *t == saved.token));
        if !duplicate {
            attempts.push(Credentials::Token(saved.token.clone()));
        }
    }

    if let (Some(username), Some(password)) = (&auth.username, &auth.password) {
        attempts.push(Credentials::password(username.clone(), password.clone()));
    }

    attempts
}
