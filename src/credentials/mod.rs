//! Portal credentials and the persisted browser session.
//!
//! Storage of credentials belongs to the caller; this module only validates the
//! `(ruc, username, secret)` triple handed in and keeps the secret out of logs.

mod session;

pub use session::{CookieJar, StoredCookie};

use std::fmt;

use secrecy::{ExposeSecret, SecretString};

/// Environment variables the CLI reads the credential triple from.
pub const RUC_ENV: &str = "SUNAT_RUC";
pub const USER_ENV: &str = "SUNAT_USER";
pub const SECRET_ENV: &str = "SUNAT_PASS";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CredentialsError {
    #[error("RUC is required")]
    MissingRuc,
    #[error("RUC must be exactly 11 digits")]
    InvalidRuc,
    #[error("username is required")]
    MissingUsername,
    #[error("secret is required")]
    MissingSecret,
}

/// A verified credential triple for the portal's login form.
#[derive(Clone)]
pub struct PortalCredentials {
    ruc: String,
    username: String,
    secret: SecretString,
}

impl PortalCredentials {
    pub fn new(
        ruc: impl Into<String>,
        username: impl Into<String>,
        secret: SecretString,
    ) -> Result<Self, CredentialsError> {
        let ruc = ruc.into().trim().to_string();
        let username = username.into().trim().to_string();

        if ruc.is_empty() {
            return Err(CredentialsError::MissingRuc);
        }
        if !is_valid_ruc(&ruc) {
            return Err(CredentialsError::InvalidRuc);
        }
        if username.is_empty() {
            return Err(CredentialsError::MissingUsername);
        }
        if secret.expose_secret().is_empty() {
            return Err(CredentialsError::MissingSecret);
        }

        Ok(Self {
            ruc,
            username,
            secret,
        })
    }

    pub fn ruc(&self) -> &str {
        &self.ruc
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn secret(&self) -> &SecretString {
        &self.secret
    }
}

impl fmt::Debug for PortalCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PortalCredentials")
            .field("ruc", &self.ruc)
            .field("username", &self.username)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

/// A RUC (taxpayer number) is exactly eleven ASCII digits.
pub fn is_valid_ruc(ruc: &str) -> bool {
    ruc.len() == 11 && ruc.bytes().all(|b| b.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secret(s: &str) -> SecretString {
        SecretString::from(s.to_string())
    }

    #[test]
    fn accepts_valid_triple() {
        let creds = PortalCredentials::new(" 20123456789 ", "USUARIO1", secret("clave")).unwrap();
        assert_eq!(creds.ruc(), "20123456789");
        assert_eq!(creds.username(), "USUARIO1");
        assert_eq!(creds.secret().expose_secret(), "clave");
    }

    #[test]
    fn rejects_bad_ruc() {
        assert_eq!(
            PortalCredentials::new("", "u", secret("s")).unwrap_err(),
            CredentialsError::MissingRuc
        );
        assert_eq!(
            PortalCredentials::new("2012345678", "u", secret("s")).unwrap_err(),
            CredentialsError::InvalidRuc
        );
        assert_eq!(
            PortalCredentials::new("2012345678a", "u", secret("s")).unwrap_err(),
            CredentialsError::InvalidRuc
        );
    }

    #[test]
    fn rejects_missing_username_or_secret() {
        assert_eq!(
            PortalCredentials::new("20123456789", " ", secret("s")).unwrap_err(),
            CredentialsError::MissingUsername
        );
        assert_eq!(
            PortalCredentials::new("20123456789", "u", secret("")).unwrap_err(),
            CredentialsError::MissingSecret
        );
    }

    #[test]
    fn debug_redacts_secret() {
        let creds = PortalCredentials::new("20123456789", "u", secret("hunter2")).unwrap();
        let rendered = format!("{creds:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("REDACTED"));
    }
}
