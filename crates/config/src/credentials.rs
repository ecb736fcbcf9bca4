//! Database credentials resolved from the environment

use crate::redacted::Redacted;

/// Environment variable holding the database user
pub const USER_ENV_VAR: &str = "PGSQL_USER";

/// Environment variable holding the database password
pub const PASSWORD_ENV_VAR: &str = "PGSQL_PASSWORD";

/// Already-resolved database credentials
#[derive(Debug, Clone)]
pub struct Credentials {
    pub user: String,
    pub password: Redacted<String>,
}

impl Credentials {
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            password: Redacted::from(password.into()),
        }
    }

    /// Reads [`USER_ENV_VAR`] and [`PASSWORD_ENV_VAR`] from the process environment.
    pub fn from_env() -> Result<Self, MissingEnvVar> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Resolves the credentials through `lookup`, failing on the first unset variable.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, MissingEnvVar> {
        let user = lookup(USER_ENV_VAR).ok_or(MissingEnvVar(USER_ENV_VAR))?;
        let password = lookup(PASSWORD_ENV_VAR).ok_or(MissingEnvVar(PASSWORD_ENV_VAR))?;
        Ok(Self::new(user, password))
    }
}

/// A required environment variable is not set
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("environment variable {0} is not set")]
pub struct MissingEnvVar(pub &'static str);
