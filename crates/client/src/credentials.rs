use thiserror::Error;

use crate::api_client::UserToken;
use crate::config::ServerConfig;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CredentialError {
    #[error("{var} must be a single bearer token without whitespace")]
    InvalidToken { var: String },
}

/// Acquire the long-lived user credential from the environment.
///
/// The variable named by `server.token_env` holds the bearer token issued at
/// login; storing it is left to whoever exports it. Returns `None` when the
/// variable is unset or blank, in which case requests go out unauthenticated.
pub fn acquire_user_token(
    config: &ServerConfig,
) -> Result<Option<UserToken>, CredentialError> {
    match std::env::var(&config.token_env) {
        Ok(raw) => parse_user_token(&config.token_env, &raw),
        Err(_) => {
            tracing::debug!(var = %config.token_env, "no user token in environment");
            Ok(None)
        }
    }
}

fn parse_user_token(var: &str, raw: &str) -> Result<Option<UserToken>, CredentialError> {
    let token = raw.trim();
    if token.is_empty() {
        return Ok(None);
    }
    if token.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(CredentialError::InvalidToken {
            var: var.to_string(),
        });
    }
    Ok(Some(UserToken::new(token)))
}
