//! Bearer credential check for `data` and `list_channels`

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use thiserror::Error;

use crate::config::{AuthMode, Config};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("no token provided")]
    MissingToken,

    #[error("invalid token")]
    InvalidToken,

    #[error("token has expired")]
    Expired,
}

/// Claims accepted in JWT mode. Only expiry is checked; `sub` is logged.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    #[serde(default)]
    pub sub: Option<String>,
    pub exp: usize,
}

/// Verifies the per-request bearer token
#[derive(Clone)]
pub struct TokenVerifier {
    secret: Vec<u8>,
    mode: AuthMode,
}

impl std::fmt::Debug for TokenVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenVerifier")
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

impl TokenVerifier {
    pub fn new(secret: impl Into<String>, mode: AuthMode) -> Self {
        Self {
            secret: secret.into().into_bytes(),
            mode,
        }
    }

    pub fn shared_secret(secret: impl Into<String>) -> Self {
        Self::new(secret, AuthMode::SharedSecret)
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.auth_token.clone(), config.auth_mode)
    }

    pub fn verify(&self, token: Option<&str>) -> Result<(), AuthError> {
        let token = token
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::MissingToken)?;

        match self.mode {
            AuthMode::SharedSecret => {
                if bool::from(token.as_bytes().ct_eq(self.secret.as_slice())) {
                    Ok(())
                } else {
                    Err(AuthError::InvalidToken)
                }
            }
            AuthMode::Jwt => {
                let data = decode::<Claims>(
                    token,
                    &DecodingKey::from_secret(&self.secret),
                    &Validation::new(Algorithm::HS256),
                )
                .map_err(|e| match e.kind() {
                    ErrorKind::ExpiredSignature => AuthError::Expired,
                    _ => AuthError::InvalidToken,
                })?;

                tracing::debug!("JWT accepted for subject {:?}", data.claims.sub);
                Ok(())
            }
        }
    }
}
