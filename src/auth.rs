//! Authentication Module
//!
//! Holds the token pair returned by `public/auth` and gates `private/`
//! methods on it. Tokens are written only by an explicit (re-)authentication
//! and read by every gated call; nothing refreshes them in the background.

use crate::error::{ClientError, ClientResult};
use crate::protocol::{self, AuthParams, AuthResult, Request};
use crate::rpc::RpcConnection;

use serde_json::Value;
use std::sync::{PoisonError, RwLock};
use std::time::Instant;

/// Access and refresh token pair from a successful login
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthTokens {
    pub access_token: String,
    pub refresh_token: String,
    /// Seconds the access token stays valid, as reported by the venue
    pub expires_in: u64,
    pub scope: String,
    pub obtained_at: Instant,
}

impl AuthTokens {
    pub fn from_result(result: AuthResult) -> Self {
        Self {
            access_token: result.access_token,
            refresh_token: result.refresh_token,
            expires_in: result.expires_in,
            scope: result.scope,
            obtained_at: Instant::now(),
        }
    }

    /// Whether the venue has most likely expired the access token by now
    pub fn is_expired(&self) -> bool {
        self.expires_in > 0 && self.obtained_at.elapsed().as_secs() >= self.expires_in
    }
}

/// Single-writer, multi-reader holder of the current token pair
#[derive(Debug, Default)]
pub struct AuthGate {
    tokens: RwLock<Option<AuthTokens>>,
}

impl AuthGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a call to `method` needs a held access token
    pub fn is_auth_required(method: &str) -> bool {
        protocol::requires_auth(method)
    }

    /// Check `method` against the held token and return the params to send.
    ///
    /// Gated methods get the access token injected as `access_token`. Fails
    /// with [`ClientError::AuthenticationRequired`] when no token is held.
    pub fn guard(&self, method: &str, params: Value) -> ClientResult<Value> {
        if !Self::is_auth_required(method) {
            return Ok(params);
        }

        let token = self
            .access_token()
            .ok_or(ClientError::AuthenticationRequired)?;

        let mut map = match params {
            Value::Null => serde_json::Map::new(),
            Value::Object(map) => map,
            other => {
                return Err(ClientError::Protocol(format!(
                    "params of '{}' must be an object, got {}",
                    method, other
                )))
            }
        };
        map.insert("access_token".to_string(), Value::String(token));
        Ok(Value::Object(map))
    }

    /// Log in with client credentials and hold the returned token pair
    pub async fn authenticate(
        &self,
        rpc: &RpcConnection,
        api_key: &str,
        secret_key: &str,
    ) -> ClientResult<AuthTokens> {
        if api_key.is_empty() || secret_key.is_empty() {
            return Err(ClientError::AuthenticationFailed(
                "api key and secret key must be set".to_string(),
            ));
        }
        self.login(
            rpc,
            AuthParams::ClientCredentials {
                client_id: api_key.to_string(),
                client_secret: secret_key.to_string(),
            },
        )
        .await
    }

    /// Exchange the held refresh token for a new token pair
    pub async fn refresh(&self, rpc: &RpcConnection) -> ClientResult<AuthTokens> {
        let refresh_token = self
            .refresh_token()
            .ok_or(ClientError::AuthenticationRequired)?;
        self.login(rpc, AuthParams::RefreshToken { refresh_token }).await
    }

    async fn login(&self, rpc: &RpcConnection, params: AuthParams) -> ClientResult<AuthTokens> {
        let value = rpc
            .call(AuthParams::METHOD, serde_json::to_value(&params)?)
            .await
            .map_err(|e| match e {
                ClientError::Rpc { code, message } => {
                    ClientError::AuthenticationFailed(format!("{} ({})", message, code))
                }
                other => other,
            })?;
        let result: AuthResult = serde_json::from_value(value)?;
        let tokens = AuthTokens::from_result(result);
        log::info!("Authenticated (scope: {})", tokens.scope);
        self.store(tokens.clone());
        Ok(tokens)
    }

    pub fn store(&self, tokens: AuthTokens) {
        *self.tokens.write().unwrap_or_else(PoisonError::into_inner) = Some(tokens);
    }

    pub fn clear(&self) {
        *self.tokens.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub fn tokens(&self) -> Option<AuthTokens> {
        self.tokens.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn access_token(&self) -> Option<String> {
        self.tokens
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|t| t.access_token.clone())
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.tokens
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|t| t.refresh_token.clone())
    }

    pub fn is_authenticated(&self) -> bool {
        self.tokens
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}
