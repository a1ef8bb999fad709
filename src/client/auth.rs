//! Identity and access token collaborator.
//!
//! The client never talks to the OAuth service itself. It asks an
//! [`AuthProvider`] for tokens, checks them, and requests at most one
//! refresh before giving up.

// ============================================================================
// Imports
// ============================================================================

use async_trait::async_trait;
use tracing::debug;

use crate::error::{Error, Result};
use crate::identifiers::UserId;

// ============================================================================
// TokenInfo
// ============================================================================

/// Result of validating the provider's current token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenInfo {
    /// Whether the token is currently accepted.
    pub valid: bool,
    /// User the token belongs to.
    pub user_id: UserId,
}

// ============================================================================
// AuthProvider
// ============================================================================

/// Supplies and validates access tokens for one end-user identity.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Returns an access token, carrying `scope` if one is required.
    ///
    /// # Errors
    ///
    /// Implementations return [`Error::Authentication`] if no token
    /// with the scope is available.
    async fn access_token(&self, scope: Option<&str>) -> Result<String>;

    /// Validates the current token and reports its owner.
    async fn token_info(&self) -> Result<TokenInfo>;

    /// Refreshes the current token and returns the new one.
    async fn refresh(&self) -> Result<String>;
}

/// Resolves a valid token for `scope`, refreshing once if needed.
///
/// # Errors
///
/// Returns [`Error::Authentication`] if the token is still invalid after
/// one refresh, or if the refresh itself fails.
pub async fn resolve_token(provider: &dyn AuthProvider, scope: Option<&str>) -> Result<String> {
    let token = provider.access_token(scope).await?;
    if provider.token_info().await?.valid {
        return Ok(token);
    }

    debug!(scope, "Access token invalid, refreshing");
    provider
        .refresh()
        .await
        .map_err(|e| Error::authentication(format!("token refresh failed: {e}")))?;

    if !provider.token_info().await?.valid {
        return Err(Error::authentication("access token invalid after refresh"));
    }

    // The refreshed token may not carry the scope; resolve it again.
    provider.access_token(scope).await
}

// ============================================================================
// StaticAuthProvider
// ============================================================================

/// Provider backed by a fixed, always-valid token.
///
/// Suited to tokens managed outside the process. With scopes configured,
/// requests for any other scope fail.
#[derive(Debug, Clone)]
pub struct StaticAuthProvider {
    user_id: UserId,
    token: String,
    scopes: Option<Vec<String>>,
}

impl StaticAuthProvider {
    /// Creates a provider for `user_id` using `token`.
    #[must_use]
    pub fn new(user_id: impl Into<UserId>, token: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            token: token.into(),
            scopes: None,
        }
    }

    /// Restricts the token to the given scopes.
    #[must_use]
    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = Some(scopes.into_iter().map(Into::into).collect());
        self
    }
}

#[async_trait]
impl AuthProvider for StaticAuthProvider {
    async fn access_token(&self, scope: Option<&str>) -> Result<String> {
        if let (Some(scope), Some(scopes)) = (scope, &self.scopes)
            && !scopes.iter().any(|granted| granted == scope)
        {
            return Err(Error::authentication(format!(
                "token for {} lacks scope {scope}",
                self.user_id
            )));
        }
        Ok(self.token.clone())
    }

    async fn token_info(&self) -> Result<TokenInfo> {
        Ok(TokenInfo {
            valid: true,
            user_id: self.user_id.clone(),
        })
    }

    async fn refresh(&self) -> Result<String> {
        Ok(self.token.clone())
    }
}

// ============================================================================
// Tests
// ============================================================================
