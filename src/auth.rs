//! Bearer JWT authorization for the endpoint layer.
//!
//! Every secured operation declares a [`JwtScheme`] listing the scopes it
//! requires. The injected [`Authorizer`] verifies the bearer token and checks
//! those scopes before the request reaches a service.

use crate::errors::{ServiceError, ServiceResult};
use axum::http::{HeaderMap, header};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};

/// Scope that satisfies every requirement.
pub const WILDCARD_SCOPE: &str = "*";

/// Security requirement of a single operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JwtScheme {
    pub name: &'static str,
    pub required_scopes: &'static [&'static str],
}

impl JwtScheme {
    pub const fn new(required_scopes: &'static [&'static str]) -> Self {
        Self {
            name: "jwt",
            required_scopes,
        }
    }
}

/// Identity extracted from a verified token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub subject: String,
    pub scopes: Vec<String>,
}

impl Principal {
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes
            .iter()
            .any(|s| s == scope || s == WILDCARD_SCOPE)
    }
}

/// Claims carried by platform tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
    /// Space separated scope list.
    #[serde(default)]
    pub scope: String,
}

pub trait Authorizer: Send + Sync {
    /// Verify `token` and check it against `scheme`.
    fn authorize(&self, token: Option<&str>, scheme: &JwtScheme) -> ServiceResult<Principal>;
}

/// HS256 verifier with a shared secret.
pub struct JwtAuthorizer {
    key: DecodingKey,
    validation: Validation,
}

impl JwtAuthorizer {
    pub fn hs256(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.algorithms = vec![Algorithm::HS256];
        validation.set_required_spec_claims(&["exp", "sub"]);
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }
}

impl Authorizer for JwtAuthorizer {
    fn authorize(&self, token: Option<&str>, scheme: &JwtScheme) -> ServiceResult<Principal> {
        let token = token.ok_or(ServiceError::Unauthorized)?;
        let claims = decode::<Claims>(token, &self.key, &self.validation)
            .map(|data| data.claims)
            .map_err(|err| {
                tracing::debug!("rejecting bearer token: {}", err);
                ServiceError::Unauthorized
            })?;

        let principal = Principal {
            subject: claims.sub,
            scopes: claims.scope.split_whitespace().map(str::to_string).collect(),
        };

        if let Some(missing) = scheme
            .required_scopes
            .iter()
            .find(|scope| !principal.has_scope(scope))
        {
            return Err(ServiceError::invalid_scopes(format!(
                "{} scope `{}` is required",
                scheme.name, missing
            )));
        }
        Ok(principal)
    }
}

/// Extract the bearer token from an `Authorization` header, if any.
pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| {
            v.strip_prefix("Bearer ")
                .or_else(|| v.strip_prefix("bearer "))
        })
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}
