use crate::application_port::TokenError;
use crate::domain_model::{Claims, TokenRecord};
use serde::Serialize;
use std::collections::HashMap;
use tracing::warn;

pub const BEARER_PREFIX: &str = "Bearer ";
/// Name of the request parameter checked when no `Authorization` header is usable.
pub const TOKEN_PARAM: &str = "token";
pub const CODE_UNAUTHORIZED: i32 = 401;
pub const MSG_UNAUTHORIZED: &str = "unauthorized";

/// What the request layer hands over for one inbound call.
#[derive(Debug, Clone, Default)]
pub struct AuthRequest {
    pub method: String,
    pub path: String,
    pub authorization: Option<String>,
    /// Query, form and body scalars merged by the caller.
    pub params: HashMap<String, String>,
}

impl AuthRequest {
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        AuthRequest {
            method: method.into(),
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn with_authorization(mut self, value: impl Into<String>) -> Self {
        self.authorization = Some(value.into());
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn token(&self) -> Option<String> {
        extract_token(self.authorization.as_deref(), &self.params)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AuthDecision {
    pub authorized: bool,
    /// Claims of the validated session, to be attached to the request context.
    pub claims: Claims,
}

impl AuthDecision {
    pub fn allow(claims: Claims) -> Self {
        AuthDecision {
            authorized: true,
            claims,
        }
    }

    pub fn deny() -> Self {
        AuthDecision {
            authorized: false,
            claims: Claims::new(),
        }
    }

    /// Body the request layer writes before halting the pipeline, if any.
    pub fn rejection(&self) -> Option<UnauthorizedBody> {
        if self.authorized {
            None
        } else {
            Some(UnauthorizedBody::default())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnauthorizedBody {
    pub code: i32,
    pub msg: String,
    pub data: Option<Claims>,
}

impl Default for UnauthorizedBody {
    fn default() -> Self {
        UnauthorizedBody {
            code: CODE_UNAUTHORIZED,
            msg: MSG_UNAUTHORIZED.to_string(),
            data: None,
        }
    }
}

/// Pure decision: `validation` is `None` when the request carried no token.
pub fn decide(protected: bool, validation: Option<&Result<TokenRecord, TokenError>>) -> AuthDecision {
    if !protected {
        return AuthDecision::allow(Claims::new());
    }
    match validation {
        Some(Ok(record)) => AuthDecision::allow(record.claims.clone()),
        Some(Err(_)) | None => AuthDecision::deny(),
    }
}

/// Picks the bearer credential: a well-formed `Authorization: Bearer` header
/// first, then the `token` parameter.
pub fn extract_token(
    authorization: Option<&str>,
    params: &HashMap<String, String>,
) -> Option<String> {
    if let Some(header) = authorization {
        match header.strip_prefix(BEARER_PREFIX) {
            Some(token) if !token.trim().is_empty() => return Some(token.trim().to_string()),
            _ => warn!("Authorization header present but carries no bearer token"),
        }
    }

    let param = params.get(TOKEN_PARAM)?;
    let token = param.strip_prefix(BEARER_PREFIX).unwrap_or(param).trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}
