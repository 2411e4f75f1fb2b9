use super::error::*;
use crate::application_port::*;
use crate::domain_model::Claims;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use warp::{self, reject};

/// Envelope for every JSON body: `code` is 0 on success.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub code: i32,
    pub msg: String,
    pub data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        ApiResponse {
            code: 0,
            msg: "success".to_string(),
            data: Some(data),
        }
    }

    pub fn message(msg: impl Into<String>) -> Self {
        ApiResponse {
            code: 0,
            msg: msg.into(),
            data: None,
        }
    }

    pub fn err(code: ApiErrorCode) -> Self {
        ApiResponse {
            code: code.code(),
            msg: code.to_string(),
            data: None,
        }
    }
}

// Demo account; real credential checks belong to the embedding service.
const DEMO_USERNAME: &str = "admin";
const DEMO_PASSWORD: &str = "123456";
const DEMO_SUBJECT: &str = "99";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub token_type: String,
    pub token: String,
    pub expire_in: u64,
    pub username: String,
}

pub async fn hello() -> Result<impl warp::Reply, warp::Rejection> {
    Ok(warp::reply::json(&ApiResponse::<()>::message("hello")))
}

pub async fn login(
    body: LoginRequest,
    token_service: Arc<dyn TokenService>,
) -> Result<impl warp::Reply, warp::Rejection> {
    if body.username.is_empty() || body.password.is_empty() {
        return Err(reject::custom(ApiErrorCode::MissingParameters));
    }
    if body.username != DEMO_USERNAME || body.password != DEMO_PASSWORD {
        return Err(reject::custom(ApiErrorCode::InvalidCredentials));
    }

    let mut claims = Claims::new();
    claims.insert("id".to_string(), json!(33));
    claims.insert("username".to_string(), json!(body.username));
    claims.insert("nickname".to_string(), json!("john"));

    let issued = token_service
        .create(DEMO_SUBJECT, claims)
        .await
        .map_err(ApiErrorCode::from)
        .map_err(reject::custom)?;

    let response = LoginResponse {
        token_type: BEARER_PREFIX.trim_end().to_string(),
        token: issued.token,
        expire_in: token_service.lifetime().as_secs(),
        username: body.username,
    };
    Ok(warp::reply::json(&ApiResponse::ok(response)))
}

#[derive(Debug, Serialize)]
pub struct LogoutResponse {
    pub revoked: bool,
}

pub async fn logout(
    token: Option<String>,
    token_service: Arc<dyn TokenService>,
) -> Result<impl warp::Reply, warp::Rejection> {
    let token = token.ok_or_else(|| reject::custom(ApiErrorCode::Unauthorized))?;
    let revoked = token_service
        .revoke(&token)
        .await
        .map_err(ApiErrorCode::from)
        .map_err(reject::custom)?;
    Ok(warp::reply::json(&ApiResponse::ok(LogoutResponse { revoked })))
}

pub async fn get_user(claims: Claims) -> Result<impl warp::Reply, warp::Rejection> {
    Ok(warp::reply::json(&ApiResponse {
        code: 0,
        msg: "get user success".to_string(),
        data: Some(claims),
    }))
}

pub async fn user_data(_claims: Claims) -> Result<impl warp::Reply, warp::Rejection> {
    Ok(warp::reply::json(&ApiResponse::ok(json!({"id": 33, "name": "abc"}))))
}

pub async fn user_public(_claims: Claims) -> Result<impl warp::Reply, warp::Rejection> {
    Ok(warp::reply::json(&ApiResponse::<()>::message("public")))
}
