use crate::api::v1::handler::ApiResponse;
use crate::application_port::*;
use std::convert::Infallible;
use thiserror::Error;
use tracing::warn;
use warp::http::StatusCode;
use warp::{Rejection, reject};

pub async fn recover_error(err: Rejection) -> Result<impl warp::Reply, Infallible> {
    if let Some(code) = err.find::<ApiErrorCode>() {
        let json = match code {
            ApiErrorCode::Unauthorized => warp::reply::json(&UnauthorizedBody::default()),
            _ => warp::reply::json(&ApiResponse::<()>::err(*code)),
        };
        return Ok(warp::reply::with_status(json, code.status()));
    }

    let (status, msg) = if err.is_not_found() {
        (StatusCode::NOT_FOUND, "not found".to_string())
    } else if err.find::<reject::MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, "method not allowed".to_string())
    } else if let Some(e) = err.find::<warp::filters::body::BodyDeserializeError>() {
        (StatusCode::BAD_REQUEST, e.to_string())
    } else {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Unhandled error: {:?}", err),
        )
    };
    let json = warp::reply::json(&ApiResponse::<()> {
        code: i32::from(status.as_u16()),
        msg,
        data: None,
    });
    Ok(warp::reply::with_status(json, status))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ApiErrorCode {
    #[error("username and password are required")]
    MissingParameters,
    #[error("invalid username or password")]
    InvalidCredentials,
    #[error("unauthorized")]
    Unauthorized,
    #[error("internal error")]
    InternalError,
}

impl ApiErrorCode {
    pub fn internal<E: std::fmt::Display>(error: E) -> ApiErrorCode {
        warn!("Internal error: {}", error);
        ApiErrorCode::InternalError
    }

    /// Value of the `code` field in the response body.
    pub fn code(&self) -> i32 {
        match self {
            ApiErrorCode::InternalError => 50,
            ApiErrorCode::MissingParameters => 51,
            ApiErrorCode::InvalidCredentials => 52,
            ApiErrorCode::Unauthorized => CODE_UNAUTHORIZED,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::OK,
        }
    }
}

impl reject::Reject for ApiErrorCode {}

impl From<TokenError> for ApiErrorCode {
    fn from(error: TokenError) -> Self {
        match error {
            TokenError::TokenEmpty
            | TokenError::TokenInvalid
            | TokenError::TokenDecode
            | TokenError::TokenNotFound => ApiErrorCode::Unauthorized,
            TokenError::SubjectEmpty => ApiErrorCode::MissingParameters,
            e => ApiErrorCode::internal(e),
        }
    }
}
