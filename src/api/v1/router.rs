use super::error::*;
use super::handler;
use crate::application_port::*;
use crate::domain_model::Claims;
use crate::server::*;
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;
use warp::http::{Method, header};
use warp::path::FullPath;
use warp::{Filter, reject};

pub fn routes(
    server: Arc<Server>,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    let hello = warp::path("hello")
        .and(warp::path::end())
        .and_then(handler::hello);

    // path before method, so an unknown path is a 404 rather than a 405
    let login = warp::path("login")
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::json())
        .and(with(server.token_service.clone()))
        .and_then(handler::login);

    let logout = warp::path("logout")
        .and(warp::path::end())
        .and(warp::post())
        .and(with_token())
        .and(with(server.token_service.clone()))
        .and_then(handler::logout);

    let user = warp::path("user")
        .and(warp::path::end())
        .and(warp::get())
        .and(with_authorization(server.token_service.clone()))
        .and_then(handler::get_user);

    let user_data = warp::path!("user" / "data")
        .and(warp::post())
        .and(with_authorization(server.token_service.clone()))
        .and_then(handler::user_data);

    // public or protected depending on the configured path rules
    let user_public = warp::path!("user" / "public")
        .and(with_authorization(server.token_service.clone()))
        .and_then(handler::user_public);

    hello
        .or(login)
        .or(logout)
        .or(user)
        .or(user_data)
        .or(user_public)
}

fn with<ServiceType>(
    service: Arc<ServiceType>,
) -> impl Filter<Extract = (Arc<ServiceType>,), Error = Infallible> + Clone
where
    ServiceType: Send + Sync + ?Sized,
{
    warp::any().map(move || service.clone())
}

const FORM_LIMIT: u64 = 16 * 1024;

/// Url-encoded form fields, or nothing when the body is absent or not a form.
fn with_form_params() -> impl Filter<Extract = (HashMap<String, String>,), Error = Infallible> + Clone
{
    warp::body::content_length_limit(FORM_LIMIT)
        .and(warp::body::form::<HashMap<String, String>>())
        .or(warp::any().map(HashMap::<String, String>::new))
        .unify()
}

fn with_auth_request() -> impl Filter<Extract = (AuthRequest,), Error = warp::Rejection> + Clone {
    warp::method()
        .and(warp::path::full())
        .and(warp::header::optional::<String>(header::AUTHORIZATION.as_str()))
        .and(warp::query::<HashMap<String, String>>())
        .and(with_form_params())
        .map(
            |method: Method,
             path: FullPath,
             authorization: Option<String>,
             query: HashMap<String, String>,
             mut params: HashMap<String, String>| {
                // query wins over form on a clash
                params.extend(query);
                AuthRequest {
                    method: method.to_string(),
                    path: path.as_str().to_string(),
                    authorization,
                    params,
                }
            },
        )
}

/// Bearer token from the `Authorization` header, else the `token` query or form field.
fn with_token() -> impl Filter<Extract = (Option<String>,), Error = warp::Rejection> + Clone {
    with_auth_request().map(|request: AuthRequest| request.token())
}

/// Runs the path policy and token validation, yielding the session claims.
fn with_authorization(
    token_service: Arc<dyn TokenService>,
) -> impl Filter<Extract = (Claims,), Error = warp::Rejection> + Clone {
    with_auth_request().and_then(move |request: AuthRequest| {
        let token_service = token_service.clone();
        async move {
            let decision = token_service.authorize(&request).await;
            if decision.authorized {
                Ok(decision.claims)
            } else {
                Err(reject::custom(ApiErrorCode::Unauthorized))
            }
        }
    })
}
