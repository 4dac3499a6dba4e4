use crate::application_port::*;
use serde::Serialize;
use std::convert::Infallible;
use thiserror::Error;
use tracing::{debug, warn};
use warp::filters::body::BodyDeserializeError;
use warp::http::StatusCode;
use warp::{Rejection, reject};

pub async fn recover_error(err: Rejection) -> Result<impl warp::Reply, Infallible> {
    let code = if let Some(code) = err.find::<ApiErrorCode>() {
        code.clone()
    } else if err.find::<BodyDeserializeError>().is_some() {
        ApiErrorCode::InvalidPayload
    } else if err.find::<warp::reject::InvalidQuery>().is_some()
        || err.find::<warp::reject::PayloadTooLarge>().is_some()
        || err.find::<warp::reject::LengthRequired>().is_some()
    {
        ApiErrorCode::InvalidPayload
    } else if err.is_not_found() {
        ApiErrorCode::NotFound
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        ApiErrorCode::MethodNotAllowed
    } else {
        warn!("Unhandled rejection: {:?}", err);
        ApiErrorCode::InternalError
    };

    let json = warp::reply::json(&ErrorBody {
        error: ApiError {
            message: code.to_string(),
            code: code.clone(),
        },
    });
    Ok(warp::reply::with_status(json, code.status()))
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: ApiError,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub code: ApiErrorCode,
    pub message: String,
}

#[derive(Debug, Clone, Error, Serialize, PartialEq, Eq)]
pub enum ApiErrorCode {
    #[error("invalid payload")]
    InvalidPayload,
    #[error("invalid access token")]
    InvalidAccessToken,
    #[error("invalid refresh token")]
    InvalidRefreshToken,
    #[error("refresh not found or revoked")]
    RefreshNotFoundOrRevoked,
    #[error("user-agent changed")]
    UserAgentChanged,
    #[error("unexpected hash method")]
    UnexpectedHashMethod,
    #[error("missing auth token")]
    MissingToken,
    #[error("unauthorized")]
    Unauthorized,
    #[error("not found")]
    NotFound,
    #[error("method not allowed")]
    MethodNotAllowed,
    #[error("internal error")]
    InternalError,
}

impl ApiErrorCode {
    pub fn internal<E: std::fmt::Display>(error: E) -> ApiErrorCode {
        warn!("Internal error: {}", error);
        ApiErrorCode::InternalError
    }

    /// Collapses every guard failure except a missing token into one answer.
    pub fn unauthorized(error: AuthError) -> ApiErrorCode {
        match error {
            AuthError::MissingToken => ApiErrorCode::MissingToken,
            AuthError::Store(e) | AuthError::InternalError(e) => {
                warn!("Access check failed: {}", e);
                ApiErrorCode::Unauthorized
            }
            e => {
                debug!("Access denied: {}", e);
                ApiErrorCode::Unauthorized
            }
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiErrorCode::InvalidPayload
            | ApiErrorCode::InvalidAccessToken
            | ApiErrorCode::InvalidRefreshToken
            | ApiErrorCode::RefreshNotFoundOrRevoked
            | ApiErrorCode::UserAgentChanged
            | ApiErrorCode::UnexpectedHashMethod => StatusCode::BAD_REQUEST,
            ApiErrorCode::MissingToken | ApiErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiErrorCode::NotFound => StatusCode::NOT_FOUND,
            ApiErrorCode::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ApiErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl reject::Reject for ApiErrorCode {}

impl From<AuthError> for ApiErrorCode {
    fn from(error: AuthError) -> Self {
        match error {
            AuthError::InvalidPayload => ApiErrorCode::InvalidPayload,
            AuthError::InvalidToken | AuthError::InvalidAccessToken => {
                ApiErrorCode::InvalidAccessToken
            }
            AuthError::InvalidRefreshToken => ApiErrorCode::InvalidRefreshToken,
            AuthError::RefreshNotFoundOrRevoked => ApiErrorCode::RefreshNotFoundOrRevoked,
            AuthError::UserAgentChanged => ApiErrorCode::UserAgentChanged,
            AuthError::UnexpectedHashMethod => ApiErrorCode::UnexpectedHashMethod,
            AuthError::MissingToken => ApiErrorCode::MissingToken,
            AuthError::Store(e) => ApiErrorCode::internal(e),
            AuthError::InternalError(e) => ApiErrorCode::internal(e),
        }
    }
}
