use super::error::*;
use crate::application_port::*;
use crate::domain_model::*;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use warp::http::StatusCode;
use warp::{self, reject};

fn client_ip(remote: Option<SocketAddr>) -> String {
    remote.map(|addr| addr.ip().to_string()).unwrap_or_default()
}

#[derive(Debug, Deserialize)]
pub struct GenerateQuery {
    #[serde(default)]
    pub user_id: String,
}

pub async fn generate_token_pair(
    query: GenerateQuery,
    user_agent: Option<String>,
    remote: Option<SocketAddr>,
    token_service: Arc<dyn TokenService>,
) -> Result<impl warp::Reply, warp::Rejection> {
    if query.user_id.trim().is_empty() {
        return Err(reject::custom(ApiErrorCode::InvalidPayload));
    }

    let user_info = UserInfo {
        id: UserId(query.user_id),
        agent: user_agent.unwrap_or_default(),
        ip: client_ip(remote),
    };

    let token_pair = token_service
        .generate_token_pair(user_info)
        .await
        .map_err(ApiErrorCode::from)
        .map_err(reject::custom)?;

    Ok(warp::reply::json(&token_pair))
}

pub async fn refresh_token_pair(
    body: TokenPair,
    user_agent: Option<String>,
    remote: Option<SocketAddr>,
    token_service: Arc<dyn TokenService>,
) -> Result<impl warp::Reply, warp::Rejection> {
    let user_info = UserInfo {
        id: UserId::default(),
        agent: user_agent.unwrap_or_default(),
        ip: client_ip(remote),
    };

    let token_pair = token_service
        .refresh_token_pair(body, user_info)
        .await
        .map_err(ApiErrorCode::from)
        .map_err(reject::custom)?;

    Ok(warp::reply::json(&token_pair))
}

#[derive(Debug, Serialize)]
struct WhoamiResponse {
    user_id: UserId,
}

pub async fn whoami(user_id: UserId) -> Result<impl warp::Reply, warp::Rejection> {
    Ok(warp::reply::json(&WhoamiResponse { user_id }))
}

pub async fn logout(
    _user_id: UserId,
    authorization: Option<String>,
    token_service: Arc<dyn TokenService>,
) -> Result<impl warp::Reply, warp::Rejection> {
    let token = parse_bearer(authorization.as_deref())
        .ok()
        .flatten()
        .ok_or_else(|| reject::custom(ApiErrorCode::MissingToken))?;

    token_service
        .logout(&AccessToken(token.to_owned()))
        .await
        .map_err(ApiErrorCode::from)
        .map_err(reject::custom)?;

    Ok(warp::reply::with_status(warp::reply(), StatusCode::NO_CONTENT))
}
