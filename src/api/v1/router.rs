use super::error::*;
use super::handler;
use crate::application_port::*;
use crate::domain_model::UserId;
use crate::server::*;
use std::convert::Infallible;
use std::sync::Arc;
use warp::{Filter, reject};

const MAX_BODY_BYTES: u64 = 16 * 1024;

pub fn routes(
    server: Arc<Server>,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    let generate = warp::path!("tokens" / "generate")
        .and(warp::post())
        .and(warp::query::<handler::GenerateQuery>())
        .and(warp::header::optional::<String>("user-agent"))
        .and(warp::addr::remote())
        .and(with(server.token_service.clone()))
        .and_then(handler::generate_token_pair);

    let refresh = warp::path!("tokens" / "refresh")
        .and(warp::post())
        .and(warp::body::content_length_limit(MAX_BODY_BYTES))
        .and(warp::body::json())
        .and(warp::header::optional::<String>("user-agent"))
        .and(warp::addr::remote())
        .and(with(server.token_service.clone()))
        .and_then(handler::refresh_token_pair);

    let whoami = warp::path!("whoami")
        .and(warp::get())
        .and(with_verification(server.access_guard.clone()))
        .and_then(handler::whoami);

    let logout = warp::path!("logout")
        .and(warp::post())
        .and(with_verification(server.access_guard.clone()))
        .and(warp::header::optional::<String>("authorization"))
        .and(with(server.token_service.clone()))
        .and_then(handler::logout);

    generate.or(refresh).or(whoami).or(logout)
}

fn with<ServiceType>(
    service: Arc<ServiceType>,
) -> impl Filter<Extract = (Arc<ServiceType>,), Error = Infallible> + Clone
where
    ServiceType: Send + Sync + ?Sized,
{
    warp::any().map(move || service.clone())
}

fn with_verification(
    access_guard: Arc<dyn AccessGuard>,
) -> impl Filter<Extract = (UserId,), Error = warp::Rejection> + Clone {
    warp::header::optional::<String>("authorization").and_then(move |header: Option<String>| {
        let access_guard = access_guard.clone();
        async move {
            access_guard
                .admit(header.as_deref())
                .await
                .map_err(ApiErrorCode::unauthorized)
                .map_err(reject::custom)
        }
    })
}
