use std::collections::HashMap;
use std::path::PathBuf;
use warp::http::StatusCode;
use warp::Filter;
use warp::Reply;

use crate::relay::RoomRegistry;
use super::relay_websocket::{self, JoinRequest};

/// All routes of the relay behind an allow-any-origin CORS policy.
pub fn routes(
    registry: RoomRegistry,
    static_dir: PathBuf,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    let cors = warp::cors()
        .allow_any_origin()
        .allow_methods(vec!["GET", "POST", "OPTIONS"])
        .allow_headers(vec!["content-type", "authorization"]);

    relay_websocket_route(registry.clone())
        .or(health_check(registry))
        .or(static_files(static_dir))
        .with(cors)
}

/// `GET /ws?room=..&role=..&name=..`
pub fn relay_websocket_route(
    registry: RoomRegistry,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path("ws")
        .and(warp::path::end())
        .and(warp::ws())
        .and(warp::query::<HashMap<String, String>>())
        .and(with_registry(registry))
        .map(|ws: warp::ws::Ws, params: HashMap<String, String>, registry: RoomRegistry| {
            match JoinRequest::from_query(&params) {
                Ok(request) => ws
                    .on_upgrade(move |websocket| {
                        relay_websocket::handle_relay_websocket(websocket, request, registry)
                    })
                    .into_response(),
                Err(e) => {
                    tracing::warn!(error = %e, "Rejecting signaling connection");
                    warp::reply::with_status(e.to_string(), StatusCode::BAD_REQUEST).into_response()
                }
            }
        })
}

/// `GET /` and `GET /health`
pub fn health_check(
    registry: RoomRegistry,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path::end()
        .or(warp::path("health").and(warp::path::end()))
        .unify()
        .and(warp::get())
        .and(with_registry(registry))
        .map(|registry: RoomRegistry| {
            warp::reply::json(&serde_json::json!({
                "status": "ok",
                "service": "signal-relay",
                "version": env!("CARGO_PKG_VERSION"),
                "rooms": registry.len()
            }))
        })
}

/// `GET /static/..` client pages
pub fn static_files(
    static_dir: PathBuf,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path("static").and(warp::fs::dir(static_dir))
}

fn with_registry(
    registry: RoomRegistry,
) -> impl Filter<Extract = (RoomRegistry,), Error = std::convert::Infallible> + Clone {
    warp::any().map(move || registry.clone())
}
