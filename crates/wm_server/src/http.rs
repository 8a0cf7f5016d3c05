//! axum routes over [`Server`].

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde_json::Value;

use wm_proto::{API_PATH, INTEROP_PATH, REGISTER_PATH};

use crate::{error::ServerError, server::Server};

/// Refusals carry no body, only the status.
impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        StatusCode::from_u16(self.status_code())
            .unwrap_or(StatusCode::BAD_REQUEST)
            .into_response()
    }
}

pub fn router(server: Server) -> Router {
    Router::new()
        .route(REGISTER_PATH, post(register))
        .route(API_PATH, post(api))
        .route(INTEROP_PATH, post(interop))
        .with_state(server)
}

async fn register(State(server): State<Server>, Json(body): Json<Value>) -> Result<Json<Value>, ServerError> {
    server.handle(REGISTER_PATH, body).await.map(Json)
}

async fn api(State(server): State<Server>, Json(body): Json<Value>) -> Result<Json<Value>, ServerError> {
    server.handle(API_PATH, body).await.map(Json)
}

async fn interop(State(server): State<Server>, Json(body): Json<Value>) -> Result<Json<Value>, ServerError> {
    server.handle(INTEROP_PATH, body).await.map(Json)
}
