//! Axum binding for the callback endpoint.
//!
//! The bot itself is transport-neutral; this module is the thin glue that
//! mounts [`Bot::handle`] on a router. Query extraction matters here: axum
//! URL-decodes values once, which is exactly what the crypto layer expects
//! (the `echostr` ciphertext regularly contains `+`).

use std::collections::HashMap;

use axum::{
    Router,
    body::Bytes,
    extract::{Query, State},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};

use crate::bot::{Bot, CallbackResponse};

/// Build a router serving the callback protocol at `/callback`.
pub fn router(bot: Bot) -> Router {
    Router::new()
        .route("/callback", get(callback_get).post(callback_post))
        .with_state(bot)
}

async fn callback_get(
    State(bot): State<Bot>,
    Query(query): Query<HashMap<String, String>>,
) -> CallbackResponse {
    bot.handle("GET", &query, &[]).await
}

async fn callback_post(
    State(bot): State<Bot>,
    Query(query): Query<HashMap<String, String>>,
    body: Bytes,
) -> CallbackResponse {
    bot.handle("POST", &query, &body).await
}

impl IntoResponse for CallbackResponse {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let mut response = (status, self.body).into_response();
        response
            .headers_mut()
            .insert(header::CONTENT_TYPE, HeaderValue::from_static(self.content_type));
        response
    }
}
