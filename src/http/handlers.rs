//! Request handlers protected by the admission middleware.

use axum::Json;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct Greeting {
    pub message: String,
}

/// `GET /`
pub async fn hello() -> Json<Greeting> {
    Json(Greeting {
        message: "Hello World!".to_string(),
    })
}
