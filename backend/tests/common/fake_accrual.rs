//! In-process stand-in for the accrual service.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use parking_lot::Mutex;
use serde_json::{Value, json};

#[derive(Clone, Debug)]
pub enum Reply {
    Json(Value),
    Status(StatusCode),
    /// Never answers within any sane client timeout.
    Hang,
}

impl Reply {
    pub fn processed(order: &str, accrual: f64) -> Self {
        Reply::Json(json!({ "order": order, "status": "PROCESSED", "accrual": accrual }))
    }

    pub fn status(order: &str, status: &str) -> Self {
        Reply::Json(json!({ "order": order, "status": status }))
    }
}

#[derive(Clone, Default)]
pub struct FakeAccrual {
    replies: Arc<Mutex<HashMap<String, Reply>>>,
    hits: Arc<Mutex<Vec<String>>>,
}

impl FakeAccrual {
    pub fn set(&self, order: &str, reply: Reply) {
        self.replies.lock().insert(order.to_string(), reply);
    }

    pub fn hits(&self) -> Vec<String> {
        self.hits.lock().clone()
    }

    pub fn hit_count(&self) -> usize {
        self.hits.lock().len()
    }

    /// Binds an ephemeral port and serves until the test runtime ends.
    /// Returns the base URL. Unknown orders get `204 No Content`.
    pub async fn start(&self) -> String {
        let app = Router::new()
            .route("/api/orders/:number", get(handle))
            .with_state(self.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        format!("http://{addr}")
    }
}

async fn handle(State(fake): State<FakeAccrual>, Path(number): Path<String>) -> Response {
    fake.hits.lock().push(number.clone());
    let reply = fake
        .replies
        .lock()
        .get(&number)
        .cloned()
        .unwrap_or(Reply::Status(StatusCode::NO_CONTENT));

    match reply {
        Reply::Json(body) => (StatusCode::OK, Json(body)).into_response(),
        Reply::Status(status) => status.into_response(),
        Reply::Hang => {
            tokio::time::sleep(Duration::from_secs(60)).await;
            StatusCode::OK.into_response()
        }
    }
}
