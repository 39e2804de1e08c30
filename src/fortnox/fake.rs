//! Local stand-in for the accounting API, served by axum on an ephemeral
//! port. Records every request and answers with canned replies per path.

use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone)]
pub(crate) struct Recorded {
    pub method: Method,
    pub path: String,
    pub headers: HeaderMap,
    pub body: String,
}

impl Recorded {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn json(&self) -> Value {
        serde_json::from_str(&self.body).unwrap()
    }
}

#[derive(Clone, Default)]
pub(crate) struct FakeFortnox {
    recorded: Arc<Mutex<Vec<Recorded>>>,
    replies: Arc<Mutex<HashMap<String, (StatusCode, Value)>>>,
}

impl FakeFortnox {
    pub fn reply(&self, path: &str, status: StatusCode, body: Value) -> &Self {
        self.replies
            .lock()
            .unwrap()
            .insert(path.to_string(), (status, body));
        self
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.recorded.lock().unwrap().clone()
    }

    /// Serve on 127.0.0.1 and return the base URL.
    pub async fn start(&self) -> String {
        let app = Router::new().fallback(record).with_state(self.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }
}

async fn record(
    State(fake): State<FakeFortnox>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: String,
) -> (StatusCode, Json<Value>) {
    let path = uri.path().to_string();
    fake.recorded.lock().unwrap().push(Recorded {
        method,
        path: path.clone(),
        headers,
        body,
    });
    fake.replies
        .lock()
        .unwrap()
        .get(&path)
        .cloned()
        .map(|(status, body)| (status, Json(body)))
        .unwrap_or((StatusCode::NOT_FOUND, Json(json!({ "message": "no such route" }))))
}
