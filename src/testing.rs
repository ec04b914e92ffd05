//! In-memory transport used by the unit tests.

use crate::client::{ApiRequest, Connector, RawResponse, Transport};
use crate::error::{BotError, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

/// Replays queued responses per endpoint key and records every request.
///
/// Requests with nothing queued fail like a dropped connection.
#[derive(Default)]
pub struct ScriptedTransport {
    responses: Mutex<HashMap<String, VecDeque<RawResponse>>>,
    requests: Mutex<Vec<ApiRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_raw(&self, endpoint: &str, status: u16, body: &[u8]) {
        self.responses
            .lock()
            .unwrap()
            .entry(endpoint.to_string())
            .or_default()
            .push_back(RawResponse {
                status,
                body: body.to_vec(),
            });
    }

    pub fn push_json(&self, endpoint: &str, status: u16, body: Value) {
        self.push_raw(endpoint, status, body.to_string().as_bytes());
    }

    pub fn requests(&self) -> Vec<ApiRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn calls_to(&self, endpoint: &str) -> Vec<ApiRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.endpoint_key() == endpoint)
            .collect()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: &ApiRequest) -> Result<RawResponse> {
        self.requests.lock().unwrap().push(request.clone());
        let key = request.endpoint_key();
        self.responses
            .lock()
            .unwrap()
            .get_mut(&key)
            .and_then(VecDeque::pop_front)
            .ok_or_else(|| BotError::Other(format!("connection refused: {}", key)))
    }
}

/// Hands out the same scripted transport to every account.
pub struct ScriptedConnector(pub Arc<ScriptedTransport>);

impl Connector for ScriptedConnector {
    fn connect(&self) -> Result<Arc<dyn Transport>> {
        let transport: Arc<dyn Transport> = self.0.clone();
        Ok(transport)
    }
}
