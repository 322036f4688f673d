//! Transports carrying XML-RPC calls: live HTTP, plus record/replay wrappers
//! around a fixture session.

use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use bytes::Bytes;
use tracing::{debug, warn};

use oca_fixture::{FixtureSession, Outcome, RecordedCall};

use crate::wire::{self, RpcValue};
use crate::RpcError;

/// One blocking request/response exchange with the API endpoint.
#[async_trait]
pub trait RpcTransport: Send + Sync {
    async fn call(&self, method: &str, params: &[RpcValue]) -> Result<RpcValue, RpcError>;
}

/// Live transport POSTing method calls to an XML-RPC endpoint.
pub struct HttpTransport {
    endpoint: String,
    http: reqwest::Client,
}

impl HttpTransport {
    pub fn new(endpoint: impl Into<String>) -> Self {
        HttpTransport {
            endpoint: endpoint.into(),
            http: reqwest::Client::new(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl RpcTransport for HttpTransport {
    async fn call(&self, method: &str, params: &[RpcValue]) -> Result<RpcValue, RpcError> {
        let body = wire::encode_call(method, params);
        debug!(method, endpoint = %self.endpoint, "issuing XML-RPC call");
        let response = self
            .http
            .post(&self.endpoint)
            .header("content-type", "text/xml")
            .body(body)
            .send()
            .await
            .map_err(|err| RpcError::Http(err.to_string()))?;
        let payload: Bytes = response
            .bytes()
            .await
            .map_err(|err| RpcError::Http(err.to_string()))?;
        wire::decode_response(&payload)
    }
}

pub(crate) fn lock(session: &Arc<Mutex<FixtureSession>>) -> MutexGuard<'_, FixtureSession> {
    // A poisoned lock only means a test panicked mid-call; the session
    // data is still usable.
    session.lock().unwrap_or_else(|err| err.into_inner())
}

/// Transport that executes against a live inner transport and records every
/// outcome under the session's active unit-test label.
pub struct RecordTransport<T: RpcTransport> {
    live: T,
    session: Arc<Mutex<FixtureSession>>,
}

impl<T: RpcTransport> RecordTransport<T> {
    pub fn new(live: T, session: Arc<Mutex<FixtureSession>>) -> Self {
        RecordTransport { live, session }
    }
}

#[async_trait]
impl<T: RpcTransport> RpcTransport for RecordTransport<T> {
    async fn call(&self, method: &str, params: &[RpcValue]) -> Result<RpcValue, RpcError> {
        let result = self.live.call(method, params).await;
        let outcome = match &result {
            Ok(value) => Outcome::Success {
                value: value.to_json(),
            },
            Err(RpcError::Fault { code, message }) => Outcome::Fault {
                code: *code,
                message: message.clone(),
            },
            // A transport failure is not an API outcome; leave no trace.
            Err(_) => return result,
        };
        let signature =
            serde_json::Value::Array(params.iter().map(RpcValue::to_json).collect());
        lock(&self.session).append(RecordedCall {
            method: method.to_string(),
            params: signature,
            outcome,
        })?;
        result
    }
}

/// Transport serving recorded outcomes without touching the network.
///
/// Replay is response-only: entries are matched by the active label and
/// ordinal position, never by method name or argument content, so a caller
/// passing different arguments than were recorded still gets the recording.
pub struct ReplayTransport {
    session: Arc<Mutex<FixtureSession>>,
}

impl ReplayTransport {
    pub fn new(session: Arc<Mutex<FixtureSession>>) -> Self {
        ReplayTransport { session }
    }
}

#[async_trait]
impl RpcTransport for ReplayTransport {
    async fn call(&self, method: &str, _params: &[RpcValue]) -> Result<RpcValue, RpcError> {
        let call = lock(&self.session).next()?;
        if call.method != method {
            warn!(
                recorded = %call.method,
                requested = method,
                "replaying an entry recorded under a different method"
            );
        }
        match call.outcome {
            Outcome::Success { value } => Ok(RpcValue::from_json(&value)),
            Outcome::Fault { code, message } => Err(RpcError::Fault { code, message }),
        }
    }
}
