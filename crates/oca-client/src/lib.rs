//! XML-RPC client facade for an OpenNebula-style cloud orchestration API.
//!
//! [`OneClient`] owns a transport (live HTTP, or a record/replay wrapper
//! around a fixture session), prepends the session credential to every call,
//! and interprets the API's `[success, payload, errcode]` result triple.
//! Pool and resource verbs return parsed [`oca_xml::Node`] trees.
//!
//! Credential rejections surface as [`RpcError::Authentication`], a distinct
//! kind from [`RpcError::Api`] and [`RpcError::Fault`], so callers can branch
//! on authentication without matching message text.

use std::sync::{Arc, Mutex};

use thiserror::Error;
use tracing::debug;

use oca_acl::AclRule;
use oca_fixture::{FixtureMode, FixtureSession};
use oca_states::HostStatus;
use oca_xml::Node;

pub mod transport;
pub mod wire;

pub use transport::{HttpTransport, RecordTransport, ReplayTransport, RpcTransport};
pub use wire::RpcValue;

use transport::lock;

/// API error code the server returns when credentials are rejected.
const AUTHENTICATION_ERROR: i64 = 0x0100;

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("xml binding: {0}")]
    Xml(#[from] oca_xml::XmlError),
    #[error("fixture: {0}")]
    Fixture(#[from] oca_fixture::FixtureError),
    #[error("http: {0}")]
    Http(String),
    #[error("XML-RPC fault {code}: {message}")]
    Fault { code: i64, message: String },
    #[error("authentication rejected: {0}")]
    Authentication(String),
    #[error("API error {code:#06x}: {message}")]
    Api { code: i64, message: String },
    #[error("malformed response: {0}")]
    Response(String),
    #[error("empty template payload")]
    EmptyPayload,
}

/// How an update call merges the submitted template into the stored one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateMode {
    Replace = 0,
    Merge = 1,
}

/// Client facade over one API endpoint.
///
/// Construct one per test runner or application context; there is no
/// process-wide instance. The fixture cursor inside a record/replay client is
/// single-writer state scoped to this client.
pub struct OneClient {
    session: String,
    transport: Box<dyn RpcTransport>,
    fixture: Option<Arc<Mutex<FixtureSession>>>,
}

impl OneClient {
    /// Live client talking straight to the endpoint, no fixtures.
    pub fn new(endpoint: &str, session: &str) -> Self {
        OneClient {
            session: session.to_string(),
            transport: Box::new(HttpTransport::new(endpoint)),
            fixture: None,
        }
    }

    /// Client whose calls are recorded to, or replayed from, a fixture
    /// session. Record mode still reaches the live endpoint; replay never
    /// touches the network.
    pub fn with_fixture(endpoint: &str, session: &str, fixture: FixtureSession) -> Self {
        let mode = fixture.mode();
        let shared = Arc::new(Mutex::new(fixture));
        let transport: Box<dyn RpcTransport> = match mode {
            FixtureMode::Record => Box::new(RecordTransport::new(
                HttpTransport::new(endpoint),
                Arc::clone(&shared),
            )),
            FixtureMode::Replay => Box::new(ReplayTransport::new(Arc::clone(&shared))),
        };
        OneClient {
            session: session.to_string(),
            transport,
            fixture: Some(shared),
        }
    }

    /// Client over an arbitrary transport implementation.
    pub fn with_transport<T: RpcTransport + 'static>(transport: T, session: &str) -> Self {
        OneClient {
            session: session.to_string(),
            transport: Box::new(transport),
            fixture: None,
        }
    }

    /// Activate a fixture unit-test label. A no-op on live clients.
    pub fn set_fixture_unit_test(&self, label: &str) {
        if let Some(fixture) = &self.fixture {
            lock(fixture).set_unit_test(label);
        }
    }

    /// Flush a recording session to disk. A no-op on live and replay clients.
    pub fn close(&self) -> Result<(), RpcError> {
        if let Some(fixture) = &self.fixture {
            let session = lock(fixture);
            if session.mode() == FixtureMode::Record {
                session.save()?;
            }
        }
        Ok(())
    }

    /// Issue a raw API call. The session credential is prepended to `params`
    /// and the result triple is interpreted before the payload is returned.
    pub async fn call(&self, method: &str, params: &[RpcValue]) -> Result<RpcValue, RpcError> {
        let mut full = Vec::with_capacity(params.len() + 1);
        full.push(RpcValue::Str(self.session.clone()));
        full.extend_from_slice(params);
        let response = self.transport.call(method, &full).await?;
        interpret_response(method, response)
    }

    async fn call_body(&self, method: &str, params: &[RpcValue]) -> Result<String, RpcError> {
        match self.call(method, params).await? {
            RpcValue::Str(body) => Ok(body),
            other => Err(RpcError::Response(format!(
                "{method} returned a non-string payload: {other:?}"
            ))),
        }
    }

    async fn call_id(&self, method: &str, params: &[RpcValue]) -> Result<i64, RpcError> {
        match self.call(method, params).await? {
            RpcValue::Int(id) => Ok(id),
            other => Err(RpcError::Response(format!(
                "{method} returned a non-integer payload: {other:?}"
            ))),
        }
    }

    async fn info(&self, method: &str, params: &[RpcValue]) -> Result<Node, RpcError> {
        let body = self.call_body(method, params).await?;
        Ok(oca_xml::parse(body.as_bytes())?)
    }

    pub async fn hostpool_info(&self) -> Result<Node, RpcError> {
        self.info("one.hostpool.info", &[]).await
    }

    pub async fn host_info(&self, id: i64) -> Result<Node, RpcError> {
        self.info("one.host.info", &[RpcValue::Int(id)]).await
    }

    pub async fn host_allocate(
        &self,
        hostname: &str,
        im_mad: &str,
        vm_mad: &str,
        cluster_id: i64,
    ) -> Result<i64, RpcError> {
        self.call_id(
            "one.host.allocate",
            &[
                RpcValue::Str(hostname.to_string()),
                RpcValue::Str(im_mad.to_string()),
                RpcValue::Str(vm_mad.to_string()),
                RpcValue::Int(cluster_id),
            ],
        )
        .await
    }

    /// Set the administrative status of a host. The enum member is marshalled
    /// as its raw integer value.
    pub async fn host_status(&self, id: i64, status: HostStatus) -> Result<i64, RpcError> {
        self.call_id(
            "one.host.status",
            &[RpcValue::Int(id), RpcValue::Int(status.value())],
        )
        .await
    }

    /// Submit a template patch for a host, then re-fetch and re-wrap it.
    ///
    /// An empty patch is rejected client-side before any call is issued.
    pub async fn host_update(
        &self,
        id: i64,
        template: &Node,
        mode: UpdateMode,
    ) -> Result<Node, RpcError> {
        if template.is_empty() {
            return Err(RpcError::EmptyPayload);
        }
        let payload = template.to_xml();
        debug!(id, mode = ?mode, "updating host template");
        self.call_id(
            "one.host.update",
            &[
                RpcValue::Int(id),
                RpcValue::Str(payload),
                RpcValue::Int(mode as i64),
            ],
        )
        .await?;
        self.host_info(id).await
    }

    pub async fn vm_info(&self, id: i64) -> Result<Node, RpcError> {
        self.info("one.vm.info", &[RpcValue::Int(id)]).await
    }

    pub async fn vm_allocate(&self, template: &str) -> Result<i64, RpcError> {
        self.call_id(
            "one.vm.allocate",
            &[RpcValue::Str(template.to_string()), RpcValue::Bool(false)],
        )
        .await
    }

    pub async fn vmpool_info(
        &self,
        filter: i64,
        start: i64,
        end: i64,
        state: i64,
    ) -> Result<Node, RpcError> {
        self.info(
            "one.vmpool.info",
            &[
                RpcValue::Int(filter),
                RpcValue::Int(start),
                RpcValue::Int(end),
                RpcValue::Int(state),
            ],
        )
        .await
    }

    pub async fn marketpool_info(&self) -> Result<Node, RpcError> {
        self.info("one.marketpool.info", &[]).await
    }

    pub async fn marketapppool_info(
        &self,
        filter: i64,
        start: i64,
        end: i64,
    ) -> Result<Node, RpcError> {
        self.info(
            "one.marketapppool.info",
            &[
                RpcValue::Int(filter),
                RpcValue::Int(start),
                RpcValue::Int(end),
            ],
        )
        .await
    }

    pub async fn vnpool_info(&self, filter: i64, start: i64, end: i64) -> Result<Node, RpcError> {
        self.info(
            "one.vnpool.info",
            &[
                RpcValue::Int(filter),
                RpcValue::Int(start),
                RpcValue::Int(end),
            ],
        )
        .await
    }

    pub async fn datastorepool_info(&self) -> Result<Node, RpcError> {
        self.info("one.datastorepool.info", &[]).await
    }

    /// Register an encoded ACL rule.
    pub async fn acl_allocate(&self, rule: &AclRule) -> Result<i64, RpcError> {
        let mut params = vec![
            RpcValue::Str(rule.user.clone()),
            RpcValue::Str(rule.resource.clone()),
            RpcValue::Str(rule.rights.clone()),
        ];
        if let Some(zone) = &rule.zone {
            params.push(RpcValue::Str(zone.clone()));
        }
        self.call_id("one.acl.addrule", &params).await
    }
}

fn interpret_response(method: &str, value: RpcValue) -> Result<RpcValue, RpcError> {
    let items = value.into_array().ok_or_else(|| {
        RpcError::Response(format!("{method} did not return a result triple"))
    })?;
    let mut items = items.into_iter();
    let success = items
        .next()
        .and_then(|value| value.as_bool())
        .ok_or_else(|| RpcError::Response(format!("{method} triple lacks a success flag")))?;
    let payload = items
        .next()
        .ok_or_else(|| RpcError::Response(format!("{method} triple lacks a payload")))?;
    let code = items.next().and_then(|value| value.as_i64()).unwrap_or(0);

    if success {
        return Ok(payload);
    }
    let message = payload.as_str().unwrap_or_default().to_string();
    if code == AUTHENTICATION_ERROR {
        Err(RpcError::Authentication(message))
    } else {
        Err(RpcError::Api { code, message })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::path::PathBuf;

    use async_trait::async_trait;

    use oca_states::HostState;

    use super::*;

    const HOST_POOL: &str = r#"<HOST_POOL>
    <HOST>
        <ID>3</ID>
        <NAME>localhost1</NAME>
        <STATE>2</STATE>
        <IM_MAD>dummy</IM_MAD>
        <TEMPLATE><IM_MAD><![CDATA[dummy]]></IM_MAD></TEMPLATE>
    </HOST>
    <HOST>
        <ID>4</ID>
        <NAME>localhost2</NAME>
        <STATE>0</STATE>
        <IM_MAD>dummy</IM_MAD>
        <TEMPLATE/>
    </HOST>
</HOST_POOL>"#;

    const HOST_WITH_LABELS: &str = r#"<HOST>
    <ID>3</ID>
    <NAME>localhost1</NAME>
    <STATE>2</STATE>
    <TEMPLATE>
        <IM_MAD><![CDATA[dummy]]></IM_MAD>
        <LABELS><![CDATA[SSD]]></LABELS>
    </TEMPLATE>
</HOST>"#;

    /// Scripted transport, the test double for the live endpoint.
    struct MockTransport {
        responses: Mutex<VecDeque<Result<RpcValue, RpcError>>>,
        calls: Mutex<Vec<(String, Vec<RpcValue>)>>,
    }

    impl MockTransport {
        fn new(responses: Vec<Result<RpcValue, RpcError>>) -> Self {
            MockTransport {
                responses: Mutex::new(responses.into()),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<(String, Vec<RpcValue>)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl RpcTransport for MockTransport {
        async fn call(&self, method: &str, params: &[RpcValue]) -> Result<RpcValue, RpcError> {
            self.calls
                .lock()
                .unwrap()
                .push((method.to_string(), params.to_vec()));
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .expect("scripted response")
        }
    }

    fn ok_body(body: &str) -> Result<RpcValue, RpcError> {
        Ok(RpcValue::Array(vec![
            RpcValue::Bool(true),
            RpcValue::Str(body.to_string()),
            RpcValue::Int(0),
        ]))
    }

    fn ok_id(id: i64) -> Result<RpcValue, RpcError> {
        Ok(RpcValue::Array(vec![
            RpcValue::Bool(true),
            RpcValue::Int(id),
            RpcValue::Int(0),
        ]))
    }

    fn api_failure(message: &str, code: i64) -> Result<RpcValue, RpcError> {
        Ok(RpcValue::Array(vec![
            RpcValue::Bool(false),
            RpcValue::Str(message.to_string()),
            RpcValue::Int(code),
        ]))
    }

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("oca-client-{name}-{}.json.gz", std::process::id()))
    }

    #[tokio::test]
    async fn hostpool_info_parses_the_pool() {
        let mock = MockTransport::new(vec![ok_body(HOST_POOL)]);
        let one = OneClient::with_transport(mock, "oneadmin:onepass");
        let pool = one.hostpool_info().await.expect("pool info");
        let hosts = pool.list("HOST").unwrap();
        assert_eq!(hosts.len(), 2);
        assert_eq!(hosts[0].scalar("NAME").unwrap(), "localhost1");
        let state = HostState::from_raw(hosts[0].scalar_i64("STATE").unwrap()).unwrap();
        assert_eq!(state, HostState::Monitored);
    }

    #[tokio::test]
    async fn session_credential_is_the_first_parameter() {
        let mock = std::sync::Arc::new(MockTransport::new(vec![ok_body(HOST_POOL)]));
        let one = OneClient::with_transport(SharedTransport(mock.clone()), "oneadmin:onepass");
        one.hostpool_info().await.expect("pool info");
        let calls = mock.calls();
        assert_eq!(calls[0].0, "one.hostpool.info");
        assert_eq!(calls[0].1[0], RpcValue::Str("oneadmin:onepass".into()));
    }

    #[tokio::test]
    async fn authentication_failures_are_a_distinct_kind() {
        let mock = MockTransport::new(vec![api_failure(
            "[HostPoolInfo] User couldn't be authenticated, aborting call.",
            AUTHENTICATION_ERROR,
        )]);
        let one = OneClient::with_transport(mock, "oneadmin:invalidpass");
        let err = one.hostpool_info().await.unwrap_err();
        assert!(matches!(err, RpcError::Authentication(_)));
    }

    #[tokio::test]
    async fn business_failures_are_api_errors() {
        let mock = MockTransport::new(vec![api_failure(
            "[HostInfo] Error getting host [99].",
            0x0400,
        )]);
        let one = OneClient::with_transport(mock, "oneadmin:onepass");
        let err = one.host_info(99).await.unwrap_err();
        assert!(matches!(err, RpcError::Api { code: 0x0400, .. }));
    }

    #[tokio::test]
    async fn unknown_methods_fault() {
        let mock = MockTransport::new(vec![Err(RpcError::Fault {
            code: -32601,
            message: "Unknown method".into(),
        })]);
        let one = OneClient::with_transport(mock, "oneadmin:onepass");
        let err = one.call("one.invalid.api.call", &[]).await.unwrap_err();
        assert!(matches!(err, RpcError::Fault { .. }));
    }

    #[tokio::test]
    async fn host_update_serializes_and_refetches() {
        let mock = MockTransport::new(vec![ok_id(3), ok_body(HOST_WITH_LABELS)]);
        let one = OneClient::with_transport(mock, "oneadmin:onepass");
        let patch = Node::template(&[("LABELS", "SSD")]);
        let host = one
            .host_update(3, &patch, UpdateMode::Merge)
            .await
            .expect("update");
        assert_eq!(host.child("TEMPLATE").unwrap().scalar("LABELS").unwrap(), "SSD");
    }

    #[tokio::test]
    async fn host_update_wire_shape() {
        let mock = std::sync::Arc::new(MockTransport::new(vec![ok_id(3), ok_body(HOST_WITH_LABELS)]));
        let one = OneClient::with_transport(SharedTransport(mock.clone()), "oneadmin:onepass");
        let patch = Node::template(&[("LABELS", "SSD")]);
        one.host_update(3, &patch, UpdateMode::Merge)
            .await
            .expect("update");
        let calls = mock.calls();
        assert_eq!(calls.len(), 2);
        let (method, params) = &calls[0];
        assert_eq!(method, "one.host.update");
        assert_eq!(params[0], RpcValue::Str("oneadmin:onepass".into()));
        assert_eq!(params[1], RpcValue::Int(3));
        let template = params[2].as_str().unwrap();
        assert!(template.contains("<LABELS><![CDATA[SSD]]></LABELS>"));
        assert_eq!(params[3], RpcValue::Int(1));
        assert_eq!(calls[1].0, "one.host.info");
    }

    #[tokio::test]
    async fn empty_template_patch_never_reaches_the_wire() {
        let mock = std::sync::Arc::new(MockTransport::new(vec![]));
        let one = OneClient::with_transport(SharedTransport(mock.clone()), "oneadmin:onepass");
        let err = one
            .host_update(3, &Node::new("TEMPLATE"), UpdateMode::Merge)
            .await
            .unwrap_err();
        assert!(matches!(err, RpcError::EmptyPayload));
        assert!(mock.calls().is_empty());
    }

    #[tokio::test]
    async fn host_status_marshals_the_enum_as_an_integer() {
        let mock = std::sync::Arc::new(MockTransport::new(vec![ok_id(3)]));
        let one = OneClient::with_transport(SharedTransport(mock.clone()), "oneadmin:onepass");
        let id = one
            .host_status(3, HostStatus::Enabled)
            .await
            .expect("status");
        assert_eq!(id, 3);
        let calls = mock.calls();
        assert_eq!(calls[0].1[2], RpcValue::Int(0));
    }

    #[tokio::test]
    async fn record_then_replay_roundtrip() {
        let path = temp_path("record-replay");

        // Record two calls under one label against the scripted endpoint.
        let session = Arc::new(Mutex::new(FixtureSession::record(&path)));
        lock(&session).set_unit_test("test_pool_info");
        let live = MockTransport::new(vec![
            ok_body(HOST_POOL),
            Err(RpcError::Fault {
                code: -32601,
                message: "Unknown method".into(),
            }),
        ]);
        let recorder = RecordTransport::new(live, Arc::clone(&session));
        let value = recorder
            .call("one.hostpool.info", &[RpcValue::Str("oneadmin:onepass".into())])
            .await
            .expect("record success");
        assert!(matches!(value, RpcValue::Array(_)));
        let fault = recorder
            .call("one.invalid.api.call", &[])
            .await
            .unwrap_err();
        assert!(matches!(fault, RpcError::Fault { .. }));
        lock(&session).save().expect("save archive");

        // Replay from the saved archive through a full client, offline.
        let one = OneClient::with_fixture(
            "https://unreachable.example/RPC2",
            "oneadmin:onepass",
            FixtureSession::replay(&path).expect("load archive"),
        );
        one.set_fixture_unit_test("test_pool_info");
        let pool = one.hostpool_info().await.expect("replayed pool");
        assert_eq!(pool.list("HOST").unwrap().len(), 2);
        let err = one.call("one.invalid.api.call", &[]).await.unwrap_err();
        assert!(matches!(err, RpcError::Fault { .. }));

        // A third call runs past the recording.
        let err = one.hostpool_info().await.unwrap_err();
        assert!(matches!(
            err,
            RpcError::Fixture(oca_fixture::FixtureError::Exhausted { recorded: 2, .. })
        ));

        // Re-activating the label rewinds its cursor.
        one.set_fixture_unit_test("test_pool_info");
        one.hostpool_info().await.expect("replay from the start");

        std::fs::remove_file(&path).ok();
    }

    #[tokio::test]
    async fn acl_allocate_sends_encoded_components() {
        let mock = std::sync::Arc::new(MockTransport::new(vec![ok_id(12)]));
        let one = OneClient::with_transport(SharedTransport(mock.clone()), "oneadmin:onepass");
        let rule = oca_acl::parse_rule("#5 HOST+VM/@12 USE+MANAGE #0").unwrap();
        let id = one.acl_allocate(&rule).await.expect("allocate rule");
        assert_eq!(id, 12);
        let calls = mock.calls();
        assert_eq!(calls[0].0, "one.acl.addrule");
        assert_eq!(calls[0].1[1], RpcValue::Str("0x100000005".into()));
        assert_eq!(calls[0].1[2], RpcValue::Str("0x320000000c".into()));
        assert_eq!(calls[0].1[3], RpcValue::Str("0x3".into()));
        assert_eq!(calls[0].1[4], RpcValue::Str("0x100000000".into()));
    }

    /// Adapter sharing a mock between the test and the client.
    struct SharedTransport(std::sync::Arc<MockTransport>);

    #[async_trait]
    impl RpcTransport for SharedTransport {
        async fn call(&self, method: &str, params: &[RpcValue]) -> Result<RpcValue, RpcError> {
            self.0.call(method, params).await
        }
    }
}
