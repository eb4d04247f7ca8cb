use converge_engine::{
    converge, converge_import, ConvergenceRequest, Created, FetchOutcome, KvWrite, RemoteClient,
    WriteOutcome,
};
use converge_types::{
    ActionKind, ConvergeError, DeleteReport, DesiredState, EndpointSpec, EndpointState,
    IdempotencyToken, KvSpec, ModifyIndex, ObservedState, ResourceKey,
};
use async_trait::async_trait;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

/// Double that fails the test on any interaction. Used to prove that
/// preflight rejections never reach the backend.
struct NoCallClient;

#[async_trait]
impl RemoteClient for NoCallClient {
    async fn fetch(&self, _key: &ResourceKey) -> Result<FetchOutcome, ConvergeError> {
        panic!("unexpected fetch")
    }
    async fn create(&self, _spec: &EndpointSpec, _dry_run: bool) -> Result<Created, ConvergeError> {
        panic!("unexpected create")
    }
    async fn delete(
        &self,
        _keys: &[ResourceKey],
        _recurse: bool,
        _dry_run: bool,
    ) -> Result<DeleteReport, ConvergeError> {
        panic!("unexpected delete")
    }
    async fn conditional_write(&self, _write: &KvWrite) -> Result<WriteOutcome, ConvergeError> {
        panic!("unexpected conditional_write")
    }
    async fn bulk_fetch_by_prefix(
        &self,
        _prefix: &str,
    ) -> Result<Vec<(ResourceKey, ObservedState)>, ConvergeError> {
        panic!("unexpected bulk_fetch_by_prefix")
    }
}

/// Scripted double shared by the end-to-end style tests below.
#[derive(Default)]
struct ScriptedClient {
    log: Mutex<Vec<&'static str>>,
    fetch_q: Mutex<VecDeque<Result<FetchOutcome, ConvergeError>>>,
    create_q: Mutex<VecDeque<Result<Created, ConvergeError>>>,
    write_q: Mutex<VecDeque<Result<WriteOutcome, ConvergeError>>>,
    repeat_pending_fetches: bool,
}

impl ScriptedClient {
    fn log(&self) -> Vec<&'static str> {
        self.log.lock().unwrap().clone()
    }
    fn script_fetch(&self, response: Result<FetchOutcome, ConvergeError>) {
        self.fetch_q.lock().unwrap().push_back(response);
    }
    fn script_create(&self, response: Result<Created, ConvergeError>) {
        self.create_q.lock().unwrap().push_back(response);
    }
    fn script_write(&self, response: Result<WriteOutcome, ConvergeError>) {
        self.write_q.lock().unwrap().push_back(response);
    }
}

#[async_trait]
impl RemoteClient for ScriptedClient {
    async fn fetch(&self, _key: &ResourceKey) -> Result<FetchOutcome, ConvergeError> {
        self.log.lock().unwrap().push("fetch");
        if let Some(next) = self.fetch_q.lock().unwrap().pop_front() {
            return next;
        }
        if self.repeat_pending_fetches {
            return Ok(FetchOutcome::Found(observed_endpoint(
                EndpointState::Pending,
            )));
        }
        panic!("unscripted fetch")
    }
    async fn create(&self, _spec: &EndpointSpec, _dry_run: bool) -> Result<Created, ConvergeError> {
        self.log.lock().unwrap().push("create");
        self.create_q.lock().unwrap().pop_front().expect("unscripted create")
    }
    async fn delete(
        &self,
        _keys: &[ResourceKey],
        _recurse: bool,
        _dry_run: bool,
    ) -> Result<DeleteReport, ConvergeError> {
        panic!("unexpected delete")
    }
    async fn conditional_write(&self, _write: &KvWrite) -> Result<WriteOutcome, ConvergeError> {
        self.log.lock().unwrap().push("write");
        self.write_q.lock().unwrap().pop_front().expect("unscripted write")
    }
    async fn bulk_fetch_by_prefix(
        &self,
        _prefix: &str,
    ) -> Result<Vec<(ResourceKey, ObservedState)>, ConvergeError> {
        panic!("unexpected bulk_fetch_by_prefix")
    }
}

fn endpoint_spec() -> EndpointSpec {
    EndpointSpec {
        vpc_id: "vpc-12345678".into(),
        service_name: "com.amazonaws.ap-southeast-2.s3".into(),
        policy_document: None,
        route_table_ids: vec!["rtb-1".into()],
        client_token: IdempotencyToken::new("token-1").unwrap(),
    }
}

fn observed_endpoint(state: EndpointState) -> ObservedState {
    let spec = endpoint_spec();
    ObservedState::Endpoint {
        endpoint_id: ResourceKey::new("vpce-0001"),
        state,
        vpc_id: spec.vpc_id,
        service_name: spec.service_name,
        policy_document: None,
        route_table_ids: spec.route_table_ids,
    }
}

fn observed_kv(key: &str, value: &str) -> ObservedState {
    ObservedState::Kv {
        key: ResourceKey::new(key),
        value: value.into(),
        flags: 0,
        modify_index: ModifyIndex::new(3),
        lock_session: None,
    }
}

// ── Preflight ─────────────────────────────────────────────────────

#[tokio::test]
async fn invalid_desired_state_never_reaches_the_backend() {
    let mut spec = endpoint_spec();
    spec.vpc_id.clear();
    let request = ConvergenceRequest::new(DesiredState::EndpointPresent(spec));

    let failure = converge(&request, &NoCallClient).await.unwrap_err();
    assert_eq!(failure.action, ActionKind::Create);
    assert!(matches!(failure.error, ConvergeError::Validation(_)));
}

#[tokio::test]
async fn preflight_failures_carry_the_intended_action_kind() {
    let request = ConvergenceRequest::new(DesiredState::EndpointAbsent {
        endpoint_ids: vec![],
    });
    let failure = converge(&request, &NoCallClient).await.unwrap_err();
    assert_eq!(failure.action, ActionKind::Delete);
}

#[tokio::test]
async fn converge_rejects_bulk_import() {
    let request = ConvergenceRequest::new(DesiredState::KvImport {
        document: json!({"a": "b"}),
    });
    let failure = converge(&request, &NoCallClient).await.unwrap_err();
    assert!(matches!(failure.error, ConvergeError::Validation(_)));
}

#[tokio::test]
async fn converge_import_rejects_non_import_state() {
    let request = ConvergenceRequest::new(DesiredState::KvPresent(KvSpec::new("a/b", "v")));
    let failure = converge_import(&request, &NoCallClient).await.unwrap_err();
    assert!(matches!(failure.error, ConvergeError::Validation(_)));
}

// ── KV flow ───────────────────────────────────────────────────────

#[tokio::test]
async fn absent_kv_is_created_through_the_full_pipeline() {
    let client = ScriptedClient::default();
    client.script_fetch(Ok(FetchOutcome::Missing));
    client.script_write(Ok(WriteOutcome {
        committed: true,
        index: ModifyIndex::new(1),
    }));

    let request = ConvergenceRequest::new(DesiredState::KvPresent(KvSpec::new("a/b", "v1")));
    let result = converge(&request, &client).await.unwrap();
    assert!(result.changed);
    assert_eq!(result.resource, Some(ResourceKey::new("a/b")));
    assert_eq!(client.log(), vec!["fetch", "write"]);
}

#[tokio::test]
async fn converged_kv_reruns_as_noop() {
    let client = ScriptedClient::default();
    client.script_fetch(Ok(FetchOutcome::Found(observed_kv("a/b", "v1"))));

    let request = ConvergenceRequest::new(DesiredState::KvPresent(KvSpec::new("a/b", "v1")));
    let result = converge(&request, &client).await.unwrap();
    assert!(!result.changed);
    assert_eq!(client.log(), vec!["fetch"]);
}

#[tokio::test(start_paused = true)]
async fn transient_observation_failures_are_retried() {
    let client = ScriptedClient::default();
    client.script_fetch(Err(ConvergeError::BackendUnavailable("503".into())));
    client.script_fetch(Err(ConvergeError::BackendUnavailable("503".into())));
    client.script_fetch(Ok(FetchOutcome::Missing));
    client.script_write(Ok(WriteOutcome {
        committed: true,
        index: ModifyIndex::new(1),
    }));

    let request = ConvergenceRequest::new(DesiredState::KvPresent(KvSpec::new("a/b", "v1")));
    let result = converge(&request, &client).await.unwrap();
    assert!(result.changed);
    assert_eq!(client.log(), vec!["fetch", "fetch", "fetch", "write"]);
}

#[tokio::test]
async fn exhausted_observation_retries_fail_the_request() {
    let mut request = ConvergenceRequest::new(DesiredState::KvPresent(KvSpec::new("a/b", "v1")));
    request.max_retries = 0;

    let client = ScriptedClient::default();
    client.script_fetch(Err(ConvergeError::BackendUnavailable("503".into())));

    let failure = converge(&request, &client).await.unwrap_err();
    assert!(matches!(failure.error, ConvergeError::BackendUnavailable(_)));
    assert_eq!(client.log(), vec!["fetch"]);
}

// ── Wait phase ────────────────────────────────────────────────────

fn created() -> Created {
    Created {
        key: ResourceKey::new("vpce-0001"),
        observed: observed_endpoint(EndpointState::Pending),
    }
}

#[tokio::test(start_paused = true)]
async fn wait_polls_created_endpoint_until_available() {
    let client = ScriptedClient::default();
    client.script_create(Ok(created()));
    client.script_fetch(Ok(FetchOutcome::Found(observed_endpoint(
        EndpointState::Pending,
    ))));
    client.script_fetch(Ok(FetchOutcome::Found(observed_endpoint(
        EndpointState::Available,
    ))));

    let request = ConvergenceRequest::new(DesiredState::EndpointPresent(endpoint_spec()))
        .wait(Duration::from_secs(320));
    let result = converge(&request, &client).await.unwrap();
    assert!(result.changed);
    assert_eq!(result.resource, Some(ResourceKey::new("vpce-0001")));
    // The final observation replaces the creation payload.
    assert_eq!(result.payload["Endpoint"]["state"], json!("available"));
    assert_eq!(client.log(), vec!["create", "fetch", "fetch"]);
}

#[tokio::test(start_paused = true)]
async fn wait_deadline_fails_with_wait_timeout() {
    let client = ScriptedClient {
        repeat_pending_fetches: true,
        ..ScriptedClient::default()
    };
    client.script_create(Ok(created()));

    let request = ConvergenceRequest::new(DesiredState::EndpointPresent(endpoint_spec()))
        .wait(Duration::from_secs(40));
    let failure = converge(&request, &client).await.unwrap_err();
    match failure.error {
        ConvergeError::WaitTimeout { key, target } => {
            assert_eq!(key, ResourceKey::new("vpce-0001"));
            assert_eq!(target, EndpointState::Available);
        }
        other => panic!("expected WaitTimeout, got {other:?}"),
    }
}

#[tokio::test]
async fn dry_run_never_enters_the_wait_phase() {
    let client = ScriptedClient::default();
    client.script_create(Ok(created()));

    let request = ConvergenceRequest::new(DesiredState::EndpointPresent(endpoint_spec()))
        .dry_run()
        .wait(Duration::from_secs(320));
    let result = converge(&request, &client).await.unwrap();
    assert!(result.changed);
    // One validation-only create call, zero polls.
    assert_eq!(client.log(), vec!["create"]);
}

#[tokio::test]
async fn kv_writes_with_wait_are_committed_not_polled() {
    // KV entries have no lifecycle status; the wait flag must not turn a
    // committed write into a timeout.
    let client = ScriptedClient::default();
    client.script_fetch(Ok(FetchOutcome::Missing));
    client.script_write(Ok(WriteOutcome {
        committed: true,
        index: ModifyIndex::new(1),
    }));

    let request = ConvergenceRequest::new(DesiredState::KvPresent(KvSpec::new("a/b", "v1")))
        .wait(Duration::from_secs(320));
    let result = converge(&request, &client).await.unwrap();
    assert!(result.changed);
    assert_eq!(result.resource, Some(ResourceKey::new("a/b")));
    assert_eq!(client.log(), vec!["fetch", "write"]);
}

#[tokio::test]
async fn delete_requests_are_never_polled() {
    let client = ScriptedClient::default();
    client.script_fetch(Ok(FetchOutcome::Missing));

    let request = ConvergenceRequest::new(DesiredState::KvAbsent {
        key: "a/b".into(),
        recurse: false,
    })
    .wait(Duration::from_secs(320));
    let result = converge(&request, &client).await.unwrap();
    assert!(!result.changed);
    assert_eq!(client.log(), vec!["fetch"]);
}
