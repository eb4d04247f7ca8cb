use converge_types::{
    ConvergeError, DesiredState, EndpointSpec, EndpointState, IdempotencyToken, KvSpec,
    ModifyIndex, ObservedState, ResourceKey, SessionId,
};
use pretty_assertions::assert_eq;
use serde_json::json;

fn endpoint_spec() -> EndpointSpec {
    EndpointSpec {
        vpc_id: "vpc-12345678".into(),
        service_name: "com.amazonaws.ap-southeast-2.s3".into(),
        policy_document: None,
        route_table_ids: vec!["rtb-1".into(), "rtb-2".into()],
        client_token: IdempotencyToken::new("token-1").unwrap(),
    }
}

fn observed_endpoint(spec: &EndpointSpec) -> ObservedState {
    ObservedState::Endpoint {
        endpoint_id: ResourceKey::new("vpce-0001"),
        state: EndpointState::Available,
        vpc_id: spec.vpc_id.clone(),
        service_name: spec.service_name.clone(),
        policy_document: spec.policy_document.clone(),
        route_table_ids: spec.route_table_ids.clone(),
    }
}

fn observed_kv(value: &str, flags: u64) -> ObservedState {
    ObservedState::Kv {
        key: ResourceKey::new("a/b"),
        value: value.into(),
        flags,
        modify_index: ModifyIndex::new(7),
        lock_session: None,
    }
}

// ── Validation ────────────────────────────────────────────────────

#[test]
fn endpoint_present_requires_vpc_id() {
    let mut spec = endpoint_spec();
    spec.vpc_id.clear();
    let err = DesiredState::EndpointPresent(spec).validate().unwrap_err();
    assert!(matches!(err, ConvergeError::Validation(_)));
}

#[test]
fn endpoint_present_requires_service_name() {
    let mut spec = endpoint_spec();
    spec.service_name.clear();
    let err = DesiredState::EndpointPresent(spec).validate().unwrap_err();
    assert!(matches!(err, ConvergeError::Validation(_)));
}

#[test]
fn endpoint_absent_requires_at_least_one_id() {
    let desired = DesiredState::EndpointAbsent {
        endpoint_ids: vec![],
    };
    assert!(matches!(
        desired.validate(),
        Err(ConvergeError::Validation(_))
    ));
}

#[test]
fn kv_present_requires_key() {
    let desired = DesiredState::KvPresent(KvSpec::new("", "v"));
    assert!(matches!(
        desired.validate(),
        Err(ConvergeError::Validation(_))
    ));
}

#[test]
fn lock_intents_require_session() {
    let spec = KvSpec::new("locks/leader", "node-1");
    assert!(matches!(
        DesiredState::KvAcquire(spec.clone()).validate(),
        Err(ConvergeError::Validation(_))
    ));
    assert!(matches!(
        DesiredState::KvRelease(spec).validate(),
        Err(ConvergeError::Validation(_))
    ));

    let mut with_session = KvSpec::new("locks/leader", "node-1");
    with_session.session = Some(SessionId::new("sess-1"));
    assert!(DesiredState::KvAcquire(with_session).validate().is_ok());
}

#[test]
fn empty_session_is_rejected() {
    let mut spec = KvSpec::new("locks/leader", "node-1");
    spec.session = Some(SessionId::new(""));
    assert!(matches!(
        DesiredState::KvAcquire(spec).validate(),
        Err(ConvergeError::Validation(_))
    ));
}

#[test]
fn import_requires_object_document() {
    let desired = DesiredState::KvImport {
        document: json!("just a string"),
    };
    assert!(matches!(
        desired.validate(),
        Err(ConvergeError::Validation(_))
    ));

    let ok = DesiredState::KvImport {
        document: json!({"a": "b"}),
    };
    assert!(ok.validate().is_ok());
}

// ── Endpoint semantic equality ────────────────────────────────────

#[test]
fn endpoint_matches_identical_observation() {
    let spec = endpoint_spec();
    assert!(spec.matches_observed(&observed_endpoint(&spec)));
}

#[test]
fn endpoint_route_tables_compare_as_sets() {
    let spec = endpoint_spec();
    let ObservedState::Endpoint {
        endpoint_id,
        state,
        vpc_id,
        service_name,
        policy_document,
        ..
    } = observed_endpoint(&spec)
    else {
        unreachable!()
    };
    let reordered = ObservedState::Endpoint {
        endpoint_id,
        state,
        vpc_id,
        service_name,
        policy_document,
        route_table_ids: vec!["rtb-2".into(), "rtb-1".into()],
    };
    assert!(spec.matches_observed(&reordered));
}

#[test]
fn endpoint_policy_compares_structurally() {
    let mut spec = endpoint_spec();
    spec.policy_document = Some(json!({"Statement": [{"Effect": "Allow"}], "Version": "2012-10-17"}));
    // Same document, different key order in the source text.
    let observed_policy: serde_json::Value =
        serde_json::from_str(r#"{"Version": "2012-10-17", "Statement": [{"Effect": "Allow"}]}"#)
            .unwrap();
    let mut observed = endpoint_spec();
    observed.policy_document = Some(observed_policy);
    assert!(spec.matches_observed(&observed_endpoint(&observed)));
}

#[test]
fn endpoint_unset_policy_accepts_backend_default() {
    let spec = endpoint_spec();
    let mut with_default_policy = endpoint_spec();
    with_default_policy.policy_document = Some(json!({"Statement": "full-access"}));
    assert!(spec.matches_observed(&observed_endpoint(&with_default_policy)));
}

#[test]
fn endpoint_differs_on_service() {
    let spec = endpoint_spec();
    let mut other = endpoint_spec();
    other.service_name = "com.amazonaws.ap-southeast-2.dynamodb".into();
    assert!(!spec.matches_observed(&observed_endpoint(&other)));
}

#[test]
fn endpoint_never_matches_kv_observation() {
    let spec = endpoint_spec();
    assert!(!spec.matches_observed(&observed_kv("v", 0)));
}

// ── KV semantic equality ──────────────────────────────────────────

#[test]
fn kv_matches_on_value() {
    let spec = KvSpec::new("a/b", "v1");
    assert!(spec.matches_observed(&observed_kv("v1", 99)));
    assert!(!spec.matches_observed(&observed_kv("v2", 99)));
}

#[test]
fn kv_unset_flags_are_dont_care() {
    let spec = KvSpec::new("a/b", "v1");
    assert!(spec.matches_observed(&observed_kv("v1", 12345)));
}

#[test]
fn kv_set_flags_must_match() {
    let mut spec = KvSpec::new("a/b", "v1");
    spec.flags = Some(7);
    assert!(spec.matches_observed(&observed_kv("v1", 7)));
    assert!(!spec.matches_observed(&observed_kv("v1", 8)));
}

// ── resource_key ──────────────────────────────────────────────────

#[test]
fn resource_key_known_up_front() {
    assert_eq!(
        DesiredState::KvPresent(KvSpec::new("a/b", "v")).resource_key(),
        Some(ResourceKey::new("a/b"))
    );
    assert_eq!(
        DesiredState::KvAbsent {
            key: "a/b".into(),
            recurse: false
        }
        .resource_key(),
        Some(ResourceKey::new("a/b"))
    );
    // Creation has no key until the backend assigns one.
    assert_eq!(
        DesiredState::EndpointPresent(endpoint_spec()).resource_key(),
        None
    );
}
