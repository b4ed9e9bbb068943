mod fakes;

use std::rc::Rc;

use fakes::{host, TestEnv, WAKE_MAC};
use rebalancer::core::api::Api;
use rebalancer::core::common::SuspendState;
use rebalancer::core::config::LoadBalancerConfig;
use serde_json::json;

fn api(env: &TestEnv) -> Api {
    Api::new(
        Rc::new(LoadBalancerConfig::new()),
        env.store.clone(),
        env.rules.clone(),
        env.compute_api(),
        env.wol_api(),
    )
}

#[test]
fn test_rule_crud() {
    let env = TestEnv::new();
    let api = api(&env);

    let created = api
        .create_rule(&json!({"lb_rules": {"type": "host", "value": "node1", "allow": false}}))
        .unwrap();
    assert_eq!(created.rule.id, 1);
    assert_eq!(created.rule.rule_type, "host");
    assert_eq!(created.rule.value, "node1");

    let listed = api.list_rules();
    assert_eq!(listed.rules.len(), 1);

    let shown = api.show_rule(1).unwrap();
    assert_eq!(shown.rule.value, "node1");

    api.delete_rule(1).unwrap();
    assert_eq!(api.show_rule(1).unwrap_err().status, 404);
    assert_eq!(api.delete_rule(1).unwrap_err().status, 404);
}

#[test]
fn test_create_rule_validation() {
    let env = TestEnv::new();
    let api = api(&env);

    let missing_body = api.create_rule(&json!({})).unwrap_err();
    assert_eq!(missing_body.status, 400);

    let bad_type = api
        .create_rule(&json!({"lb_rules": {"type": 5, "value": "x", "allow": true}}))
        .unwrap_err();
    assert_eq!(bad_type.status, 400);
    assert_eq!(bad_type.message, "Invalid lbrule type provided.");

    let bad_allow = api
        .create_rule(&json!({"lb_rules": {"type": "host", "value": "x", "allow": "yes"}}))
        .unwrap_err();
    assert_eq!(bad_allow.status, 400);
    assert_eq!(bad_allow.message, "allow key should be bool type.");

    let unknown_type = api
        .create_rule(&json!({"lb_rules": {"type": "rack", "value": "x", "allow": true}}))
        .unwrap_err();
    assert_eq!(unknown_type.status, 400);

    let bad_regex = api
        .create_rule(&json!({"lb_rules": {"type": "host", "value": "(", "allow": true}}))
        .unwrap_err();
    assert_eq!(bad_regex.status, 400);
}

#[test]
// The listing shows every host whatever its power state
fn test_list_hosts_view() {
    let env = TestEnv::new();
    env.add_default_cluster();
    let mut sleeper = host("node9", 9, 2, 2048, 0, 0.);
    sleeper.suspend_state = SuspendState::Suspended;
    sleeper.mac_to_wake = Some(WAKE_MAC.to_string());
    env.add_node(sleeper);

    let view = api(&env).list_hosts();
    assert_eq!(view.compute_nodes.len(), 3);

    let serialized = serde_json::to_value(&view).unwrap();
    let first = &serialized["compute_nodes"][0];
    assert_eq!(first["hypervisor_hostname"], "node1");
    assert_eq!(first["memory_total"], 1024);
    assert_eq!(first["memory_used"], 512);
    assert_eq!(first["suspend_state"], "active");
    assert_eq!(first["vcpus"], 1);
    let last = &serialized["compute_nodes"][2];
    assert_eq!(last["suspend_state"], "suspended");
    assert_eq!(last["mac_to_wake"], WAKE_MAC);
}

#[test]
// Suspending a host that is already draining answers 400 and leaves the
// state alone
fn test_suspend_host_wrong_state_is_bad_request() {
    let env = TestEnv::new();
    env.add_default_cluster();
    env.set_suspend_state("node1", SuspendState::Suspending);

    let err = api(&env)
        .suspend_host(&json!({"suspend_host": {"host": "node1"}}))
        .unwrap_err();

    assert_eq!(err.status, 400);
    assert_eq!(env.suspend_state("node1"), SuspendState::Suspending);
}

#[test]
fn test_suspend_host_forbidden_by_rule_is_bad_request() {
    let env = TestEnv::new();
    env.add_default_cluster();
    env.rules.borrow_mut().create("host", "node1", false).unwrap();

    let err = api(&env)
        .suspend_host(&json!({"suspend_host": {"host": "node1"}}))
        .unwrap_err();

    assert_eq!(err.status, 400);
    assert_eq!(env.suspend_state("node1"), SuspendState::Active);
}

#[test]
fn test_suspend_host_accepted() {
    let env = TestEnv::new();
    env.add_default_cluster();

    api(&env)
        .suspend_host(&json!({"suspend_host": {"host": "node1"}}))
        .unwrap();

    assert_eq!(env.suspend_state("node1"), SuspendState::Suspending);
}

#[test]
// A live-migration RPC failing mid-drain is not the caller's fault: the
// command answers 500 and the host stays in suspending for the advance
// tick to retry
fn test_suspend_host_transient_failure_is_server_error() {
    let env = TestEnv::new();
    env.add_default_cluster();
    env.compute.borrow_mut().fail_live_migrate = true;

    let err = api(&env)
        .suspend_host(&json!({"suspend_host": {"host": "node1"}}))
        .unwrap_err();

    assert_eq!(err.status, 500);
    assert_eq!(env.suspend_state("node1"), SuspendState::Suspending);
}

#[test]
fn test_unsuspend_host_transient_failure_is_server_error() {
    let env = TestEnv::new();
    let mut sleeper = host("node9", 9, 2, 2048, 0, 0.);
    sleeper.suspend_state = SuspendState::Suspended;
    sleeper.mac_to_wake = Some(WAKE_MAC.to_string());
    env.add_node(sleeper);
    env.wol.borrow_mut().fail = true;

    let err = api(&env)
        .unsuspend_host(&json!({"unsuspend_host": {"host": "node9"}}))
        .unwrap_err();

    assert_eq!(err.status, 500);
    assert_eq!(env.suspend_state("node9"), SuspendState::Suspended);
}

#[test]
fn test_unsuspend_host_unknown_node_is_bad_request() {
    let env = TestEnv::new();
    env.add_default_cluster();

    let err = api(&env)
        .unsuspend_host(&json!({"unsuspend_host": {"host": "node7"}}))
        .unwrap_err();

    assert_eq!(err.status, 400);
    assert_eq!(err.message, "Requested node not found");
}

#[test]
fn test_unsuspend_host_accepted() {
    let env = TestEnv::new();
    let mut sleeper = host("node9", 9, 2, 2048, 0, 0.);
    sleeper.suspend_state = SuspendState::Suspended;
    sleeper.mac_to_wake = Some(WAKE_MAC.to_string());
    env.add_node(sleeper);

    api(&env)
        .unsuspend_host(&json!({"unsuspend_host": {"host": "node9"}}))
        .unwrap();

    assert_eq!(env.wol.borrow().woken, vec![WAKE_MAC.to_string()]);
    assert_eq!(env.suspend_state("node9"), SuspendState::Active);
}

#[test]
fn test_missing_host_key_is_bad_request() {
    let env = TestEnv::new();
    let err = api(&env).suspend_host(&json!({"suspend_host": {}})).unwrap_err();
    assert_eq!(err.status, 400);
}
