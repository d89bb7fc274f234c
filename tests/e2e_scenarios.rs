//! End-to-end test-runner scenarios against a real Chrome/Chromium binary.
//!
//! Ignored by default, same convention as `cdp-adapter`'s contract tests:
//! set `CDP_ORCHESTRATOR_CONTRACT_TESTS=1` and have Chrome on `PATH` to run
//! these for real.

use std::env;
use std::sync::Arc;

use async_trait::async_trait;
use cdp_adapter::CdpConfig;
use orchestrator_core_types::{RunStatus, TestDefinition};
use run_coordinator::RunCoordinator;
use serde_json::json;
use step_flow::{RunOptions, TestRepository};

fn contract_enabled() -> bool {
    env::var("CDP_ORCHESTRATOR_CONTRACT_TESTS")
        .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false)
}

fn headless_cdp() -> CdpConfig {
    CdpConfig { headless: true, ..CdpConfig::default() }
}

fn def_from(value: serde_json::Value) -> TestDefinition {
    serde_json::from_value(value).expect("fixture parses as a TestDefinition")
}

struct SingleTestRepo(TestDefinition);

#[async_trait]
impl TestRepository for SingleTestRepo {
    async fn get_test(&self, id: &str) -> Option<TestDefinition> {
        (self.0.id == id).then(|| self.0.clone())
    }
}

struct MapRepo(std::collections::HashMap<String, TestDefinition>);

#[async_trait]
impl TestRepository for MapRepo {
    async fn get_test(&self, id: &str) -> Option<TestDefinition> {
        self.0.get(id).cloned()
    }
}

#[tokio::test]
#[ignore = "requires Chrome/Chromium; set CDP_ORCHESTRATOR_CONTRACT_TESTS=1"]
async fn s1_eval_chain() {
    if !contract_enabled() {
        eprintln!("skipping (CDP_ORCHESTRATOR_CONTRACT_TESTS not enabled)");
        return;
    }

    let def = def_from(json!({
        "id": "s1-eval-chain",
        "url": "about:blank",
        "steps": [
            {"eval": "40+2", "as": "x"},
            {"eval": "$vars.x + 1", "as": "y"},
            {"assert": "$vars.y === 43"},
        ],
    }));

    let repo: Arc<dyn TestRepository> = Arc::new(SingleTestRepo(def.clone()));
    let result = step_flow::run_test(
        &def,
        repo,
        RunOptions { cdp: headless_cdp(), ..Default::default() },
        None,
    )
    .await
    .unwrap();

    assert!(matches!(result.status, RunStatus::Passed));
    assert_eq!(result.steps.len(), 3);
}

#[tokio::test]
#[ignore = "requires Chrome/Chromium; set CDP_ORCHESTRATOR_CONTRACT_TESTS=1"]
async fn s2_mock_runs_before_navigate() {
    if !contract_enabled() {
        eprintln!("skipping (CDP_ORCHESTRATOR_CONTRACT_TESTS not enabled)");
        return;
    }

    let def = def_from(json!({
        "id": "s2-mock-fetch",
        "before": [
            {"mock_network": {"match": "*/api/ping", "status": 200, "body": {"ok": true}}},
        ],
        "url": "about:blank",
        "steps": [
            {
                "eval": "fetch('/api/ping').then(r => r.json()).then(j => j.ok)",
                "as": "ok",
            },
            {"assert": "$vars.ok === true"},
        ],
    }));

    let repo: Arc<dyn TestRepository> = Arc::new(SingleTestRepo(def.clone()));
    let result = step_flow::run_test(
        &def,
        repo,
        RunOptions { cdp: headless_cdp(), ..Default::default() },
        None,
    )
    .await
    .unwrap();

    assert!(matches!(result.status, RunStatus::Passed));
}

#[tokio::test]
#[ignore = "requires Chrome/Chromium; set CDP_ORCHESTRATOR_CONTRACT_TESTS=1"]
async fn s3_loop_syncs_and_unsyncs_vars() {
    if !contract_enabled() {
        eprintln!("skipping (CDP_ORCHESTRATOR_CONTRACT_TESTS not enabled)");
        return;
    }

    let def = def_from(json!({
        "id": "s3-loop",
        "url": "about:blank",
        "steps": [
            {"eval": "[1,2,3]", "as": "xs"},
            {
                "loop": {
                    "over": "$vars.xs",
                    "as": "n",
                    "steps": [
                        {"eval": "$vars.n*2", "as": "doubled"},
                        {"assert": "$vars.doubled === $vars.n*2"},
                    ],
                },
            },
        ],
    }));

    let repo: Arc<dyn TestRepository> = Arc::new(SingleTestRepo(def.clone()));
    let result = step_flow::run_test(
        &def,
        repo,
        RunOptions { cdp: headless_cdp(), ..Default::default() },
        None,
    )
    .await
    .unwrap();

    assert!(matches!(result.status, RunStatus::Passed));
}

#[tokio::test]
#[ignore = "requires Chrome/Chromium; set CDP_ORCHESTRATOR_CONTRACT_TESTS=1"]
async fn s4_nested_test_cycle_fails_with_cycle_error() {
    if !contract_enabled() {
        eprintln!("skipping (CDP_ORCHESTRATOR_CONTRACT_TESTS not enabled)");
        return;
    }

    let test_a = def_from(json!({"id": "a", "steps": [{"run_test": "b"}]}));
    let test_b = def_from(json!({"id": "b", "steps": [{"run_test": "a"}]}));

    let mut tests = std::collections::HashMap::new();
    tests.insert("a".to_string(), test_a.clone());
    tests.insert("b".to_string(), test_b);
    let repo: Arc<dyn TestRepository> = Arc::new(MapRepo(tests));

    let result = step_flow::run_test(
        &test_a,
        repo,
        RunOptions { cdp: headless_cdp(), ..Default::default() },
        None,
    )
    .await
    .unwrap();

    assert!(matches!(result.status, RunStatus::Failed));
    let failure = result.failure.expect("a cycle should produce a failure detail");
    assert!(
        failure.message.to_lowercase().contains("cycle"),
        "expected a cycle error, got: {}",
        failure.message
    );
}

#[tokio::test]
#[ignore = "requires Chrome/Chromium; set CDP_ORCHESTRATOR_CONTRACT_TESTS=1"]
async fn s5_assert_retries_until_the_flag_is_set() {
    if !contract_enabled() {
        eprintln!("skipping (CDP_ORCHESTRATOR_CONTRACT_TESTS not enabled)");
        return;
    }

    let def = def_from(json!({
        "id": "s5-retry-pass",
        "url": "about:blank",
        "steps": [
            {"eval": "setTimeout(() => { window.flag = true; }, 150); true"},
            {"assert": "window.flag === true", "retry": {"interval": 50, "timeout": 300}},
        ],
    }));

    let repo: Arc<dyn TestRepository> = Arc::new(SingleTestRepo(def.clone()));
    let result = step_flow::run_test(
        &def,
        repo,
        RunOptions { cdp: headless_cdp(), ..Default::default() },
        None,
    )
    .await
    .unwrap();

    assert!(matches!(result.status, RunStatus::Passed));
}

#[tokio::test]
#[ignore = "requires Chrome/Chromium; set CDP_ORCHESTRATOR_CONTRACT_TESTS=1"]
async fn s5_assert_fails_when_the_flag_never_sets() {
    if !contract_enabled() {
        eprintln!("skipping (CDP_ORCHESTRATOR_CONTRACT_TESTS not enabled)");
        return;
    }

    let def = def_from(json!({
        "id": "s5-retry-fail",
        "url": "about:blank",
        "steps": [
            {"assert": "window.flag === true", "retry": {"interval": 50, "timeout": 300}},
        ],
    }));

    let repo: Arc<dyn TestRepository> = Arc::new(SingleTestRepo(def.clone()));
    let result = step_flow::run_test(
        &def,
        repo,
        RunOptions { cdp: headless_cdp(), ..Default::default() },
        None,
    )
    .await
    .unwrap();

    assert!(matches!(result.status, RunStatus::Failed));
    let failure = result.failure.expect("an unsatisfied assert should produce a failure detail");
    assert!(failure.message.to_lowercase().contains("assert"));
}

#[tokio::test]
#[ignore = "requires Chrome/Chromium; set CDP_ORCHESTRATOR_CONTRACT_TESTS=1"]
async fn s6_concurrent_run_is_rejected() {
    if !contract_enabled() {
        eprintln!("skipping (CDP_ORCHESTRATOR_CONTRACT_TESTS not enabled)");
        return;
    }

    let slow = def_from(json!({
        "id": "s6-slow",
        "url": "about:blank",
        "steps": [{"wait": 500}],
    }));
    let quick = def_from(json!({"id": "s6-quick", "url": "about:blank", "steps": []}));

    let repo: Arc<dyn TestRepository> = Arc::new(MapRepo(std::collections::HashMap::new()));
    let bus = orchestrator_event_bus::run_event_bus(16);
    let coordinator = Arc::new(RunCoordinator::new(repo, bus));

    let first = {
        let coordinator = coordinator.clone();
        let slow = slow.clone();
        tokio::spawn(async move {
            coordinator
                .run(&slow, RunOptions { cdp: headless_cdp(), ..Default::default() })
                .await
        })
    };

    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    let rejected = coordinator
        .run(&quick, RunOptions { cdp: headless_cdp(), ..Default::default() })
        .await;
    assert!(rejected.is_err(), "a concurrent run should be rejected while the first is active");

    let first_result = first.await.unwrap().unwrap();
    assert!(matches!(first_result.status, RunStatus::Passed));

    let accepted_after = coordinator
        .run(&quick, RunOptions { cdp: headless_cdp(), ..Default::default() })
        .await;
    assert!(accepted_after.is_ok(), "the coordinator should accept a run once the mutex clears");
}
