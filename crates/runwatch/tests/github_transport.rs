//! Integration tests for the GitHub transport against a mock HTTP server.

use std::time::Duration;

use mockito::{Matcher, Server, ServerGuard};
use runwatch::{
    cancel_pair, CancelSignal, GithubTransport, Outcome, ProviderConfig, RunId, StatusSource,
    WaitConfig, Waiter, WatchError,
};
use runwatch_domain::RunStatus;
use serde_json::{json, Value};

const RUN_PATH: &str = "/repos/acme/widgets/actions/runs/42";
const JOBS_PATH: &str = "/repos/acme/widgets/actions/runs/42/jobs";

fn transport(server: &ServerGuard) -> GithubTransport {
    let config = ProviderConfig::default()
        .with_api_url(&server.url())
        .with_repository("acme/widgets")
        .with_token("t0ken")
        .with_request_timeout(Duration::from_secs(5));
    GithubTransport::new(config).expect("transport")
}

fn run_body(status: &str, conclusion: Option<&str>) -> String {
    json!({
        "id": 42,
        "name": "CI",
        "status": status,
        "conclusion": conclusion,
        "head_sha": "90d6bc9cd0a659c96f871a7a00989ed4f4b5cfff",
        "unknown_future_field": { "nested": true },
    })
    .to_string()
}

fn job(id: u64, status: &str) -> Value {
    json!({
        "id": id,
        "name": format!("job-{id}"),
        "status": status,
        "conclusion": null,
        "steps": []
    })
}

/// Test: one fetch reads the run and its jobs with the expected headers
#[tokio::test]
async fn test_fetch_builds_snapshot() {
    let mut server = Server::new_async().await;
    let run_mock = server
        .mock("GET", RUN_PATH)
        .match_query(Matcher::Any)
        .match_header("accept", "application/vnd.github+json")
        .match_header("x-github-api-version", "2022-11-28")
        .match_header("authorization", "Bearer t0ken")
        .match_header("user-agent", Matcher::Regex("^runwatch/".into()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(run_body("in_progress", None))
        .create_async()
        .await;
    let jobs_mock = server
        .mock("GET", JOBS_PATH)
        .match_query(Matcher::UrlEncoded("page".into(), "1".into()))
        .with_status(200)
        .with_body(json!({ "total_count": 2, "jobs": [job(1, "completed"), job(2, "in_progress")] }).to_string())
        .create_async()
        .await;

    let mut transport = transport(&server);
    let snapshot = transport.fetch(&RunId::from(42u64)).await.expect("fetch");

    assert_eq!(snapshot.status(), RunStatus::InProgress);
    assert_eq!(snapshot.jobs().len(), 2);
    assert_eq!(snapshot.head_sha(), Some("90d6bc9cd0a659c96f871a7a00989ed4f4b5cfff"));
    run_mock.assert_async().await;
    jobs_mock.assert_async().await;
}

/// Test: jobs are collected across pages until total_count is reached
#[tokio::test]
async fn test_jobs_pagination() {
    let mut server = Server::new_async().await;
    let first_page: Vec<Value> = (1..=100).map(|id| job(id, "completed")).collect();

    server
        .mock("GET", RUN_PATH)
        .match_query(Matcher::Any)
        .with_body(run_body("in_progress", None))
        .create_async()
        .await;
    let page1 = server
        .mock("GET", JOBS_PATH)
        .match_query(Matcher::UrlEncoded("page".into(), "1".into()))
        .with_body(json!({ "total_count": 101, "jobs": first_page }).to_string())
        .create_async()
        .await;
    let page2 = server
        .mock("GET", JOBS_PATH)
        .match_query(Matcher::UrlEncoded("page".into(), "2".into()))
        .with_body(json!({ "total_count": 101, "jobs": [job(101, "queued")] }).to_string())
        .create_async()
        .await;

    let snapshot = transport(&server)
        .fetch(&RunId::from(42u64))
        .await
        .expect("fetch");

    assert_eq!(snapshot.jobs().len(), 101);
    assert_eq!(snapshot.payload().jobs["total_count"], 101);
    page1.assert_async().await;
    page2.assert_async().await;
}

/// Test: HTTP errors and non-JSON bodies are transport errors
#[tokio::test]
async fn test_http_failures_are_transport_errors() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", RUN_PATH)
        .match_query(Matcher::Any)
        .with_status(401)
        .with_body(r#"{"message":"Bad credentials"}"#)
        .create_async()
        .await;

    let err = transport(&server)
        .fetch(&RunId::from(42u64))
        .await
        .expect_err("401 must fail");
    assert!(matches!(err, WatchError::Transport(ref msg) if msg.contains("401")));
    assert!(err.is_retryable());
    mock.remove_async().await;

    server
        .mock("GET", RUN_PATH)
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body("<html>unicorn</html>")
        .create_async()
        .await;
    let err = transport(&server)
        .fetch(&RunId::from(42u64))
        .await
        .expect_err("html must fail");
    assert!(matches!(err, WatchError::Transport(ref msg) if msg.contains("non-JSON")));
}

/// Test: JSON that does not fit the schema is a malformed snapshot
#[tokio::test]
async fn test_schema_mismatch_is_malformed() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", RUN_PATH)
        .match_query(Matcher::Any)
        .with_body(json!({ "id": 42, "status": "teleporting" }).to_string())
        .create_async()
        .await;
    server
        .mock("GET", JOBS_PATH)
        .match_query(Matcher::Any)
        .with_body(json!({ "total_count": 0, "jobs": [] }).to_string())
        .create_async()
        .await;

    let err = transport(&server)
        .fetch(&RunId::from(42u64))
        .await
        .expect_err("unknown status must fail");
    assert!(matches!(err, WatchError::MalformedSnapshot(_)));
}

/// Test: persistent 503s end the wait with a TransportError outcome
#[tokio::test]
async fn test_waiter_gives_up_after_retry_bound() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", RUN_PATH)
        .match_query(Matcher::Any)
        .with_status(503)
        .expect(4)
        .create_async()
        .await;

    let config = WaitConfig::new(RunId::from(42u64))
        .with_interval(Duration::ZERO)
        .with_max_retries(3);
    let mut waiter = Waiter::new(transport(&server), config);
    let outcome = waiter.wait().await.expect("wait");

    assert!(matches!(outcome, Outcome::TransportError { attempts: 4, .. }));
    assert_eq!(outcome.exit_code(), 4);
    assert!(waiter.state().history().is_empty());
    mock.assert_async().await;
}

/// Test: run lookup by commit picks the newest run
#[tokio::test]
async fn test_latest_run_for_commit() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/repos/acme/widgets/actions/runs")
        .match_query(Matcher::UrlEncoded("head_sha".into(), "abc123".into()))
        .with_body(
            json!({
                "total_count": 3,
                "workflow_runs": [
                    { "id": 100, "created_at": "2025-11-09T18:00:00Z" },
                    { "id": 300, "created_at": "2025-11-09T18:05:00Z" },
                    { "id": 200, "created_at": "2025-11-09T18:02:00Z" }
                ]
            })
            .to_string(),
        )
        .create_async()
        .await;

    let run = transport(&server)
        .latest_run_for_commit("abc123")
        .await
        .expect("lookup");
    assert_eq!(run, Some(RunId::from(300u64)));
}

/// Test: resolving a commit with no runs gives RunNotFound after the attempts
#[tokio::test]
async fn test_resolve_run_not_found() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/repos/acme/widgets/actions/runs")
        .match_query(Matcher::Any)
        .with_body(json!({ "total_count": 0, "workflow_runs": [] }).to_string())
        .expect(3)
        .create_async()
        .await;

    let err = transport(&server)
        .resolve_run_for_commit("abc123", 3, Duration::ZERO, &CancelSignal::never())
        .await
        .expect_err("no run");
    assert!(matches!(err, WatchError::RunNotFound(ref sha) if sha == "abc123"));
    mock.assert_async().await;
}

/// Test: cancelling while no run exists yet stops the lookup between attempts
#[tokio::test]
async fn test_resolve_run_stops_on_cancel() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/repos/acme/widgets/actions/runs")
        .match_query(Matcher::Any)
        .with_body(json!({ "total_count": 0, "workflow_runs": [] }).to_string())
        .create_async()
        .await;

    let (handle, signal) = cancel_pair();
    let canceller = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        handle.cancel();
    });

    let started = std::time::Instant::now();
    let resolved = transport(&server)
        .resolve_run_for_commit("abc123", 30, Duration::from_secs(1), &signal)
        .await
        .expect("cancelled lookup is not an error");

    assert_eq!(resolved, None);
    assert!(started.elapsed() < Duration::from_secs(5));
    canceller.await.expect("canceller");
}
