use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::StatusCode;
use serde_json::json;

use minerep_api::app::{ReportServices, build_app};
use minerep_auth::{JwtClaims, PrincipalId, Role};
use minerep_infra::{
    artifacts::LocalArtifactStore,
    config::ReportingConfig,
    jobs::InMemoryJobRecordStore,
    reports::{CatalogExecutor, ReportCatalog, StaticReportSource},
};

const JWT_SECRET: &str = "test-secret";

struct TestServer {
    base_url: String,
    source: Arc<StaticReportSource>,
    results_dir: tempfile::TempDir,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        Self::spawn_with(ReportingConfig::default()).await
    }

    async fn spawn_with(mut reporting: ReportingConfig) -> Self {
        let results_dir = tempfile::tempdir().expect("tempdir");
        reporting.results_dir = results_dir.path().to_path_buf();

        let source = Arc::new(StaticReportSource::demo());
        let artifacts = LocalArtifactStore::new(&reporting.results_dir);
        artifacts.ensure_root().await.expect("results dir");

        let services = ReportServices::new(
            Arc::new(InMemoryJobRecordStore::new()),
            Arc::new(CatalogExecutor::new(ReportCatalog::standard(), source.clone())),
            Arc::new(artifacts),
            &reporting,
        );

        // Build app (same router as prod), but bind to an ephemeral port.
        let app = build_app(Arc::new(services), JWT_SECRET.to_string());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url,
            source,
            results_dir,
            handle,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn mint_jwt(sub: &str, roles: Vec<Role>) -> String {
    let now = Utc::now();
    let claims = JwtClaims {
        sub: PrincipalId::new(sub).unwrap(),
        roles,
        issued_at: now,
        expires_at: now + ChronoDuration::minutes(10),
    };

    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .expect("failed to encode jwt")
}

fn reporter(sub: &str) -> String {
    mint_jwt(sub, vec![Role::REPORTER])
}

async fn submit(
    client: &reqwest::Client,
    srv: &TestServer,
    token: &str,
    body: serde_json::Value,
) -> reqwest::Response {
    client
        .post(srv.url("/reports/jobs"))
        .bearer_auth(token)
        .json(&body)
        .send()
        .await
        .unwrap()
}

async fn submit_daily(client: &reqwest::Client, srv: &TestServer, token: &str) -> i64 {
    let res = submit(
        client,
        srv,
        token,
        json!({"reportType": "DailyProduction", "criteria": {"date": "2024-03-01"}}),
    )
    .await;
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["success"], json!(true));
    body["requestId"].as_i64().expect("numeric requestId")
}

async fn status_of(
    client: &reqwest::Client,
    srv: &TestServer,
    token: &str,
    id: i64,
) -> serde_json::Value {
    let res = client
        .get(srv.url(&format!("/reports/jobs/{id}")))
        .bearer_auth(token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    res.json().await.unwrap()
}

async fn wait_for_terminal(
    client: &reqwest::Client,
    srv: &TestServer,
    token: &str,
    id: i64,
) -> serde_json::Value {
    // Jobs run in the background; poll until the record leaves PROCESSING.
    for _ in 0..200 {
        let body = status_of(client, srv, token, id).await;
        if body["status"] != json!("PROCESSING") {
            return body;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {id} did not finish within timeout");
}

#[tokio::test]
async fn health_is_public() {
    let srv = TestServer::spawn().await;
    let res = reqwest::get(srv.url("/health")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn auth_required_for_protected_endpoints() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client.get(srv.url("/reports/jobs/1")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = client
        .get(srv.url("/reports/jobs/1"))
        .bearer_auth("not-a-jwt")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn daily_production_completes_and_is_downloadable() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let token = reporter("op1");

    let id = submit_daily(&client, &srv, &token).await;
    let status = wait_for_terminal(&client, &srv, &token, id).await;
    assert_eq!(status["status"], json!("COMPLETED"));
    let artifact_name = status["artifactName"].as_str().unwrap().to_string();
    assert_eq!(artifact_name, format!("report-{id}.json"));
    assert!(status["completedDate"].is_string());

    let res = client
        .get(srv.url(&format!("/reports/jobs/{id}/result")))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()["content-type"], "application/json");
    assert_eq!(res.headers()["cache-control"], "no-store");
    let by_id: serde_json::Value = res.json().await.unwrap();
    assert!(by_id["production"].is_array());
    assert!(by_id["stoppages"].is_array());

    let res = client
        .get(srv.url(&format!("/reports/artifacts/{artifact_name}")))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let by_name: serde_json::Value = res.json().await.unwrap();
    assert_eq!(by_name, by_id);

    assert!(srv.results_dir.path().join(&artifact_name).is_file());
}

#[tokio::test]
async fn submission_does_not_wait_for_the_report() {
    let srv = TestServer::spawn().await;
    srv.source.set_latency(Duration::from_secs(3));
    let client = reqwest::Client::new();
    let token = reporter("op1");

    let started = std::time::Instant::now();
    let id = submit_daily(&client, &srv, &token).await;
    assert!(started.elapsed() < Duration::from_secs(1));

    let status = status_of(&client, &srv, &token, id).await;
    assert_eq!(status, json!({"status": "PROCESSING"}));

    let res = client
        .get(srv.url(&format!("/reports/jobs/{id}/result")))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body, json!({"status": "PROCESSING"}));

    let res = client
        .get(srv.url(&format!("/reports/artifacts/report-{id}.json")))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn offline_procedure_fails_the_job_with_a_message() {
    let srv = TestServer::spawn().await;
    srv.source.set_offline("rpt_daily_stoppages", true);
    let client = reqwest::Client::new();
    let token = reporter("op1");

    let id = submit_daily(&client, &srv, &token).await;
    let status = wait_for_terminal(&client, &srv, &token, id).await;
    assert_eq!(status["status"], json!("FAILED"));
    assert!(!status["message"].as_str().unwrap().is_empty());
    assert!(status.get("artifactName").is_none());

    let res = client
        .get(srv.url(&format!("/reports/jobs/{id}/result")))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["status"], json!("FAILED"));
    assert!(body["message"].is_string());

    assert!(!srv.results_dir.path().join(format!("report-{id}.json")).exists());
}

#[tokio::test]
async fn invalid_submissions_are_rejected_without_creating_jobs() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let token = reporter("op1");

    for body in [
        json!({}),
        json!({"reportType": "Tonnage", "criteria": {"date": "2024-03-01"}}),
        json!({"reportType": "DailyProduction"}),
        json!({"reportType": "DailyProduction", "criteria": {"date": "  "}}),
        json!({"reportType": "EquipmentDowntime", "criteria": {"from": "2024-03-01"}}),
    ] {
        let res = submit(&client, &srv, &token, body.clone()).await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST, "{body}");
        let out: serde_json::Value = res.json().await.unwrap();
        assert_eq!(out["success"], json!(false));
        assert!(out["message"].is_string());
    }

    let res = client
        .post(srv.url("/reports/jobs"))
        .bearer_auth(&token)
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = client
        .get(srv.url("/reports/jobs"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    let jobs: serde_json::Value = res.json().await.unwrap();
    assert_eq!(jobs, json!([]));
}

#[tokio::test]
async fn traversal_attempts_are_rejected() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let token = reporter("op1");

    for name in [
        "..%2F..%2Fetc%2Fpasswd",
        "report-1.json.bak",
        "report-01.json",
        "%2Fetc%2Fpasswd",
        "report-1.json%00",
        "..%5Creport-1.json",
    ] {
        let res = client
            .get(srv.url(&format!("/reports/artifacts/{name}")))
            .bearer_auth(&token)
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST, "{name}");
    }

    let res = client
        .get(srv.url("/reports/jobs/abc"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn concurrent_identical_submissions_get_distinct_jobs() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let token = reporter("op1");

    let (a, b) = tokio::join!(
        submit_daily(&client, &srv, &token),
        submit_daily(&client, &srv, &token)
    );
    assert_ne!(a, b);

    for id in [a, b] {
        let status = wait_for_terminal(&client, &srv, &token, id).await;
        assert_eq!(status["status"], json!("COMPLETED"));
        assert_eq!(status["artifactName"], json!(format!("report-{id}.json")));
    }
    assert!(srv.results_dir.path().join(format!("report-{a}.json")).is_file());
    assert!(srv.results_dir.path().join(format!("report-{b}.json")).is_file());

    let res = client
        .get(srv.url("/reports/jobs?limit=10"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    let jobs: serde_json::Value = res.json().await.unwrap();
    assert_eq!(jobs.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn jobs_are_private_to_their_requester_except_for_admins() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let owner = reporter("op1");
    let other = reporter("op2");
    let admin = mint_jwt("supervisor", vec![Role::ADMIN]);

    let id = submit_daily(&client, &srv, &owner).await;
    wait_for_terminal(&client, &srv, &owner, id).await;

    for path in [
        format!("/reports/jobs/{id}"),
        format!("/reports/jobs/{id}/result"),
        format!("/reports/artifacts/report-{id}.json"),
    ] {
        let res = client
            .get(srv.url(&path))
            .bearer_auth(&other)
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND, "{path}");

        let res = client
            .get(srv.url(&path))
            .bearer_auth(&admin)
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK, "{path}");
    }

    let res = client
        .get(srv.url("/reports/jobs"))
        .bearer_auth(&other)
        .send()
        .await
        .unwrap();
    let jobs: serde_json::Value = res.json().await.unwrap();
    assert_eq!(jobs, json!([]));
}

#[tokio::test]
async fn roles_gate_submission_and_dispatcher_stats() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let viewer = mint_jwt("guest", vec![Role::new("viewer")]);

    let res = submit(
        &client,
        &srv,
        &viewer,
        json!({"reportType": "DailyProduction", "criteria": {"date": "2024-03-01"}}),
    )
    .await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = client
        .get(srv.url("/whoami"))
        .bearer_auth(&viewer)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let res = client
        .get(srv.url("/reports/dispatcher"))
        .bearer_auth(reporter("op1"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = client
        .get(srv.url("/reports/dispatcher"))
        .bearer_auth(mint_jwt("supervisor", vec![Role::ADMIN]))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let stats: serde_json::Value = res.json().await.unwrap();
    assert_eq!(stats["dispatched"], json!(0));
}

#[tokio::test]
async fn saturated_queue_fails_new_jobs_immediately() {
    let srv = TestServer::spawn_with(ReportingConfig {
        worker_count: 1,
        queue_capacity: 1,
        ..ReportingConfig::default()
    })
    .await;
    srv.source.set_latency(Duration::from_millis(500));
    let client = reqwest::Client::new();
    let token = reporter("op1");

    let mut ids = Vec::new();
    for _ in 0..6 {
        ids.push(submit_daily(&client, &srv, &token).await);
    }

    let mut failed = 0;
    for id in ids {
        let status = wait_for_terminal(&client, &srv, &token, id).await;
        if status["status"] == json!("FAILED") {
            failed += 1;
        }
    }
    assert!(failed >= 1);
}
