//! End-to-end flow over the HTTP surface: register, sync, rollback,
//! deregister.

use std::path::Path;
use std::time::Duration;

use serde_json::{json, Value};
use tempfile::TempDir;
use vane_config::ControllerConfig;
use vane_server::{bootstrap, build_router, Runtime};

struct TestServer {
    base_url: String,
    runtime: Runtime,
    source_dir: TempDir,
}

fn write_revision(root: &Path, revision: &str, replicas: u64) {
    let base = root.join("demo").join(revision).join("base");
    std::fs::create_dir_all(&base).unwrap();
    std::fs::write(
        base.join("web.json"),
        format!(
            r#"{{"kind": "Deployment", "metadata": {{"name": "web", "namespace": "default"}}, "spec": {{"replicas": {replicas}}}}}"#
        ),
    )
    .unwrap();
    std::fs::write(root.join("demo").join("REVISION"), revision).unwrap();
}

async fn start_server() -> TestServer {
    let source_dir = tempfile::tempdir().unwrap();
    write_revision(source_dir.path(), "rev-1", 1);

    let mut config = ControllerConfig::default();
    config.source.root = source_dir.path().to_path_buf();

    let runtime = bootstrap(&config);
    let router = build_router(runtime.state.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    TestServer {
        base_url: format!("http://{addr}"),
        runtime,
        source_dir,
    }
}

async fn get_json(client: &reqwest::Client, url: &str) -> Value {
    client.get(url).send().await.unwrap().json().await.unwrap()
}

async fn wait_for(client: &reqwest::Client, url: &str, mut predicate: impl FnMut(&Value) -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let body = get_json(client, url).await;
            if predicate(&body) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

fn declaration() -> Value {
    json!({
        "name": "demo",
        "source": {
            "repo": "demo",
            "revision": {"symbolic": "latest"},
            "path": "base"
        },
        "destination": {"environment": "default", "namespace": "default"},
        "syncPolicy": {"automated": true, "prune": true}
    })
}

#[tokio::test]
async fn full_application_lifecycle_over_http() {
    let server = start_server().await;
    let client = reqwest::Client::new();
    let api = format!("{}/api/v1", server.base_url);

    // liveness first
    let health = client
        .get(format!("{}/healthz", server.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(health.status(), 200);

    // register
    let created = client
        .post(format!("{api}/applications"))
        .json(&declaration())
        .send()
        .await
        .unwrap();
    assert_eq!(created.status(), 201);

    // duplicate names collide
    let duplicate = client
        .post(format!("{api}/applications"))
        .json(&declaration())
        .send()
        .await
        .unwrap();
    assert_eq!(duplicate.status(), 409);

    // the automated policy converges without a manual trigger
    let app_url = format!("{api}/applications/demo");
    wait_for(&client, &app_url, |body| {
        body["status"]["sync"] == json!("Synced")
    })
    .await;

    let body = get_json(&client, &app_url).await;
    assert_eq!(body["status"]["revision"], json!("rev-1"));
    assert_eq!(body["status"]["health"], json!("Healthy"));
    assert_eq!(body["history"].as_array().unwrap().len(), 1);
    assert_eq!(body["live"]["resources"], json!(1));

    // a new revision lands; manual sync picks it up
    write_revision(server.source_dir.path(), "rev-2", 5);
    let synced = client
        .post(format!("{app_url}/sync"))
        .send()
        .await
        .unwrap();
    assert_eq!(synced.status(), 202);
    wait_for(&client, &app_url, |body| {
        body["status"]["revision"] == json!("rev-2") && body["status"]["sync"] == json!("Synced")
    })
    .await;

    // rollback to the first snapshot
    let rolled = client
        .post(format!("{app_url}/rollback"))
        .json(&json!({"revisionIndex": 0}))
        .send()
        .await
        .unwrap();
    assert_eq!(rolled.status(), 202);
    wait_for(&client, &app_url, |body| {
        body["status"]["revision"] == json!("rev-1") && body["status"]["sync"] == json!("Synced")
    })
    .await;

    // rollback to an unknown index is a request-local failure
    let missing = client
        .post(format!("{app_url}/rollback"))
        .json(&json!({"revisionIndex": 99}))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), 404);

    // the listing shows the application
    let listed = get_json(&client, &format!("{api}/applications")).await;
    assert_eq!(listed.as_array().unwrap().len(), 1);
    assert_eq!(listed[0]["name"], json!("demo"));

    // deregister with cascade removes everything
    let deleted = client
        .delete(format!("{app_url}?cascade=true"))
        .send()
        .await
        .unwrap();
    assert_eq!(deleted.status(), 204);
    let gone = client.get(&app_url).send().await.unwrap();
    assert_eq!(gone.status(), 404);

    server.runtime.shutdown();
}

#[tokio::test]
async fn malformed_declarations_are_rejected() {
    let server = start_server().await;
    let client = reqwest::Client::new();
    let api = format!("{}/api/v1", server.base_url);

    let mut bad = declaration();
    bad["name"] = json!("Not A Valid Name");
    let response = client
        .post(format!("{api}/applications"))
        .json(&bad)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 422);

    // the rejected declaration never entered the scheduler
    let listed = get_json(&client, &format!("{api}/applications")).await;
    assert_eq!(listed.as_array().unwrap().len(), 0);

    server.runtime.shutdown();
}
