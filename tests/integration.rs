use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

use content_mirror::cache::CacheStore;
use content_mirror::config::{parse_config, Config};
use content_mirror::models::DirectoryPath;
use content_mirror::remote::GithubClient;
use content_mirror::server::router;
use content_mirror::sync::{SyncOptions, Syncer};

const TOKEN_ENV: &str = "CONTENT_MIRROR_IT_TOKEN";
const TOKEN: &str = "test-token";

/// Fake GraphQL upstream keyed by the `expression` variable.
#[derive(Clone)]
struct Upstream {
    responses: Arc<HashMap<String, Value>>,
    errors: Option<&'static str>,
    requests: Arc<AtomicUsize>,
}

async fn graphql(
    State(up): State<Upstream>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    up.requests.fetch_add(1, Ordering::SeqCst);

    let auth = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    if auth != Some(format!("Bearer {}", TOKEN).as_str()) {
        return (StatusCode::UNAUTHORIZED, "Bad credentials").into_response();
    }
    if headers.get(header::USER_AGENT).is_none() {
        return (StatusCode::FORBIDDEN, "User-Agent required").into_response();
    }
    if let Some(message) = up.errors {
        return Json(json!({ "data": null, "errors": [ { "message": message } ] })).into_response();
    }

    assert_eq!(body["variables"]["owner"], "brown-ccv");
    assert_eq!(body["variables"]["name"], "site-content");
    let expression = body["variables"]["expression"].as_str().unwrap_or_default();
    let data = up
        .responses
        .get(expression)
        .cloned()
        .unwrap_or_else(|| json!({ "repository": { "object": null } }));
    Json(json!({ "data": data })).into_response()
}

fn file(name: &str, text: &str) -> Value {
    json!({ "name": name, "object": { "text": text } })
}

fn subdir(name: &str) -> Value {
    json!({ "name": name, "object": {} })
}

fn listing(entries: Vec<Value>) -> Value {
    json!({ "repository": { "object": { "entries": entries } } })
}

fn site() -> HashMap<String, Value> {
    let tree = json!({ "repository": { "object": { "entries": [
        { "name": "README.md", "path": "README.md", "object": {} },
        { "name": "about", "path": "about", "object": { "entries": [
            { "name": "index.md", "path": "about/index.md", "object": {} },
            { "name": "people", "path": "about/people", "object": { "entries": [
                { "name": "jane.yml", "path": "about/people/jane.yml" }
            ] } }
        ] } },
        { "name": "home", "path": "home", "object": { "entries": [
            { "name": "index.yml", "path": "home/index.yml", "object": {} }
        ] } }
    ] } } });

    let mut responses = HashMap::new();
    responses.insert("main:".to_string(), tree);
    responses.insert(
        "main:about".to_string(),
        listing(vec![
            file(
                "index.md",
                "---\ntitle: About CCV\n---\nWe support **research**.\n",
            ),
            subdir("people"),
        ]),
    );
    responses.insert(
        "main:about/people".to_string(),
        listing(vec![
            file("jane.yml", "title: Jane Doe\nrole: Engineer\n"),
            file("john.yml", "title: John Roe\nrole: Scientist\n"),
            file("broken.yml", "title: [oops\n"),
            file("photo.jpg", "binary"),
        ]),
    );
    responses.insert(
        "main:home".to_string(),
        listing(vec![file("index.yml", "title: Home\nbanner: Welcome\n")]),
    );
    responses
}

async fn spawn(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

async fn spawn_upstream(errors: Option<&'static str>) -> (String, Arc<AtomicUsize>) {
    let requests = Arc::new(AtomicUsize::new(0));
    let upstream = Upstream {
        responses: Arc::new(site()),
        errors,
        requests: requests.clone(),
    };
    let app = Router::new()
        .route("/graphql", post(graphql))
        .with_state(upstream);
    (format!("{}/graphql", spawn(app).await), requests)
}

fn config(endpoint: &str, cache_root: &std::path::Path) -> Config {
    std::env::set_var(TOKEN_ENV, TOKEN);
    parse_config(&format!(
        r#"
[remote]
endpoint = "{}"
owner = "brown-ccv"
repository = "site-content"
token_env = "{}"
timeout_secs = 5

[cache]
root = "{}"

[sync]
concurrency = 2
"#,
        endpoint,
        TOKEN_ENV,
        cache_root.display()
    ))
    .unwrap()
}

fn syncer(cfg: &Config) -> Arc<Syncer> {
    let client = GithubClient::new(&cfg.remote).unwrap();
    Arc::new(Syncer::new(
        Arc::new(client),
        CacheStore::new(&cfg.cache.root),
        SyncOptions::from_config(&cfg.sync),
    ))
}

fn p(s: &str) -> DirectoryPath {
    DirectoryPath::parse(s).unwrap()
}

#[tokio::test]
async fn test_sync_over_graphql() {
    let tmp = TempDir::new().unwrap();
    let (endpoint, requests) = spawn_upstream(None).await;
    let cfg = config(&endpoint, tmp.path());
    let s = syncer(&cfg);

    let report = s.run_sync().await.unwrap();
    assert_eq!(report.paths_resolved, 3);
    assert_eq!(report.synced(), 3);
    assert_eq!(report.dropped_files(), 1);
    // One tree query plus one query per directory.
    assert_eq!(requests.load(Ordering::SeqCst), 4);

    let about = s.cache().read(&p("about")).await.unwrap().unwrap();
    assert_eq!(about.index["title"], json!("About CCV"));
    assert_eq!(
        about.index["body"],
        json!("<main><p>We support <strong>research</strong>.</p>\n</main>")
    );
    assert_eq!(about.toc, vec!["people"]);
    assert!(about.data.is_empty());

    let people = s.cache().read(&p("about/people")).await.unwrap().unwrap();
    assert_eq!(people.toc, vec!["Jane Doe", "John Roe"]);
    assert_eq!(people.data.len(), 2);
    assert_eq!(people.data[0]["role"], json!("Engineer"));
    assert!(people.index.is_empty());

    let home = s.cache().read(&p("home")).await.unwrap().unwrap();
    assert_eq!(
        serde_json::to_value(&home).unwrap(),
        json!({ "index": { "title": "Home", "banner": "Welcome" }, "data": [], "toc": [] })
    );
}

#[tokio::test]
async fn test_resync_is_idempotent() {
    let tmp = TempDir::new().unwrap();
    let (endpoint, _) = spawn_upstream(None).await;
    let cfg = config(&endpoint, tmp.path());
    let s = syncer(&cfg);

    s.run_sync().await.unwrap();
    let snapshot: Vec<(String, Vec<u8>)> = ["about", "about/people", "home"]
        .iter()
        .map(|d| {
            let file = s.cache().file_path(&p(d));
            (d.to_string(), std::fs::read(file).unwrap())
        })
        .collect();

    s.run_sync().await.unwrap();
    for (dir, before) in snapshot {
        let after = std::fs::read(s.cache().file_path(&p(&dir))).unwrap();
        assert_eq!(before, after, "cache for {} changed between runs", dir);
    }
}

#[tokio::test]
async fn test_graphql_errors_abort_resolution() {
    let tmp = TempDir::new().unwrap();
    let (endpoint, requests) = spawn_upstream(Some("Could not resolve to a Repository")).await;
    let cfg = config(&endpoint, tmp.path());
    let s = syncer(&cfg);

    let err = s.run_sync().await.unwrap_err();
    assert_eq!(err.kind(), "resolution");
    assert!(err.to_string().contains("Could not resolve"));
    assert_eq!(requests.load(Ordering::SeqCst), 1);
    assert!(s.cache().list().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_wrong_token_is_rejected_upstream() {
    let tmp = TempDir::new().unwrap();
    let (endpoint, _) = spawn_upstream(None).await;
    let mut cfg = config(&endpoint, tmp.path());
    cfg.remote.token_env = "CONTENT_MIRROR_IT_WRONG_TOKEN".to_string();
    std::env::set_var("CONTENT_MIRROR_IT_WRONG_TOKEN", "nope");
    let s = syncer(&cfg);

    let err = s.run_sync().await.unwrap_err();
    assert!(err.to_string().contains("401"), "unexpected error: {}", err);
}

#[tokio::test]
async fn test_http_serves_cached_content() {
    let tmp = TempDir::new().unwrap();
    let (endpoint, _) = spawn_upstream(None).await;
    let cfg = config(&endpoint, tmp.path());
    let s = syncer(&cfg);
    let base = spawn(router(s.clone())).await;
    let http = reqwest::Client::new();

    // Nothing synced yet.
    let resp = http.get(format!("{}/about", base)).send().await.unwrap();
    assert_eq!(resp.status(), 404);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "not_found");

    let resp = http.get(format!("{}/sync/status", base)).send().await.unwrap();
    assert_eq!(resp.status(), 404);

    // Reload waits for the whole pass before answering.
    let resp = http.post(format!("{}/reload", base)).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    let summary = resp.text().await.unwrap();
    assert!(summary.starts_with("Content updated"), "{}", summary);
    assert!(summary.contains("3 of 3 directories synced"), "{}", summary);

    let resp = http
        .get(format!("{}/about/people", base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let people: Value = resp.json().await.unwrap();
    assert_eq!(people["toc"], json!(["Jane Doe", "John Roe"]));

    let resp = http
        .get(format!("{}/home", base))
        .header("Origin", "https://example.org")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(
        resp.headers()
            .get("access-control-allow-origin")
            .and_then(|v| v.to_str().ok()),
        Some("*")
    );

    let resp = http.get(format!("{}/", base)).send().await.unwrap();
    let list: Value = resp.json().await.unwrap();
    assert_eq!(list["paths"], json!(["about", "about/people", "home"]));

    let resp = http.get(format!("{}/README.md", base)).send().await.unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "bad_request");

    let resp = http.get(format!("{}/sync/status", base)).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    let status: Value = resp.json().await.unwrap();
    assert_eq!(status["paths_resolved"], 3);
    assert_eq!(status["directories"][1]["path"], "about/people");
    assert_eq!(status["directories"][1]["dropped_files"][0]["kind"], "parse");

    let resp = http.get(format!("{}/health", base)).send().await.unwrap();
    let health: Value = resp.json().await.unwrap();
    assert_eq!(health["status"], "ok");
}
