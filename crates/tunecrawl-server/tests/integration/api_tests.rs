use axum::body::Body;
use axum::http::{Request, Response, StatusCode};
use http_body_util::BodyExt;
use tower::ServiceExt;

use crate::integration::common::{
    StubFetcher, TEST_ADMIN_TOKEN, setup_test_app, setup_test_app_no_auth,
};

fn authorized_post(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::post(uri)
        .header("authorization", format!("Bearer {TEST_ADMIN_TOKEN}"))
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn json_body(response: Response<Body>) -> serde_json::Value {
    let body = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn health_reports_disabled_database() {
    let app = setup_test_app(StubFetcher::serving(3));

    let response = app
        .router
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["database"], "disabled");
}

#[tokio::test]
async fn progress_is_idle_before_first_job() {
    let app = setup_test_app(StubFetcher::serving(3));

    let response = app
        .router
        .oneshot(Request::get("/crawler/progress").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["status"], "idle");
    assert_eq!(json["progress"], 0);
    assert!(json["jobId"].is_null());
}

#[tokio::test]
async fn unauthenticated_start_returns_401() {
    let app = setup_test_app(StubFetcher::serving(3));

    let response = app
        .router
        .oneshot(
            Request::post("/crawler/start")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"type":"popular","limit":3}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn wrong_token_returns_401() {
    let app = setup_test_app(StubFetcher::serving(3));

    let response = app
        .router
        .oneshot(
            Request::post("/crawler/stop")
                .header("authorization", "Bearer wrong-token")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn no_admin_token_returns_403() {
    let app = setup_test_app_no_auth();

    let response = app
        .router
        .oneshot(
            Request::post("/crawler/stop")
                .header("authorization", "Bearer any-token")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let json = json_body(response).await;
    assert_eq!(json["error"], "forbidden");
}

#[tokio::test]
async fn start_runs_job_to_completion() {
    let app = setup_test_app(StubFetcher::serving(3));

    let response = app
        .router
        .clone()
        .oneshot(authorized_post(
            "/crawler/start",
            serde_json::json!({"type": "popular", "limit": 3}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let json = json_body(response).await;
    assert_eq!(json["success"], true);
    assert_eq!(json["job"]["crawlType"], "popular");
    assert_eq!(json["job"]["requestedLimit"], 3);

    let job = app.crawler.wait().await.unwrap();
    assert_eq!(job.status.as_str(), "completed");
    assert_eq!(app.catalog.len(), 3);

    let response = app
        .router
        .clone()
        .oneshot(Request::get("/crawler/progress").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let json = json_body(response).await;
    assert_eq!(json["status"], "completed");
    assert_eq!(json["progress"], 100);
    assert_eq!(json["current"], 3);

    let response = app
        .router
        .clone()
        .oneshot(Request::get("/crawler/stats").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let json = json_body(response).await;
    assert_eq!(json["jobsStarted"], 1);
    assert_eq!(json["successCount"], 3);
    assert_eq!(json["errorCount"], 0);
    assert!(json["quotaRemaining"].is_null());

    let response = app
        .router
        .oneshot(
            Request::get("/crawler/duplicate-stats")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let json = json_body(response).await;
    assert_eq!(json["duplicatesDetected"], 0);
    assert_eq!(json["uniqueAccepted"], 3);
    assert_eq!(json["currentJob"]["unique"], 3);
}

#[tokio::test]
async fn second_crawl_reports_catalog_duplicates() {
    let app = setup_test_app(StubFetcher::serving(2));
    let start = serde_json::json!({"type": "latest", "limit": 2});

    let response = app
        .router
        .clone()
        .oneshot(authorized_post("/crawler/start", start.clone()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    app.crawler.wait().await.unwrap();

    let response = app
        .router
        .clone()
        .oneshot(authorized_post("/crawler/start", start))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    app.crawler.wait().await.unwrap();

    let response = app
        .router
        .oneshot(
            Request::get("/crawler/duplicate-stats")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let json = json_body(response).await;
    assert_eq!(json["duplicatesDetected"], 2);
    assert_eq!(json["uniqueAccepted"], 2);
    assert_eq!(json["duplicateRate"], 50.0);
    assert_eq!(json["currentJob"]["duplicates"], 2);
    assert_eq!(app.catalog.len(), 2);
}

#[tokio::test]
async fn start_while_running_returns_409() {
    let app = setup_test_app(StubFetcher::blocked(3));
    let start = serde_json::json!({"type": "popular", "limit": 3});

    let first = app
        .router
        .clone()
        .oneshot(authorized_post("/crawler/start", start.clone()))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::ACCEPTED);

    let second = app
        .router
        .oneshot(authorized_post("/crawler/start", start))
        .await
        .unwrap();

    assert_eq!(second.status(), StatusCode::CONFLICT);
    let json = json_body(second).await;
    assert_eq!(json["error"], "job_conflict");
    assert_eq!(json["success"], false);
}

#[tokio::test]
async fn invalid_start_request_returns_400() {
    let app = setup_test_app(StubFetcher::serving(3));

    let response = app
        .router
        .clone()
        .oneshot(authorized_post(
            "/crawler/start",
            serde_json::json!({"type": "trending", "limit": 3}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = json_body(response).await;
    assert_eq!(json["error"], "validation_error");
    assert_eq!(json["success"], false);

    let response = app
        .router
        .oneshot(authorized_post(
            "/crawler/start",
            serde_json::json!({"type": "popular", "limit": 3, "duplicateThreshold": 1.5}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn stop_without_job_reports_nothing_stopped() {
    let app = setup_test_app(StubFetcher::serving(3));

    let response = app
        .router
        .oneshot(authorized_post("/crawler/stop", serde_json::json!({})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["stopped"], false);
    assert!(json["job"].is_null());
}

#[tokio::test]
async fn stop_aborts_running_job() {
    let fetcher = StubFetcher::blocked(3);
    let app = setup_test_app(fetcher.clone());

    let response = app
        .router
        .clone()
        .oneshot(authorized_post(
            "/crawler/start",
            serde_json::json!({"type": "recommended", "limit": 3}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let response = app
        .router
        .clone()
        .oneshot(authorized_post("/crawler/stop", serde_json::json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["stopped"], true);
    assert_eq!(json["job"]["status"], "aborted");

    let response = app
        .router
        .oneshot(Request::get("/crawler/progress").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(json_body(response).await["status"], "aborted");
    assert!(fetcher.calls() <= 1);
}

#[tokio::test]
async fn config_hides_proxy_credentials() {
    let app = setup_test_app(StubFetcher::serving(3));

    let response = app
        .router
        .oneshot(Request::get("/crawler/config").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(!text.contains("s3cret-proxy-pass"));

    let json: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(json["proxyEnabled"], true);
    assert_eq!(json["maxConcurrent"], 3);
    assert_eq!(json["baseUrl"], "https://music.example.com/api");
}

#[tokio::test]
async fn connection_test_probes_base_url() {
    let fetcher = StubFetcher::serving(1);
    let app = setup_test_app(fetcher.clone());

    let response = app
        .router
        .oneshot(authorized_post("/crawler/test", serde_json::json!({})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["reachable"], true);
    assert_eq!(json["url"], "https://music.example.com/api");
    assert_eq!(fetcher.calls(), 1);
}

#[tokio::test]
async fn openapi_document_is_served() {
    let app = setup_test_app(StubFetcher::serving(1));

    let response = app
        .router
        .oneshot(
            Request::get("/api-docs/openapi.json")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert!(json["paths"]["/crawler/start"].is_object());
    assert!(json["paths"]["/crawler/duplicate-stats"].is_object());
}
