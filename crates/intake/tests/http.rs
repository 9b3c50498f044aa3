use std::sync::Arc;

use anyhow::Result;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use intake::http::{router, AppState, UPLOAD_FIELD};
use intake_core::store::MemoryRepository;
use intake_core::IngestPipeline;
use serde_json::Value;
use tower::ServiceExt;

const BOUNDARY: &str = "intake-test-boundary";

fn app() -> Router {
    let pipeline = IngestPipeline::new(Arc::new(MemoryRepository::new()));
    router(AppState::new(Arc::new(pipeline)), 1024 * 1024)
}

fn multipart_request(field: &str, contents: &str) -> Request<Body> {
    let body = format!(
        "--{BOUNDARY}\r\n\
         Content-Disposition: form-data; name=\"{field}\"; filename=\"requests.csv\"\r\n\
         Content-Type: text/csv\r\n\r\n\
         {contents}\r\n\
         --{BOUNDARY}--\r\n"
    );
    Request::builder()
        .method("POST")
        .uri("/api/v1/action")
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .expect("build request")
}

async fn json_body(response: axum::response::Response) -> Result<Value> {
    let bytes = response.into_body().collect().await?.to_bytes();
    Ok(serde_json::from_slice(&bytes)?)
}

#[tokio::test]
async fn upload_returns_statistics() -> Result<()> {
    let app = app();
    let csv = concat!(
        "RequestType,RequestStatus,RequestData\n",
        "1,1,\"{\"\"CompanyName\"\":\"\"Acme\"\",\"\"IsOffice\"\":true}\"\n",
        "3,2,\"{\"\"CompanyName\"\":\"\"Acme\"\",\"\"InspectionDate\"\":\"\"2024-01-01\"\"}\"\n",
        "2,3,\"{\"\"CompanyName\"\":\"\"Acme\"\",\"\"Permissions\"\":[\"\"admin\"\"]}\"\n",
    );

    let response = app
        .clone()
        .oneshot(multipart_request(UPLOAD_FIELD, csv))
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await?;
    assert_eq!(body["statistics"]["totalRecords"], 3);
    assert_eq!(body["statistics"]["newLicenseRequests"], 1);
    assert_eq!(body["statistics"]["accountRequests"], 1);
    assert_eq!(body["statistics"]["inspectionRequests"], 1);
    assert_eq!(body["dispatch"]["dispatched"], 3);
    assert!(body["elapsed_ms"].is_u64());
    assert!(body["upload_id"].is_string());

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/v1/statistics")
                .body(Body::empty())?,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await?;
    assert_eq!(body["totalRecords"], 3);

    Ok(())
}

#[tokio::test]
async fn missing_upload_field_is_a_bad_request() -> Result<()> {
    let response = app()
        .oneshot(multipart_request("something_else", "RequestType\n"))
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = json_body(response).await?;
    assert!(body["error"].as_str().unwrap_or_default().contains(UPLOAD_FIELD));
    Ok(())
}

#[tokio::test]
async fn malformed_csv_is_a_bad_request() -> Result<()> {
    let csv = "RequestType,RequestStatus,RequestData\n1,1,\"{\n";
    let response = app().oneshot(multipart_request(UPLOAD_FIELD, csv)).await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = json_body(response).await?;
    assert!(body["error"]
        .as_str()
        .unwrap_or_default()
        .contains("unterminated"));
    Ok(())
}

#[tokio::test]
async fn out_of_range_request_type_is_unprocessable() -> Result<()> {
    let csv = "RequestType,RequestStatus,RequestData\n9,1,{}\n";
    let response = app().oneshot(multipart_request(UPLOAD_FIELD, csv)).await?;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    Ok(())
}

#[tokio::test]
async fn index_and_health_are_served() -> Result<()> {
    let app = app();

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/").body(Body::empty())?)
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await?.to_bytes();
    let html = String::from_utf8(bytes.to_vec())?;
    assert!(html.contains("name=\"request_csv\""));

    let response = app
        .oneshot(Request::builder().uri("/healthz").body(Body::empty())?)
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    Ok(())
}
