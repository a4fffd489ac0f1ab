//! HTTP surface tests driven through the router with `tower::oneshot`.

mod support;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use http_body_util::BodyExt;
use confreg::store::RegistrationStore;
use serde_json::Value;
use support::{GOOD_RECEIPT_TEXT, NO_TAX_ID_TEXT, VALID_REFERENCE, draft, service};
use tower::ServiceExt;

const BOUNDARY: &str = "test-boundary-7d81";

fn app() -> (Router, support::TestService) {
    let svc = service();
    let router = confreg::http::router(svc.engine.clone());
    (router, svc)
}

fn multipart_reference(code: &str) -> (String, String) {
    let body = format!(
        "--{BOUNDARY}\r\n\
         Content-Disposition: form-data; name=\"paymentReference\"\r\n\r\n\
         {code}\r\n\
         --{BOUNDARY}--\r\n"
    );
    (format!("multipart/form-data; boundary={BOUNDARY}"), body)
}

fn multipart_file(file_name: &str, contents: &str) -> (String, String) {
    let body = format!(
        "--{BOUNDARY}\r\n\
         Content-Disposition: form-data; name=\"receiptFile\"; filename=\"{file_name}\"\r\n\
         Content-Type: application/pdf\r\n\r\n\
         {contents}\r\n\
         --{BOUNDARY}--\r\n"
    );
    (format!("multipart/form-data; boundary={BOUNDARY}"), body)
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_endpoint_responds() {
    let (router, _svc) = app();
    let response = router
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn registration_can_be_created_and_fetched() {
    let (router, _svc) = app();

    let created = router
        .clone()
        .oneshot(
            Request::post("/api/registrations")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(serde_json::to_vec(&draft("Иван", "Иванов")).unwrap()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(created.status(), StatusCode::CREATED);
    let body = json_body(created).await;
    let id = body["id"].as_u64().unwrap();

    let fetched = router
        .oneshot(
            Request::get(format!("/api/registrations/{id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(fetched.status(), StatusCode::OK);
    let body = json_body(fetched).await;
    assert_eq!(body["registration"]["firstName"], "Иван");
    assert!(body["receipt"].is_null());
}

#[tokio::test]
async fn completion_with_valid_reference_succeeds() {
    let (router, svc) = app();
    let reg = svc.store.insert(draft("Иван", "Иванов"));

    let (content_type, body) = multipart_reference(VALID_REFERENCE);
    let response = router
        .oneshot(
            Request::post(format!("/api/registrations/{}/complete", reg.id))
                .header(header::CONTENT_TYPE, content_type)
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["verified"], true);
    assert!(body["receiptId"].is_u64());
}

#[tokio::test]
async fn completion_with_receipt_document_succeeds() {
    let (router, svc) = app();
    let reg = svc.store.insert(draft("Иван", "Иванов"));

    let (content_type, body) = multipart_file("receipt.pdf", GOOD_RECEIPT_TEXT);
    let response = router
        .oneshot(
            Request::post(format!("/api/registrations/{}/complete", reg.id))
                .header(header::CONTENT_TYPE, content_type)
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["verified"], true);
    assert!(svc.store.get(reg.id).unwrap().completed_at.is_some());
}

#[tokio::test]
async fn unverified_receipt_reports_pending_review() {
    let (router, svc) = app();
    let reg = svc.store.insert(draft("Иван", "Иванов"));

    let (content_type, body) = multipart_file("receipt.pdf", NO_TAX_ID_TEXT);
    let response = router
        .oneshot(
            Request::post(format!("/api/registrations/{}/complete", reg.id))
                .header(header::CONTENT_TYPE, content_type)
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["verified"], false);
    assert!(svc.store.get(reg.id).unwrap().is_pending());
}

#[tokio::test]
async fn missing_payment_data_returns_bad_request() {
    let (router, svc) = app();
    let reg = svc.store.insert(draft("Иван", "Иванов"));

    let body = format!("--{BOUNDARY}--\r\n");
    let response = router
        .oneshot(
            Request::post(format!("/api/registrations/{}/complete", reg.id))
                .header(
                    header::CONTENT_TYPE,
                    format!("multipart/form-data; boundary={BOUNDARY}"),
                )
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "no payment data provided");
}

#[tokio::test]
async fn unknown_registration_returns_not_found() {
    let (router, _svc) = app();

    let (content_type, body) = multipart_reference(VALID_REFERENCE);
    let response = router
        .oneshot(
            Request::post("/api/registrations/9999/complete")
                .header(header::CONTENT_TYPE, content_type)
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = json_body(response).await;
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn non_pdf_upload_returns_bad_request() {
    let (router, svc) = app();
    let reg = svc.store.insert(draft("Иван", "Иванов"));

    let (content_type, body) = multipart_file("receipt.txt", GOOD_RECEIPT_TEXT);
    let response = router
        .oneshot(
            Request::post(format!("/api/registrations/{}/complete", reg.id))
                .header(header::CONTENT_TYPE, content_type)
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["error"], "receipt file must be a PDF document");
}
