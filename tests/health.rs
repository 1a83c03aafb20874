use grocery_store_api::routes::health::health_check;

#[tokio::test]
async fn health_reports_ok_and_crate_version() {
    let body = health_check().await.0;

    assert_eq!(body.message, "Health check");
    let data = body.data.expect("health payload");
    assert_eq!(data.status, "ok");
    assert_eq!(data.version, env!("CARGO_PKG_VERSION"));
}
