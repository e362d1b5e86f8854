use base64::Engine;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use vidlink_core::models::settings::{AssetProxySettings, NetworkSettings};
use vidlink_lib::core::asset_proxy::AssetProxy;

fn proxy(max_bytes: u64) -> AssetProxy {
    AssetProxy::new(&NetworkSettings::default(), &AssetProxySettings { max_bytes }).unwrap()
}

#[tokio::test]
async fn inlines_body_with_its_content_type() {
    let server = MockServer::start().await;
    let body = b"\x89PNG\r\n\x1a\nfake-image".to_vec();
    Mock::given(method("GET"))
        .and(path("/cover.png"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body.clone(), "image/png"))
        .mount(&server)
        .await;

    let data_uri = proxy(1024)
        .proxy(&format!("{}/cover.png", server.uri()))
        .await
        .unwrap();
    let expected = format!(
        "data:image/png;base64,{}",
        base64::engine::general_purpose::STANDARD.encode(&body)
    );
    assert_eq!(data_uri, expected);
}

#[tokio::test]
async fn sends_the_given_referer() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/large/pic.jpg"))
        .and(header("referer", "https://weibo.com/"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(b"jpg".to_vec(), "image/jpeg"))
        .mount(&server)
        .await;

    let url = format!("{}/large/pic.jpg", server.uri());
    let p = proxy(1024);
    assert!(p.proxy_with_referer(&url, "https://weibo.com/").await.is_ok());
    // Without the referer the mock does not match and answers 404.
    assert_eq!(p.proxy(&url).await.unwrap_err().kind(), "AssetProxyFailure");
}

#[tokio::test]
async fn rejects_bodies_over_the_limit() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(vec![7u8; 4096], "image/webp"))
        .mount(&server)
        .await;

    let err = proxy(100)
        .proxy(&format!("{}/huge.webp", server.uri()))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "AssetProxyFailure");
}

#[tokio::test]
async fn batch_keeps_order_and_isolates_failures() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ok.jpg"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(b"ok".to_vec(), "image/jpeg"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/gone.jpg"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let urls = vec![
        format!("{}/gone.jpg", server.uri()),
        format!("{}/ok.jpg", server.uri()),
        "not a url".to_string(),
    ];
    let results = proxy(1024).proxy_many(&urls).await;
    assert_eq!(results.len(), 3);
    assert!(results[0].is_err());
    assert!(results[1].as_ref().unwrap().starts_with("data:image/jpeg;base64,"));
    assert!(results[2].is_err());
}
