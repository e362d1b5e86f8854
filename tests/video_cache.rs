use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::net::TcpListener;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use vidlink_core::models::settings::{CacheSettings, NetworkSettings};
use vidlink_lib::core::video_cache::VideoCache;

fn cache_in(dir: &std::path::Path, max_bytes: u64) -> VideoCache {
    let settings = CacheSettings {
        dir: Some(dir.to_path_buf()),
        max_bytes,
        max_age_secs: 3600,
    };
    VideoCache::new(dir.to_path_buf(), &settings, &NetworkSettings::default()).unwrap()
}

fn files_in(dir: &std::path::Path) -> Vec<String> {
    std::fs::read_dir(dir)
        .map(|rd| {
            rd.filter_map(|e| e.ok())
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default()
}

#[tokio::test]
async fn second_call_is_a_hit() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/clip.mp4"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(vec![1u8; 2048], "video/mp4"))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let cache = cache_in(dir.path(), 1 << 20);
    let url = format!("{}/clip.mp4", server.uri());

    let first = cache.cache(&url).await.unwrap();
    let second = cache.cache(&url).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(first, cache.path_for(&url));
    assert_eq!(std::fs::read(&first).unwrap().len(), 2048);
}

#[tokio::test]
async fn concurrent_misses_download_once() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(vec![2u8; 4096], "video/mp4")
                .set_delay(std::time::Duration::from_millis(100)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let cache = cache_in(dir.path(), 1 << 20);
    let url = format!("{}/shared.mp4", server.uri());

    let (a, b) = tokio::join!(cache.cache(&url), cache.cache(&url));
    assert_eq!(a.unwrap(), b.unwrap());
    assert_eq!(files_in(dir.path()).len(), 1);
}

#[tokio::test]
async fn failed_fetch_leaves_nothing_behind() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing.mp4"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/big.mp4"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(vec![3u8; 5000], "video/mp4"))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let cache = cache_in(dir.path(), 1000);

    let err = cache.cache(&format!("{}/missing.mp4", server.uri())).await.unwrap_err();
    assert_eq!(err.kind(), "DownloadFailure");
    let err = cache.cache(&format!("{}/big.mp4", server.uri())).await.unwrap_err();
    assert_eq!(err.kind(), "DownloadFailure");

    assert!(files_in(dir.path()).is_empty());
}

#[tokio::test]
async fn new_entry_pushes_out_older_ones() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(vec![4u8; 600], "video/mp4"))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let cache = cache_in(dir.path(), 1000);

    let old = cache.cache(&format!("{}/a.mp4", server.uri())).await.unwrap();
    let old_time = std::time::SystemTime::now() - std::time::Duration::from_secs(60);
    filetime::set_file_mtime(&old, filetime::FileTime::from_system_time(old_time)).unwrap();

    let new = cache.cache(&format!("{}/b.mp4", server.uri())).await.unwrap();
    assert!(new.exists());
    assert!(!old.exists());
}

#[tokio::test]
async fn silent_server_times_out_and_leaves_nothing() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = [0u8; 1024];
        let _ = socket.read(&mut buf).await;
        tokio::time::sleep(Duration::from_secs(60)).await;
    });

    let dir = tempfile::tempdir().unwrap();
    let settings = CacheSettings {
        dir: Some(dir.path().to_path_buf()),
        max_bytes: 1 << 20,
        max_age_secs: 3600,
    };
    let net = NetworkSettings {
        connect_timeout_secs: 1,
        request_timeout_secs: 1,
        read_timeout_secs: 1,
        ..NetworkSettings::default()
    };
    let cache = VideoCache::new(dir.path().to_path_buf(), &settings, &net).unwrap();

    let result = tokio::time::timeout(
        Duration::from_secs(8),
        cache.cache(&format!("http://{}/clip.mp4", addr)),
    )
    .await
    .expect("cache did not give up on a silent server");

    assert_eq!(result.unwrap_err().kind(), "NetworkFailure");
    assert!(files_in(dir.path()).is_empty());
}
