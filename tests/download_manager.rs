use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc::UnboundedReceiver;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

use vidlink_core::models::download::{DownloadProgress, DownloadStatus};
use vidlink_core::models::settings::{DownloadSettings, NetworkSettings};
use vidlink_lib::core::download_manager::DownloadManager;
use vidlink_lib::core::events::ChannelEmitter;
use vidlink_lib::storage::db::Store;

struct Harness {
    manager: DownloadManager,
    store: Arc<Store>,
    progress: UnboundedReceiver<DownloadProgress>,
    dir: tempfile::TempDir,
}

fn harness() -> Harness {
    let store = Arc::new(Store::open_in_memory().unwrap());
    let (emitter, progress) = ChannelEmitter::new();
    let manager = DownloadManager::new(
        store.clone(),
        Arc::new(emitter),
        &NetworkSettings::default(),
        &DownloadSettings { progress_interval_ms: 0 },
    )
    .unwrap();
    Harness {
        manager,
        store,
        progress,
        dir: tempfile::tempdir().unwrap(),
    }
}

/// Serves one connection: reads the request head, writes `head`, then each
/// chunk with a short pause, and either closes or keeps the socket open.
async fn serve_once(head: String, chunks: Vec<Vec<u8>>, hold_open: bool) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut request = Vec::new();
        let mut buf = [0u8; 1024];
        while !request.windows(4).any(|w| w == b"\r\n\r\n") {
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                return;
            }
            request.extend_from_slice(&buf[..n]);
        }

        socket.write_all(head.as_bytes()).await.unwrap();
        for chunk in chunks {
            if socket.write_all(&chunk).await.is_err() {
                return;
            }
            let _ = socket.flush().await;
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        if hold_open {
            tokio::time::sleep(Duration::from_secs(60)).await;
        }
    });
    format!("http://{}/video.mp4", addr)
}

async fn collect_until_terminal(
    progress: &mut UnboundedReceiver<DownloadProgress>,
    id: i64,
) -> Vec<DownloadProgress> {
    let mut seen = Vec::new();
    loop {
        let p = tokio::time::timeout(Duration::from_secs(10), progress.recv())
            .await
            .expect("no progress within 10s")
            .expect("progress channel closed");
        if p.id != id {
            continue;
        }
        let terminal = p.status.is_terminal();
        seen.push(p);
        if terminal {
            return seen;
        }
    }
}

fn assert_monotonic(ticks: &[DownloadProgress]) {
    for pair in ticks.windows(2) {
        assert!(pair[0].downloaded <= pair[1].downloaded, "{:?}", ticks);
    }
    let terminals = ticks.iter().filter(|p| p.status.is_terminal()).count();
    assert_eq!(terminals, 1);
}

fn file_len(path: &Path) -> u64 {
    std::fs::metadata(path).unwrap().len()
}

#[tokio::test]
async fn unknown_length_completes_with_monotonic_progress() {
    let mut h = harness();
    let chunks: Vec<Vec<u8>> = (0..5).map(|i| vec![i as u8; 1000]).collect();
    let head = "HTTP/1.1 200 OK\r\nContent-Type: video/mp4\r\nConnection: close\r\n\r\n".to_string();
    let url = serve_once(head, chunks, false).await;
    let save = h.dir.path().join("out").join("clip.mp4");

    let id = h
        .manager
        .start_download(7, &url, &save, "clip", "https://cover")
        .await
        .unwrap();
    let ticks = collect_until_terminal(&mut h.progress, id).await;

    assert_monotonic(&ticks);
    assert!(ticks.iter().all(|p| p.total.is_none()));
    let last = ticks.last().unwrap();
    assert_eq!(last.status, DownloadStatus::Completed);
    assert_eq!(last.downloaded, 5000);
    assert_eq!(file_len(&save), 5000);

    let record = h.store.get_download(id).unwrap();
    assert_eq!(record.status, DownloadStatus::Completed);
    assert_eq!(record.downloaded_size, 5000);
    assert_eq!(record.total_size, Some(5000));
    assert_eq!(record.user_id, 7);
    assert_eq!(record.title, "clip");
}

#[tokio::test]
async fn dropped_connection_fails_with_bytes_on_disk() {
    let mut h = harness();
    let head = "HTTP/1.1 200 OK\r\nContent-Type: video/mp4\r\nContent-Length: 10000\r\n\r\n".to_string();
    let url = serve_once(head, vec![vec![9u8; 1500], vec![9u8; 1500]], false).await;
    let save = h.dir.path().join("partial.mp4");

    let id = h.manager.start_download(1, &url, &save, "", "").await.unwrap();
    let ticks = collect_until_terminal(&mut h.progress, id).await;

    assert_monotonic(&ticks);
    assert!(ticks.iter().all(|p| p.total == Some(10_000) && p.downloaded <= 10_000));
    let last = ticks.last().unwrap();
    assert_eq!(last.status, DownloadStatus::Failed);

    let on_disk = file_len(&save);
    assert_eq!(last.downloaded, on_disk);
    let record = h.store.get_download(id).unwrap();
    assert_eq!(record.status, DownloadStatus::Failed);
    assert_eq!(record.downloaded_size, on_disk);
    assert_eq!(record.total_size, Some(10_000));
}

#[tokio::test]
async fn cancel_stops_a_stalled_stream() {
    let mut h = harness();
    let head = "HTTP/1.1 200 OK\r\nContent-Type: video/mp4\r\nContent-Length: 100000\r\n\r\n".to_string();
    let url = serve_once(head, vec![vec![1u8; 2048]], true).await;
    let save = h.dir.path().join("stalled.mp4");

    let id = h.manager.start_download(1, &url, &save, "", "").await.unwrap();
    let first = tokio::time::timeout(Duration::from_secs(10), h.progress.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first.status, DownloadStatus::Downloading);

    assert!(h.manager.cancel(id));
    let ticks = collect_until_terminal(&mut h.progress, id).await;
    let last = ticks.last().unwrap();
    assert_eq!(last.status, DownloadStatus::Failed);
    assert_eq!(last.downloaded, file_len(&save));
    assert_eq!(h.store.get_download(id).unwrap().status, DownloadStatus::Failed);
}

#[tokio::test]
async fn concurrent_downloads_are_independent() {
    let mut h = harness();
    let ok_head = "HTTP/1.1 200 OK\r\nContent-Type: video/mp4\r\nContent-Length: 3000\r\n\r\n".to_string();
    let bad_head = "HTTP/1.1 200 OK\r\nContent-Type: video/mp4\r\nContent-Length: 9000\r\n\r\n".to_string();
    let ok_url = serve_once(ok_head, vec![vec![1u8; 1000]; 3], false).await;
    let bad_url = serve_once(bad_head, vec![vec![2u8; 1000]], false).await;

    let ok_path = h.dir.path().join("ok.mp4");
    let bad_path = h.dir.path().join("bad.mp4");
    let ok_id = h.manager.start_download(1, &ok_url, &ok_path, "", "").await.unwrap();
    let bad_id = h.manager.start_download(1, &bad_url, &bad_path, "", "").await.unwrap();
    assert_ne!(ok_id, bad_id);

    let mut finals = std::collections::HashMap::new();
    while finals.len() < 2 {
        let p = tokio::time::timeout(Duration::from_secs(10), h.progress.recv())
            .await
            .unwrap()
            .unwrap();
        if p.status.is_terminal() {
            finals.insert(p.id, p.status);
        }
    }
    assert_eq!(finals[&ok_id], DownloadStatus::Completed);
    assert_eq!(finals[&bad_id], DownloadStatus::Failed);
    assert_eq!(file_len(&ok_path), 3000);
    assert_eq!(h.store.list_downloads(1).unwrap().len(), 2);
}

#[tokio::test]
async fn http_errors_and_html_are_rejected_up_front() {
    let h = harness();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(wiremock::matchers::path("/expired.mp4"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(wiremock::matchers::path("/login.mp4"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(b"<html></html>".to_vec(), "text/html"))
        .mount(&server)
        .await;

    for name in ["expired.mp4", "login.mp4"] {
        let save = h.dir.path().join(name);
        let err = h
            .manager
            .start_download(1, &format!("{}/{}", server.uri(), name), &save, "", "")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "DownloadFailure");
        assert!(!save.exists());
    }
    assert!(h.store.list_downloads(1).unwrap().is_empty());
}

/// Accepts one connection, reads the request, and never answers.
async fn silent_server() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = [0u8; 1024];
        let _ = socket.read(&mut buf).await;
        tokio::time::sleep(Duration::from_secs(60)).await;
    });
    format!("http://{}/video.mp4", addr)
}

#[tokio::test]
async fn silent_server_times_out_without_a_record() {
    let store = Arc::new(Store::open_in_memory().unwrap());
    let (emitter, _progress) = ChannelEmitter::new();
    let net = NetworkSettings {
        connect_timeout_secs: 1,
        request_timeout_secs: 1,
        read_timeout_secs: 1,
        ..NetworkSettings::default()
    };
    let manager = DownloadManager::new(
        store.clone(),
        Arc::new(emitter),
        &net,
        &DownloadSettings { progress_interval_ms: 0 },
    )
    .unwrap();
    let dir = tempfile::tempdir().unwrap();
    let save = dir.path().join("never.mp4");
    let url = silent_server().await;

    let result = tokio::time::timeout(
        Duration::from_secs(8),
        manager.start_download(1, &url, &save, "", ""),
    )
    .await
    .expect("start_download did not give up on a silent server");

    assert_eq!(result.unwrap_err().kind(), "NetworkFailure");
    assert!(store.list_downloads(1).unwrap().is_empty());
    assert!(!save.exists());
}
