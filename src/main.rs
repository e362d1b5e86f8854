use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context};
use tracing_subscriber::EnvFilter;

use vidlink_core::fs_paths::{AppPaths, DesktopPaths};
use vidlink_core::models::download::DownloadStatus;
use vidlink_core::platforms::Platform;
use vidlink_lib::commands;
use vidlink_lib::core::events::ChannelEmitter;
use vidlink_lib::core::filename;
use vidlink_lib::storage::config;
use vidlink_lib::AppState;

const DEFAULT_USER: i64 = 1;

const USAGE: &str = "usage:
  vidlink parse <url or share text>
  vidlink download <url or share text> [save path]
  vidlink cache <video url>
  vidlink proxy <asset url>
  vidlink downloads [user id]";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,vidlink_lib=debug")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first().map(String::as_str) else {
        eprintln!("{}", USAGE);
        std::process::exit(2);
    };

    let paths = DesktopPaths;
    let settings = config::load_settings(&paths.data_dir());
    let (emitter, mut progress) = ChannelEmitter::new();
    let state = AppState::new(&settings, &paths, Arc::new(emitter))?;

    match (command, &args[1..]) {
        ("parse", [input, ..]) => {
            let descriptor = commands::parse::parse_video(&state, input.clone())
                .await
                .map_err(|e| anyhow!(e))?;
            println!("{}", serde_json::to_string_pretty(&descriptor)?);
        }
        ("download", [input, rest @ ..]) => {
            let (url, title, cover, default_name) = download_target(&state, input).await?;
            let save_path = match rest.first() {
                Some(p) => PathBuf::from(p),
                None => paths.downloads_dir().join(default_name),
            };

            let started = commands::downloads::download_file(
                &state,
                DEFAULT_USER,
                url,
                save_path.to_string_lossy().into_owned(),
                title,
                cover,
            )
            .await
            .map_err(|e| anyhow!(e))?;

            while let Some(p) = progress.recv().await {
                if p.id != started.id {
                    continue;
                }
                match p.percent() {
                    Some(pct) => eprintln!("#{} {} {:.1}% ({} bytes)", p.id, p.status, pct, p.downloaded),
                    None => eprintln!("#{} {} {} bytes", p.id, p.status, p.downloaded),
                }
                if p.status.is_terminal() {
                    if p.status == DownloadStatus::Failed {
                        bail!("download #{} failed after {} bytes", p.id, p.downloaded);
                    }
                    break;
                }
            }
            println!("{}", save_path.display());
        }
        ("cache", [url, ..]) => {
            let path = commands::media::cache_video(&state, url.clone())
                .await
                .map_err(|e| anyhow!(e))?;
            println!("{}", path);
        }
        ("proxy", [url, ..]) => {
            let data_uri = commands::media::proxy_image(&state, url.clone(), None)
                .await
                .map_err(|e| anyhow!(e))?;
            println!("{}", data_uri);
        }
        ("downloads", rest) => {
            let user_id = match rest.first() {
                Some(id) => id.parse().context("user id must be an integer")?,
                None => DEFAULT_USER,
            };
            let records =
                commands::downloads::get_downloads(&state, user_id).map_err(|e| anyhow!(e))?;
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
        _ => {
            eprintln!("{}", USAGE);
            std::process::exit(2);
        }
    }

    Ok(())
}

/// Share links are resolved first; anything else is fetched as-is.
async fn download_target(
    state: &AppState,
    input: &str,
) -> anyhow::Result<(String, String, String, String)> {
    let is_share_link = vidlink_lib::platforms::shared::extract_url(input)
        .as_deref()
        .and_then(Platform::from_url)
        .is_some();

    if !is_share_link {
        let name = filename::sanitize_title(
            url::Url::parse(input)
                .ok()
                .and_then(|u| u.path_segments()?.next_back().map(|s| s.to_string()))
                .as_deref()
                .unwrap_or_default(),
        );
        let name = if name.is_empty() { "download.mp4".to_string() } else { name };
        return Ok((input.to_string(), String::new(), String::new(), name));
    }

    let descriptor = commands::parse::parse_video(state, input.to_string())
        .await
        .map_err(|e| anyhow!(e))?;
    let url = if descriptor.has_video() {
        descriptor.video_url.clone()
    } else {
        descriptor
            .images
            .first()
            .map(|i| i.url.clone())
            .ok_or_else(|| anyhow!("nothing to download"))?
    };
    let fallback_ext = if descriptor.has_video() { "mp4" } else { "jpg" };
    let name = filename::file_name_for(&descriptor, &filename::extension_from_url(&url, fallback_ext));
    Ok((url, descriptor.title.clone(), descriptor.cover_url.clone(), name))
}
