//! Mock catalogue pages, mock sink endpoints, and fake external tools

use std::path::{Path, PathBuf};
use std::time::Duration;
use tracklift::Event;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// A catalogue listing with one song and one 320kbps download link
///
/// URLs are derived from `n` so every listing is distinct: the listing lives
/// at `/albums/{n}` and its download link points at `track{n}-320.mp3`.
pub fn album_listing(n: usize) -> serde_json::Value {
    serde_json::json!({
        "url": format!("https://catalogue.test/albums/{n}"),
        "songs": [
            {
                "name": format!("track{n}"),
                "song_link": format!("https://catalogue.test/songs/track{n}"),
                "download_links": [
                    { "quality": "320kbps", "url": format!("https://cdn.test/track{n}-320.mp3") }
                ]
            }
        ],
        "movie_info": { "Album": "Test Album", "Year": "2024" }
    })
}

/// Serve `listings` as catalogue page `page` at `/albums?page={page}`
pub async fn mount_page(server: &MockServer, page: u32, listings: Vec<serde_json::Value>) {
    Mock::given(method("GET"))
        .and(path("/albums"))
        .and(query_param("page", page.to_string()))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::Value::Array(listings)))
        .mount(server)
        .await;
}

/// Accept every publish on the sink with a fixed success receipt
pub async fn mount_sink(server: &MockServer) {
    let accepted = ResponseTemplate::new(200).set_body_json(serde_json::json!({
        "ok": true,
        "result": { "message_id": 100 }
    }));
    Mock::given(method("POST"))
        .and(path("/sendPhoto"))
        .respond_with(accepted.clone())
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/sendDocument"))
        .respond_with(accepted)
        .mount(server)
        .await;
}

/// Requests the sink has received so far, as `(api_method, body)` pairs
pub async fn sink_calls(server: &MockServer) -> Vec<(String, String)> {
    server
        .received_requests()
        .await
        .expect("request recording is enabled")
        .iter()
        .map(|request| {
            (
                request.url.path().trim_start_matches('/').to_string(),
                String::from_utf8_lossy(&request.body).into_owned(),
            )
        })
        .collect()
}

/// Write an executable shell script standing in for an external tool
///
/// The prologue parses the argument shapes of both tools: `$dest` and `$out`
/// hold the values passed after `-d` and `-o` (aria2c), `$input` holds the
/// value passed after `-i` and `$output` the final argument (ffmpeg).
#[cfg(unix)]
pub fn write_fake_tool(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    let prologue = r#"#!/bin/sh
dest=""
out=""
input=""
output=""
prev=""
for a in "$@"; do
  case "$prev" in
    -d) dest="$a" ;;
    -o) out="$a" ;;
    -i) input="$a" ;;
  esac
  prev="$a"
  output="$a"
done
"#;
    std::fs::write(&path, format!("{prologue}{body}\n")).expect("write fake tool");
    let mut perms = std::fs::metadata(&path).expect("stat fake tool").permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).expect("chmod fake tool");
    path
}

/// An aria2c stand-in that writes a small asset into the destination directory
#[cfg(unix)]
pub fn fake_aria2c_ok(dir: &Path) -> PathBuf {
    write_fake_tool(
        dir,
        "fake-aria2c",
        r#"printf 'audio bytes for testing' > "$dest/${out:-asset.mp3}""#,
    )
}

/// An aria2c stand-in that fails every invocation
#[cfg(unix)]
pub fn fake_aria2c_failing(dir: &Path) -> PathBuf {
    write_fake_tool(
        dir,
        "fake-aria2c",
        r#"echo 'download error' >&2
exit 1"#,
    )
}

/// An ffmpeg stand-in that writes a small image to the output path
#[cfg(unix)]
pub fn fake_ffmpeg_ok(dir: &Path) -> PathBuf {
    write_fake_tool(dir, "fake-ffmpeg", r#"printf 'png bytes' > "$output""#)
}

/// Receive events until one matches, failing the test if none arrives in time
///
/// Integration tests run on the real clock, so the ceiling is short.
pub async fn wait_for_event(
    events: &mut tokio::sync::broadcast::Receiver<Event>,
    mut predicate: impl FnMut(&Event) -> bool,
) -> Event {
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let event = events.recv().await.expect("event channel closed");
            if predicate(&event) {
                return event;
            }
        }
    })
    .await
    .expect("expected event was not emitted")
}

/// Drain whatever events are immediately available
pub fn drain_events(events: &mut tokio::sync::broadcast::Receiver<Event>) -> Vec<Event> {
    let mut drained = Vec::new();
    while let Ok(event) = events.try_recv() {
        drained.push(event);
    }
    drained
}
