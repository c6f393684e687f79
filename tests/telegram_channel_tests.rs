//! TelegramChannel and the bot upload path against an in-process fake of
//! the Bot API.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use channel_drive::bot::{Dispatcher, IncomingMedia, BOT_DOWNLOAD_LIMIT};
use channel_drive::channel::{BlobChannel, ChannelError, Destination, LocalChannel, TelegramChannel};
use channel_drive::service::{ContentKind, FileService};
use channel_drive::storage::{FileType, IndexStore, MessageId};
use channel_drive::telegram::BotApi;
use serde_json::{json, Value};

const TOKEN: &str = "123:test";
const CHANNEL: &str = "-1001234";

/// One multipart upload as the fake server saw it.
#[derive(Debug, Clone, Default)]
struct MediaRequest {
    method: String,
    fields: HashMap<String, String>,
    file_field: Option<String>,
    file_name: Option<String>,
    file_len: usize,
}

#[derive(Default)]
struct FakeBotApi {
    media: Mutex<Vec<MediaRequest>>,
    copies: Mutex<Vec<Value>>,
    file_lookups: Mutex<Vec<String>>,
}

async fn record_media(
    state: &FakeBotApi,
    method: &str,
    mut multipart: Multipart,
) -> Response {
    let mut request = MediaRequest {
        method: method.to_string(),
        ..Default::default()
    };
    while let Some(field) = multipart.next_field().await.unwrap() {
        let name = field.name().unwrap_or_default().to_string();
        if field.file_name().is_some() {
            request.file_field = Some(name);
            request.file_name = field.file_name().map(str::to_string);
            request.file_len = field.bytes().await.unwrap().len();
        } else {
            let text = field.text().await.unwrap();
            request.fields.insert(name, text);
        }
    }

    let rejected = request.file_name.as_deref() == Some("too-big.bin");
    let message_id = {
        let mut media = state.media.lock().unwrap();
        media.push(request);
        500 + media.len() as i64
    };

    if rejected {
        return (
            StatusCode::PAYLOAD_TOO_LARGE,
            Json(json!({
                "ok": false,
                "error_code": 413,
                "description": "Request Entity Too Large"
            })),
        )
            .into_response();
    }
    Json(json!({
        "ok": true,
        "result": { "message_id": message_id, "chat": { "id": -1001234 } }
    }))
    .into_response()
}

async fn copy_message(State(state): State<Arc<FakeBotApi>>, Json(body): Json<Value>) -> Response {
    state.copies.lock().unwrap().push(body.clone());
    match body["message_id"].as_i64() {
        Some(404) => (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "ok": false,
                "error_code": 400,
                "description": "Bad Request: message to copy not found"
            })),
        )
            .into_response(),
        Some(503) => (StatusCode::BAD_GATEWAY, "upstream down").into_response(),
        _ => Json(json!({ "ok": true, "result": { "message_id": 9000 } })).into_response(),
    }
}

async fn get_file(State(state): State<Arc<FakeBotApi>>, Json(body): Json<Value>) -> Response {
    let file_id = body["file_id"].as_str().unwrap_or_default().to_string();
    state.file_lookups.lock().unwrap().push(file_id.clone());
    let file_path = match file_id.as_str() {
        "doc-ok" => Some("documents/report.pdf"),
        "photo-ok" => Some("photos/file_7.jpg"),
        "big" => Some("documents/big.bin"),
        _ => None,
    };
    Json(json!({
        "ok": true,
        "result": { "file_id": file_id, "file_path": file_path }
    }))
    .into_response()
}

async fn download(Path((_, file_path)): Path<(String, String)>) -> Response {
    match file_path.as_str() {
        "documents/report.pdf" => b"%PDF-1.7".to_vec().into_response(),
        "photos/file_7.jpg" => b"jpeg".to_vec().into_response(),
        "documents/big.bin" => vec![0u8; 64].into_response(),
        _ => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn start_fake() -> (Arc<FakeBotApi>, String) {
    let state = Arc::new(FakeBotApi::default());
    let app = Router::new()
        .route(
            &format!("/bot{TOKEN}/sendPhoto"),
            post(|State(s): State<Arc<FakeBotApi>>, m: Multipart| async move {
                record_media(&s, "sendPhoto", m).await
            }),
        )
        .route(
            &format!("/bot{TOKEN}/sendVideo"),
            post(|State(s): State<Arc<FakeBotApi>>, m: Multipart| async move {
                record_media(&s, "sendVideo", m).await
            }),
        )
        .route(
            &format!("/bot{TOKEN}/sendDocument"),
            post(|State(s): State<Arc<FakeBotApi>>, m: Multipart| async move {
                record_media(&s, "sendDocument", m).await
            }),
        )
        .route(&format!("/bot{TOKEN}/copyMessage"), post(copy_message))
        .route(&format!("/bot{TOKEN}/getFile"), post(get_file))
        .route(&format!("/file/bot{TOKEN}/*path"), get(download))
        .with_state(Arc::clone(&state));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (state, format!("http://{addr}"))
}

fn channel_for(base_url: &str) -> TelegramChannel {
    let api = BotApi::new(base_url, TOKEN, Duration::from_secs(5)).unwrap();
    TelegramChannel::new(Arc::new(api), CHANNEL)
}

#[tokio::test]
async fn test_store_uses_type_specific_method() {
    let (fake, url) = start_fake().await;
    let channel = channel_for(&url);

    let photo = channel
        .store(Bytes::from_static(b"png!"), "cat.png", FileType::Photo)
        .await
        .unwrap();
    let video = channel
        .store(Bytes::from_static(b"mp4!!"), "clip.mp4", FileType::Video)
        .await
        .unwrap();
    let document = channel
        .store(Bytes::from_static(b"%PDF-1.7"), "report.pdf", FileType::Document)
        .await
        .unwrap();

    assert_eq!(photo, MessageId::new(501));
    assert_eq!(video, MessageId::new(502));
    assert_eq!(document, MessageId::new(503));

    let media = fake.media.lock().unwrap().clone();
    assert_eq!(media.len(), 3);

    assert_eq!(media[0].method, "sendPhoto");
    assert_eq!(media[0].file_field.as_deref(), Some("photo"));
    assert_eq!(media[0].fields.get("chat_id").map(String::as_str), Some(CHANNEL));
    assert!(!media[0].fields.contains_key("caption"), "photos carry no caption");

    assert_eq!(media[1].method, "sendVideo");
    assert_eq!(media[1].file_field.as_deref(), Some("video"));
    assert_eq!(media[1].fields.get("caption").map(String::as_str), Some("clip.mp4"));

    assert_eq!(media[2].method, "sendDocument");
    assert_eq!(media[2].file_field.as_deref(), Some("document"));
    assert_eq!(media[2].file_name.as_deref(), Some("report.pdf"));
    assert_eq!(media[2].file_len, 8);
    assert_eq!(media[2].fields.get("caption").map(String::as_str), Some("report.pdf"));
}

#[tokio::test]
async fn test_store_rejection() {
    let (_fake, url) = start_fake().await;
    let channel = channel_for(&url);

    let result = channel
        .store(Bytes::from_static(b"x"), "too-big.bin", FileType::Document)
        .await;
    assert!(matches!(result, Err(ChannelError::Rejected(msg)) if msg.contains("Too Large")));
}

#[tokio::test]
async fn test_store_unreachable_backend() {
    // Nothing listens on the discard port
    let channel = channel_for("http://127.0.0.1:9");

    let result = channel
        .store(Bytes::from_static(b"x"), "a.txt", FileType::Document)
        .await;
    match result {
        Err(ChannelError::Unavailable(msg)) => {
            assert!(!msg.contains(TOKEN), "token leaked into error: {msg}")
        }
        other => panic!("expected Unavailable, got {other:?}"),
    }
}

#[tokio::test]
async fn test_redeliver_copies_from_channel() {
    let (fake, url) = start_fake().await;
    let channel = channel_for(&url);

    channel
        .redeliver(MessageId::new(501), &Destination::from(42))
        .await
        .unwrap();

    let copies = fake.copies.lock().unwrap().clone();
    assert_eq!(copies.len(), 1);
    assert_eq!(copies[0]["chat_id"], json!("42"));
    assert_eq!(copies[0]["from_chat_id"], json!(CHANNEL));
    assert_eq!(copies[0]["message_id"], json!(501));
}

#[tokio::test]
async fn test_redeliver_missing_message_is_not_found() {
    let (_fake, url) = start_fake().await;
    let channel = channel_for(&url);

    let result = channel
        .redeliver(MessageId::new(404), &Destination::from(42))
        .await;
    assert!(matches!(result, Err(ChannelError::NotFound(id)) if id == MessageId::new(404)));
}

#[tokio::test]
async fn test_redeliver_upstream_failure_is_unavailable() {
    let (_fake, url) = start_fake().await;
    let channel = channel_for(&url);

    let result = channel
        .redeliver(MessageId::new(503), &Destination::from(42))
        .await;
    assert!(matches!(result, Err(ChannelError::Unavailable(_))));
}

fn dispatcher_for(
    base_url: &str,
    dir: &tempfile::TempDir,
    max_upload_size: u64,
) -> (Dispatcher, Arc<FileService>) {
    let api = BotApi::new(base_url, TOKEN, Duration::from_secs(5)).unwrap();
    let index = IndexStore::open(dir.path().join("files.db")).unwrap();
    let channel = LocalChannel::new(dir.path().join("channel")).unwrap();
    let service = Arc::new(FileService::new(
        index,
        Arc::new(channel),
        Duration::from_secs(5),
    ));
    let dispatcher = Dispatcher::new(
        Arc::new(api),
        Arc::clone(&service),
        max_upload_size,
        None,
        Duration::from_secs(1),
    );
    (dispatcher, service)
}

fn media(file_id: &str, file_name: Option<&str>, file_size: Option<u64>, kind: ContentKind) -> IncomingMedia {
    IncomingMedia {
        file_id: file_id.to_string(),
        file_name: file_name.map(str::to_string),
        file_size,
        kind,
    }
}

#[tokio::test]
async fn test_bot_upload_fetches_and_indexes_document() {
    let (fake, url) = start_fake().await;
    let dir = tempfile::tempdir().unwrap();
    let (dispatcher, service) = dispatcher_for(&url, &dir, 1024);

    let reply = dispatcher
        .handle_upload(media("doc-ok", Some("report.pdf"), Some(8), ContentKind::Document))
        .await;
    assert_eq!(reply, "File 'report.pdf' uploaded");

    assert_eq!(*fake.file_lookups.lock().unwrap(), vec!["doc-ok".to_string()]);
    let record = service.lookup("1").unwrap();
    assert_eq!(record.file_name, "report.pdf");
    assert_eq!(record.file_type, FileType::Document);
    assert_eq!(record.size, 8);
}

#[tokio::test]
async fn test_bot_photo_upload_gets_default_name() {
    let (_fake, url) = start_fake().await;
    let dir = tempfile::tempdir().unwrap();
    let (dispatcher, service) = dispatcher_for(&url, &dir, 1024);

    let reply = dispatcher
        .handle_upload(media("photo-ok", None, Some(4), ContentKind::Photo))
        .await;
    assert_eq!(reply, "File 'photo.jpg' uploaded");
    assert_eq!(service.lookup("1").unwrap().file_type, FileType::Photo);
}

#[tokio::test]
async fn test_bot_upload_checks_declared_size_before_download() {
    let (fake, url) = start_fake().await;
    let dir = tempfile::tempdir().unwrap();
    let (dispatcher, service) = dispatcher_for(&url, &dir, 16);

    let reply = dispatcher
        .handle_upload(media("doc-ok", Some("report.pdf"), Some(17), ContentKind::Document))
        .await;
    assert!(reply.contains("the limit is 16 bytes"), "{reply}");
    assert!(fake.file_lookups.lock().unwrap().is_empty());
    assert!(service.list().unwrap().is_empty());
}

#[tokio::test]
async fn test_bot_upload_checks_downloaded_size() {
    let (fake, url) = start_fake().await;
    let dir = tempfile::tempdir().unwrap();
    let (dispatcher, service) = dispatcher_for(&url, &dir, 16);

    // No size in the message; the 64 downloaded bytes are over the limit
    let reply = dispatcher
        .handle_upload(media("big", Some("big.bin"), None, ContentKind::Document))
        .await;
    assert!(reply.contains("exceeds the limit of 16 bytes"), "{reply}");
    assert_eq!(*fake.file_lookups.lock().unwrap(), vec!["big".to_string()]);
    assert!(service.list().unwrap().is_empty());
}

#[tokio::test]
async fn test_bot_upload_without_download_path() {
    let (_fake, url) = start_fake().await;
    let dir = tempfile::tempdir().unwrap();
    let (dispatcher, service) = dispatcher_for(&url, &dir, 1024);

    let reply = dispatcher
        .handle_upload(media("expired", Some("a.txt"), Some(3), ContentKind::Document))
        .await;
    assert!(
        reply.starts_with("Upload failed: could not fetch the file from Telegram"),
        "{reply}"
    );
    assert!(service.list().unwrap().is_empty());
}

#[tokio::test]
async fn test_bot_upload_over_download_ceiling_names_the_limit() {
    let (fake, url) = start_fake().await;
    let dir = tempfile::tempdir().unwrap();
    let (dispatcher, service) = dispatcher_for(&url, &dir, 50 * 1024 * 1024);

    let reply = dispatcher
        .handle_upload(media(
            "doc-ok",
            Some("movie.mkv"),
            Some(BOT_DOWNLOAD_LIMIT + 1),
            ContentKind::Document,
        ))
        .await;
    assert!(reply.contains("20 MB"), "{reply}");
    assert!(reply.contains("MiniApp"), "{reply}");
    assert!(fake.file_lookups.lock().unwrap().is_empty());
    assert!(service.list().unwrap().is_empty());
}
