//! End-to-end pipeline tests against a mock course platform.
//!
//! These cover the full flow: catalog resolution, chapter selection,
//! manifest/quality selection, segment decryption, and on-disk assembly.

use std::io::Cursor;
use std::sync::Arc;

use cipher::block_padding::Pkcs7;
use cipher::{BlockEncryptMut, KeyIvInit};
use coursedl_core::assemble::Assembler;
use coursedl_core::manifest::ByteRange;
use coursedl_core::scheduler::{DownloadTask, TaskKind};
use coursedl_core::{
    CatalogError, ChapterSpec, DownloadConfig, PipelineError, ProgressEvent, ProgressSink,
    RetryPolicy, Scheduler, SessionContext, pipeline,
};
use tokio_util::sync::CancellationToken;
use url::Url;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;

const KEY_HEX: &str = "000102030405060708090a0b0c0d0e0f";
const IV_HEX: &str = "00000000000000000000000000000001";

fn content_key() -> [u8; 16] {
    let mut key = [0u8; 16];
    hex::decode_to_slice(KEY_HEX, &mut key).unwrap();
    key
}

fn playlist_iv() -> [u8; 16] {
    let mut iv = [0u8; 16];
    hex::decode_to_slice(IV_HEX, &mut iv).unwrap();
    iv
}

fn encrypt(plaintext: &[u8]) -> Vec<u8> {
    let cipher = Aes128CbcEnc::new(&content_key().into(), &playlist_iv().into());
    let padded_len = (plaintext.len() / 16 + 1) * 16;
    let mut buffer = vec![0u8; padded_len];
    buffer[..plaintext.len()].copy_from_slice(plaintext);
    cipher
        .encrypt_padded_mut::<Pkcs7>(&mut buffer, plaintext.len())
        .unwrap()
        .to_vec()
}

fn test_session() -> Arc<SessionContext> {
    let keys = format!(r#"{{"kid-1": "{KEY_HEX}"}}"#);
    Arc::new(
        SessionContext::load(
            None::<Cursor<Vec<u8>>>,
            Some(&keys),
            Some("test-token".to_string()),
        )
        .unwrap(),
    )
}

fn base_config(server: &MockServer, output: &std::path::Path) -> DownloadConfig {
    let mut config = DownloadConfig::new("rust-basics", Url::parse(&server.uri()).unwrap());
    config.output_root = output.to_path_buf();
    config
}

async fn run_pipeline(
    config: &DownloadConfig,
    session: &Arc<SessionContext>,
) -> Result<coursedl_core::RunSummary, PipelineError> {
    pipeline::run(
        config,
        session,
        &ProgressSink::disabled(),
        &CancellationToken::new(),
    )
    .await
}

/// Mounts the catalog endpoints for a two-chapter course.
///
/// Chapter 1 "Basics" has one progressive lecture; chapter 2 "Advanced
/// Topics" has one encrypted HLS lecture with a caption, an asset, and a
/// quiz.
async fn mount_catalog(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/api/courses/rust-basics"))
        .and(header("authorization", "Bearer test-token"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"id": 7, "title": "Rust Basics"})),
        )
        .mount(server)
        .await;

    let uri = server.uri();
    Mock::given(method("GET"))
        .and(path("/api/courses/rust-basics/curriculum"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "count": 4,
            "next": null,
            "results": [
                {"type": "chapter", "title": "Basics", "sort_order": 1},
                {"type": "lecture", "id": 101, "title": "Intro", "sort_order": 2,
                 "media_id": "m-1"},
                {"type": "chapter", "title": "Advanced Topics", "sort_order": 3},
                {"type": "lecture", "id": 102, "title": "Ownership", "sort_order": 4,
                 "media_id": "m-2",
                 "captions": [{"lang": "en", "url": format!("{uri}/caps/en.vtt")}],
                 "assets": [{"name": "slides.pdf", "url": format!("{uri}/assets/slides.pdf")}],
                 "quiz": {"questions": [{"q": "Who owns it?"}]}}
            ]
        })))
        .mount(server)
        .await;
}

/// Mounts the media endpoints: a progressive variant for m-1 and an
/// encrypted three-segment HLS variant for m-2.
async fn mount_media(server: &MockServer, segments: &[&[u8]]) {
    let uri = server.uri();

    Mock::given(method("GET"))
        .and(path("/api/media/m-1/manifest"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "variants": [{"label": "720p", "height": 720, "bitrate": 1_000_000,
                          "kind": "progressive", "url": format!("{uri}/media/m-1/file.mp4")}]
        })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/media/m-1/file.mp4"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"progressive media".to_vec()))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/media/m-2/manifest"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "variants": [{"label": "720p", "height": 720, "bitrate": 1_500_000,
                          "kind": "hls", "url": format!("{uri}/media/m-2/index.m3u8")}]
        })))
        .mount(server)
        .await;

    let mut playlist = format!(
        "#EXTM3U\n#EXT-X-VERSION:3\n#EXT-X-TARGETDURATION:6\n#EXT-X-MEDIA-SEQUENCE:0\n\
         #EXT-X-KEY:METHOD=AES-128,URI=\"drm://kid-1\",IV=0x{IV_HEX}\n"
    );
    for (i, _) in segments.iter().enumerate() {
        playlist.push_str(&format!("#EXTINF:6.0,\nseg-{i}.ts\n"));
    }
    playlist.push_str("#EXT-X-ENDLIST\n");

    Mock::given(method("GET"))
        .and(path("/media/m-2/index.m3u8"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(playlist.into_bytes()))
        .mount(server)
        .await;

    for (i, plaintext) in segments.iter().enumerate() {
        Mock::given(method("GET"))
            .and(path(format!("/media/m-2/seg-{i}.ts")))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(encrypt(plaintext)))
            .mount(server)
            .await;
    }

    Mock::given(method("GET"))
        .and(path("/caps/en.vtt"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"WEBVTT\n".to_vec()))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/assets/slides.pdf"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"%PDF-1.4".to_vec()))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_full_course_download_decrypts_and_assembles() {
    let server = MockServer::start().await;
    mount_catalog(&server).await;
    mount_media(&server, &[b"part one;", b"part two;", b"part three;"]).await;

    let output = tempfile::tempdir().unwrap();
    let config = base_config(&server, output.path());
    let summary = run_pipeline(&config, &test_session()).await.unwrap();

    assert!(summary.is_clean(), "failures: {:?}", summary.lecture_failures);
    assert_eq!(summary.course_title, "Rust Basics");
    assert_eq!(summary.lectures_planned, 2);

    let course = output.path().join("Rust Basics");
    let media = course.join("02 Advanced Topics").join("001 Ownership.ts");
    assert_eq!(
        std::fs::read_to_string(&media).unwrap(),
        "part one;part two;part three;"
    );
    assert_eq!(
        std::fs::read_to_string(course.join("01 Basics").join("001 Intro.mp4")).unwrap(),
        "progressive media"
    );

    let chapter2 = course.join("02 Advanced Topics");
    assert_eq!(
        std::fs::read_to_string(chapter2.join("001 Ownership.en.vtt")).unwrap(),
        "WEBVTT\n"
    );
    assert!(chapter2.join("001 Ownership - slides.pdf").exists());
    let quiz = std::fs::read_to_string(chapter2.join("001 Ownership.quiz.json")).unwrap();
    assert!(quiz.contains("Who owns it?"));
}

#[tokio::test]
async fn test_chapter_selection_downloads_only_selected() {
    let server = MockServer::start().await;
    mount_catalog(&server).await;
    mount_media(&server, &[b"only chapter two"]).await;

    let output = tempfile::tempdir().unwrap();
    let mut config = base_config(&server, output.path());
    config.chapters = ChapterSpec::parse("2").unwrap();

    let summary = run_pipeline(&config, &test_session()).await.unwrap();
    assert_eq!(summary.lectures_planned, 1);

    let course = output.path().join("Rust Basics");
    assert!(course.join("02 Advanced Topics").join("001 Ownership.ts").exists());
    assert!(
        !course.join("01 Basics").exists(),
        "unselected chapter must not be created"
    );
}

#[tokio::test]
async fn test_rerun_skips_existing_media() {
    let server = MockServer::start().await;
    mount_catalog(&server).await;
    mount_media(&server, &[b"segment data"]).await;

    let output = tempfile::tempdir().unwrap();
    let config = base_config(&server, output.path());
    let session = test_session();

    let first = run_pipeline(&config, &session).await.unwrap();
    assert_eq!(first.lectures_planned, 2);
    assert_eq!(first.lectures_skipped, 0);

    let second = run_pipeline(&config, &session).await.unwrap();
    assert_eq!(second.lectures_planned, 0);
    assert_eq!(second.lectures_skipped, 2);
    assert_eq!(second.stats.completed(), 0);
}

#[tokio::test]
async fn test_quality_preference_selects_constrained_variant() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/courses/rust-basics"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"id": 7, "title": "Rust Basics"})),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/courses/rust-basics/curriculum"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "count": 2, "next": null,
            "results": [
                {"type": "chapter", "title": "Only", "sort_order": 1},
                {"type": "lecture", "id": 1, "title": "Pick", "sort_order": 2, "media_id": "m-9"}
            ]
        })))
        .mount(&server)
        .await;

    let uri = server.uri();
    Mock::given(method("GET"))
        .and(path("/api/media/m-9/manifest"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "variants": [
                {"label": "1080p", "height": 1080, "bitrate": 3_000_000,
                 "kind": "progressive", "url": format!("{uri}/media/m-9/1080.mp4")},
                {"label": "720p", "height": 720, "bitrate": 1_500_000,
                 "kind": "progressive", "url": format!("{uri}/media/m-9/720.mp4")},
                {"label": "480p", "height": 480, "bitrate": 800_000,
                 "kind": "progressive", "url": format!("{uri}/media/m-9/480.mp4")}
            ]
        })))
        .mount(&server)
        .await;
    for label in ["1080", "720", "480"] {
        Mock::given(method("GET"))
            .and(path(format!("/media/m-9/{label}.mp4")))
            .respond_with(
                ResponseTemplate::new(200).set_body_bytes(format!("media-{label}").into_bytes()),
            )
            .mount(&server)
            .await;
    }

    let output = tempfile::tempdir().unwrap();
    let mut config = base_config(&server, output.path());
    config.quality = Some(900);

    run_pipeline(&config, &test_session()).await.unwrap();

    let media = output
        .path()
        .join("Rust Basics")
        .join("01 Only")
        .join("001 Pick.mp4");
    // 900 is not an exact rung: the best variant not exceeding it is 720p.
    assert_eq!(std::fs::read_to_string(&media).unwrap(), "media-720");
}

#[tokio::test]
async fn test_transient_errors_retried_until_success() {
    let server = MockServer::start().await;
    mount_catalog(&server).await;

    let uri = server.uri();
    Mock::given(method("GET"))
        .and(path("/api/media/m-1/manifest"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "variants": [{"label": "720p", "height": 720, "bitrate": 1_000_000,
                          "kind": "progressive", "url": format!("{uri}/media/m-1/file.mp4")}]
        })))
        .mount(&server)
        .await;
    // First two fetches fail with 503, the third succeeds.
    Mock::given(method("GET"))
        .and(path("/media/m-1/file.mp4"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/media/m-1/file.mp4"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"finally".to_vec()))
        .mount(&server)
        .await;

    let output = tempfile::tempdir().unwrap();
    let mut config = base_config(&server, output.path());
    config.chapters = ChapterSpec::parse("1").unwrap();
    config.max_attempts = 3;

    let summary = run_pipeline(&config, &test_session()).await.unwrap();

    assert_eq!(summary.stats.retried(), 2);
    assert_eq!(summary.stats.failed(), 0);
    let media = output
        .path()
        .join("Rust Basics")
        .join("01 Basics")
        .join("001 Intro.mp4");
    assert_eq!(std::fs::read_to_string(&media).unwrap(), "finally");
}

#[tokio::test]
async fn test_missing_key_fails_lecture_but_not_run() {
    let server = MockServer::start().await;
    mount_catalog(&server).await;
    mount_media(&server, &[b"encrypted fine"]).await;

    // Session without the content key for kid-1.
    let session = Arc::new(
        SessionContext::load(
            None::<Cursor<Vec<u8>>>,
            None,
            Some("test-token".to_string()),
        )
        .unwrap(),
    );

    let output = tempfile::tempdir().unwrap();
    let config = base_config(&server, output.path());
    let summary = run_pipeline(&config, &session).await.unwrap();

    // The encrypted lecture is reported; the progressive one still lands.
    assert_eq!(summary.lecture_failures.len(), 1);
    assert!(summary.lecture_failures[0].reason.contains("kid-1"));
    assert!(
        output
            .path()
            .join("Rust Basics")
            .join("01 Basics")
            .join("001 Intro.mp4")
            .exists()
    );
    assert!(
        !output
            .path()
            .join("Rust Basics")
            .join("02 Advanced Topics")
            .join("001 Ownership.ts")
            .exists()
    );
}

#[tokio::test]
async fn test_session_rejection_is_fatal() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/courses/rust-basics"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let output = tempfile::tempdir().unwrap();
    let config = base_config(&server, output.path());
    let err = run_pipeline(&config, &test_session()).await.unwrap_err();

    assert!(matches!(
        err,
        PipelineError::Catalog(CatalogError::SessionRejected { status: 401 })
    ));
}

fn segment_task(url: String, dest: &std::path::Path, sequence: u64, total: u64) -> DownloadTask {
    DownloadTask {
        url,
        byte_range: None,
        kind: TaskKind::Segment {
            dest: dest.to_path_buf(),
            sequence,
            total,
            key: None,
        },
    }
}

#[tokio::test]
async fn test_cancellation_discards_partial_media() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/media/seg-0.ts"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"first;".to_vec()))
        .mount(&server)
        .await;
    // The second segment stalls long enough for the cancel to land first.
    Mock::given(method("GET"))
        .and(path("/media/seg-1.ts"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(b"never;".to_vec())
                .set_delay(std::time::Duration::from_secs(60)),
        )
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("001 Intro.ts");
    let tasks = vec![
        segment_task(format!("{}/media/seg-0.ts", server.uri()), &dest, 0, 2),
        segment_task(format!("{}/media/seg-1.ts", server.uri()), &dest, 1, 2),
    ];

    let session = test_session();
    let client = pipeline::build_http_client(&session).unwrap();
    let assembler = Arc::new(Assembler::new());
    let scheduler = Scheduler::new(2, RetryPolicy::with_max_attempts(1)).unwrap();

    let cancel = CancellationToken::new();
    let (progress, mut rx) = ProgressSink::channel();
    let canceller = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if matches!(event, ProgressEvent::Completed { .. }) {
                    cancel.cancel();
                }
            }
        })
    };

    let stats = scheduler
        .run(tasks, &client, &session, &assembler, &progress, &cancel)
        .await
        .unwrap();
    drop(progress);
    canceller.await.unwrap();

    assert_eq!(stats.completed(), 1);
    assert_eq!(stats.failed(), 1, "the stalled segment must abort, not hang");
    assert!(
        !dest.exists(),
        "cancelled lecture must never appear under its final name"
    );
    assert_eq!(assembler.in_flight(), 1);

    // Dropping the assembler releases the partial lecture's temp file.
    drop(assembler);
    let leftovers: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
    assert!(leftovers.is_empty(), "no temp file may survive cancellation");
}

#[tokio::test]
async fn test_byte_range_segments_send_range_headers_and_assemble() {
    let server = MockServer::start().await;
    // Each mock matches only its segment's Range header, so an absent or
    // wrong header falls through to wiremock's 404 and fails the task.
    Mock::given(method("GET"))
        .and(path("/media/all.ts"))
        .and(header("range", "bytes=0-5"))
        .respond_with(ResponseTemplate::new(206).set_body_bytes(b"first;".to_vec()))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/media/all.ts"))
        .and(header("range", "bytes=6-12"))
        .respond_with(ResponseTemplate::new(206).set_body_bytes(b"second;".to_vec()))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("001 Ranged.ts");
    let url = format!("{}/media/all.ts", server.uri());
    let mut tasks = vec![
        segment_task(url.clone(), &dest, 0, 2),
        segment_task(url, &dest, 1, 2),
    ];
    tasks[0].byte_range = Some(ByteRange {
        offset: 0,
        length: 6,
    });
    tasks[1].byte_range = Some(ByteRange {
        offset: 6,
        length: 7,
    });

    let session = test_session();
    let client = pipeline::build_http_client(&session).unwrap();
    let assembler = Arc::new(Assembler::new());
    let scheduler = Scheduler::new(2, RetryPolicy::with_max_attempts(1)).unwrap();

    let stats = scheduler
        .run(
            tasks,
            &client,
            &session,
            &assembler,
            &ProgressSink::disabled(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(stats.failed(), 0, "failures: {:?}", stats.failures());
    assert_eq!(stats.completed(), 2);
    assert_eq!(std::fs::read_to_string(&dest).unwrap(), "first;second;");
}

#[tokio::test]
async fn test_progress_events_cover_the_run() {
    let server = MockServer::start().await;
    mount_catalog(&server).await;
    mount_media(&server, &[b"seg"]).await;

    let output = tempfile::tempdir().unwrap();
    let config = base_config(&server, output.path());

    let (progress, mut rx) = ProgressSink::channel();
    pipeline::run(
        &config,
        &test_session(),
        &progress,
        &CancellationToken::new(),
    )
    .await
    .unwrap();
    drop(progress);

    let mut total_tasks = None;
    let mut completed = 0usize;
    let mut persisted = 0usize;
    while let Some(event) = rx.recv().await {
        match event {
            ProgressEvent::RunStarted { total_tasks: n } => total_tasks = Some(n),
            ProgressEvent::Completed { .. } => completed += 1,
            ProgressEvent::LecturePersisted { .. } => persisted += 1,
            _ => {}
        }
    }

    // Two media files, one caption, one asset.
    assert_eq!(total_tasks, Some(4));
    assert_eq!(completed, 4);
    assert_eq!(persisted, 2);
}
