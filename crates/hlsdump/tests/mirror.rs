use hlsdump_engine::hls::{
    DumpReport, HlsConfig, HlsDumper, HlsError, RetryPolicy, SyncReport, Termination,
};
use hlsdump_engine::{DownloadError, DownloaderConfig};
use reqwest::StatusCode;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

fn test_config() -> HlsConfig {
    let mut config = HlsConfig {
        base: DownloaderConfig {
            timeout: Duration::from_secs(5),
            use_system_proxy: false,
            ..Default::default()
        },
        ..Default::default()
    };
    config.playlist_config.min_refresh_interval = Duration::from_millis(10);
    config.pool_config.retry_policy = RetryPolicy::immediate();
    config
}

fn dumper() -> HlsDumper {
    HlsDumper::new(test_config()).unwrap()
}

async fn serve(server: &MockServer, at: &str, status: u16, body: &str) {
    Mock::given(method("GET"))
        .and(path(at))
        .respond_with(ResponseTemplate::new(status).set_body_string(body))
        .mount(server)
        .await;
}

fn read(path: &Path) -> String {
    std::fs::read_to_string(path).unwrap()
}

const VOD: &str = "#EXTM3U
#EXT-X-VERSION:3
#EXT-X-TARGETDURATION:6
#EXT-X-MEDIA-SEQUENCE:10
#EXTINF:5.0,
a.ts
#EXTINF:5.0,
b.ts
#EXT-X-ENDLIST
";

fn media(report: DumpReport) -> (std::path::PathBuf, SyncReport) {
    match report {
        DumpReport::Media { root, report } => (root, report),
        DumpReport::Master(_) => panic!("expected a media playlist"),
    }
}

#[tokio::test]
async fn mirrors_a_media_playlist() {
    let server = MockServer::start().await;
    serve(&server, "/live/index.m3u8", 200, VOD).await;
    serve(&server, "/live/a.ts", 200, "segment-a").await;
    serve(&server, "/live/b.ts", 200, "segment-b").await;

    let out = tempfile::tempdir().unwrap();
    let dest = out.path().join("mirror");
    let report = dumper()
        .dump(&format!("{}/live/index.m3u8", server.uri()), &dest)
        .await
        .unwrap();
    assert!(report.is_success());

    let (root, report) = media(report);
    assert!(root.file_name().unwrap().to_string_lossy().starts_with("mirror-"));
    assert_eq!(report.segments, 2);
    assert_eq!(report.downloads.succeeded, 2);
    assert_eq!(report.downloads.failed, 0);

    assert_eq!(read(&root.join("10.ts")), "segment-a");
    assert_eq!(read(&root.join("11.ts")), "segment-b");

    let index = read(&root.join("index.m3u8"));
    let body: Vec<&str> = index
        .lines()
        .skip_while(|l| !l.starts_with("##"))
        .take_while(|l| *l != "#EXT-X-ENDLIST")
        .collect();
    assert_eq!(
        body,
        vec!["##a.ts", "#EXTINF:5.0,", "10.ts", "##b.ts", "#EXTINF:5.0,", "11.ts"]
    );

    let parsed = m3u8_rs::parse_media_playlist_res(index.as_bytes()).unwrap();
    assert_eq!(parsed.media_sequence, 10);
    assert!(parsed.end_list);
    let uris: Vec<&str> = parsed.segments.iter().map(|s| s.uri.as_str()).collect();
    assert_eq!(uris, vec!["10.ts", "11.ts"]);
    assert_eq!(parsed.segments[0].duration, 5.0);
}

/// Serves a different playlist window on every request, sticking to the last one.
struct SlidingWindow {
    windows: Vec<String>,
    hits: AtomicUsize,
}

impl Respond for SlidingWindow {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        let hit = self.hits.fetch_add(1, Ordering::SeqCst);
        let window = &self.windows[hit.min(self.windows.len() - 1)];
        ResponseTemplate::new(200).set_body_string(window.clone())
    }
}

fn window(first: u64, count: u64, ended: bool) -> String {
    let mut body = format!("#EXTM3U\n#EXT-X-TARGETDURATION:1\n#EXT-X-MEDIA-SEQUENCE:{first}\n");
    for seq in first..first + count {
        body.push_str(&format!("#EXTINF:1.0,\nseg-{seq}.ts\n"));
    }
    if ended {
        body.push_str("#EXT-X-ENDLIST\n");
    }
    body
}

#[tokio::test]
async fn follows_a_live_window_without_gaps_or_duplicates() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/live.m3u8"))
        .respond_with(SlidingWindow {
            windows: vec![
                window(0, 3, false),
                window(2, 3, false),
                window(2, 3, false),
                window(4, 3, true),
            ],
            hits: AtomicUsize::new(0),
        })
        .mount(&server)
        .await;
    for seq in 0..7 {
        serve(&server, &format!("/seg-{seq}.ts"), 200, &format!("payload-{seq}")).await;
    }

    let out = tempfile::tempdir().unwrap();
    let report = dumper()
        .dump(&format!("{}/live.m3u8", server.uri()), &out.path().join("live"))
        .await
        .unwrap();

    let (root, report) = media(report);
    assert!(report.is_success(), "{:?}", report.termination);
    assert_eq!(report.segments, 7);
    assert_eq!(report.stalls, 1);
    assert_eq!(report.downloads.succeeded, 7);
    for seq in 0..7 {
        assert_eq!(read(&root.join(format!("{seq}.ts"))), format!("payload-{seq}"));
    }

    let parsed = m3u8_rs::parse_media_playlist_res(read(&root.join("index.m3u8")).as_bytes()).unwrap();
    let uris: Vec<String> = parsed.segments.iter().map(|s| s.uri.clone()).collect();
    let expected: Vec<String> = (0..7).map(|seq| format!("{seq}.ts")).collect();
    assert_eq!(uris, expected);
}

#[tokio::test]
async fn segment_failures_do_not_stop_the_playlist() {
    let server = MockServer::start().await;
    serve(&server, "/live/index.m3u8", 200, VOD).await;
    // a.ts recovers on the second attempt, b.ts is gone for good
    Mock::given(method("GET"))
        .and(path("/live/a.ts"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    serve(&server, "/live/a.ts", 200, "segment-a").await;
    serve(&server, "/live/b.ts", 404, "").await;

    let out = tempfile::tempdir().unwrap();
    let report = dumper()
        .dump(&format!("{}/live/index.m3u8", server.uri()), &out.path().join("m"))
        .await
        .unwrap();

    let (root, report) = media(report);
    assert!(report.is_success());
    assert_eq!(report.downloads.succeeded, 1);
    assert_eq!(report.downloads.failed, 1);
    assert_eq!(report.downloads.attempts, 3);
    assert_eq!(read(&root.join("10.ts")), "segment-a");
    assert!(!root.join("11.ts").exists());
    // the index still lists every segment
    assert!(read(&root.join("index.m3u8")).contains("11.ts"));
}

const MASTER: &str = r#"#EXTM3U
#EXT-X-STREAM-INF:PROGRAM-ID=1,BANDWIDTH=246440,CODECS="mp4a.40.5,avc1.42000d",RESOLUTION=320x184
low/index.m3u8
#EXT-X-STREAM-INF:PROGRAM-ID=1,BANDWIDTH=1280000
high/index.m3u8
"#;

#[tokio::test]
async fn failing_variant_does_not_affect_its_sibling() {
    let server = MockServer::start().await;
    serve(&server, "/show/master.m3u8", 200, MASTER).await;
    serve(&server, "/show/low/index.m3u8", 200, VOD).await;
    serve(&server, "/show/low/a.ts", 200, "low-a").await;
    serve(&server, "/show/low/b.ts", 200, "low-b").await;
    serve(&server, "/show/high/index.m3u8", 404, "").await;

    let out = tempfile::tempdir().unwrap();
    let report = dumper()
        .dump(&format!("{}/show/master.m3u8", server.uri()), &out.path().join("show"))
        .await
        .unwrap();

    let DumpReport::Master(master) = report else {
        panic!("expected a master playlist");
    };
    assert_eq!(master.variants.len(), 2);
    assert_eq!(master.failed(), 1);

    let low = &master.variants[0];
    assert_eq!(low.label, "0-246440-320");
    assert!(low.is_success());
    assert_eq!(low.downloads.succeeded, 2);
    assert_eq!(read(&master.root.join("0-246440-320").join("10.ts")), "low-a");

    let high = &master.variants[1];
    assert_eq!(high.label, "1-1280000");
    assert!(matches!(
        high.termination,
        Termination::Failed(HlsError::RefreshFailed {
            status: StatusCode::NOT_FOUND,
            failures: 4
        })
    ));

    let index = read(&master.root.join("index.m3u8"));
    assert!(index.contains("0-246440-320/index.m3u8\n"));
    assert!(index.contains("1-1280000/index.m3u8\n"));
    assert!(!index.contains("low/index.m3u8"));
    let parsed = m3u8_rs::parse_master_playlist_res(index.as_bytes()).unwrap();
    assert_eq!(parsed.variants.len(), 2);
    assert_eq!(parsed.variants[0].uri, "0-246440-320/index.m3u8");
    assert_eq!(parsed.variants[0].bandwidth, 246440);
}

#[tokio::test]
async fn master_without_bandwidth_is_rejected_before_any_output() {
    let server = MockServer::start().await;
    serve(
        &server,
        "/master.m3u8",
        200,
        "#EXTM3U\n#EXT-X-STREAM-INF:RESOLUTION=640x360\nv.m3u8\n",
    )
    .await;

    let out = tempfile::tempdir().unwrap();
    let err = dumper()
        .dump(&format!("{}/master.m3u8", server.uri()), &out.path().join("x"))
        .await
        .unwrap_err();
    assert!(matches!(err, HlsError::BandwidthNotFound { .. }));
    assert_eq!(std::fs::read_dir(out.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn non_playlist_content_is_invalid() {
    let server = MockServer::start().await;
    serve(&server, "/page", 200, "<html><body>hello</body></html>").await;

    let out = tempfile::tempdir().unwrap();
    let err = dumper()
        .dump(&format!("{}/page", server.uri()), out.path())
        .await
        .unwrap_err();
    assert!(matches!(err, HlsError::InvalidPlaylist { .. }));
}

#[tokio::test]
async fn root_fetch_errors_are_reported() {
    let server = MockServer::start().await;
    serve(&server, "/gone.m3u8", 410, "").await;

    let out = tempfile::tempdir().unwrap();
    let err = dumper()
        .dump(&format!("{}/gone.m3u8", server.uri()), out.path())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        HlsError::Download(DownloadError::HttpStatus {
            status: StatusCode::GONE,
            ..
        })
    ));

    let err = dumper()
        .dump("ftp://example.com/index.m3u8", out.path())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        HlsError::Download(DownloadError::UnsupportedProtocol { .. })
    ));
}
