//! End-to-end export behavior, including the remote-first raster path
//! against a mock render server.

use std::thread;
use std::time::Duration;

use tiny_http::{Header, Response, Server};

use cardshot::capture::{Format, WaitPolicy};
use cardshot::content::{Card, CardContent};
use cardshot::export::{ExportJob, ExportOrchestrator, LiveElement};
use cardshot::theme::ThemeRegistry;
use cardshot::RenderConfig;

fn content() -> CardContent {
    let cards = vec![
        Card::new("Draft", "Write it down", "edit").unwrap(),
        Card::new("Ship", "Send it out", "send").unwrap(),
    ];
    CardContent::new("Release Notes", cards).unwrap()
}

fn local_config() -> RenderConfig {
    RenderConfig {
        wait: WaitPolicy::none(),
        ..RenderConfig::default()
    }
}

/// Serve `responses` on an ephemeral port, one per incoming request.
fn mock_server(responses: Vec<(u16, &'static str, Vec<u8>)>) -> String {
    let server = Server::http("127.0.0.1:0").unwrap();
    let port = server.server_addr().to_ip().unwrap().port();
    thread::spawn(move || {
        for (status, content_type, body) in responses {
            let Ok(request) = server.recv() else { return };
            let response = Response::from_data(body)
                .with_status_code(status)
                .with_header(
                    format!("Content-Type: {}", content_type)
                        .parse::<Header>()
                        .unwrap(),
                );
            let _ = request.respond(response);
        }
    });
    format!("http://127.0.0.1:{}/render", port)
}

#[tokio::test]
async fn remote_success_returns_remote_bytes_verbatim() {
    let fake_png: Vec<u8> = {
        let mut b = vec![0x89, b'P', b'N', b'G'];
        b.extend(std::iter::repeat(7u8).take(2048));
        b
    };
    let endpoint = mock_server(vec![(200, "image/png", fake_png.clone())]);

    let config = RenderConfig {
        prefer_remote: true,
        remote_endpoint: Some(endpoint),
        remote_token: Some("secret".into()),
        wait: WaitPolicy::none(),
        ..RenderConfig::default()
    };
    let reg = ThemeRegistry::builtin();
    let theme = reg.get("classic").unwrap();
    let orch = ExportOrchestrator::new(config.clone()).unwrap();
    let job = ExportJob::new(Format::Png, theme.as_ref(), &config);

    let artifact = orch
        .export_as_image(theme.as_ref(), &content(), &job, None)
        .await
        .unwrap();
    assert_eq!(artifact.bytes, fake_png);
    assert_eq!(artifact.content_type, "image/png");
}

#[tokio::test]
async fn remote_error_falls_back_to_local_capture_silently() {
    let endpoint = mock_server(vec![(500, "application/json", b"{\"error\":\"down\"}".to_vec())]);

    let config = RenderConfig {
        prefer_remote: true,
        remote_endpoint: Some(endpoint),
        wait: WaitPolicy::none(),
        ..RenderConfig::default()
    };
    let reg = ThemeRegistry::builtin();
    let theme = reg.get("classic").unwrap();
    let orch = ExportOrchestrator::new(config.clone()).unwrap();
    let job = ExportJob::new(Format::Png, theme.as_ref(), &config);

    // The caller sees a plain success produced by local capture.
    let artifact = orch
        .export_as_image(theme.as_ref(), &content(), &job, None)
        .await
        .unwrap();
    assert_eq!(&artifact.bytes[..4], &[0x89, b'P', b'N', b'G']);
}

#[tokio::test]
async fn stalled_remote_times_out_and_falls_back_to_local_capture() {
    // The mock accepts the connection but responds long after the client
    // bound, forcing the timeout branch rather than a connect error.
    let server = Server::http("127.0.0.1:0").unwrap();
    let port = server.server_addr().to_ip().unwrap().port();
    thread::spawn(move || {
        if let Ok(request) = server.recv() {
            thread::sleep(Duration::from_millis(2_000));
            let _ = request.respond(Response::from_data(vec![0u8; 2048]));
        }
    });

    let config = RenderConfig {
        prefer_remote: true,
        remote_endpoint: Some(format!("http://127.0.0.1:{}/render", port)),
        remote_timeout_ms: 100,
        wait: WaitPolicy::none(),
        ..RenderConfig::default()
    };
    let reg = ThemeRegistry::builtin();
    let theme = reg.get("classic").unwrap();
    let orch = ExportOrchestrator::new(config.clone()).unwrap();
    let job = ExportJob::new(Format::Png, theme.as_ref(), &config);

    let artifact = orch
        .export_as_image(theme.as_ref(), &content(), &job, None)
        .await
        .unwrap();
    // Locally captured bytes, not the stalled server's payload.
    assert_eq!(&artifact.bytes[..4], &[0x89, b'P', b'N', b'G']);
    assert_ne!(artifact.bytes, vec![0u8; 2048]);
}

#[tokio::test]
async fn non_image_remote_response_also_falls_back() {
    let endpoint = mock_server(vec![(200, "text/html", b"<html>login page</html>".to_vec())]);

    let config = RenderConfig {
        prefer_remote: true,
        remote_endpoint: Some(endpoint),
        wait: WaitPolicy::none(),
        ..RenderConfig::default()
    };
    let reg = ThemeRegistry::builtin();
    let theme = reg.get("classic").unwrap();
    let orch = ExportOrchestrator::new(config.clone()).unwrap();
    let job = ExportJob::new(Format::Png, theme.as_ref(), &config);

    let artifact = orch
        .export_as_image(theme.as_ref(), &content(), &job, None)
        .await
        .unwrap();
    assert_eq!(&artifact.bytes[..4], &[0x89, b'P', b'N', b'G']);
}

#[tokio::test]
async fn svg_export_never_takes_the_remote_path() {
    // No mock server: a remote attempt would fail the connect and a
    // non-raster format must not even try.
    let config = RenderConfig {
        prefer_remote: true,
        remote_endpoint: Some("http://127.0.0.1:1/render".into()),
        wait: WaitPolicy::none(),
        ..RenderConfig::default()
    };
    let reg = ThemeRegistry::builtin();
    let theme = reg.get("mono").unwrap();
    let orch = ExportOrchestrator::new(config.clone()).unwrap();
    let job = ExportJob::new(Format::Svg, theme.as_ref(), &config);

    let artifact = orch
        .export_as_image(theme.as_ref(), &content(), &job, None)
        .await
        .unwrap();
    assert!(String::from_utf8(artifact.bytes).unwrap().starts_with("<svg"));
    assert!(artifact.filename.ends_with(".svg"));
}

#[tokio::test]
async fn document_export_is_standalone() {
    let reg = ThemeRegistry::builtin();
    let theme = reg.get("classic").unwrap();
    let orch = ExportOrchestrator::new(local_config()).unwrap();
    let doc = orch
        .export_as_document(theme.as_ref(), &content())
        .await
        .unwrap();

    assert!(doc.starts_with("<!doctype html>"));
    // The fit procedure travels with the file.
    assert!(doc.contains("document.getElementById('card-main-title')"));
    assert!(doc.contains("document.getElementById('card-content-wrapper')"));
    // Fixed intrinsic canvas.
    assert!(doc.contains("width:1920px;height:1080px"));
}

#[tokio::test]
async fn live_element_export_matches_on_screen_scale() {
    let reg = ThemeRegistry::builtin();
    let theme = reg.get("classic").unwrap();
    let config = local_config();
    let orch = ExportOrchestrator::new(config.clone()).unwrap();
    let mut job = ExportJob::new(Format::Png, theme.as_ref(), &config);
    job.pixel_ratio = 1.0;

    let live = LiveElement {
        width: 960.0,
        height: 540.0,
    };
    let artifact = orch
        .export_as_image(theme.as_ref(), &content(), &job, Some(live))
        .await
        .unwrap();
    let img = image::load_from_memory(&artifact.bytes).unwrap();
    assert_eq!((img.width(), img.height()), (960, 540));
}
