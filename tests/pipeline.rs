use std::io::{Read, Write};
use std::net::TcpListener;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use base64::Engine;
use image::{DynamicImage, ImageFormat, RgbImage};
use tempfile::NamedTempFile;

use bioscan::{
    run_input, CaptureInput, DetectionService, FileCapture, HostedInferenceClient,
    InferenceSettings, OverlayRenderer, OverlayStyle, Phase, RasterSurface, ScanSession,
};

/// What the mock endpoint saw.
struct CapturedRequest {
    request_line: String,
    headers: String,
    body: String,
}

/// Serve exactly one HTTP request on loopback with a canned response.
fn mock_endpoint(status: u16, body: &'static str) -> (String, JoinHandle<CapturedRequest>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind mock endpoint");
    let addr = listener.local_addr().expect("mock addr");
    let handle = thread::spawn(move || {
        let (mut stream, _) = listener.accept().expect("accept");
        let mut raw = Vec::new();
        let mut buf = [0u8; 4096];
        let header_end = loop {
            let n = stream.read(&mut buf).expect("read request");
            assert!(n > 0, "client closed before sending headers");
            raw.extend_from_slice(&buf[..n]);
            if let Some(pos) = raw.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos + 4;
            }
        };
        let head = String::from_utf8_lossy(&raw[..header_end]).to_string();
        let content_length = head
            .lines()
            .find_map(|line| {
                let (name, value) = line.split_once(':')?;
                name.trim()
                    .eq_ignore_ascii_case("content-length")
                    .then(|| value.trim().parse::<usize>().ok())
                    .flatten()
            })
            .unwrap_or(0);
        while raw.len() < header_end + content_length {
            let n = stream.read(&mut buf).expect("read body");
            assert!(n > 0, "client closed before sending body");
            raw.extend_from_slice(&buf[..n]);
        }

        let response = format!(
            "HTTP/1.1 {} Mock\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            body.len(),
            body
        );
        stream.write_all(response.as_bytes()).expect("write response");
        stream.flush().expect("flush response");

        let mut lines = head.lines();
        CapturedRequest {
            request_line: lines.next().unwrap_or_default().to_string(),
            headers: lines.collect::<Vec<_>>().join("\n"),
            body: String::from_utf8_lossy(&raw[header_end..header_end + content_length])
                .to_string(),
        }
    });
    (format!("http://{}/biomedical_waste/8", addr), handle)
}

fn client(endpoint: String) -> HostedInferenceClient {
    HostedInferenceClient::new(InferenceSettings {
        endpoint,
        api_key: "test-key".to_string(),
        timeout: Some(Duration::from_secs(5)),
    })
    .expect("client")
}

fn png_file(width: u32, height: u32) -> (NamedTempFile, Vec<u8>) {
    let mut bytes = std::io::Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(RgbImage::new(width, height))
        .write_to(&mut bytes, ImageFormat::Png)
        .expect("encode png");
    let bytes = bytes.into_inner();
    let mut file = NamedTempFile::new().expect("temp image");
    file.write_all(&bytes).expect("write image");
    (file, bytes)
}

#[test]
fn upload_cycle_reports_and_draws_detection() {
    let (endpoint, server) = mock_endpoint(
        200,
        r#"{"predictions":[{"class":"Glass","confidence":0.873,"x":400,"y":300,"width":100,"height":50}]}"#,
    );
    let service = client(endpoint);
    let (file, bytes) = png_file(800, 600);

    let mut session = ScanSession::new();
    session.enter_upload().expect("upload mode");
    let pending = FileCapture::load(Some(file.path())).expect("load file");
    let ticket = session.begin_detection().expect("ticket");
    let (payload, outcome) = run_input(&service, CaptureInput::from(pending));
    assert!(session.complete(ticket, outcome));

    assert_eq!(session.phase(), Phase::Result);
    assert_eq!(
        session.message(),
        Some(
            "Detection 1:\nClass: Glass\nConfidence: 87.30%\nBin: 🔵 Blue Bin → Uncontaminated or disinfected glassware, bottles, vials"
        )
    );

    let request = server.join().expect("mock endpoint");
    assert!(request.request_line.starts_with("POST /biomedical_waste/8?api_key=test-key"));
    assert!(request
        .headers
        .to_ascii_lowercase()
        .contains("content-type: application/x-www-form-urlencoded"));
    assert_eq!(
        request.body,
        base64::engine::general_purpose::STANDARD.encode(&bytes)
    );

    let payload = payload.expect("decoded payload");
    assert_eq!(payload.natural_width(), 800);
    assert_eq!(payload.natural_height(), 600);

    let renderer = OverlayRenderer::new(OverlayStyle::default());
    let mut surface = RasterSurface::new(None);
    renderer.render(session.detections(), &mut surface, 800, 600);
    let composed = surface.compose(&payload).expect("compose");
    assert_eq!(composed.get_pixel(350, 275).0, [255, 61, 0, 255]);
    assert_eq!(composed.get_pixel(449, 324).0, [255, 61, 0, 255]);
    assert_eq!(composed.get_pixel(400, 300).0, [0, 0, 0, 255]);
}

#[test]
fn empty_predictions_report_no_waste() {
    let (endpoint, server) = mock_endpoint(200, r#"{"predictions":[]}"#);
    let service = client(endpoint);
    let (file, _) = png_file(16, 16);

    let pending = FileCapture::load(Some(file.path())).expect("load file");
    let (payload, outcome) = run_input(&service, CaptureInput::from(pending));
    server.join().expect("mock endpoint");

    assert!(payload.is_some());
    assert!(!outcome.failed);
    assert!(outcome.detections.is_empty());
    assert_eq!(outcome.report, "No biomedical waste detected.");
}

#[test]
fn server_error_is_reported() {
    let (endpoint, server) = mock_endpoint(500, r#"{"error":"model offline"}"#);
    let service = client(endpoint);

    let err = service.detect("aGVsbG8=").unwrap_err();
    server.join().expect("mock endpoint");
    assert!(err.to_string().contains("status code 500"));

    let (file, _) = png_file(16, 16);
    let (endpoint, server) = mock_endpoint(500, r#"{"error":"model offline"}"#);
    let service = client(endpoint);
    let pending = FileCapture::load(Some(file.path())).expect("load file");
    let (_, outcome) = run_input(&service, CaptureInput::from(pending));
    server.join().expect("mock endpoint");
    assert!(outcome.failed);
    assert!(outcome.detections.is_empty());
    assert!(outcome.report.starts_with("Error: "));
}

#[test]
fn malformed_response_is_reported() {
    let (endpoint, server) = mock_endpoint(200, "<html>not json</html>");
    let service = client(endpoint);

    let mut session = ScanSession::new();
    session.enter_upload().expect("upload mode");
    let ticket = session.begin_detection().expect("ticket");
    let (file, _) = png_file(16, 16);
    let pending = FileCapture::load(Some(file.path())).expect("load file");
    let (_, outcome) = run_input(&service, CaptureInput::from(pending));
    server.join().expect("mock endpoint");

    assert!(session.complete(ticket, outcome));
    assert_eq!(session.phase(), Phase::Error);
    assert!(session
        .message()
        .is_some_and(|m| m.starts_with("Error: malformed inference response")));
    assert!(session.detections().is_empty());
}

#[test]
fn unreachable_endpoint_is_reported() {
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        listener.local_addr().expect("addr").port()
    };
    let service = client(format!("http://127.0.0.1:{}/model", port));

    let err = service.detect("aGVsbG8=").unwrap_err();
    assert!(err.to_string().starts_with("inference request failed"));
}

#[test]
fn missing_file_never_reaches_the_endpoint() {
    let err = FileCapture::load(None).err().expect("no selection");
    assert_eq!(err.to_string(), "no file selected");

    let mut session = ScanSession::new();
    session.enter_upload().expect("upload mode");
    session.input_error(format!("{:#}", err));
    assert_eq!(session.phase(), Phase::Idle);
    assert_eq!(session.message(), Some("no file selected"));
}
