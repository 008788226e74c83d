//! Local stand-in for the agent-chat streaming endpoint.
//!
//! `MOCK_SCENARIO` picks the reply: `text` (default) streams one token per
//! line, `split` cuts lines across writes and mixes in noise, `error` rejects
//! the turn with 503. `MOCK_TOKEN_DELAY_MS` spaces out writes.

use std::convert::Infallible;
use std::env;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures_util::stream;
use http::{header, HeaderValue, Method, Request, Response, StatusCode};
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Full, StreamBody};
use hyper::body::{Frame, Incoming};
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as AutoBuilder;
use tokio::net::TcpListener;

const DEFAULT_UPSTREAM_PORT: u16 = 19_002;
const STREAM_PATH_SUFFIX: &str = "/stream";

type MockBody = BoxBody<Bytes, Infallible>;

#[derive(Copy, Clone)]
enum MockScenario {
    Text,
    Split,
    Error,
}

struct MockState {
    scenario: MockScenario,
    token_delay: Duration,
    turns: AtomicU64,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let port = env_u64("UPSTREAM_PORT", u64::from(DEFAULT_UPSTREAM_PORT));
    let port = u16::try_from(port).unwrap_or(DEFAULT_UPSTREAM_PORT);
    let state = Arc::new(MockState {
        scenario: parse_scenario(),
        token_delay: Duration::from_millis(env_u64("MOCK_TOKEN_DELAY_MS", 0)),
        turns: AtomicU64::new(0),
    });

    let listener = TcpListener::bind(("127.0.0.1", port))
        .await
        .unwrap_or_else(|err| panic!("failed to bind mock upstream on 127.0.0.1:{port}: {err}"));
    let conn_builder = AutoBuilder::new(TokioExecutor::new());

    loop {
        let (stream, remote_addr) = match listener.accept().await {
            Ok((stream, remote_addr)) => (stream, remote_addr),
            Err(err) => {
                eprintln!("accept error: {err}");
                continue;
            }
        };
        let io = TokioIo::new(stream);
        let conn_builder = conn_builder.clone();
        let service_state = Arc::clone(&state);
        let service = service_fn(move |request: Request<Incoming>| {
            let state_ref = Arc::clone(&service_state);
            async move { Ok::<_, Infallible>(handle_request(request, &state_ref).await) }
        });

        tokio::spawn(async move {
            if let Err(err) = conn_builder.serve_connection(io, service).await {
                eprintln!("mock upstream connection error from {remote_addr}: {err}");
            }
        });
    }
}

fn env_u64(name: &str, default: u64) -> u64 {
    env::var(name)
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .unwrap_or(default)
}

fn parse_scenario() -> MockScenario {
    match env::var("MOCK_SCENARIO").as_deref() {
        Ok("split") => MockScenario::Split,
        Ok("error") => MockScenario::Error,
        Ok("text") | Err(_) => MockScenario::Text,
        Ok(other) => {
            eprintln!("unknown MOCK_SCENARIO '{other}', fallback to text");
            MockScenario::Text
        }
    }
}

async fn handle_request(request: Request<Incoming>, state: &Arc<MockState>) -> Response<MockBody> {
    let (parts, body) = request.into_parts();
    let body_len = drain_request_body(body).await;

    if parts.method == Method::GET && parts.uri.path() == "/_mock/stats" {
        let turns = state.turns.load(Ordering::Relaxed);
        return full_response(
            StatusCode::OK,
            "application/json",
            Bytes::from(format!("{{\"turns\":{turns}}}")),
        );
    }
    if parts.method != Method::POST {
        return full_response(
            StatusCode::METHOD_NOT_ALLOWED,
            "application/json",
            Bytes::from_static(br#"{"error":"method_not_allowed"}"#),
        );
    }
    if !parts.uri.path().ends_with(STREAM_PATH_SUFFIX) {
        return full_response(
            StatusCode::NOT_FOUND,
            "application/json",
            Bytes::from_static(br#"{"error":"not_found"}"#),
        );
    }

    let multipart = parts
        .headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("multipart/form-data"));
    if !multipart || parts.headers.get("x-api-key").is_none() {
        return full_response(
            StatusCode::BAD_REQUEST,
            "application/json",
            Bytes::from_static(br#"{"error":{"message":"expected multipart form with x-api-key"}}"#),
        );
    }

    let turn = state.turns.fetch_add(1, Ordering::Relaxed) + 1;
    eprintln!("turn {turn}: {body_len} form bytes");

    match state.scenario {
        MockScenario::Error => full_response(
            StatusCode::SERVICE_UNAVAILABLE,
            "text/plain",
            Bytes::from_static(b"overloaded"),
        ),
        MockScenario::Text => streaming_response(TEXT_CHUNKS, state.token_delay),
        MockScenario::Split => streaming_response(SPLIT_CHUNKS, state.token_delay),
    }
}

async fn drain_request_body(mut body: Incoming) -> usize {
    let mut len = 0;
    while let Some(frame_result) = body.frame().await {
        match frame_result {
            Ok(frame) => {
                if let Some(data) = frame.data_ref() {
                    len += data.len();
                }
            }
            Err(_) => break,
        }
    }
    len
}

fn streaming_response(chunks: &'static [&'static str], delay: Duration) -> Response<MockBody> {
    let frames = stream::unfold(0usize, move |idx| async move {
        let chunk = chunks.get(idx)?;
        if idx > 0 && !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let frame = Frame::data(Bytes::from_static(chunk.as_bytes()));
        Some((Ok::<_, Infallible>(frame), idx + 1))
    });
    let mut response = Response::new(StreamBody::new(frames).boxed());
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/x-ndjson"),
    );
    response
}

fn full_response(status: StatusCode, content_type: &'static str, body: Bytes) -> Response<MockBody> {
    let mut response = Response::new(Full::new(body).boxed());
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

const TEXT_CHUNKS: &[&str] = &[
    "{\"type\":\"start\",\"content\":null}\n",
    "{\"type\":\"token\",\"content\":\"Olá\"}\n",
    "{\"type\":\"token\",\"content\":\", \"}\n",
    "{\"type\":\"token\",\"content\":\"tudo bem?\"}\n",
    "{\"type\":\"end\",\"content\":null}\n",
];

const SPLIT_CHUNKS: &[&str] = &[
    "{\"type\":\"tok",
    "en\",\"content\":\"Ol",
    "á\"}\n: ping\n\n{\"type\":\"status\",\"content\":\"a pensar\"}\n",
    "garbage line\n{\"type\":\"token\",\"content\":\" mundo\"}\r\n",
    "{\"type\":\"token\",\"content\":\"!\"}",
    "\n",
];
