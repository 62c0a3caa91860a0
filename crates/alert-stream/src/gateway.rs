//! HTTP 스트리밍 게이트웨이
//!
//! `tokio::net::TcpListener` 위의 최소 HTTP/1.1 서버입니다.
//!
//! - `GET /healthz` → `200 ok`
//! - `GET /events`  → Server-Sent Events, 알림마다 `data: <json>\n\n`
//! - 그 외 경로 → 404, GET 이외 메서드 → 405, 해석 불가 요청 → 400
//!
//! 연결마다 별도 태스크에서 처리하며, 동시 연결 수는 세마포어로 제한합니다.
//! 한도를 넘은 연결은 수락 루프 안에서 `503`을 받고 바로 닫힙니다.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use runsight_core::metrics as m;

use crate::bus::AlertBus;
use crate::config::GatewayConfig;
use crate::error::StreamError;

/// 헬스 체크 경로
pub const HEALTH_PATH: &str = "/healthz";

/// SSE 스트림 경로
pub const EVENTS_PATH: &str = "/events";

/// 요청 헤더 최대 크기 (바이트)
const MAX_HEAD_BYTES: usize = 8 * 1024;

/// 종료 시 활성 연결을 기다리는 최대 시간
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// SSE 프레임 하나의 쓰기 제한 시간 (읽지 않는 클라이언트 차단)
const FRAME_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// 연결 한도 초과 응답
const REJECT_RESPONSE: &[u8] = b"HTTP/1.1 503 Service Unavailable\r\n\
    Content-Type: text/plain; charset=utf-8\r\n\
    Content-Length: 20\r\n\
    Connection: close\r\n\
    \r\n\
    too many connections";

// ===== 요청 해석 =====

/// 요청 라인에서 추출한 메서드와 경로
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestLine {
    /// HTTP 메서드
    pub method: String,
    /// 쿼리 문자열을 제외한 경로
    pub path: String,
}

/// 요청 라인(`GET /events HTTP/1.1`)을 해석합니다.
pub fn parse_request_line(line: &str) -> Result<RequestLine, StreamError> {
    let mut parts = line.split_ascii_whitespace();
    let (Some(method), Some(target), Some(version), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(StreamError::BadRequest(format!(
            "malformed request line: {:?}",
            line.trim_end()
        )));
    };

    if !version.starts_with("HTTP/1.") {
        return Err(StreamError::BadRequest(format!(
            "unsupported version: {version}"
        )));
    }
    if !target.starts_with('/') {
        return Err(StreamError::BadRequest(format!(
            "unsupported request target: {target}"
        )));
    }

    let path = target.split('?').next().unwrap_or(target);
    Ok(RequestLine {
        method: method.to_owned(),
        path: path.to_owned(),
    })
}

/// 요청 라우팅 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// `GET /healthz`
    Health,
    /// `GET /events`
    Events,
    /// 등록되지 않은 경로
    NotFound,
    /// 등록된 경로에 GET 이외의 메서드
    MethodNotAllowed,
}

impl Route {
    /// 메서드와 경로로 라우트를 결정합니다.
    pub fn resolve(request: &RequestLine) -> Self {
        let known = matches!(request.path.as_str(), HEALTH_PATH | EVENTS_PATH);
        match (known, request.method.as_str()) {
            (false, _) => Self::NotFound,
            (true, "GET") => {
                if request.path == HEALTH_PATH {
                    Self::Health
                } else {
                    Self::Events
                }
            }
            (true, _) => Self::MethodNotAllowed,
        }
    }
}

/// 요청 헤더 블록을 읽고 요청 라인을 해석합니다.
///
/// 빈 줄까지 읽으며, 나머지 헤더는 무시합니다.
async fn read_request_head<R>(reader: &mut R) -> Result<RequestLine, StreamError>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = String::new();
    let mut total = 0usize;
    let mut request_line: Option<String> = None;

    loop {
        line.clear();
        let read = reader.read_line(&mut line).await?;
        if read == 0 {
            return Err(StreamError::BadRequest(
                "connection closed before end of headers".to_owned(),
            ));
        }
        total += read;
        if total > MAX_HEAD_BYTES {
            return Err(StreamError::BadRequest("request head too large".to_owned()));
        }

        let trimmed = line.trim_end_matches(['\r', '\n']);
        if request_line.is_none() {
            // 요청 라인 앞의 빈 줄은 허용
            if !trimmed.is_empty() {
                request_line = Some(trimmed.to_owned());
            }
            continue;
        }
        if trimmed.is_empty() {
            break;
        }
    }

    let request_line = request_line.unwrap_or_default();
    parse_request_line(&request_line)
}

// ===== 응답 쓰기 =====

/// 본문이 있는 단순 응답을 쓰고 연결을 닫을 준비를 합니다.
async fn write_simple<W>(writer: &mut W, status: u16, reason: &str, body: &str) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut response = format!(
        "HTTP/1.1 {status} {reason}\r\n\
         Content-Type: text/plain; charset=utf-8\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n",
        body.len()
    );
    if status == 405 {
        response.push_str("Allow: GET\r\n");
    }
    response.push_str("\r\n");
    response.push_str(body);

    writer.write_all(response.as_bytes()).await?;
    writer.flush().await
}

/// SSE 응답 헤더
const SSE_HEADERS: &str = "HTTP/1.1 200 OK\r\n\
    Content-Type: text/event-stream\r\n\
    Cache-Control: no-cache\r\n\
    Connection: close\r\n\
    \r\n";

/// 알림 JSON 하나를 SSE 프레임으로 감쌉니다.
pub fn sse_frame(json: &str) -> String {
    format!("data: {json}\n\n")
}

// ===== 게이트웨이 =====

/// SSE 스트리밍 게이트웨이
///
/// [`bind`](Self::bind)에서 소켓을 열기 때문에 바인드 실패는 시작 시점에 드러납니다.
pub struct StreamingGateway {
    listener: TcpListener,
    bus: AlertBus,
    config: GatewayConfig,
}

impl StreamingGateway {
    /// 수신 소켓을 바인드합니다.
    ///
    /// # 에러
    /// - `StreamError::Bind`: 주소 사용 중, 권한 없음 등
    pub async fn bind(config: GatewayConfig, bus: AlertBus) -> Result<Self, StreamError> {
        let listener = TcpListener::bind(config.listen_addr)
            .await
            .map_err(|e| StreamError::Bind {
                addr: config.listen_addr.to_string(),
                reason: e.to_string(),
            })?;

        info!(addr = %config.listen_addr, "streaming gateway bound");
        Ok(Self {
            listener,
            bus,
            config,
        })
    }

    /// 실제 바인드된 주소 (포트 0 바인드 시 확인용)
    pub fn local_addr(&self) -> Result<SocketAddr, StreamError> {
        Ok(self.listener.local_addr()?)
    }

    /// 연결 수락 루프를 실행합니다.
    ///
    /// 취소 토큰이 활성화되면 수락을 멈추고, 활성 스트림이 끝나기를
    /// 최대 5초 기다린 뒤 반환합니다.
    pub async fn run(self, cancel: CancellationToken) -> Result<(), StreamError> {
        let max_connections = self.config.max_connections.max(1);
        let connections = Arc::new(Semaphore::new(max_connections));
        let addr = self.local_addr()?;
        info!(%addr, max_connections, "streaming gateway accepting connections");

        loop {
            let (stream, peer) = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("streaming gateway received shutdown signal");
                    break;
                }
                result = self.listener.accept() => match result {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        warn!(error = %e, "accept failed");
                        continue;
                    }
                },
            };

            let Ok(permit) = Arc::clone(&connections).try_acquire_owned() else {
                metrics::counter!(m::GATEWAY_REJECTED_CONNECTIONS_TOTAL).increment(1);
                warn!(%peer, max_connections, "max connections reached, rejecting connection");
                reject(stream);
                continue;
            };

            debug!(%peer, "accepted connection");
            let bus = self.bus.clone();
            let request_timeout = self.config.request_timeout;
            let cancel = cancel.clone();
            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, peer, bus, request_timeout, cancel).await {
                    debug!(%peer, error = %e, "connection ended with error");
                }
                drop(permit);
            });
        }

        drop(self.listener);
        let permits = u32::try_from(max_connections).unwrap_or(u32::MAX);
        if timeout(DRAIN_TIMEOUT, connections.acquire_many(permits))
            .await
            .is_err()
        {
            warn!(
                active = max_connections - connections.available_permits(),
                "streaming gateway stopped with active connections"
            );
        } else {
            info!("streaming gateway stopped");
        }
        Ok(())
    }
}

/// 한도 초과 연결에 503을 쓰고 닫습니다.
///
/// 수락 루프에서 직접 호출되므로 기다리지 않습니다. 논블로킹 쓰기를 한 번만
/// 시도하고, 송신 버퍼에 들어가지 않으면 응답 없이 닫습니다.
fn reject(stream: TcpStream) {
    if let Ok(mut stream) = stream.into_std() {
        let _ = std::io::Write::write(&mut stream, REJECT_RESPONSE);
    }
}

/// 단일 연결을 처리합니다.
async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    bus: AlertBus,
    request_timeout: Duration,
    cancel: CancellationToken,
) -> Result<(), StreamError> {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    let head = tokio::select! {
        _ = cancel.cancelled() => return Ok(()),
        result = timeout(request_timeout, read_request_head(&mut reader)) => result,
    };

    let request = match head {
        Ok(Ok(request)) => request,
        Ok(Err(StreamError::BadRequest(reason))) => {
            debug!(%peer, %reason, "bad request");
            write_simple(&mut write_half, 400, "Bad Request", "bad request").await?;
            return Ok(());
        }
        Ok(Err(e)) => return Err(e),
        Err(_) => {
            debug!(%peer, "request head timed out");
            return Ok(());
        }
    };

    match Route::resolve(&request) {
        Route::Health => {
            write_simple(&mut write_half, 200, "OK", "ok").await?;
        }
        Route::NotFound => {
            write_simple(&mut write_half, 404, "Not Found", "not found").await?;
        }
        Route::MethodNotAllowed => {
            write_simple(&mut write_half, 405, "Method Not Allowed", "method not allowed").await?;
        }
        Route::Events => {
            stream_events(reader, write_half, peer, bus, cancel).await?;
        }
    }
    Ok(())
}

/// `/events` 구독 스트림
///
/// 종료 조건: 취소, 클라이언트 연결 종료, 쓰기 실패 또는 시간 초과, 버스 종료.
/// 프레임 쓰기 중에도 취소를 감시합니다. 어떤 경우든 구독자 핸들이 drop되며 해제됩니다.
async fn stream_events<R, W>(
    mut reader: R,
    mut writer: W,
    peer: SocketAddr,
    bus: AlertBus,
    cancel: CancellationToken,
) -> Result<(), StreamError>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    // 헤더를 쓰기 전에 등록 (헤더를 받은 클라이언트는 이후 알림을 놓치지 않음)
    let mut subscriber = bus.register();
    info!(%peer, subscriber = %subscriber.id(), "event stream opened");

    writer.write_all(SSE_HEADERS.as_bytes()).await?;
    writer.flush().await?;

    let mut scratch = [0u8; 256];
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(%peer, "event stream closing on shutdown");
                break;
            }
            alert = subscriber.recv() => {
                let Some(alert) = alert else {
                    debug!(%peer, "alert bus closed");
                    break;
                };
                let json = match alert.to_json() {
                    Ok(json) => json,
                    Err(e) => {
                        warn!(rule = %alert.rule_id, error = %e, "failed to serialize alert");
                        continue;
                    }
                };
                let frame = sse_frame(&json);
                let written = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        debug!(%peer, "event stream closing on shutdown during write");
                        break;
                    }
                    result = timeout(FRAME_WRITE_TIMEOUT, write_frame(&mut writer, &frame)) => result,
                };
                match written {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        debug!(%peer, error = %e, "event stream write failed");
                        break;
                    }
                    Err(_) => {
                        warn!(%peer, "event stream write timed out, closing slow client");
                        break;
                    }
                }
            }
            read = reader.read(&mut scratch) => match read {
                Ok(0) | Err(_) => {
                    debug!(%peer, "client disconnected");
                    break;
                }
                Ok(_) => {}
            },
        }
    }

    info!(%peer, subscriber = %subscriber.id(), "event stream closed");
    Ok(())
}

async fn write_frame<W>(writer: &mut W, frame: &str) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(frame.as_bytes()).await?;
    writer.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(method: &str, path: &str) -> RequestLine {
        RequestLine {
            method: method.to_owned(),
            path: path.to_owned(),
        }
    }

    #[test]
    fn parse_valid_request_line() {
        let line = parse_request_line("GET /events HTTP/1.1").unwrap();
        assert_eq!(line, request("GET", "/events"));
    }

    #[test]
    fn parse_strips_query() {
        let line = parse_request_line("GET /healthz?verbose=1 HTTP/1.0").unwrap();
        assert_eq!(line.path, "/healthz");
    }

    #[test]
    fn parse_rejects_malformed() {
        assert!(parse_request_line("").is_err());
        assert!(parse_request_line("GET").is_err());
        assert!(parse_request_line("GET /events").is_err());
        assert!(parse_request_line("GET /events HTTP/1.1 extra").is_err());
        assert!(parse_request_line("GET /events SPDY/3").is_err());
        assert!(parse_request_line("GET events HTTP/1.1").is_err());
    }

    #[test]
    fn route_table() {
        assert_eq!(Route::resolve(&request("GET", "/healthz")), Route::Health);
        assert_eq!(Route::resolve(&request("GET", "/events")), Route::Events);
        assert_eq!(Route::resolve(&request("GET", "/metrics")), Route::NotFound);
        assert_eq!(Route::resolve(&request("POST", "/events")), Route::MethodNotAllowed);
        assert_eq!(Route::resolve(&request("DELETE", "/healthz")), Route::MethodNotAllowed);
        assert_eq!(Route::resolve(&request("POST", "/nope")), Route::NotFound);
    }

    #[test]
    fn sse_frame_format() {
        assert_eq!(sse_frame(r#"{"a":1}"#), "data: {\"a\":1}\n\n");
    }

    #[tokio::test]
    async fn read_head_ignores_headers() {
        let raw = b"GET /events HTTP/1.1\r\nHost: localhost\r\nAccept: text/event-stream\r\n\r\n";
        let mut reader = BufReader::new(&raw[..]);
        let line = read_request_head(&mut reader).await.unwrap();
        assert_eq!(line, request("GET", "/events"));
    }

    #[tokio::test]
    async fn read_head_rejects_truncated() {
        let raw = b"GET /events HTTP/1.1\r\nHost: x\r\n";
        let mut reader = BufReader::new(&raw[..]);
        let err = read_request_head(&mut reader).await.unwrap_err();
        assert!(matches!(err, StreamError::BadRequest(_)));
    }

    #[tokio::test]
    async fn read_head_rejects_oversized() {
        let mut raw = b"GET /events HTTP/1.1\r\n".to_vec();
        raw.extend_from_slice(format!("X-Big: {}\r\n\r\n", "a".repeat(MAX_HEAD_BYTES)).as_bytes());
        let mut reader = BufReader::new(&raw[..]);
        let err = read_request_head(&mut reader).await.unwrap_err();
        assert!(matches!(err, StreamError::BadRequest(_)));
    }

    #[tokio::test]
    async fn simple_response_has_length() {
        let mut out = Vec::new();
        write_simple(&mut out, 200, "OK", "ok").await.unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.contains("Content-Length: 2\r\n"));
        assert!(text.ends_with("\r\n\r\nok"));
    }

    #[tokio::test]
    async fn method_not_allowed_advertises_get() {
        let mut out = Vec::new();
        write_simple(&mut out, 405, "Method Not Allowed", "method not allowed")
            .await
            .unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Allow: GET\r\n"));
    }

    #[tokio::test]
    async fn reject_response_matches_simple_response() {
        let mut out = Vec::new();
        write_simple(&mut out, 503, "Service Unavailable", "too many connections")
            .await
            .unwrap();
        assert_eq!(out, REJECT_RESPONSE);
    }

    #[tokio::test]
    async fn bind_conflict_reports_address() {
        let first = StreamingGateway::bind(
            GatewayConfig {
                listen_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
                ..Default::default()
            },
            AlertBus::new(4),
        )
        .await
        .unwrap();
        let taken = first.local_addr().unwrap();

        let second = StreamingGateway::bind(
            GatewayConfig {
                listen_addr: taken,
                ..Default::default()
            },
            AlertBus::new(4),
        )
        .await;
        match second {
            Err(StreamError::Bind { addr, .. }) => assert_eq!(addr, taken.to_string()),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("second bind on the same port must fail"),
        }
    }
}
