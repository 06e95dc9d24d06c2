//! server.rs
//!
//! WebSocket front door. One thread per connection; the session owns its
//! socket exclusively, so there is no shared mutable state across
//! connections. Reads poll with a short socket timeout so waits stay
//! cancelable and deadline-bound.

use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tungstenite::handshake::server::{Request, Response};
use tungstenite::{accept_hdr, Message, WebSocket};

use crate::orchestrator::{Orchestrator, SessionRequest};
use crate::protocol::{ClientAction, SessionEvent, SessionTransport};

const READ_POLL: Duration = Duration::from_millis(30);

pub fn serve(orchestrator: Arc<Orchestrator>, listen_addr: &str) -> Result<(), String> {
    let listener =
        TcpListener::bind(listen_addr).map_err(|e| format!("bind {} failed: {}", listen_addr, e))?;
    eprintln!("testforge listening on {}", listen_addr);

    for stream in listener.incoming() {
        let stream = match stream {
            Ok(stream) => stream,
            Err(e) => {
                eprintln!("accept failed: {}", e);
                continue;
            }
        };

        let orchestrator = orchestrator.clone();
        thread::spawn(move || {
            if let Err(e) = handle_connection(stream, &orchestrator) {
                eprintln!("session ended with error: {}", e);
            }
        });
    }

    Ok(())
}

fn handle_connection(stream: TcpStream, orchestrator: &Orchestrator) -> Result<(), String> {
    let mut path = None;
    let mut header_token = None;

    let ws = accept_hdr(stream, |req: &Request, resp: Response| {
        path = Some(req.uri().to_string());
        header_token = req
            .headers()
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(|s| s.trim().to_string());
        Ok(resp)
    })
    .map_err(|e| format!("handshake failed: {}", e))?;

    let _ = ws.get_ref().set_read_timeout(Some(READ_POLL));
    let mut transport = WsTransport { ws };

    let request = match parse_request(path.as_deref().unwrap_or(""), header_token) {
        Ok(request) => request,
        Err(msg) => {
            let _ = transport.send(&SessionEvent::Failed { error: msg });
            let _ = transport.ws.close(None);
            return Ok(());
        }
    };

    orchestrator.run_session(&mut transport, &request);

    let _ = transport.ws.close(None);
    Ok(())
}

/// `GET /testcases/{id}/execute?script_type=...` with the bearer token from
/// the handshake headers or a `token` query parameter.
fn parse_request(path: &str, header_token: Option<String>) -> Result<SessionRequest, String> {
    let url = url::Url::parse(&format!("http://session.local{}", path))
        .map_err(|_| "Malformed request path".to_string())?;

    let segments: Vec<&str> = url
        .path_segments()
        .map(|s| s.filter(|seg| !seg.is_empty()).collect())
        .unwrap_or_default();

    let testcase_id = match segments.as_slice() {
        ["testcases", id, "execute"] => id.to_string(),
        _ => return Err(format!("Unknown endpoint: {}", url.path())),
    };

    let mut script_type = String::new();
    let mut query_token = None;
    for (k, v) in url.query_pairs() {
        match k.as_ref() {
            "script_type" => script_type = v.to_string(),
            "token" => query_token = Some(v.to_string()),
            _ => {}
        }
    }

    Ok(SessionRequest {
        testcase_id,
        script_type,
        token: header_token.or(query_token),
    })
}

/* ---------- transport ---------- */

struct WsTransport {
    ws: WebSocket<TcpStream>,
}

impl SessionTransport for WsTransport {
    fn send(&mut self, event: &SessionEvent) -> Result<(), String> {
        self.ws
            .send(Message::Text(event.to_message().to_string()))
            .map_err(|e| e.to_string())
    }

    fn wait_action(&mut self, deadline: Duration) -> Result<Option<ClientAction>, String> {
        let started = Instant::now();

        loop {
            match self.ws.read() {
                Ok(Message::Text(text)) => {
                    // Unparseable messages are ignored, not fatal.
                    if let Some(action) = ClientAction::parse(&text) {
                        return Ok(Some(action));
                    }
                }
                Ok(Message::Close(_)) => return Err("client disconnected".into()),
                Ok(_) => {}
                Err(tungstenite::Error::Io(e))
                    if e.kind() == std::io::ErrorKind::WouldBlock
                        || e.kind() == std::io::ErrorKind::TimedOut => {}
                Err(e) => return Err(e.to_string()),
            }

            if started.elapsed() >= deadline {
                return Ok(None);
            }
        }
    }
}
