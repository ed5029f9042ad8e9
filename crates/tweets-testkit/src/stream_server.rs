//! A streaming endpoint that keeps connections open.
//!
//! wiremock closes every response once its body is written; a push stream
//! needs the body to stay open until the test decides otherwise. Each
//! accepted connection gets the configured frames as one chunk of a chunked
//! response, then is held until [`HeldStreamServer::disconnect_all`] or drop.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

/// A request received by the held stream server.
#[derive(Debug, Clone)]
pub struct ReceivedStreamRequest {
    /// Request line, e.g. `POST /1.1/statuses/filter.json HTTP/1.1`.
    pub request_line: String,
    /// Raw request body.
    pub body: String,
}

#[derive(Default)]
struct Shared {
    requests: Mutex<Vec<ReceivedStreamRequest>>,
    open: Mutex<Vec<TcpStream>>,
}

/// Stream server holding every connection open.
pub struct HeldStreamServer {
    base_url: String,
    shared: Arc<Shared>,
    accept_loop: JoinHandle<()>,
}

impl HeldStreamServer {
    /// Start on an ephemeral port; every connection receives `frames`.
    ///
    /// # Panics
    ///
    /// Panics if no local port can be bound.
    pub async fn start(frames: &str) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind stream server");
        let addr = listener.local_addr().expect("stream server addr");
        let shared = Arc::new(Shared::default());
        let frames = frames.to_string();

        let accept_shared = Arc::clone(&shared);
        let accept_loop = tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let Some(request) = read_request(&mut socket).await else {
                    continue;
                };
                accept_shared.requests.lock().push(request);

                let head = "HTTP/1.1 200 OK\r\n\
                            Content-Type: application/json\r\n\
                            Transfer-Encoding: chunked\r\n\r\n";
                let mut response = head.to_string();
                if !frames.is_empty() {
                    response.push_str(&format!("{:x}\r\n{frames}\r\n", frames.len()));
                }
                if socket.write_all(response.as_bytes()).await.is_ok() {
                    let _ = socket.flush().await;
                    accept_shared.open.lock().push(socket);
                }
            }
        });

        Self {
            base_url: format!("http://{addr}"),
            shared,
            accept_loop,
        }
    }

    #[must_use]
    pub fn base_url(&self) -> String {
        self.base_url.clone()
    }

    /// Number of connections accepted so far.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.shared.requests.lock().len()
    }

    /// Requests received so far, in arrival order.
    #[must_use]
    pub fn requests(&self) -> Vec<ReceivedStreamRequest> {
        self.shared.requests.lock().clone()
    }

    /// Number of connections currently held open.
    #[must_use]
    pub fn open_connections(&self) -> usize {
        self.shared.open.lock().len()
    }

    /// Wait up to two seconds for `count` connections to be held open.
    pub async fn wait_for_open_connections(&self, count: usize) -> bool {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while tokio::time::Instant::now() < deadline {
            if self.open_connections() >= count {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.open_connections() >= count
    }

    /// Close every held connection mid-body.
    pub fn disconnect_all(&self) {
        self.shared.open.lock().clear();
    }
}

impl Drop for HeldStreamServer {
    fn drop(&mut self) {
        self.accept_loop.abort();
        self.shared.open.lock().clear();
    }
}

/// Read the request head and a `Content-Length` body.
async fn read_request(socket: &mut TcpStream) -> Option<ReceivedStreamRequest> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    let head_end = loop {
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).into_owned();
    let content_length = head
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .unwrap_or(0);

    while buf.len() < head_end + content_length {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    let body_end = buf.len().min(head_end + content_length);
    Some(ReceivedStreamRequest {
        request_line: head.lines().next().unwrap_or_default().to_string(),
        body: String::from_utf8_lossy(&buf[head_end..body_end]).into_owned(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_held_connection_delivers_frames() {
        let server = HeldStreamServer::start("{\"text\":\"hi\"}\r\n").await;

        let mut response = reqwest::Client::new()
            .post(format!("{}/1.1/statuses/filter.json", server.base_url()))
            .body("track=rust")
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), 200);
        let chunk = response.chunk().await.unwrap().unwrap();
        assert_eq!(&chunk[..], b"{\"text\":\"hi\"}\r\n");

        let requests = server.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].body, "track=rust");
        assert!(requests[0].request_line.starts_with("POST /1.1/statuses/filter.json"));
        assert!(server.wait_for_open_connections(1).await);

        server.disconnect_all();
        assert!(response.chunk().await.is_err());
    }
}
