//! Loopback listener receiving the OAuth redirect.
//!
//! One listener serves one authorization session. It binds
//! `127.0.0.1:0`, answers every request with a small HTML page, and hands
//! the first valid authorization code to [`CallbackListener::wait_for_code`]
//! through a oneshot channel. Later callbacks are answered but ignored.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{AuthError, AuthResult};

/// Path the authorization server redirects to.
pub const CALLBACK_PATH: &str = "/";

/// Time allowed for a client to send its request head.
const READ_TIMEOUT: Duration = Duration::from_secs(10);

/// Largest request head accepted.
const MAX_REQUEST_SIZE: usize = 8 * 1024;

const SUCCESS_PAGE: &str = "<!DOCTYPE html>
<html>
<head><title>Authorization Complete</title></head>
<body><h1>Authorization Successful</h1><p>You can close this window and return to the terminal.</p></body>
</html>";

const DENIED_PAGE: &str = "<!DOCTYPE html>
<html>
<head><title>Authorization Failed</title></head>
<body><h1>Authorization Failed</h1><p>Access was not granted. You can close this window.</p></body>
</html>";

const INVALID_PAGE: &str = "<!DOCTYPE html>
<html>
<head><title>Authorization Failed</title></head>
<body><h1>Authorization Failed</h1><p>Invalid or unexpected callback parameters.</p></body>
</html>";

const ALREADY_RECEIVED_PAGE: &str = "<!DOCTYPE html>
<html>
<head><title>Authorization Complete</title></head>
<body><h1>Already Authorized</h1><p>An authorization code was already received. You can close this window.</p></body>
</html>";

/// What the browser delivered: a code, or the reason access was refused.
type Delivery = Result<String, String>;

/// Shared between the accept loop and connection tasks.
struct Session {
    expected_state: String,
    code_tx: Mutex<Option<oneshot::Sender<Delivery>>>,
}

impl Session {
    /// Takes the single-use sender, leaving `None` behind.
    fn take_sender(&self) -> Option<oneshot::Sender<Delivery>> {
        self.code_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

/// A running callback listener. Closed on drop.
#[derive(Debug)]
pub struct CallbackListener {
    addr: SocketAddr,
    code_rx: Option<oneshot::Receiver<Delivery>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl CallbackListener {
    /// Binds an ephemeral loopback port and starts serving.
    ///
    /// Callbacks whose `state` differs from `expected_state` are rejected.
    pub async fn start(expected_state: impl Into<String>) -> AuthResult<Self> {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0))
            .await
            .map_err(AuthError::ListenerBind)?;
        let addr = listener.local_addr().map_err(AuthError::ListenerBind)?;

        let (code_tx, code_rx) = oneshot::channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let session = Arc::new(Session {
            expected_state: expected_state.into(),
            code_tx: Mutex::new(Some(code_tx)),
        });

        let handle = tokio::spawn(serve(listener, session, shutdown_rx));
        info!("callback listener bound on {}", addr);

        Ok(Self {
            addr,
            code_rx: Some(code_rx),
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        })
    }

    /// The bound address.
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// The redirect URI to put in the authorization request.
    pub fn redirect_uri(&self) -> String {
        format!("http://{}{}", self.addr, CALLBACK_PATH)
    }

    /// Waits until the browser delivers the authorization code.
    ///
    /// Waits indefinitely when `timeout` is `None`. Denial, timeout,
    /// Ctrl-C and a closed listener are all [`AuthError::Callback`].
    pub async fn wait_for_code(&mut self, timeout: Option<Duration>) -> AuthResult<String> {
        let rx = self
            .code_rx
            .take()
            .ok_or_else(|| AuthError::callback("authorization code already consumed"))?;

        let delivery = async {
            match rx.await {
                Ok(Ok(code)) => Ok(code),
                Ok(Err(reason)) => Err(AuthError::callback(format!(
                    "authorization denied: {}",
                    reason
                ))),
                Err(_) => Err(AuthError::callback(
                    "listener closed before a code was received",
                )),
            }
        };
        let bounded = async {
            match timeout {
                Some(limit) => tokio::time::timeout(limit, delivery)
                    .await
                    .unwrap_or_else(|_| {
                        Err(AuthError::callback(format!(
                            "no authorization received within {}s",
                            limit.as_secs()
                        )))
                    }),
                None => delivery.await,
            }
        };

        tokio::select! {
            result = bounded => result,
            () = interrupted() => Err(AuthError::callback("interrupted")),
        }
    }

    /// Stops serving and releases the port.
    ///
    /// Safe to call more than once and before any callback arrived.
    pub fn close(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            if !handle.is_finished() {
                handle.abort();
            }
            debug!("callback listener on {} closed", self.addr);
        }
    }

    pub fn is_closed(&self) -> bool {
        self.handle.is_none()
    }
}

impl Drop for CallbackListener {
    fn drop(&mut self) {
        self.close();
    }
}

/// Resolves on Ctrl-C. Never resolves if the handler cannot be installed.
async fn interrupted() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("unable to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}

async fn serve(listener: TcpListener, session: Arc<Session>, mut shutdown: oneshot::Receiver<()>) {
    // Dropping the set aborts connections still in flight.
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    debug!("callback connection from {}", peer);
                    connections.spawn(handle_connection(stream, Arc::clone(&session)));
                }
                Err(e) => warn!("failed to accept callback connection: {}", e),
            },
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
        }
    }
}

async fn handle_connection(mut stream: TcpStream, session: Arc<Session>) {
    let reply = match tokio::time::timeout(READ_TIMEOUT, read_request_target(&mut stream)).await {
        Ok(Some(target)) => route(&target, &session),
        Ok(None) => Reply::reject("400 Bad Request"),
        Err(_) => {
            debug!("callback client did not send a request in time");
            return;
        }
    };

    if let Err(e) = write_response(&mut stream, reply.status, reply.page).await {
        debug!("failed to write callback response: {}", e);
    }
    // The page goes out first so the browser is answered before the listener closes.
    if let Some((tx, delivery)) = reply.handoff {
        if tx.send(delivery).is_err() {
            debug!("authorization code arrived after the wait ended");
        }
    }
}

/// Response to a callback request, plus the delivery it completes.
struct Reply {
    status: &'static str,
    page: &'static str,
    handoff: Option<(oneshot::Sender<Delivery>, Delivery)>,
}

impl Reply {
    fn reject(status: &'static str) -> Self {
        Self {
            status,
            page: INVALID_PAGE,
            handoff: None,
        }
    }
}

/// Reads the request head and returns the target of a `GET` request line.
async fn read_request_target(stream: &mut TcpStream) -> Option<String> {
    let mut buf = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];

    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
        if buf.len() > MAX_REQUEST_SIZE {
            return None;
        }
        let n = stream.read(&mut chunk).await.ok()?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    let head = String::from_utf8_lossy(&buf);
    let request_line = head.lines().next()?;
    let mut parts = request_line.split_whitespace();
    match (parts.next(), parts.next()) {
        (Some("GET"), Some(target)) => Some(target.to_string()),
        _ => None,
    }
}

/// Decides the response for a request target, claiming the sender if valid.
fn route(target: &str, session: &Session) -> Reply {
    let Ok(url) = Url::parse(&format!("http://127.0.0.1{}", target)) else {
        return Reply::reject("400 Bad Request");
    };
    if url.path() != CALLBACK_PATH {
        return Reply::reject("404 Not Found");
    }

    let mut code = None;
    let mut state = None;
    let mut error = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            "error" => error = Some(value.into_owned()),
            _ => {}
        }
    }

    if state.as_deref() != Some(session.expected_state.as_str()) {
        warn!("ignoring callback with mismatched state");
        return Reply::reject("400 Bad Request");
    }

    let delivery = match (code, error) {
        (_, Some(error)) => Err(error),
        (Some(code), None) if !code.is_empty() => Ok(code),
        _ => {
            warn!("ignoring callback without an authorization code");
            return Reply::reject("400 Bad Request");
        }
    };

    let Some(tx) = session.take_sender() else {
        debug!("ignoring callback after the first one");
        return Reply {
            status: "200 OK",
            page: ALREADY_RECEIVED_PAGE,
            handoff: None,
        };
    };

    Reply {
        status: "200 OK",
        page: if delivery.is_ok() { SUCCESS_PAGE } else { DENIED_PAGE },
        handoff: Some((tx, delivery)),
    }
}

async fn write_response(
    stream: &mut TcpStream,
    status: &str,
    body: &str,
) -> std::io::Result<()> {
    let response = format!(
        "HTTP/1.1 {}\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        body.len(),
        body
    );
    stream.write_all(response.as_bytes()).await?;
    stream.shutdown().await
}
