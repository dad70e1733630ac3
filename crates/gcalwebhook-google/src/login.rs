//! Interactive login over a loopback redirect.
//!
//! A one-shot HTTP listener on `127.0.0.1:<port>` waits for Google to
//! redirect the browser to `/oauth2callback`. Connections are served
//! concurrently, so an idle one cannot hold up the callback. Requests to any
//! other path get a 404 and are otherwise ignored. The first callback decides the outcome:
//!
//! - `error=<e>`: 400 to the browser, the flow fails with `e`
//! - no `code`: 400, the flow fails
//! - `code=<c>`: the code is redeemed and the tokens persisted, then 200
//!   (or 500 if redemption or persistence fails)
//!
//! The listener is closed before [`LoginFlow::run`] returns, whatever the
//! outcome.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use gcalwebhook_core::DocumentStore;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::timeout;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::{CALLBACK_PATH, redirect_uri_for};
use crate::error::{ApiError, ApiResult};
use crate::oauth::{PkceFlow, TokenExchange};
use crate::tokens::{Credentials, TokenStore};

/// Upper bound on header lines read from a callback request.
const MAX_HEADER_LINES: usize = 100;

/// How long a connection may stay silent before it is dropped.
const REQUEST_READ_TIMEOUT: Duration = Duration::from_secs(10);

/// Opens the consent URL for the user.
pub trait BrowserOpener: Send + Sync {
    fn open(&self, url: &str) -> std::io::Result<()>;
}

/// Opens URLs with the platform's default browser.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemBrowser;

impl BrowserOpener for SystemBrowser {
    fn open(&self, url: &str) -> std::io::Result<()> {
        open::that(url)
    }
}

/// Where the login flow stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowState {
    Idle,
    Listening { port: u16 },
    Done,
    Failed(String),
}

/// Parameters carried by a request to the callback path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackParams {
    /// Google reported an error (e.g. `access_denied`).
    Denied(String),
    /// Neither an error nor a code was supplied.
    MissingCode,
    /// An authorization code.
    Code(String),
}

/// Classification of one HTTP request received by the listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackRequest {
    /// Any path other than the callback path.
    NotFound,
    /// The request line could not be understood.
    BadRequest,
    /// A request to the callback path.
    Callback(CallbackParams),
}

impl CallbackRequest {
    /// Classifies a request target such as `/oauth2callback?code=abc`.
    pub fn parse(target: &str) -> Self {
        let Ok(url) = Url::parse("http://127.0.0.1").and_then(|base| base.join(target)) else {
            return Self::BadRequest;
        };
        if url.path() != CALLBACK_PATH {
            return Self::NotFound;
        }

        let param = |name: &str| {
            url.query_pairs()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.into_owned())
                .filter(|value| !value.is_empty())
        };

        let params = if let Some(error) = param("error") {
            CallbackParams::Denied(error)
        } else if let Some(code) = param("code") {
            CallbackParams::Code(code)
        } else {
            CallbackParams::MissingCode
        };
        Self::Callback(params)
    }
}

/// A bound loopback listener that has not started serving yet.
#[derive(Debug)]
pub struct LoopbackServer {
    listener: TcpListener,
    port: u16,
}

impl LoopbackServer {
    /// Binds `127.0.0.1:<port>`. Port 0 picks a free port.
    pub async fn bind(port: u16) -> ApiResult<Self> {
        let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            ApiError::configuration(format!(
                "failed to listen on {} for the OAuth callback: {}",
                addr, e
            ))
            .with_source(e)
        })?;
        let port = listener
            .local_addr()
            .map_err(|e| ApiError::internal(format!("listener has no local address: {}", e)))?
            .port();
        debug!(port, "bound loopback server");
        Ok(Self { listener, port })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// The redirect URI this listener answers.
    pub fn redirect_uri(&self) -> String {
        redirect_uri_for(self.port)
    }

    fn spawn(self) -> (ListenerTask, oneshot::Receiver<std::io::Result<PendingCallback>>) {
        let (tx, rx) = oneshot::channel();
        let handle = tokio::spawn(accept_until_callback(self.listener, tx));
        (ListenerTask(Some(handle)), rx)
    }
}

/// A callback request awaiting its response.
struct PendingCallback {
    params: CallbackParams,
    stream: TcpStream,
}

/// Owns the accept loop. Dropping it aborts the loop and closes the listener.
struct ListenerTask(Option<JoinHandle<()>>);

impl ListenerTask {
    async fn close(mut self) {
        if let Some(handle) = self.0.take() {
            handle.abort();
            // Cancellation is the expected outcome here.
            let _ = handle.await;
        }
    }
}

impl Drop for ListenerTask {
    fn drop(&mut self) {
        if let Some(handle) = self.0.take() {
            handle.abort();
        }
    }
}

type CallbackSlot = Arc<Mutex<Option<oneshot::Sender<std::io::Result<PendingCallback>>>>>;

/// Accepts connections until aborted, serving each one on its own task.
///
/// The first callback request is handed over through `tx`. Connection tasks
/// live in a [`JoinSet`], so aborting this task aborts them too.
async fn accept_until_callback(
    listener: TcpListener,
    tx: oneshot::Sender<std::io::Result<PendingCallback>>,
) {
    let slot: CallbackSlot = Arc::new(Mutex::new(Some(tx)));
    let mut connections = JoinSet::new();
    loop {
        while connections.try_join_next().is_some() {}

        match listener.accept().await {
            Ok((stream, peer)) => {
                connections.spawn(serve_connection(stream, peer, Arc::clone(&slot)));
            }
            Err(e) => {
                if let Some(tx) = take_sender(&slot) {
                    let _ = tx.send(Err(e));
                }
                return;
            }
        }
    }
}

fn take_sender(
    slot: &CallbackSlot,
) -> Option<oneshot::Sender<std::io::Result<PendingCallback>>> {
    slot.lock().ok().and_then(|mut sender| sender.take())
}

async fn serve_connection(mut stream: TcpStream, peer: SocketAddr, slot: CallbackSlot) {
    let target = match timeout(REQUEST_READ_TIMEOUT, read_request_target(&mut stream)).await {
        Ok(Ok(Some(target))) => target,
        Ok(Ok(None)) => {
            respond(&mut stream, Response::BAD_REQUEST).await;
            return;
        }
        Ok(Err(e)) => {
            debug!(%peer, error = %e, "failed to read request");
            return;
        }
        Err(_) => {
            debug!(%peer, "no request received in time");
            return;
        }
    };

    match CallbackRequest::parse(&target) {
        CallbackRequest::NotFound => {
            debug!(%peer, request_target = %target, "not the callback path");
            respond(&mut stream, Response::NOT_FOUND).await;
        }
        CallbackRequest::BadRequest => {
            respond(&mut stream, Response::BAD_REQUEST).await;
        }
        CallbackRequest::Callback(params) => match take_sender(&slot) {
            Some(tx) => {
                let _ = tx.send(Ok(PendingCallback { params, stream }));
            }
            None => {
                debug!(%peer, "callback already received");
                respond(&mut stream, Response::BAD_REQUEST).await;
            }
        },
    }
}

/// Reads the request line and drains headers. Returns the request target.
async fn read_request_target(stream: &mut TcpStream) -> std::io::Result<Option<String>> {
    let mut reader = BufReader::new(stream);
    let mut request_line = String::new();
    if reader.read_line(&mut request_line).await? == 0 {
        return Ok(None);
    }

    let mut line = String::new();
    for _ in 0..MAX_HEADER_LINES {
        line.clear();
        let read = reader.read_line(&mut line).await?;
        if read == 0 || line == "\r\n" || line == "\n" {
            break;
        }
    }

    // GET /oauth2callback?code=... HTTP/1.1
    let mut parts = request_line.split_whitespace();
    Ok(match (parts.next(), parts.next()) {
        (Some(_method), Some(target)) => Some(target.to_string()),
        _ => None,
    })
}

struct Response {
    status: u16,
    reason: &'static str,
    body: &'static str,
}

impl Response {
    const OK: Self = Self {
        status: 200,
        reason: "OK",
        body: "Authorization complete. You can close this window and return to the terminal.",
    };
    const BAD_REQUEST: Self = Self {
        status: 400,
        reason: "Bad Request",
        body: "Authorization failed. You can close this window.",
    };
    const MISSING_CODE: Self = Self {
        status: 400,
        reason: "Bad Request",
        body: "Missing authorization code.",
    };
    const NOT_FOUND: Self = Self {
        status: 404,
        reason: "Not Found",
        body: "Not found.",
    };
    const SERVER_ERROR: Self = Self {
        status: 500,
        reason: "Internal Server Error",
        body: "Failed to complete authorization. Check the terminal for details.",
    };
}

async fn respond(stream: &mut TcpStream, response: Response) {
    let raw = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: text/plain; charset=utf-8\r\n\
         Content-Length: {}\r\nConnection: close\r\n\r\n{}",
        response.status,
        response.reason,
        response.body.len(),
        response.body
    );
    let written = async {
        stream.write_all(raw.as_bytes()).await?;
        stream.flush().await?;
        stream.shutdown().await
    };
    if let Err(e) = written.await {
        debug!(error = %e, "failed to write callback response");
    }
}

/// Drives one interactive login.
#[derive(Debug)]
pub struct LoginFlow<E, B> {
    exchange: E,
    browser: B,
    state: FlowState,
}

impl<E: TokenExchange, B: BrowserOpener> LoginFlow<E, B> {
    pub fn new(exchange: E, browser: B) -> Self {
        Self {
            exchange,
            browser,
            state: FlowState::Idle,
        }
    }

    pub fn state(&self) -> &FlowState {
        &self.state
    }

    /// Binds the loopback listener. A bind failure fails the flow.
    pub async fn listen(&mut self, port: u16) -> ApiResult<LoopbackServer> {
        match LoopbackServer::bind(port).await {
            Ok(server) => Ok(server),
            Err(err) => {
                self.state = FlowState::Failed(err.to_string());
                Err(err)
            }
        }
    }

    /// Opens the browser and waits for the redirect on `server`, then
    /// persists the redeemed tokens through `tokens`.
    pub async fn run<S: DocumentStore>(
        &mut self,
        server: LoopbackServer,
        tokens: &TokenStore<S>,
    ) -> ApiResult<Credentials> {
        let pkce = PkceFlow::new();
        let redirect_uri = server.redirect_uri();
        let consent_url = self.exchange.authorization_url(&pkce, &redirect_uri);

        self.state = FlowState::Listening {
            port: server.port(),
        };
        let (task, callback) = server.spawn();
        info!(%redirect_uri, "waiting for OAuth callback");

        eprintln!("Opening browser for Google authorization...");
        if let Err(e) = self.browser.open(&consent_url) {
            warn!(error = %e, "failed to open browser");
            eprintln!("\nOpen this URL in your browser to continue:\n\n{}\n", consent_url);
        }

        let outcome = match callback.await {
            Ok(Ok(pending)) => {
                self.complete(pending, &pkce.verifier, &redirect_uri, tokens)
                    .await
            }
            Ok(Err(e)) => Err(ApiError::network(format!("callback listener failed: {}", e))
                .with_source(e)),
            Err(_) => Err(ApiError::internal("callback listener stopped unexpectedly")),
        };
        task.close().await;

        self.state = match &outcome {
            Ok(_) => FlowState::Done,
            Err(err) => FlowState::Failed(err.to_string()),
        };
        outcome
    }

    async fn complete<S: DocumentStore>(
        &self,
        pending: PendingCallback,
        verifier: &str,
        redirect_uri: &str,
        tokens: &TokenStore<S>,
    ) -> ApiResult<Credentials> {
        let PendingCallback { params, mut stream } = pending;

        match params {
            CallbackParams::Denied(error) => {
                respond(&mut stream, Response::BAD_REQUEST).await;
                Err(ApiError::authentication(format!(
                    "Authorization error: {}",
                    error
                )))
            }
            CallbackParams::MissingCode => {
                respond(&mut stream, Response::MISSING_CODE).await;
                Err(ApiError::authentication("missing authorization code"))
            }
            CallbackParams::Code(code) => {
                let redeemed = async {
                    let credentials = self
                        .exchange
                        .exchange_code(&code, verifier, redirect_uri)
                        .await?;
                    tokens.save(&credentials)?;
                    Ok(credentials)
                };
                match redeemed.await {
                    Ok(credentials) => {
                        respond(&mut stream, Response::OK).await;
                        Ok(credentials)
                    }
                    Err(err) => {
                        respond(&mut stream, Response::SERVER_ERROR).await;
                        Err(err)
                    }
                }
            }
        }
    }
}
