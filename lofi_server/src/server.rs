// HTTP listener for the trigger endpoints.
//
// One `tiny_http` server handled on a single background thread: requests
// only enqueue jobs or read the job table, so nothing here blocks for long.
// The loop polls with `recv_timeout` so it can notice `keep_running` going
// false and exit; `ServerHandle::stop` flips the flag and joins the thread.

use crate::routes::{Reply, Router};
use lofi_generator::GeneratorConfig;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;
use tiny_http::{Header, Request, Response, Server};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("cannot listen on {addr}: {reason}")]
    Bind { addr: String, reason: String },
}

pub struct ServerConfig {
    pub addr: String,
    pub token: Option<String>,
    pub generator: GeneratorConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: "0.0.0.0:3000".into(),
            token: None,
            generator: GeneratorConfig::default(),
        }
    }
}

/// Handle returned by `start_server` to stop the listener.
pub struct ServerHandle {
    keep_running: Arc<AtomicBool>,
    thread: Option<thread::JoinHandle<()>>,
}

impl ServerHandle {
    pub fn stop(mut self) {
        self.keep_running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

/// Bind and serve on a background thread. Returns the bound address, which
/// differs from the configured one when port 0 is requested.
pub fn start_server(config: ServerConfig) -> Result<(ServerHandle, SocketAddr), ServerError> {
    let bind_error = |reason: String| ServerError::Bind {
        addr: config.addr.clone(),
        reason,
    };
    let server = Server::http(config.addr.as_str()).map_err(|e| bind_error(e.to_string()))?;
    let addr = server
        .server_addr()
        .to_ip()
        .ok_or_else(|| bind_error("not an IP listener".into()))?;

    let router = Router::new(config.generator, config.token);
    let keep_running = Arc::new(AtomicBool::new(true));
    let flag = Arc::clone(&keep_running);
    let thread = thread::spawn(move || serve(&server, &router, &flag));

    Ok((
        ServerHandle {
            keep_running,
            thread: Some(thread),
        },
        addr,
    ))
}

fn serve(server: &Server, router: &Router, keep_running: &AtomicBool) {
    while keep_running.load(Ordering::SeqCst) {
        match server.recv_timeout(POLL_INTERVAL) {
            Ok(Some(request)) => handle(request, router),
            Ok(None) => {}
            Err(e) => {
                log::error!("listener failed: {e}");
                break;
            }
        }
    }
}

fn handle(request: Request, router: &Router) {
    let authorization = request
        .headers()
        .iter()
        .find(|h| h.field.equiv("Authorization"))
        .map(|h| h.value.as_str().to_owned());
    let reply = router.route(
        request.method().as_str(),
        request.url(),
        authorization.as_deref(),
    );
    log::debug!(
        "{} {} -> {}",
        request.method(),
        request.url(),
        reply.status
    );
    if let Err(e) = request.respond(into_response(reply)) {
        log::warn!("failed to send response: {e}");
    }
}

fn into_response(reply: Reply) -> Response<std::io::Cursor<Vec<u8>>> {
    let response = Response::from_string(reply.body).with_status_code(reply.status);
    match Header::from_bytes(&b"Content-Type"[..], reply.content_type.as_bytes()) {
        Ok(header) => response.with_header(header),
        Err(()) => response,
    }
}
