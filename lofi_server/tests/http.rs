// Exercises the listener over a real socket with raw HTTP/1.0 requests.

use lofi_server::{ServerConfig, start_server};
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};

fn get(addr: SocketAddr, path: &str, extra_headers: &str) -> (u16, String) {
    let mut stream = TcpStream::connect(addr).unwrap();
    write!(
        stream,
        "GET {path} HTTP/1.0\r\nHost: localhost\r\n{extra_headers}\r\n"
    )
    .unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).unwrap();
    let status = response
        .split_whitespace()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .unwrap();
    let body = response
        .split_once("\r\n\r\n")
        .map(|(_, body)| body.to_string())
        .unwrap_or_default();
    (status, body)
}

fn start(token: Option<&str>) -> (lofi_server::ServerHandle, SocketAddr) {
    let mut config = ServerConfig {
        addr: "127.0.0.1:0".into(),
        token: token.map(String::from),
        ..ServerConfig::default()
    };
    config.generator.corpus.path = "/nonexistent/lofi-http/notes.json".into();
    start_server(config).unwrap()
}

#[test]
fn serves_welcome_and_not_found() {
    let (handle, addr) = start(None);
    assert_eq!(
        get(addr, "/", ""),
        (200, "Welcome to the Lofi Generator! :)".to_string())
    );
    assert_eq!(get(addr, "/missing", "").0, 404);
    handle.stop();
}

#[test]
fn triggers_return_accepted_with_job_id() {
    let (handle, addr) = start(Some("letmein"));
    let (status, body) = get(addr, "/generate_music", "");
    assert_eq!(status, 202);
    assert_eq!(body, r#"{"job":1}"#);

    assert_eq!(get(addr, "/train_network", "").0, 401);
    let (status, body) = get(
        addr,
        "/train_network",
        "Authorization: Bearer letmein\r\n",
    );
    assert_eq!(status, 202);
    assert_eq!(body, r#"{"job":2}"#);

    let (status, body) = get(addr, "/jobs/1", "");
    assert_eq!(status, 200);
    assert!(body.contains(r#""kind":"generate""#));
    handle.stop();
}

#[test]
fn bind_failure_is_an_error() {
    let config = ServerConfig {
        addr: "not-an-address".into(),
        ..ServerConfig::default()
    };
    assert!(start_server(config).is_err());
}
