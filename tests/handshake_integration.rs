//! Integration tests for the startup handshake.
//!
//! Unlike the teacher's `tests/integration.rs`, which needs a running
//! Postgres instance and is `#[ignore]`d, these drive `Client`/`Connection`
//! against a scripted fake backend on a loopback `TcpListener`.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use pgsession_wire::{Client, ConnectionOptions, Error, TlsOptions};
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

fn write_message(buf: &mut Vec<u8>, tag: u8, body: &[u8]) {
    buf.push(tag);
    buf.extend_from_slice(&((body.len() + 4) as i32).to_be_bytes());
    buf.extend_from_slice(body);
}

async fn read_message(socket: &mut tokio::net::TcpStream) -> (u8, Vec<u8>) {
    let mut header = [0u8; 5];
    socket.read_exact(&mut header).await.unwrap();
    let len = i32::from_be_bytes([header[1], header[2], header[3], header[4]]) as usize;
    let mut body = vec![0u8; len - 4];
    socket.read_exact(&mut body).await.unwrap();
    (header[0], body)
}

fn split_null_terminated(body: &[u8]) -> Vec<u8> {
    body[..body.len().saturating_sub(1)].to_vec()
}

/// A scripted backend that runs the full SCRAM-SHA-256 exchange with a
/// fixed password ("hunter2"), using the textbook vector math so the
/// client's proof can be checked exactly like a real server would.
async fn scram_backend(listener: TcpListener, password: &'static str) {
    let (mut socket, _) = listener.accept().await.unwrap();

    // Startup message: length-prefixed, no type byte.
    let mut len_buf = [0u8; 4];
    socket.read_exact(&mut len_buf).await.unwrap();
    let len = i32::from_be_bytes(len_buf) as usize;
    let mut rest = vec![0u8; len - 4];
    socket.read_exact(&mut rest).await.unwrap();

    let mut sasl_mechanisms = Vec::new();
    write_message(&mut sasl_mechanisms, b'R', &{
        let mut body = 10i32.to_be_bytes().to_vec();
        body.extend_from_slice(b"SCRAM-SHA-256\0\0");
        body
    });
    socket.write_all(&sasl_mechanisms).await.unwrap();

    let (tag, body) = read_message(&mut socket).await;
    assert_eq!(tag, b'p');
    let client_first_len_prefix = 4 + 14;
    let client_first = std::str::from_utf8(&body[client_first_len_prefix..]).unwrap();
    assert!(client_first.starts_with("n,,n=,r="));
    let client_nonce = client_first.strip_prefix("n,,n=,r=").unwrap().to_string();

    let server_nonce = format!("{}SERVEREXT", client_nonce);
    let salt = b"fixedsalt";
    let iterations = 4096u32;
    let server_first = format!(
        "r={},s={},i={}",
        server_nonce,
        BASE64.encode(salt),
        iterations
    );

    let mut continue_msg = Vec::new();
    let mut continue_body = 11i32.to_be_bytes().to_vec();
    continue_body.extend_from_slice(server_first.as_bytes());
    write_message(&mut continue_msg, b'R', &continue_body);
    socket.write_all(&continue_msg).await.unwrap();

    let (tag, body) = read_message(&mut socket).await;
    assert_eq!(tag, b'p');
    let client_final = std::str::from_utf8(&body).unwrap();

    let client_first_bare = format!("n=,r={}", client_nonce);
    let client_final_without_proof = client_final.rsplit_once(",p=").unwrap().0;
    let auth_message = format!(
        "{},{},{}",
        client_first_bare, server_first, client_final_without_proof
    );

    let server_key = {
        use hmac::{Hmac, Mac};
        use pbkdf2::pbkdf2;
        type HmacSha256 = Hmac<Sha256>;
        let mut salted = vec![0u8; 32];
        pbkdf2::<HmacSha256>(password.as_bytes(), salt, iterations, &mut salted).unwrap();
        let mut mac = HmacSha256::new_from_slice(&salted).unwrap();
        mac.update(b"Server Key");
        mac.finalize().into_bytes().to_vec()
    };
    let server_signature = {
        use hmac::{Hmac, Mac};
        type HmacSha256 = Hmac<Sha256>;
        let mut mac = HmacSha256::new_from_slice(&server_key).unwrap();
        mac.update(auth_message.as_bytes());
        mac.finalize().into_bytes().to_vec()
    };

    let server_final = format!("v={}", BASE64.encode(server_signature));
    let mut final_msg = Vec::new();
    let mut final_body = 12i32.to_be_bytes().to_vec();
    final_body.extend_from_slice(server_final.as_bytes());
    write_message(&mut final_msg, b'R', &final_body);
    socket.write_all(&final_msg).await.unwrap();

    let mut response = Vec::new();
    write_message(&mut response, b'R', &0i32.to_be_bytes());
    write_message(&mut response, b'K', &[0, 0, 1, 0, 0, 0, 2, 0]);
    write_message(&mut response, b'Z', b"I");
    socket.write_all(&response).await.unwrap();

    let _ = split_null_terminated(&rest);
}

#[tokio::test]
async fn test_scram_handshake_end_to_end() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(scram_backend(listener, "hunter2"));

    let options = ConnectionOptions::new(addr.ip().to_string(), addr.port(), "alice", "mydb")
        .password("hunter2");
    let mut client = Client::new(options).unwrap();
    client.connect().await.unwrap();

    assert!(client.connected());
    assert_eq!(client.session().pid, Some(256));
    server.await.unwrap();
}

#[tokio::test]
async fn test_tls_enforced_and_server_rejects() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut header = [0u8; 8];
        socket.read_exact(&mut header).await.unwrap();
        socket.write_all(b"N").await.unwrap();
        let mut buf = [0u8; 1];
        let _ = socket.read(&mut buf).await;
    });

    let options = ConnectionOptions::new(addr.ip().to_string(), addr.port(), "alice", "mydb").tls(
        TlsOptions {
            enabled: true,
            enforce: true,
            ca_certificates: Vec::new(),
        },
    );
    let mut client = Client::new(options).unwrap();
    let result = client.connect().await;

    assert!(matches!(result, Err(Error::TlsAvailability(_))));
    let _ = server.await;
}

#[tokio::test]
async fn test_tls_not_enforced_falls_back_to_plaintext() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut header = [0u8; 8];
        socket.read_exact(&mut header).await.unwrap();
        socket.write_all(b"N").await.unwrap();

        let mut discard = vec![0u8; 4096];
        let _ = socket.read(&mut discard).await.unwrap();

        let mut response = Vec::new();
        write_message(&mut response, b'R', &0i32.to_be_bytes());
        write_message(&mut response, b'Z', b"I");
        socket.write_all(&response).await.unwrap();
    });

    let options = ConnectionOptions::new(addr.ip().to_string(), addr.port(), "alice", "mydb").tls(
        TlsOptions {
            enabled: true,
            enforce: false,
            ca_certificates: Vec::new(),
        },
    );
    let mut client = Client::new(options).unwrap();
    client.connect().await.unwrap();

    assert!(client.connected());
    assert_eq!(client.session().tls, Some(false));
    server.await.unwrap();
}

/// A peer that accepts the connection, reads the SSLRequest probe in full,
/// then drops the socket without writing a response byte. Reading the probe
/// before closing avoids a spurious RST, so the client sees a clean EOF.
/// Every attempt should see a closed socket, which must be retry-eligible
/// rather than a flat protocol failure.
#[tokio::test]
async fn test_peer_accepts_then_drops_retries_and_reports_tls_availability() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let accept_count = Arc::new(AtomicU32::new(0));
    let accept_count_server = accept_count.clone();

    let server = tokio::spawn(async move {
        loop {
            let (mut socket, _) = match listener.accept().await {
                Ok(pair) => pair,
                Err(_) => break,
            };
            accept_count_server.fetch_add(1, Ordering::SeqCst);
            let mut header = [0u8; 8];
            let _ = socket.read_exact(&mut header).await;
            drop(socket);
        }
    });

    let options = ConnectionOptions::new(addr.ip().to_string(), addr.port(), "alice", "mydb")
        .tls(TlsOptions {
            enabled: true,
            enforce: true,
            ca_certificates: Vec::new(),
        })
        .attempts(5);
    let mut client = Client::new(options).unwrap();
    let result = client.connect().await;

    assert!(
        matches!(result, Err(Error::TlsAvailability(_))),
        "expected Error::TlsAvailability"
    );
    let message = result.unwrap_err().to_string();
    assert!(
        message.contains("Could not check if server accepts SSL connections"),
        "unexpected message: {message}"
    );
    assert_eq!(accept_count.load(Ordering::SeqCst), 5);

    server.abort();
}
