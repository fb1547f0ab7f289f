//! RPC server: accepts connections, performs the nonce handshake, and
//! dispatches decoded requests to a user-supplied handler with thread-affine
//! FIFO ordering per `(client_id, thread_id)` (spec §4.9).
//!
//! Grounded on `packet_server.cpp`'s `initialize`/`on_accept`/`read_header`/
//! `read_packet`/`send_response`. The original pins a thread pool of
//! `boost::asio::io_context` worker threads; here a single `tokio` runtime
//! task per connection plus one dispatch task per `(client_id, thread_id)`
//! achieves the same ordering guarantee without pinning OS threads.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use repertory_common::{ApiError, Result};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};
use tracing::{instrument, trace, warn};

use crate::crypto::{decrypt_envelope, derive_rpc_key, encrypt_envelope};
use crate::frame::{read_frame, write_frame};
use crate::protocol::{check_version, encode_handshake, generate_nonce, RequestEnvelope, ResponseEnvelope, SERVICE_FLAGS};

/// `(service_flags, client_id, thread_id, method, args) -> (result, body)`.
pub type MessageHandler = Arc<
    dyn Fn(u32, String, u64, String, Vec<u8>) -> Pin<Box<dyn Future<Output = (i32, Vec<u8>)> + Send>>
        + Send
        + Sync,
>;

/// Invoked with a client id once its last connection has dropped.
pub type ClosedCallback = Arc<dyn Fn(&str) + Send + Sync>;

type WorkItem = (RequestEnvelope, mpsc::Sender<(i32, Vec<u8>)>);

/// Binds a TCP listener and serves the RPC protocol until dropped.
pub struct PacketServer {
    local_addr: std::net::SocketAddr,
    shutdown: Arc<tokio::sync::Notify>,
    accept_task: tokio::task::JoinHandle<()>,
}

impl PacketServer {
    /// Starts listening on `port`. `token` derives the shared AEAD key.
    pub async fn bind(port: u16, token: String, handler: MessageHandler, closed: ClosedCallback) -> Result<Self> {
        let listener = TcpListener::bind(("0.0.0.0", port))
            .await
            .map_err(ApiError::Io)?;
        let local_addr = listener.local_addr().map_err(ApiError::Io)?;
        let shutdown = Arc::new(tokio::sync::Notify::new());
        let key = derive_rpc_key(&token);

        let workers: Arc<Mutex<HashMap<(String, u64), mpsc::Sender<WorkItem>>>> =
            Arc::new(Mutex::new(HashMap::new()));

        let accept_shutdown = shutdown.clone();
        let accept_task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = accept_shutdown.notified() => break,
                    accepted = listener.accept() => {
                        match accepted {
                            Ok((socket, peer)) => {
                                trace!(%peer, "accepted rpc connection");
                                let handler = handler.clone();
                                let closed = closed.clone();
                                let workers = workers.clone();
                                tokio::spawn(async move {
                                    if let Err(err) = serve_connection(socket, key, handler, closed, workers).await {
                                        warn!(%err, "rpc connection ended with error");
                                    }
                                });
                            }
                            Err(err) => {
                                warn!(%err, "rpc accept failed");
                            }
                        }
                    }
                }
            }
        });

        Ok(Self {
            local_addr,
            shutdown,
            accept_task,
        })
    }

    #[must_use]
    pub fn local_addr(&self) -> std::net::SocketAddr {
        self.local_addr
    }

    pub async fn shutdown(self) {
        self.shutdown.notify_one();
        let _ = self.accept_task.await;
    }
}

#[instrument(skip(socket, key, handler, closed, workers))]
async fn serve_connection(
    mut socket: TcpStream,
    key: repertory_crypto::chunk::ChunkKey,
    handler: MessageHandler,
    closed: ClosedCallback,
    workers: Arc<Mutex<HashMap<(String, u64), mpsc::Sender<WorkItem>>>>,
) -> Result<()> {
    socket.set_nodelay(true).map_err(ApiError::Io)?;

    let mut nonce = generate_nonce();
    write_frame(&mut socket, &encode_handshake(&nonce)).await?;

    let mut client_id = String::new();

    loop {
        let payload = match read_frame(&mut socket).await {
            Ok(p) => p,
            Err(_) => break,
        };

        let decrypted = match decrypt_envelope(&key, &payload) {
            Ok(d) => d,
            Err(_) => break,
        };

        let request = match RequestEnvelope::decode(&decrypted) {
            Ok(r) => r,
            Err(_) => break,
        };

        if request.nonce != nonce {
            break;
        }
        nonce = generate_nonce();

        let result = if let Err(err) = check_version(&request.version) {
            Err(err)
        } else {
            Ok(())
        };

        let (result_code, body) = match result {
            Err(err) => (err.errno(), Vec::new()),
            Ok(()) => {
                if client_id.is_empty() {
                    client_id = request.client_id.clone();
                }

                dispatch(&workers, &handler, request.clone()).await
            }
        };

        let response = ResponseEnvelope {
            nonce: nonce.clone(),
            service_flags: SERVICE_FLAGS,
            result: result_code,
            body,
        };
        let encrypted = encrypt_envelope(&key, &response.encode())?;
        if write_frame(&mut socket, &encrypted).await.is_err() {
            break;
        }
    }

    if !client_id.is_empty() {
        closed(&client_id);
    }
    Ok(())
}

/// Routes a request onto the per-`(client_id, thread_id)` worker task,
/// spawning it on first use, so calls from the same remote thread execute
/// strictly in arrival order even though many connections are served
/// concurrently.
async fn dispatch(
    workers: &Arc<Mutex<HashMap<(String, u64), mpsc::Sender<WorkItem>>>>,
    handler: &MessageHandler,
    request: RequestEnvelope,
) -> (i32, Vec<u8>) {
    let key = (request.client_id.clone(), request.thread_id);

    let sender = {
        let mut guard = workers.lock().await;
        guard
            .entry(key)
            .or_insert_with(|| spawn_worker(handler.clone()))
            .clone()
    };

    let (reply_tx, mut reply_rx) = mpsc::channel(1);
    if sender.send((request, reply_tx)).await.is_err() {
        return (ApiError::CommError("worker task gone".to_string()).errno(), Vec::new());
    }

    reply_rx
        .recv()
        .await
        .unwrap_or((ApiError::CommError("worker dropped reply".to_string()).errno(), Vec::new()))
}

fn spawn_worker(handler: MessageHandler) -> mpsc::Sender<WorkItem> {
    let (tx, mut rx) = mpsc::channel::<WorkItem>(32);
    tokio::spawn(async move {
        while let Some((request, reply_tx)) = rx.recv().await {
            let result = handler(
                request.service_flags,
                request.client_id,
                request.thread_id,
                request.method,
                request.args,
            )
            .await;
            let _ = reply_tx.send(result).await;
        }
    });
    tx
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::PacketClient;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[tokio::test]
    async fn handshake_and_echo_round_trip() {
        let counter = Arc::new(AtomicU64::new(0));
        let counter_clone = counter.clone();
        let handler: MessageHandler = Arc::new(move |_flags, _client_id, _thread_id, method, args| {
            let counter = counter_clone.clone();
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
                if method == "echo" {
                    (0, args)
                } else {
                    (ApiError::NotImplemented(method).errno(), Vec::new())
                }
            }) as Pin<Box<dyn Future<Output = (i32, Vec<u8>)> + Send>>
        });
        let closed: ClosedCallback = Arc::new(|_| {});

        let server = PacketServer::bind(0, "test-token".to_string(), handler, closed)
            .await
            .unwrap();
        let addr = server.local_addr();

        let client = PacketClient::new(
            addr.ip().to_string(),
            addr.port(),
            "test-token".to_string(),
            2,
            5,
            5,
        );

        let (result, body) = client.send("echo", vec![9, 8, 7]).await.unwrap();
        assert_eq!(result, 0);
        assert_eq!(body, vec![9, 8, 7]);
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        server.shutdown().await;
    }
}
