//! RPC client: a pooled set of sockets against one endpoint, each tracking
//! the server's rolling nonce, with the original's exact retry policy
//! (spec §4.9, grounded on `packet_client.cpp`).

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use repertory_common::{ApiError, Result};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::warn;
use uuid::Uuid;

use crate::crypto::{decrypt_envelope, derive_rpc_key, encrypt_envelope};
use crate::frame::{read_frame, write_frame};
use crate::protocol::{RequestEnvelope, ResponseEnvelope, PROTOCOL_VERSION, SERVICE_FLAGS};

const MAX_ATTEMPTS: u8 = 5;
const RETRY_BACKOFF: Duration = Duration::from_secs(1);

struct Connection {
    socket: TcpStream,
    nonce: String,
}

struct Pool {
    idle: VecDeque<Connection>,
}

/// A client against one RPC endpoint. Cheap to clone: the pool and identity
/// are shared behind an `Arc`.
#[derive(Clone)]
pub struct PacketClient {
    inner: Arc<Inner>,
}

struct Inner {
    host: String,
    port: u16,
    key: repertory_crypto::chunk::ChunkKey,
    max_connections: usize,
    send_timeout: Duration,
    receive_timeout: Duration,
    client_id: String,
    pool: Mutex<Pool>,
    allow_connections: std::sync::atomic::AtomicBool,
}

impl PacketClient {
    /// `max_connections` bounds the idle-connection pool (defaults to 20 at
    /// `0`, matching the original). Timeouts are in seconds.
    #[must_use]
    pub fn new(
        host: String,
        port: u16,
        token: String,
        max_connections: u8,
        send_timeout_secs: u64,
        receive_timeout_secs: u64,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                host,
                port,
                key: derive_rpc_key(&token),
                max_connections: if max_connections == 0 { 20 } else { max_connections as usize },
                send_timeout: Duration::from_secs(send_timeout_secs),
                receive_timeout: Duration::from_secs(receive_timeout_secs),
                client_id: Uuid::new_v4().to_string(),
                pool: Mutex::new(Pool {
                    idle: VecDeque::new(),
                }),
                allow_connections: std::sync::atomic::AtomicBool::new(true),
            }),
        }
    }

    /// Stops serving new requests; in-flight ones still complete, matching
    /// the original's `allow_connections_` flag semantics.
    pub fn stop(&self) {
        self.inner
            .allow_connections
            .store(false, std::sync::atomic::Ordering::SeqCst);
    }

    async fn connect(&self) -> Result<Connection> {
        let mut socket = TcpStream::connect((self.inner.host.as_str(), self.inner.port))
            .await
            .map_err(ApiError::Io)?;
        socket.set_nodelay(true).map_err(ApiError::Io)?;

        let payload = read_frame(&mut socket).await?;
        let decrypted = decrypt_envelope(&self.inner.key, &payload)?;
        let handshake = ResponseEnvelope::decode(&decrypted)?;

        Ok(Connection {
            socket,
            nonce: handshake.nonce,
        })
    }

    async fn get_connection(&self) -> Result<Connection> {
        {
            let mut pool = self.inner.pool.lock().await;
            if let Some(conn) = pool.idle.pop_front() {
                return Ok(conn);
            }
        }
        self.connect().await
    }

    async fn return_connection(&self, conn: Connection) {
        let mut pool = self.inner.pool.lock().await;
        if pool.idle.len() < self.inner.max_connections {
            pool.idle.push_back(conn);
        }
    }

    /// Sends `method` with opaque `args`, retrying up to 5 times with a 1s
    /// backoff and a fresh connection each attempt on failure. Returns the
    /// envelope's result code and response body.
    pub async fn send(&self, method: &str, args: Vec<u8>) -> Result<(i32, Vec<u8>)> {
        let mut last_err = ApiError::CommError("no attempts made".to_string());

        for attempt in 1..=MAX_ATTEMPTS {
            if !self.inner.allow_connections.load(std::sync::atomic::Ordering::SeqCst) {
                return Err(ApiError::CommError("client is stopped".to_string()));
            }

            match self.send_once(method, &args).await {
                Ok(result) => return Ok(result),
                Err(err) => {
                    warn!(%err, method, attempt, "rpc send failed");
                    last_err = err;
                    if attempt < MAX_ATTEMPTS {
                        tokio::time::sleep(RETRY_BACKOFF).await;
                    }
                }
            }
        }

        Err(last_err)
    }

    async fn send_once(&self, method: &str, args: &[u8]) -> Result<(i32, Vec<u8>)> {
        let mut conn = self.get_connection().await?;

        let request = RequestEnvelope {
            nonce: conn.nonce.clone(),
            version: PROTOCOL_VERSION.to_string(),
            service_flags: SERVICE_FLAGS,
            client_id: self.inner.client_id.clone(),
            thread_id: current_thread_id(),
            method: method.to_string(),
            args: args.to_vec(),
        };

        let encrypted = encrypt_envelope(&self.inner.key, &request.encode())?;

        let write_result = tokio::time::timeout(self.inner.send_timeout, write_frame(&mut conn.socket, &encrypted)).await;
        match write_result {
            Ok(Ok(())) => {}
            Ok(Err(err)) => return Err(err),
            Err(_) => return Err(ApiError::CommError(format!("send timed out: {method}"))),
        }

        let read_result = tokio::time::timeout(self.inner.receive_timeout, read_frame(&mut conn.socket)).await;
        let payload = match read_result {
            Ok(Ok(payload)) => payload,
            Ok(Err(err)) => return Err(err),
            Err(_) => return Err(ApiError::CommError(format!("receive timed out: {method}"))),
        };

        let decrypted = decrypt_envelope(&self.inner.key, &payload)?;
        let response = ResponseEnvelope::decode(&decrypted)?;

        conn.nonce = response.nonce.clone();
        self.return_connection(conn).await;

        Ok((response.result, response.body))
    }
}

fn current_thread_id() -> u64 {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    std::thread::current().id().hash(&mut hasher);
    hasher.finish()
}
