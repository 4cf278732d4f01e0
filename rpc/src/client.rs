use std::sync::atomic::{AtomicU64, Ordering};

use log::debug;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::RpcError;
use crate::types::{RpcRequest, RpcResponse};

/// HTTP JSON-RPC client for a single daemon endpoint.
///
/// The client is cheap to share by reference: the underlying
/// [`reqwest::Client`] pools connections and request ids are allocated from
/// an atomic counter.
#[derive(Debug)]
pub struct RpcClient {
    endpoint: String,
    http: reqwest::Client,
    next_id: AtomicU64,
    trace: bool,
}

impl RpcClient {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            http: reqwest::Client::new(),
            next_id: AtomicU64::new(0),
            trace: false,
        }
    }

    /// Log every request/response pair at debug level.
    pub fn with_tracing(mut self, trace: bool) -> Self {
        self.trace = trace;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Perform a raw call, returning the untyped result value.
    pub async fn call_value(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> Result<Value, RpcError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = RpcRequest::new(id, method, params);

        if self.trace {
            debug!(
                "rpc -> {}: {}",
                self.endpoint,
                serde_json::to_string(&request)?
            );
        }

        let response = self
            .http
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await?;
        let status = response.status().as_u16();
        let body = response.bytes().await?;

        // Daemons answer application errors with a JSON-RPC error body, some
        // behind a non-2xx status. Prefer the structured error when the body
        // parses; fall back to the bare status otherwise.
        let parsed: RpcResponse = match serde_json::from_slice(&body) {
            Ok(parsed) => parsed,
            Err(_) if status >= 400 => return Err(RpcError::Http { status }),
            Err(err) => return Err(err.into()),
        };

        if self.trace {
            debug!(
                "rpc <- {} {}: {}",
                self.endpoint,
                method,
                String::from_utf8_lossy(&body)
            );
        }

        parsed.into_result()
    }

    /// Call `method` with serialized `params`, deserializing the result.
    pub async fn call<P: Serialize, R: DeserializeOwned>(
        &self,
        method: &str,
        params: &P,
    ) -> Result<R, RpcError> {
        let value = self
            .call_value(method, Some(serde_json::to_value(params)?))
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Call a parameterless `method`, deserializing the result.
    pub async fn call_no_params<R: DeserializeOwned>(&self, method: &str) -> Result<R, RpcError> {
        let value = self.call_value(method, None).await?;
        Ok(serde_json::from_value(value)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve exactly one HTTP request with a canned JSON body, capturing the
    /// request body for later inspection.
    async fn one_shot_server(
        status_line: &'static str,
        body: &'static str,
    ) -> (SocketAddr, tokio::sync::oneshot::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = tokio::sync::oneshot::channel();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 4096];

            // Read headers, then the content-length body.
            let request = loop {
                let n = socket.read(&mut chunk).await.unwrap();
                assert!(n > 0, "client closed connection mid-request");
                buf.extend_from_slice(&chunk[..n]);

                let text = String::from_utf8_lossy(&buf).into_owned();
                if let Some(header_end) = text.find("\r\n\r\n") {
                    let content_length = text
                        .lines()
                        .find_map(|line| {
                            line.to_ascii_lowercase()
                                .strip_prefix("content-length:")
                                .map(|v| v.trim().parse::<usize>().unwrap())
                        })
                        .unwrap_or(0);
                    if buf.len() >= header_end + 4 + content_length {
                        break text[header_end + 4..].to_owned();
                    }
                }
            };

            let response = format!(
                "{}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status_line,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            let _ = tx.send(request);
        });

        (addr, rx)
    }

    #[tokio::test]
    async fn call_returns_typed_result() {
        let (addr, request_rx) = one_shot_server(
            "HTTP/1.1 200 OK",
            r#"{"jsonrpc":"2.0","id":0,"result":205}"#,
        )
        .await;

        let client = RpcClient::new(format!("http://{}", addr));
        let count: u64 = client.call_no_params("get_block_count").await.unwrap();
        assert_eq!(count, 205);

        let sent = request_rx.await.unwrap();
        let sent: Value = serde_json::from_str(&sent).unwrap();
        assert_eq!(sent["method"], "get_block_count");
        assert_eq!(sent["jsonrpc"], "2.0");
    }

    #[tokio::test]
    async fn server_error_body_is_preserved() {
        let (addr, _request_rx) = one_shot_server(
            "HTTP/1.1 500 Internal Server Error",
            r#"{"jsonrpc":"2.0","id":0,"error":{"code":-26,"message":"bad-fork-block"}}"#,
        )
        .await;

        let client = RpcClient::new(format!("http://{}", addr));
        let err = client
            .call_value("generate_blocks", Some(serde_json::json!({"count": 1})))
            .await
            .unwrap_err();

        assert!(err.is_server_error_containing("bad-fork-block"));
    }

    #[tokio::test]
    async fn non_json_error_page_maps_to_http_status() {
        let (addr, _request_rx) =
            one_shot_server("HTTP/1.1 502 Bad Gateway", "upstream unavailable").await;

        let client = RpcClient::new(format!("http://{}", addr));
        let err = client.call_no_params::<u64>("get_block_count").await.unwrap_err();

        assert!(matches!(err, RpcError::Http { status: 502 }));
    }

    #[tokio::test]
    async fn request_ids_increase() {
        let client = RpcClient::new("http://127.0.0.1:1");
        let first = client.next_id.fetch_add(1, Ordering::Relaxed);
        let second = client.next_id.fetch_add(1, Ordering::Relaxed);
        assert!(second > first);
    }
}
