use anyhow::Context as _;
use axum::Router;
use std::io::{BufRead as _, BufReader, Write as _};
use std::process::{Child, ChildStdin};
use std::sync::mpsc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

pub struct KillOnDrop(pub Child);

impl Drop for KillOnDrop {
    fn drop(&mut self) {
        let _ = self.0.kill();
    }
}

/// An in-process HTTP API on an ephemeral localhost port. Shuts down when dropped.
pub struct MockApi {
    pub base_url: String,
    shutdown: Option<oneshot::Sender<()>>,
}

impl MockApi {
    /// Serve `router` on `127.0.0.1:<ephemeral>`.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if binding the listener fails.
    pub async fn start(router: Router) -> anyhow::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .context("bind mock API")?;
        let addr = listener.local_addr()?;
        let (tx, rx) = oneshot::channel::<()>();
        tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    let _ = rx.await;
                })
                .await
        });
        Ok(Self {
            base_url: format!("http://{addr}"),
            shutdown: Some(tx),
        })
    }

    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

impl Drop for MockApi {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

/// A line-delimited JSON-RPC session with a child process over its stdin/stdout.
///
/// Responses are read on a background thread so a hung child fails the test instead of blocking it.
pub struct StdioSession {
    stdin: ChildStdin,
    responses: mpsc::Receiver<serde_json::Value>,
    timeout: Duration,
}

impl StdioSession {
    /// Take over the piped stdin/stdout of `child`.
    ///
    /// # Errors
    ///
    /// Returns an error if the child was not spawned with piped stdin and stdout.
    pub fn attach(child: &mut Child, timeout: Duration) -> anyhow::Result<Self> {
        let stdin = child.stdin.take().context("child stdin is not piped")?;
        let stdout = child.stdout.take().context("child stdout is not piped")?;

        let (tx, rx) = mpsc::channel();
        std::thread::spawn(move || {
            for line in BufReader::new(stdout).lines() {
                let Ok(line) = line else { break };
                let Ok(msg) = serde_json::from_str::<serde_json::Value>(&line) else {
                    continue;
                };
                if tx.send(msg).is_err() {
                    break;
                }
            }
        });

        Ok(Self {
            stdin,
            responses: rx,
            timeout,
        })
    }

    /// Send one message without waiting for a reply.
    ///
    /// # Errors
    ///
    /// Returns an error if writing to the child fails.
    pub fn send(&mut self, msg: &serde_json::Value) -> anyhow::Result<()> {
        writeln!(self.stdin, "{}", serde_json::to_string(msg)?).context("write to child")?;
        self.stdin.flush().context("flush child stdin")?;
        Ok(())
    }

    /// Send a request and wait for the response with the same `id`.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails or no matching response arrives before the timeout.
    pub fn request(
        &mut self,
        id: i64,
        method: &str,
        params: serde_json::Value,
    ) -> anyhow::Result<serde_json::Value> {
        self.send(&serde_json::json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        }))?;

        loop {
            let msg = self
                .responses
                .recv_timeout(self.timeout)
                .with_context(|| format!("timed out waiting for response to {method} (id={id})"))?;
            if msg.get("id").and_then(serde_json::Value::as_i64) == Some(id) {
                return Ok(msg);
            }
        }
    }
}
