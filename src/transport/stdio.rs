//! Line-delimited JSON-RPC over standard input/output.
//!
//! A single long-lived process carries a single session. Framing is strict
//! NDJSON: one JSON-RPC message per line in both directions, flushed after
//! every write. Standard output carries protocol bytes only; all
//! diagnostics go to standard error via `tracing`.
//!
//! The loop enforces two clocks: a read timeout of
//! `min(init_timeout, 60s)` per line (idle reads are logged, never fatal)
//! and a total-uptime limit after which the process exits. End-of-stream
//! closes the session and exits cleanly.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Stdout};
use tokio::time::timeout;
use tracing::{debug, error, info};

use crate::access_log::{AccessEvent, AccessLogger, AccessOutcome};
use crate::config::Config;
use crate::mcp::engine::{Outcome, ProtocolEngine};
use crate::session::lifecycle::RequestContext;
use crate::session::record::now_secs;
use crate::session::store::SessionStore;
use crate::transport::rpc_method;

/// Upper bound on the per-line read timeout.
const MAX_READ_TIMEOUT_SECS: u64 = 60;

/// The stdio transport: a cooperative single-session loop.
pub struct StdioTransport {
    engine: Arc<ProtocolEngine>,
    store: Arc<SessionStore>,
    config: Arc<Config>,
    access_log: Arc<AccessLogger>,
    /// The per-process session slot, populated by the first successful
    /// `initialize` and reused for every subsequent message.
    session_id: Option<String>,
}

impl StdioTransport {
    /// Creates a stdio transport over the given engine and store.
    #[must_use]
    pub fn new(
        engine: Arc<ProtocolEngine>,
        store: Arc<SessionStore>,
        config: Arc<Config>,
        access_log: Arc<AccessLogger>,
    ) -> Self {
        Self {
            engine,
            store,
            config,
            access_log,
            session_id: None,
        }
    }

    /// Runs the stdio main loop until end-of-stream, interrupt, or the
    /// uptime limit.
    ///
    /// # Errors
    ///
    /// Returns an error if transport I/O fails.
    pub async fn run(&mut self) -> std::io::Result<()> {
        let started = Instant::now();
        let max_uptime = Duration::from_secs(self.config.max_uptime_secs);
        let read_timeout = Duration::from_secs(
            self.config.init_timeout_secs.min(MAX_READ_TIMEOUT_SECS),
        );

        let mut reader = BufReader::new(tokio::io::stdin());
        let mut stdout = tokio::io::stdout();
        let mut idle_reads: u32 = 0;

        loop {
            if started.elapsed() >= max_uptime {
                info!("maximum connection uptime reached, shutting down");
                break;
            }

            let mut line = String::new();
            let read = tokio::select! {
                read = timeout(read_timeout, reader.read_line(&mut line)) => read,
                _ = tokio::signal::ctrl_c() => {
                    info!("interrupt received, shutting down");
                    break;
                }
            };

            match read {
                // Read timeout with no data: log and keep waiting.
                Err(_) => {
                    idle_reads += 1;
                    debug!(
                        idle_reads,
                        idle_secs = u64::from(idle_reads) * read_timeout.as_secs(),
                        "no input within read timeout"
                    );
                }
                // EOF - client closed the connection.
                Ok(Ok(0)) => {
                    info!("client closed standard input");
                    break;
                }
                Ok(Ok(_)) => {
                    idle_reads = 0;
                    let payload = line.trim();
                    if payload.is_empty() {
                        continue;
                    }
                    self.handle_line(payload, &mut stdout).await?;
                }
                Ok(Err(e)) => return Err(e),
            }
        }

        self.shutdown();
        Ok(())
    }

    /// Handles a single line of input.
    ///
    /// Errors and notification acknowledgements never terminate the loop;
    /// they produce at most an error message on standard output.
    async fn handle_line(&mut self, payload: &str, stdout: &mut Stdout) -> std::io::Result<()> {
        let started = Instant::now();
        let ctx = RequestContext::stdio(self.session_id.clone());

        let (outcome_kind, reply) = match self.engine.handle(payload, &ctx).await {
            Outcome::Initialized {
                response,
                session_id,
                ..
            } => {
                self.session_id = Some(session_id);
                (AccessOutcome::Ok, Some(serde_json::to_string(&response)))
            }
            Outcome::Reply { response, .. } => {
                (AccessOutcome::Ok, Some(serde_json::to_string(&response)))
            }
            Outcome::Ack { .. } => (AccessOutcome::Ok, None),
            Outcome::Fail { error, .. } => {
                (AccessOutcome::Refused, Some(serde_json::to_string(&error)))
            }
            Outcome::Internal { message } => {
                error!(%message, "internal failure while handling message");
                (AccessOutcome::Failed, None)
            }
        };

        if let Some(serialised) = reply {
            match serialised {
                Ok(mut body) => {
                    body.push('\n');
                    stdout.write_all(body.as_bytes()).await?;
                    stdout.flush().await?;
                }
                Err(e) => error!(error = %e, "failed to serialise response"),
            }
        }

        self.access_log.log_silent(
            &AccessEvent::new("stdio", rpc_method(payload), outcome_kind, started.elapsed())
                .with_session(self.session_id.clone()),
        );

        Ok(())
    }

    /// Closes the current session (if any) and sweeps the store.
    fn shutdown(&mut self) {
        if let Some(session_id) = self.session_id.take() {
            let _ = self.engine.gate().close(&session_id);
        }
        self.store.reap(
            now_secs(),
            self.config.max_uptime_secs,
            self.config.init_timeout_secs,
        );
    }
}
