//! One page's manifest session and its request channel.
//!
//! A session owns everything that lives for the page's lifetime: the
//! assembler (current manifest and dedup state), the persistence scheduler,
//! the rebuild controller and the live feed task.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, instrument, warn};

use crate::adapters::{Fetcher, ManifestStore, PageHost};
use crate::domain::manifest::snapshot;
use crate::domain::Manifest;

use super::assembler::ManifestAssembler;
use super::live::start_live_feed;
use super::persist::PersistenceScheduler;
use super::rebuild::{RebuildController, RebuildOutcome};

/// Errors on the request channel
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Request channel closed")]
    Closed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Inbound requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Request {
    /// Rebuild the manifest; answered only once the rebuild has finished
    RebuildManifest,

    /// Return the in-memory current manifest
    GetManifest,
}

/// Responses to [`Request`]s
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Response {
    Rebuilt { success: bool },
    Error { error: String },
    Manifest { manifest: Option<Manifest> },
}

/// A request paired with the slot its response goes to
pub type Envelope = (Request, oneshot::Sender<Response>);

/// Answers requests against one session
#[derive(Clone)]
pub struct RequestHandler {
    assembler: Arc<ManifestAssembler>,
    controller: Arc<RebuildController>,
}

impl RequestHandler {
    #[instrument(skip(self))]
    pub async fn handle(&self, request: Request) -> Response {
        match request {
            Request::RebuildManifest => {
                self.controller.rebuild().await;
                Response::Rebuilt { success: true }
            }
            Request::GetManifest => Response::Manifest {
                manifest: self.assembler.current().map(|m| snapshot(&m)),
            },
        }
    }

    /// Serve requests from a channel until every sender is gone
    ///
    /// Each request runs on its own task, so `getManifest` is answered even
    /// while a rebuild is in flight.
    pub async fn serve(&self, mut requests: mpsc::Receiver<Envelope>) {
        while let Some((request, reply)) = requests.recv().await {
            let handler = self.clone();
            tokio::spawn(async move {
                let response = handler.handle(request).await;
                if reply.send(response).is_err() {
                    debug!(?request, "Requester went away before the response");
                }
            });
        }
    }

    /// Serve JSON-lines requests, one response line per request line
    ///
    /// `getManifest` and malformed lines are answered as soon as they are
    /// read. Rebuilds run on their own tasks and answer when they finish, so
    /// responses are not necessarily in request order. Returns once the
    /// input is exhausted and every rebuild has been answered.
    pub async fn serve_json_lines<R, W>(&self, reader: R, mut writer: W) -> Result<(), SessionError>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = reader.lines();
        let mut rebuilds = JoinSet::new();
        let mut reading = true;

        loop {
            tokio::select! {
                line = lines.next_line(), if reading => {
                    let Some(line) = line? else {
                        reading = false;
                        continue;
                    };
                    if line.trim().is_empty() {
                        continue;
                    }

                    match serde_json::from_str::<Request>(&line) {
                        Ok(Request::RebuildManifest) => {
                            let handler = self.clone();
                            rebuilds.spawn(async move {
                                handler.handle(Request::RebuildManifest).await
                            });
                        }
                        Ok(request) => {
                            let response = self.handle(request).await;
                            write_response(&mut writer, &response).await?;
                        }
                        Err(e) => {
                            warn!("Invalid request {}: {}", line, e);
                            let response = Response::Error {
                                error: format!("invalid request: {}", e),
                            };
                            write_response(&mut writer, &response).await?;
                        }
                    }
                }
                Some(joined) = rebuilds.join_next() => {
                    let response = joined.unwrap_or_else(|e| Response::Error {
                        error: format!("rebuild failed: {}", e),
                    });
                    write_response(&mut writer, &response).await?;
                }
                else => break,
            }
        }

        Ok(())
    }
}

async fn write_response<W>(writer: &mut W, response: &Response) -> Result<(), SessionError>
where
    W: AsyncWrite + Unpin,
{
    let json = serde_json::to_string(response)?;
    writer.write_all(format!("{}\n", json).as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

/// Send one request over a channel and wait for its response
pub async fn send_request(
    requests: &mpsc::Sender<Envelope>,
    request: Request,
) -> Result<Response, SessionError> {
    let (tx, rx) = oneshot::channel();
    requests
        .send((request, tx))
        .await
        .map_err(|_| SessionError::Closed)?;
    rx.await.map_err(|_| SessionError::Closed)
}

/// Everything that lives for one page load
pub struct PageSession {
    host: Arc<dyn PageHost>,
    assembler: Arc<ManifestAssembler>,
    controller: Arc<RebuildController>,
    scheduler: PersistenceScheduler,
    live_feed: Option<JoinHandle<()>>,
    startup: Option<JoinHandle<RebuildOutcome>>,
}

impl PageSession {
    /// Wire up a session without starting anything
    pub fn new(
        host: Arc<dyn PageHost>,
        fetcher: Arc<dyn Fetcher>,
        store: Arc<dyn ManifestStore>,
        debounce: Duration,
    ) -> Self {
        let assembler = Arc::new(ManifestAssembler::new(host.location().clone(), fetcher));
        let scheduler = PersistenceScheduler::new(store, debounce);
        let controller = Arc::new(RebuildController::new(
            Arc::clone(&assembler),
            Arc::clone(&host),
            scheduler.clone(),
        ));

        Self {
            host,
            assembler,
            controller,
            scheduler,
            live_feed: None,
            startup: None,
        }
    }

    /// Wire up a session, kick off the startup rebuild and subscribe to the live feed
    pub fn start(
        host: Arc<dyn PageHost>,
        fetcher: Arc<dyn Fetcher>,
        store: Arc<dyn ManifestStore>,
        debounce: Duration,
    ) -> Self {
        let mut session = Self::new(host, fetcher, store, debounce);

        let controller = Arc::clone(&session.controller);
        session.startup = Some(tokio::spawn(async move { controller.rebuild().await }));
        session.start_live_feed();

        session
    }

    /// Subscribe to the host's live feed; only the first call has any effect
    pub fn start_live_feed(&mut self) -> bool {
        if self.live_feed.is_none() {
            self.live_feed = start_live_feed(
                Arc::clone(&self.assembler),
                self.host.as_ref(),
                self.scheduler.clone(),
            );
        }
        self.live_feed.is_some()
    }

    /// Wait for the startup rebuild, if one was started and not yet awaited
    pub async fn wait_startup(&mut self) -> Option<RebuildOutcome> {
        let handle = self.startup.take()?;
        match handle.await {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                warn!("Startup rebuild task failed: {}", e);
                None
            }
        }
    }

    /// Wait until the host closes its live feed
    pub async fn wait_live_feed(&mut self) {
        if let Some(handle) = self.live_feed.take() {
            if let Err(e) = handle.await {
                warn!("Live feed task failed: {}", e);
            }
        }
    }

    /// Run a full rebuild now
    pub async fn rebuild(&self) -> RebuildOutcome {
        self.controller.rebuild().await
    }

    /// Snapshot of the in-memory current manifest
    pub fn current_manifest(&self) -> Option<Manifest> {
        self.assembler.current().map(|m| snapshot(&m))
    }

    pub fn assembler(&self) -> &Arc<ManifestAssembler> {
        &self.assembler
    }

    pub fn scheduler(&self) -> &PersistenceScheduler {
        &self.scheduler
    }

    /// Handler for the inbound request channel
    pub fn handler(&self) -> RequestHandler {
        RequestHandler {
            assembler: Arc::clone(&self.assembler),
            controller: Arc::clone(&self.controller),
        }
    }

    /// Write any batched update that is still waiting for its window
    pub async fn flush(&self) -> bool {
        self.scheduler.flush().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_wire_format() {
        assert_eq!(
            serde_json::to_string(&Request::RebuildManifest).unwrap(),
            r#"{"action":"rebuildManifest"}"#
        );
        assert_eq!(
            serde_json::from_str::<Request>(r#"{"action":"getManifest"}"#).unwrap(),
            Request::GetManifest
        );
        assert!(serde_json::from_str::<Request>(r#"{"action":"explode"}"#).is_err());
    }

    #[test]
    fn test_response_wire_format() {
        assert_eq!(
            serde_json::to_string(&Response::Rebuilt { success: true }).unwrap(),
            r#"{"success":true}"#
        );
        assert_eq!(
            serde_json::to_string(&Response::Manifest { manifest: None }).unwrap(),
            r#"{"manifest":null}"#
        );

        let error: Response = serde_json::from_str(r#"{"error":"bad"}"#).unwrap();
        assert_eq!(error, Response::Error { error: "bad".to_string() });
        let empty: Response = serde_json::from_str(r#"{"manifest":null}"#).unwrap();
        assert_eq!(empty, Response::Manifest { manifest: None });
    }
}
