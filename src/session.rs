//! The control loop of a native-messaging session.
//!
//! One task reads frames, decodes requests and dispatches them to the
//! [`WatcherRegistry`]. Responses are written only for `version` and
//! `directorySelect`; `start`, `stop` and `stopAll` are silent.

use std::sync::Arc;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::config::RuntimeConfig;
use crate::manifest::version_response;
use crate::picker::DirectoryPicker;
use crate::protocol::{FrameReader, FrameWriter, ProtocolError, Request, Response};
use crate::watcher::{ChangeSource, StartOutcome, StopOutcome, WatcherRegistry};

/// Why a session ended normally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The input stream was closed by the browser.
    StreamClosed,
    /// A one-shot `directorySelect` request was served.
    DirectorySelected,
}

/// Fatal session errors.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Transport error: {0}")]
    Transport(#[from] ProtocolError),

    #[error("Directory picker failed: {reason}")]
    Picker { reason: String },
}

enum Flow {
    Continue,
    Exit(SessionEnd),
}

/// A running host session over an input and output stream.
pub struct Session<R> {
    reader: FrameReader<R>,
    outbound: Arc<FrameWriter>,
    registry: WatcherRegistry,
    picker: Arc<dyn DirectoryPicker>,
    version: Response,
}

impl<R: AsyncRead + Unpin> Session<R> {
    pub fn new<W>(
        input: R,
        output: W,
        source: Arc<dyn ChangeSource>,
        picker: Arc<dyn DirectoryPicker>,
        runtime: &RuntimeConfig,
    ) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let outbound = Arc::new(FrameWriter::new(output));
        let registry = WatcherRegistry::new(
            source,
            Arc::clone(&outbound),
            runtime.watch_options(),
        );

        Self {
            reader: FrameReader::new(input),
            outbound,
            registry,
            picker,
            version: version_response(runtime),
        }
    }

    pub fn registry(&self) -> &WatcherRegistry {
        &self.registry
    }

    /// Serve requests until the input closes, a one-shot request finishes,
    /// or the transport fails. All watchers are closed before returning.
    pub async fn run(mut self) -> Result<SessionEnd, SessionError> {
        crate::debug_event!("session", "started");
        let result = self.serve().await;

        if !self.registry.is_empty() {
            let mut rules: Vec<&str> = self.registry.rule_ids().collect();
            rules.sort_unstable();
            crate::debug_event!("session", "closing watchers", "{}", rules.join(", "));
            self.registry.stop_all().await;
        }
        result
    }

    async fn serve(&mut self) -> Result<SessionEnd, SessionError> {
        loop {
            let Some(frame) = self.reader.read_frame().await? else {
                crate::log_event!("session", "input closed");
                return Ok(SessionEnd::StreamClosed);
            };

            let Some(request) = Request::decode(&frame) else {
                crate::failure_event!(
                    warn,
                    "session",
                    "ignored message without msgId",
                    "{}",
                    String::from_utf8_lossy(&frame)
                );
                continue;
            };

            crate::debug_event!("session", "request", "{request:?}");
            if let Flow::Exit(end) = self.dispatch(request).await? {
                return Ok(end);
            }
        }
    }

    async fn dispatch(&mut self, request: Request) -> Result<Flow, SessionError> {
        match request {
            Request::Version => {
                self.outbound.send(&self.version).await?;
            }

            Request::Start(start) => {
                let rule_id = start.rule_id.clone();
                match self.registry.start(start.into()) {
                    Ok(StartOutcome::Created) | Ok(StartOutcome::Shared { .. }) => {}
                    Err(e) => {
                        crate::failure_event!(error, "session", "cannot start rule", "'{rule_id}': {e}");
                    }
                }
            }

            Request::Stop { rule_id } => {
                if let StopOutcome::Unknown = self.registry.stop(&rule_id).await {
                    crate::debug_event!("session", "stop for unknown rule", "'{rule_id}'");
                }
            }

            Request::StopAll => {
                self.registry.stop_all().await;
            }

            Request::DirectorySelect { rule_id, directory } => {
                if !rule_id.is_empty() {
                    let picker = Arc::clone(&self.picker);
                    select_directory(picker, &self.outbound, rule_id, directory.unwrap_or_default())
                        .await?;
                }
                // Served by a dedicated helper instance of the host
                return Ok(Flow::Exit(SessionEnd::DirectorySelected));
            }

            Request::Unknown(msg_id) => {
                crate::debug_event!("session", "unknown msgId", "'{msg_id}'");
            }
        }

        Ok(Flow::Continue)
    }
}

/// Ask the picker for a directory and report it for `rule_id`.
async fn select_directory(
    picker: Arc<dyn DirectoryPicker>,
    outbound: &FrameWriter,
    rule_id: String,
    initial: String,
) -> Result<(), SessionError> {
    crate::log_event!("session", "opening directory selector", "{initial}");

    let selected = tokio::task::spawn_blocking(move || picker.select_folder(&initial))
        .await
        .map_err(|e| SessionError::Picker {
            reason: e.to_string(),
        })?;

    let Some(directory) = selected.filter(|dir| !dir.as_os_str().is_empty()) else {
        crate::debug_event!("session", "directory selection cancelled");
        return Ok(());
    };

    let response = Response::DirectorySelect {
        rule_id,
        directory: directory.to_string_lossy().into_owned(),
    };
    outbound.send(&response).await?;
    Ok(())
}
