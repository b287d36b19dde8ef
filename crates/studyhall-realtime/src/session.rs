//! Session controller: owns at most one live gateway session.
//!
//! A single background task serializes every session-lifecycle decision:
//! opening a session for the latest channel set, reading its frames,
//! retrying with backoff after abnormal closes, and giving up once the
//! attempt ceiling is reached. Callers talk to it through commands; a
//! command arriving while a dial or backoff wait is in flight supersedes
//! that work.

use crate::bus::EventBus;
use crate::channel::ChannelSet;
use crate::config::RealtimeConfig;
use crate::dispatch::{self, FrameOutcome};
use crate::fault::FaultSink;
use crate::reconnect::ReconnectState;
use crate::transport::{Reachability, SessionStream, SessionTransport};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Commands accepted by the session task.
pub(crate) enum SessionCommand {
    /// Registry-driven refresh with the latest aggregate channel set.
    /// Clears the failure memory and supersedes any in-flight attempt.
    Refresh { channels: ChannelSet },
    /// Tear down the live session and exit the task.
    Shutdown,
}

/// Handle to the session task.
pub(crate) struct SessionHandle {
    cmd_tx: mpsc::Sender<SessionCommand>,
    connected: Arc<AtomicBool>,
}

impl SessionHandle {
    /// Ask the task to re-establish the session for `channels`.
    pub(crate) async fn refresh(&self, channels: ChannelSet) -> bool {
        self.cmd_tx
            .send(SessionCommand::Refresh { channels })
            .await
            .is_ok()
    }

    /// Whether a session is currently live.
    pub(crate) fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Tear down the session and end the task.
    pub(crate) async fn shutdown(&self) {
        let _ = self.cmd_tx.send(SessionCommand::Shutdown).await;
    }

    /// Fire-and-forget shutdown, for use from `Drop`.
    pub(crate) fn shutdown_nowait(&self) {
        let _ = self.cmd_tx.try_send(SessionCommand::Shutdown);
    }
}

/// Everything the session task needs, bundled for `spawn`.
pub(crate) struct SessionParts {
    pub transport: Arc<dyn SessionTransport>,
    pub reachability: Arc<dyn Reachability>,
    pub faults: Arc<dyn FaultSink>,
    pub config: RealtimeConfig,
    pub bus: EventBus,
    pub attempts: Arc<ReconnectState>,
    pub sessions_opened: Arc<AtomicU64>,
}

/// Spawn the session task. Must be called within a Tokio runtime.
pub(crate) fn spawn(parts: SessionParts) -> SessionHandle {
    let (cmd_tx, cmd_rx) = mpsc::channel(16);
    let connected = Arc::new(AtomicBool::new(false));
    let task_connected = connected.clone();

    tokio::spawn(async move {
        session_task(parts, cmd_rx, task_connected).await;
    });

    SessionHandle { cmd_tx, connected }
}

async fn session_task(
    parts: SessionParts,
    mut cmd_rx: mpsc::Receiver<SessionCommand>,
    connected: Arc<AtomicBool>,
) {
    let SessionParts {
        transport,
        reachability,
        faults,
        config,
        bus,
        attempts,
        sessions_opened,
    } = parts;

    // Channel set the next (or current) session should listen on.
    let mut desired = ChannelSet::new();
    // The live session, when one exists.
    let mut stream: Option<Box<dyn SessionStream>> = None;
    // Set when retries are exhausted or a fatal transport error occurred.
    // Only a registry-driven refresh clears it.
    let mut halted = false;
    // Whether the next dial owes the backoff delay.
    let mut retrying = false;
    // Fencing token: a dialed session may only install itself while the
    // generation it was opened under is still current.
    let mut generation: u64 = 0;

    loop {
        if let Some(mut active) = stream.take() {
            tokio::select! {
                cmd = cmd_rx.recv() => match cmd {
                    Some(SessionCommand::Refresh { channels }) => {
                        debug!(channels = channels.len(), "refresh supersedes live session");
                        active.close().await;
                        connected.store(false, Ordering::SeqCst);
                        generation += 1;
                        attempts.reset();
                        halted = false;
                        retrying = false;
                        desired = channels;
                    }
                    Some(SessionCommand::Shutdown) | None => {
                        active.close().await;
                        connected.store(false, Ordering::SeqCst);
                        return;
                    }
                },
                frame = active.next_frame() => {
                    match dispatch::handle_frame(frame, &bus, faults.as_ref(), &attempts) {
                        FrameOutcome::Continue => stream = Some(active),
                        FrameOutcome::Disconnected(reason) => {
                            info!(%reason, "realtime session lost");
                            connected.store(false, Ordering::SeqCst);
                            retrying = true;
                        }
                    }
                }
            }
        } else if desired.is_empty() || halted {
            match cmd_rx.recv().await {
                Some(SessionCommand::Refresh { channels }) => {
                    generation += 1;
                    attempts.reset();
                    halted = false;
                    retrying = false;
                    desired = channels;
                }
                Some(SessionCommand::Shutdown) | None => return,
            }
        } else if retrying {
            let attempt = attempts.record_failure();
            if attempt > config.max_attempts {
                warn!(
                    attempt,
                    ceiling = config.max_attempts,
                    "reconnect ceiling reached, giving up until the subscription set changes"
                );
                halted = true;
                retrying = false;
                continue;
            }

            let delay = config.backoff.delay_for(attempt);
            debug!(attempt, delay_ms = delay.as_millis() as u64, "waiting before reconnect");
            tokio::select! {
                cmd = cmd_rx.recv() => match cmd {
                    Some(SessionCommand::Refresh { channels }) => {
                        generation += 1;
                        attempts.reset();
                        halted = false;
                        retrying = false;
                        desired = channels;
                    }
                    Some(SessionCommand::Shutdown) | None => return,
                },
                _ = tokio::time::sleep(delay) => {
                    retrying = false;
                }
            }
        } else {
            generation += 1;
            let opened_under = generation;
            debug!(channels = desired.len(), generation, "opening realtime session");

            let dial = {
                let transport = transport.clone();
                let reachability = reachability.clone();
                let channels = desired.clone();
                async move {
                    reachability.wait_until_reachable().await;
                    transport.open(&channels).await
                }
            };

            tokio::select! {
                cmd = cmd_rx.recv() => match cmd {
                    // Dropping the dial future abandons the in-flight attempt.
                    Some(SessionCommand::Refresh { channels }) => {
                        debug!("refresh supersedes in-flight dial");
                        generation += 1;
                        attempts.reset();
                        halted = false;
                        retrying = false;
                        desired = channels;
                    }
                    Some(SessionCommand::Shutdown) | None => return,
                },
                result = dial => match result {
                    Ok(session) => {
                        if opened_under == generation {
                            info!(channels = desired.len(), "realtime session established");
                            sessions_opened.fetch_add(1, Ordering::Relaxed);
                            connected.store(true, Ordering::SeqCst);
                            stream = Some(session);
                        } else {
                            // A superseded attempt may not install itself as
                            // the live session.
                            debug!("discarding session from a superseded dial");
                        }
                    }
                    Err(error) if error.is_retriable() => {
                        faults.transport_failure(&error);
                        retrying = true;
                    }
                    Err(error) => {
                        warn!(%error, "fatal transport failure, closing down");
                        faults.transport_failure(&error);
                        halted = true;
                    }
                },
            }
        }
    }
}
