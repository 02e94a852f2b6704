//! Strictly sequential audio playback queue.
//!
//! Chunks play one at a time in arrival order, never overlapping. The
//! "finished" condition is a three-way conjunction: the server signalled
//! end of utterance, the queue is drained, and nothing is mid-render.
//! Firing on anything less produces premature "done speaking" signals
//! while later chunks are still in flight.

use std::collections::VecDeque;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::decode::{PcmChunk, PcmSink};

enum QueueCmd {
    Chunk(PcmChunk),
    UtteranceStarted,
    UtteranceStopped,
    Clear,
}

/// Owner of the playback task.
pub struct PlaybackQueue {
    cmd_tx: mpsc::Sender<QueueCmd>,
    finished_rx: watch::Receiver<bool>,
    handle: JoinHandle<()>,
}

/// Cloneable command handle for feeding the queue from pump tasks while
/// the [`PlaybackQueue`] itself stays owned by the session.
#[derive(Clone)]
pub struct PlaybackHandle {
    cmd_tx: mpsc::Sender<QueueCmd>,
}

impl PlaybackHandle {
    pub fn enqueue(&self, chunk: PcmChunk) {
        if self.cmd_tx.try_send(QueueCmd::Chunk(chunk)).is_err() {
            warn!("playback queue saturated, dropping chunk");
        }
    }

    pub async fn utterance_started(&self) {
        let _ = self.cmd_tx.send(QueueCmd::UtteranceStarted).await;
    }

    pub async fn utterance_stopped(&self) {
        let _ = self.cmd_tx.send(QueueCmd::UtteranceStopped).await;
    }
}

impl PlaybackQueue {
    pub fn new(sink: Box<dyn PcmSink>) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(256);
        let (finished_tx, finished_rx) = watch::channel(false);

        let handle = tokio::spawn(run_queue(sink, cmd_rx, finished_tx));

        Self {
            cmd_tx,
            finished_rx,
            handle,
        }
    }

    /// Queues one decoded chunk. Chunks that arrive while the channel is
    /// saturated are dropped rather than backpressuring the read pump.
    pub fn enqueue(&self, chunk: PcmChunk) {
        if self.cmd_tx.try_send(QueueCmd::Chunk(chunk)).is_err() {
            warn!("playback queue saturated, dropping chunk");
        }
    }

    /// Marks the start of a server utterance; resets the finished flag.
    pub async fn utterance_started(&self) {
        let _ = self.cmd_tx.send(QueueCmd::UtteranceStarted).await;
    }

    /// Marks the end of a server utterance. Playback finishes once the
    /// queue drains after this.
    pub async fn utterance_stopped(&self) {
        let _ = self.cmd_tx.send(QueueCmd::UtteranceStopped).await;
    }

    /// Discards everything queued but not yet playing.
    pub async fn clear(&self) {
        let _ = self.cmd_tx.send(QueueCmd::Clear).await;
    }

    /// Watch channel carrying the "playback fully finished" condition.
    pub fn finished(&self) -> watch::Receiver<bool> {
        self.finished_rx.clone()
    }

    pub fn handle(&self) -> PlaybackHandle {
        PlaybackHandle {
            cmd_tx: self.cmd_tx.clone(),
        }
    }

    pub fn is_finished(&self) -> bool {
        *self.finished_rx.borrow()
    }
}

impl Drop for PlaybackQueue {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn run_queue(
    mut sink: Box<dyn PcmSink>,
    mut cmd_rx: mpsc::Receiver<QueueCmd>,
    finished_tx: watch::Sender<bool>,
) {
    let mut pending: VecDeque<PcmChunk> = VecDeque::new();
    let mut utterance_stopped = false;
    let mut in_flight: Option<tokio::task::JoinHandle<Box<dyn PcmSink>>> = None;

    loop {
        let finished = utterance_stopped && pending.is_empty() && in_flight.is_none();
        finished_tx.send_if_modified(|f| {
            if *f == finished {
                false
            } else {
                *f = finished;
                true
            }
        });

        if let Some(handle) = in_flight.as_mut() {
            tokio::select! {
                cmd = cmd_rx.recv() => {
                    let Some(cmd) = cmd else { break };
                    apply_cmd(cmd, &mut pending, &mut utterance_stopped);
                }
                result = handle => {
                    in_flight = None;
                    match result {
                        Ok(returned) => sink = returned,
                        Err(e) => {
                            warn!("playback sink task failed: {e}");
                            break;
                        }
                    }
                }
            }
        } else if let Some(chunk) = pending.pop_front() {
            // Sinks block until the chunk is audible-complete; run them
            // off the async threads.
            let mut owned = sink;
            sink = Box::new(NullSink);
            in_flight = Some(tokio::task::spawn_blocking(move || {
                owned.play(chunk);
                owned
            }));
        } else {
            match cmd_rx.recv().await {
                Some(cmd) => apply_cmd(cmd, &mut pending, &mut utterance_stopped),
                None => break,
            }
        }
    }

    debug!("playback queue stopped");
}

fn apply_cmd(cmd: QueueCmd, pending: &mut VecDeque<PcmChunk>, utterance_stopped: &mut bool) {
    match cmd {
        QueueCmd::Chunk(chunk) => pending.push_back(chunk),
        QueueCmd::UtteranceStarted => *utterance_stopped = false,
        QueueCmd::UtteranceStopped => *utterance_stopped = true,
        QueueCmd::Clear => pending.clear(),
    }
}

/// Placeholder occupying the sink slot while the real sink is rendering
/// on the blocking pool.
struct NullSink;

impl PcmSink for NullSink {
    fn play(&mut self, _chunk: PcmChunk) {}
}
