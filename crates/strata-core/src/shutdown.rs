// SPDX-License-Identifier: CEPL-1.0
//! Request/acknowledge handshake between whoever wants the process to stop and
//! the thread that owns the GPU.
//!
//! The frame-driving thread holds a [`ShutdownListener`]; it checks for a stop
//! request between ticks, tears everything down, then acknowledges. The other
//! side holds a [`ShutdownHandle`] and blocks on the acknowledgment before the
//! process exits.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TryRecvError, TrySendError};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Both channels hold at most two pending messages.
pub const HANDSHAKE_CAPACITY: usize = 2;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ShutdownError {
    #[error("shutdown peer disconnected before acknowledging")]
    Disconnected,
    #[error("no shutdown acknowledgment within {0:?}")]
    AckTimeout(Duration),
}

/// Requesting side of the handshake.
#[derive(Debug)]
pub struct ShutdownHandle {
    request: SyncSender<()>,
    ack: Receiver<()>,
}

/// Frame-thread side of the handshake.
#[derive(Debug)]
pub struct ShutdownListener {
    request_tx: SyncSender<()>,
    request_rx: Receiver<()>,
    ack: SyncSender<()>,
}

pub fn shutdown_channel() -> (ShutdownHandle, ShutdownListener) {
    let (request_tx, request_rx) = mpsc::sync_channel(HANDSHAKE_CAPACITY);
    let (ack_tx, ack_rx) = mpsc::sync_channel(HANDSHAKE_CAPACITY);
    (
        ShutdownHandle {
            request: request_tx.clone(),
            ack: ack_rx,
        },
        ShutdownListener {
            request_tx,
            request_rx,
            ack: ack_tx,
        },
    )
}

// A full channel already carries a pending request, so dropping the extra one is fine.
fn post(tx: &SyncSender<()>) {
    match tx.try_send(()) {
        Ok(()) | Err(TrySendError::Full(())) => {}
        Err(TrySendError::Disconnected(())) => debug!("shutdown request after peer dropped"),
    }
}

impl ShutdownHandle {
    pub fn request(&self) {
        post(&self.request);
    }

    /// Blocks until the frame thread confirms teardown.
    pub fn wait_ack(&self, timeout: Duration) -> Result<(), ShutdownError> {
        match self.ack.recv_timeout(timeout) {
            Ok(()) => Ok(()),
            Err(RecvTimeoutError::Timeout) => Err(ShutdownError::AckTimeout(timeout)),
            Err(RecvTimeoutError::Disconnected) => Err(ShutdownError::Disconnected),
        }
    }

    /// Non-blocking check used after the frame thread has already returned.
    pub fn try_ack(&self) -> Result<(), ShutdownError> {
        match self.ack.try_recv() {
            Ok(()) => Ok(()),
            Err(TryRecvError::Empty) => Err(ShutdownError::AckTimeout(Duration::ZERO)),
            Err(TryRecvError::Disconnected) => Err(ShutdownError::Disconnected),
        }
    }
}

impl ShutdownListener {
    /// Lets the frame thread ask itself to stop (e.g. the window was closed).
    pub fn request(&self) {
        post(&self.request_tx);
    }

    /// Only consulted between ticks; never interrupts a GPU wait.
    pub fn stop_requested(&self) -> bool {
        match self.request_rx.try_recv() {
            Ok(()) => true,
            Err(TryRecvError::Empty) => false,
            // request_tx lives in self, so this arm is unreachable in practice
            Err(TryRecvError::Disconnected) => true,
        }
    }

    pub fn acknowledge(self) {
        if self.ack.try_send(()).is_err() {
            debug!("shutdown acknowledgment had no receiver");
        }
    }
}
