// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Continuation transport: how the controller hands messages back to the
//! hosting runtime.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use thiserror::Error;

/// Delivery failure. Never tears the loop down; the cycle retries on the
/// next qualifying event.
#[derive(Debug, Error)]
#[error("continuation send failed: {0}")]
pub struct TransportError(pub String);

/// Sink for continuation and terminal messages.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send_continuation(
        &self,
        report_title: &str,
        message: &str,
    ) -> Result<(), TransportError>;
}

/// In-memory transport that records every send. Used by tests and by
/// embedders that only want to observe the loop.
#[derive(Clone, Default)]
pub struct RecordingTransport {
    sent: Arc<Mutex<Vec<(String, String)>>>,
    fail_next: Arc<Mutex<bool>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// All (report, message) pairs sent so far.
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().clone()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().len()
    }

    /// Make the next send fail (for send-failure tests).
    pub fn fail_next(&self) {
        *self.fail_next.lock() = true;
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send_continuation(
        &self,
        report_title: &str,
        message: &str,
    ) -> Result<(), TransportError> {
        if std::mem::take(&mut *self.fail_next.lock()) {
            return Err(TransportError("simulated transport failure".to_string()));
        }
        self.sent.lock().push((report_title.to_string(), message.to_string()));
        Ok(())
    }
}
