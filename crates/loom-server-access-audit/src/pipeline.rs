// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Non-blocking audit pipeline.
//!
//! The request path hands finished entries to [`AuditService::log`], which
//! enqueues onto a bounded channel and returns immediately. A background
//! task drains the queue and fans each entry out to every sink. The request
//! path therefore never waits on a sink, and a full queue drops the newest
//! entry rather than applying backpressure to request handling.

use std::sync::Arc;

use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{instrument, warn};

use crate::error::{AuditError, AuditResult};
use crate::event::AccessLogEntry;
use crate::sink::AuditSink;

pub struct AuditService {
	tx: mpsc::Sender<AccessLogEntry>,
}

impl AuditService {
	/// Spawns the background fan-out task and returns the service handle.
	pub fn new(queue_capacity: usize, sinks: Vec<Arc<dyn AuditSink>>) -> Self {
		let (tx, rx) = mpsc::channel(queue_capacity);

		tokio::spawn(Self::background_task(rx, sinks));

		Self { tx }
	}

	async fn background_task(
		mut rx: mpsc::Receiver<AccessLogEntry>,
		sinks: Vec<Arc<dyn AuditSink>>,
	) {
		while let Some(entry) = rx.recv().await {
			let event = Arc::new(entry);

			for sink in &sinks {
				let sink = Arc::clone(sink);
				let event = Arc::clone(&event);

				tokio::spawn(async move {
					if let Err(e) = sink.publish(event).await {
						warn!(sink = sink.name(), error = %e, "audit sink publish failed");
					}
				});
			}
		}
	}

	/// Log an audit event to the queue for processing.
	///
	/// Returns `true` if the event was successfully queued, `false` if it
	/// was dropped because the queue is full or the service has shut down.
	/// Never blocks.
	#[instrument(skip(self, entry), fields(event_type = %entry.event_type))]
	pub fn log(&self, entry: AccessLogEntry) -> bool {
		match self.tx.try_send(entry) {
			Ok(()) => true,
			Err(e) => {
				let reason = match e {
					TrySendError::Full(_) => AuditError::QueueFull,
					TrySendError::Closed(_) => AuditError::Shutdown,
				};
				warn!(error = %reason, "dropping audit entry");
				false
			}
		}
	}

	/// Log an audit event, waiting for queue space if necessary.
	///
	/// Used by publication paths where losing the record is worse than
	/// waiting; the request path uses [`log`](Self::log).
	pub async fn log_blocking(&self, entry: AccessLogEntry) -> AuditResult<()> {
		self.tx.send(entry).await.map_err(|_| AuditError::Shutdown)
	}
}
