// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Audit sink trait and bundled sink implementations.
//!
//! A sink receives finished [`AccessLogEntry`] records from the pipeline.
//! Sinks are expected to be cheap to call; anything slow should buffer
//! internally. A failing sink degrades to a warning, never to a failed
//! request.

use crate::error::AuditSinkError;
use crate::event::AccessLogEntry;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Destination for audit entries.
#[async_trait]
pub trait AuditSink: Send + Sync {
	/// Short identifier used in pipeline warnings.
	fn name(&self) -> &str;

	/// Deliver one entry to the sink's destination.
	async fn publish(&self, entry: Arc<AccessLogEntry>) -> Result<(), AuditSinkError>;
}

/// Sink that emits each entry as a structured `tracing` event.
///
/// Decision events land at the level implied by their audit severity, so an
/// operator tailing logs sees denials as warnings without any extra wiring.
#[derive(Debug, Default)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
	fn name(&self) -> &str {
		"tracing"
	}

	async fn publish(&self, entry: Arc<AccessLogEntry>) -> Result<(), AuditSinkError> {
		use crate::event::AuditSeverity;

		let reason = entry.reason.as_deref().unwrap_or("");
		let application = entry.application_id.as_deref().unwrap_or("");
		match entry.severity {
			AuditSeverity::Warning | AuditSeverity::Error | AuditSeverity::Critical => {
				tracing::warn!(
					event = %entry.event_type,
					application = %application,
					reason = %reason,
					details = %entry.details,
					"access audit event"
				);
			}
			_ => {
				tracing::info!(
					event = %entry.event_type,
					application = %application,
					reason = %reason,
					"access audit event"
				);
			}
		}
		Ok(())
	}
}

/// Sink that captures entries in memory. Intended for tests.
#[derive(Debug, Default)]
pub struct MemorySink {
	entries: Mutex<Vec<Arc<AccessLogEntry>>>,
}

impl MemorySink {
	pub fn new() -> Self {
		Self::default()
	}

	/// Snapshot of everything captured so far.
	pub async fn entries(&self) -> Vec<Arc<AccessLogEntry>> {
		self.entries.lock().await.clone()
	}
}

#[async_trait]
impl AuditSink for MemorySink {
	fn name(&self) -> &str {
		"memory"
	}

	async fn publish(&self, entry: Arc<AccessLogEntry>) -> Result<(), AuditSinkError> {
		self.entries.lock().await.push(entry);
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::event::AccessEventType;

	#[tokio::test]
	async fn memory_sink_captures_entries() {
		let sink = MemorySink::new();
		let entry = Arc::new(
			AccessLogEntry::builder(AccessEventType::AccessDenied)
				.reason("no_matching_policy")
				.build(),
		);

		sink.publish(Arc::clone(&entry)).await.unwrap();

		let captured = sink.entries().await;
		assert_eq!(captured.len(), 1);
		assert_eq!(captured[0].id, entry.id);
	}

	#[tokio::test]
	async fn tracing_sink_accepts_all_severities() {
		let sink = TracingAuditSink;
		for event_type in [
			AccessEventType::AccessGranted,
			AccessEventType::AccessDenied,
			AccessEventType::SessionRevoked,
		] {
			let entry = Arc::new(AccessLogEntry::builder(event_type).build());
			sink.publish(entry).await.unwrap();
		}
	}
}
