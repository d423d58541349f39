// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Core event types for access-decision audit logging.
//!
//! This module provides the foundational types for the audit system:
//!
//! - [`AccessEventType`]: Enumeration of all auditable events
//! - [`AuditSeverity`]: RFC 5424-compatible severity levels
//! - [`AccessLogEntry`]: Complete audit record for one decision or
//!   credential/session lifecycle event
//! - [`AccessLogBuilder`]: Fluent API for constructing entries

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use uuid::Uuid;

/// Types of events that can be recorded in the access audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessEventType {
	// Decision events
	AccessGranted,
	AccessDenied,

	// Session events
	SessionIssued,
	SessionRevoked,
	SessionExpired,

	// Credential events
	CredentialRejected,
	TokenMinted,
	TokenRevoked,

	// Policy publication events
	SnapshotPublished,
	SnapshotRejected,
}

impl fmt::Display for AccessEventType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let s = match self {
			AccessEventType::AccessGranted => "access_granted",
			AccessEventType::AccessDenied => "access_denied",
			AccessEventType::SessionIssued => "session_issued",
			AccessEventType::SessionRevoked => "session_revoked",
			AccessEventType::SessionExpired => "session_expired",
			AccessEventType::CredentialRejected => "credential_rejected",
			AccessEventType::TokenMinted => "token_minted",
			AccessEventType::TokenRevoked => "token_revoked",
			AccessEventType::SnapshotPublished => "snapshot_published",
			AccessEventType::SnapshotRejected => "snapshot_rejected",
		};
		write!(f, "{s}")
	}
}

impl AccessEventType {
	/// Returns the default severity for this event type.
	///
	/// Mapping follows RFC 5424 conventions:
	/// - `Info`: normal operations (grants, session/token issuance)
	/// - `Warning`: security-relevant refusals (denials, bad credentials,
	///   rejected snapshots)
	/// - `Notice`: administrative/destructive actions (revocations, expiry)
	pub fn default_severity(&self) -> AuditSeverity {
		match self {
			AccessEventType::AccessGranted
			| AccessEventType::SessionIssued
			| AccessEventType::TokenMinted
			| AccessEventType::SnapshotPublished => AuditSeverity::Info,

			AccessEventType::AccessDenied
			| AccessEventType::CredentialRejected
			| AccessEventType::SnapshotRejected => AuditSeverity::Warning,

			AccessEventType::SessionRevoked
			| AccessEventType::SessionExpired
			| AccessEventType::TokenRevoked => AuditSeverity::Notice,
		}
	}
}

/// Severity levels for audit events, compatible with RFC 5424 syslog.
///
/// The numeric values correspond to syslog severity codes, allowing direct
/// mapping when forwarding to syslog-based SIEM systems.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AuditSeverity {
	Debug = 7,
	#[default]
	Info = 6,
	Notice = 5,
	Warning = 4,
	Error = 3,
	Critical = 2,
}

impl AuditSeverity {
	/// Returns the RFC 5424 numeric severity code.
	pub fn as_syslog_code(&self) -> u8 {
		*self as u8
	}
}

impl PartialOrd for AuditSeverity {
	fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
		Some(self.cmp(other))
	}
}

impl Ord for AuditSeverity {
	fn cmp(&self, other: &Self) -> Ordering {
		// Lower numeric value = higher severity (Critical=2 > Debug=7)
		(*other as u8).cmp(&(*self as u8))
	}
}

impl fmt::Display for AuditSeverity {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let s = match self {
			AuditSeverity::Debug => "debug",
			AuditSeverity::Info => "info",
			AuditSeverity::Notice => "notice",
			AuditSeverity::Warning => "warning",
			AuditSeverity::Error => "error",
			AuditSeverity::Critical => "critical",
		};
		write!(f, "{s}")
	}
}

/// An entry in the audit log recording one access decision or lifecycle
/// event.
///
/// Entries carry references (ids, reason codes) and JSON detail; they never
/// carry secrets or bearer tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessLogEntry {
	/// Unique identifier for this audit entry.
	pub id: Uuid,
	/// When the event occurred.
	pub timestamp: DateTime<Utc>,
	/// The type of event.
	pub event_type: AccessEventType,
	/// The severity level of this event.
	pub severity: AuditSeverity,

	/// The application the request targeted.
	pub application_id: Option<String>,
	/// The subject the decision concerned (email or service token id).
	pub subject_ref: Option<String>,
	/// The policy that authorized or denied, if one applied.
	pub matched_policy_id: Option<String>,
	/// The decision's reason code.
	pub reason: Option<String>,
	/// IP address of the request origin.
	pub ip_address: Option<String>,
	/// Additional event-specific details. Internal-only failure detail
	/// (e.g. which way a credential was invalid) lives here and nowhere
	/// else.
	pub details: serde_json::Value,
}

impl AccessLogEntry {
	/// Create a new audit log builder for the given event type.
	pub fn builder(event_type: AccessEventType) -> AccessLogBuilder {
		AccessLogBuilder::new(event_type)
	}
}

/// Builder for constructing audit log entries with a fluent API.
#[derive(Debug, Clone)]
pub struct AccessLogBuilder {
	event_type: AccessEventType,
	severity: Option<AuditSeverity>,
	application_id: Option<String>,
	subject_ref: Option<String>,
	matched_policy_id: Option<String>,
	reason: Option<String>,
	ip_address: Option<String>,
	details: serde_json::Value,
}

impl AccessLogBuilder {
	/// Create a new builder for the given event type.
	pub fn new(event_type: AccessEventType) -> Self {
		Self {
			event_type,
			severity: None,
			application_id: None,
			subject_ref: None,
			matched_policy_id: None,
			reason: None,
			ip_address: None,
			details: serde_json::Value::Null,
		}
	}

	/// Set the severity level. Defaults to the event type's default severity.
	pub fn severity(mut self, severity: AuditSeverity) -> Self {
		self.severity = Some(severity);
		self
	}

	/// Set the application the request targeted.
	pub fn application(mut self, application_id: impl Into<String>) -> Self {
		self.application_id = Some(application_id.into());
		self
	}

	/// Set the subject the decision concerned.
	pub fn subject(mut self, subject_ref: impl Into<String>) -> Self {
		self.subject_ref = Some(subject_ref.into());
		self
	}

	/// Set the policy that authorized or denied.
	pub fn matched_policy(mut self, policy_id: impl Into<String>) -> Self {
		self.matched_policy_id = Some(policy_id.into());
		self
	}

	/// Set the decision's reason code.
	pub fn reason(mut self, reason: impl Into<String>) -> Self {
		self.reason = Some(reason.into());
		self
	}

	/// Set the IP address of the request origin.
	pub fn ip_address(mut self, ip: impl Into<String>) -> Self {
		self.ip_address = Some(ip.into());
		self
	}

	/// Set additional event-specific details.
	pub fn details(mut self, details: serde_json::Value) -> Self {
		self.details = details;
		self
	}

	/// Build the audit log entry.
	pub fn build(self) -> AccessLogEntry {
		AccessLogEntry {
			id: Uuid::new_v4(),
			timestamp: Utc::now(),
			event_type: self.event_type,
			severity: self
				.severity
				.unwrap_or_else(|| self.event_type.default_severity()),
			application_id: self.application_id,
			subject_ref: self.subject_ref,
			matched_policy_id: self.matched_policy_id,
			reason: self.reason,
			ip_address: self.ip_address,
			details: self.details,
		}
	}
}
