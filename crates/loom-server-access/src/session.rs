// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Session issuance and validation.
//!
//! A granted decision mints an opaque bearer token of 32 random bytes,
//! hex-encoded. The session table is keyed by the SHA-256 of the token, so
//! the table itself never holds a usable bearer value. Validation consults
//! the revocation mark before the expiry check: a revoked session reports
//! `Revoked` even after its TTL has also passed.
//!
//! Expiry is computed at issuance as
//! `issued_at + min(requested, application.max_session_duration)` and is
//! never extended afterwards.

use chrono::{DateTime, Utc};
use loom_access_core::{Application, ApplicationId, PolicyId, SessionId};
use parking_lot::RwLock;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use tracing::{debug, instrument};

/// How the subject behind a session authenticated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
	/// A human identity satisfied a policy.
	Identity,
	/// A machine credential satisfied a policy.
	ServiceToken,
}

impl fmt::Display for AuthMethod {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			AuthMethod::Identity => write!(f, "identity"),
			AuthMethod::ServiceToken => write!(f, "service_token"),
		}
	}
}

/// An issued session. Holds no bearer material; the token lives only with
/// the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
	pub id: SessionId,
	/// Email for identity sessions, token id for machine sessions.
	pub subject_ref: String,
	pub application_id: ApplicationId,
	pub issued_at: DateTime<Utc>,
	pub expires_at: DateTime<Utc>,
	pub auth_method: AuthMethod,
	/// The policy whose decision granted this session.
	pub matched_policy_id: Option<PolicyId>,
}

/// The opaque bearer token handed to the caller at issuance.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionToken(String);

impl SessionToken {
	pub fn as_str(&self) -> &str {
		&self.0
	}

	fn generate() -> Self {
		let mut bytes = [0u8; 32];
		OsRng.fill_bytes(&mut bytes);
		Self(hex::encode(bytes))
	}

	fn storage_key(token: &str) -> String {
		hex::encode(Sha256::digest(token.as_bytes()))
	}
}

impl fmt::Debug for SessionToken {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "SessionToken([REDACTED])")
	}
}

/// The outcome of validating a presented session token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStatus {
	Valid(Session),
	Expired,
	Revoked,
	NotFound,
}

struct SessionRecord {
	session: Session,
	revoked: bool,
}

/// In-memory session table keyed by token hash.
pub struct SessionManager {
	sessions: RwLock<HashMap<String, SessionRecord>>,
}

impl SessionManager {
	pub fn new() -> Self {
		Self {
			sessions: RwLock::new(HashMap::new()),
		}
	}

	/// Issues a session for a granted decision.
	///
	/// The requested duration is clamped to the application's
	/// `max_session_duration` ceiling.
	#[instrument(skip_all, fields(application_id = %application.id, auth_method = %auth_method))]
	pub fn issue(
		&self,
		subject_ref: impl Into<String>,
		application: &Application,
		auth_method: AuthMethod,
		matched_policy_id: Option<PolicyId>,
		requested: Duration,
	) -> (SessionToken, Session) {
		self.issue_at(
			subject_ref,
			application,
			auth_method,
			matched_policy_id,
			requested,
			Utc::now(),
		)
	}

	/// Issuance with an explicit clock, for deterministic expiry tests.
	pub fn issue_at(
		&self,
		subject_ref: impl Into<String>,
		application: &Application,
		auth_method: AuthMethod,
		matched_policy_id: Option<PolicyId>,
		requested: Duration,
		issued_at: DateTime<Utc>,
	) -> (SessionToken, Session) {
		let effective = requested.min(application.max_session_duration);
		let expires_at = chrono::Duration::from_std(effective)
			.ok()
			.and_then(|d| issued_at.checked_add_signed(d))
			.unwrap_or(DateTime::<Utc>::MAX_UTC);

		let session = Session {
			id: SessionId::generate(),
			subject_ref: subject_ref.into(),
			application_id: application.id,
			issued_at,
			expires_at,
			auth_method,
			matched_policy_id,
		};

		let token = SessionToken::generate();
		let key = SessionToken::storage_key(token.as_str());
		self.sessions.write().insert(
			key,
			SessionRecord {
				session: session.clone(),
				revoked: false,
			},
		);
		debug!(session_id = %session.id, expires_at = %session.expires_at, "session issued");
		(token, session)
	}

	/// Validates a presented bearer token.
	pub fn validate(&self, token: &str) -> SessionStatus {
		self.validate_at(token, Utc::now())
	}

	/// Validation with an explicit clock, for deterministic expiry tests.
	pub fn validate_at(&self, token: &str, now: DateTime<Utc>) -> SessionStatus {
		let key = SessionToken::storage_key(token);
		let sessions = self.sessions.read();
		let Some(record) = sessions.get(&key) else {
			return SessionStatus::NotFound;
		};
		// Revocation dominates expiry.
		if record.revoked {
			return SessionStatus::Revoked;
		}
		if now >= record.session.expires_at {
			return SessionStatus::Expired;
		}
		SessionStatus::Valid(record.session.clone())
	}

	/// Revokes the session behind a bearer token. Returns the session if one
	/// was newly revoked.
	#[instrument(skip(self, token))]
	pub fn revoke(&self, token: &str) -> Option<Session> {
		let key = SessionToken::storage_key(token);
		let mut sessions = self.sessions.write();
		let record = sessions.get_mut(&key)?;
		if record.revoked {
			return None;
		}
		record.revoked = true;
		debug!(session_id = %record.session.id, "session revoked");
		Some(record.session.clone())
	}

	/// Drops expired records from the table. Revoked-but-unexpired records
	/// are kept so revocation stays observable.
	pub fn purge_expired(&self) -> usize {
		self.purge_expired_at(Utc::now())
	}

	pub fn purge_expired_at(&self, now: DateTime<Utc>) -> usize {
		let mut sessions = self.sessions.write();
		let before = sessions.len();
		sessions.retain(|_, record| now < record.session.expires_at);
		before - sessions.len()
	}
}

impl Default for SessionManager {
	fn default() -> Self {
		Self::new()
	}
}
