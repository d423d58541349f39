// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Service-token registry and credential validation.
//!
//! Machine credentials are (client id, client secret) pairs. The registry
//! stores only the Argon2 PHC hash of each secret; the plaintext is returned
//! exactly once at mint time and never persisted or logged. Several token
//! records may be live under one [`ServiceTokenId`] at once, which is how
//! rotation overlap works: mint the replacement, roll clients over, then
//! revoke the old record.
//!
//! Externally every validation failure is the same [`CredentialError`]. The
//! distinction between unknown id, revoked, expired, and secret mismatch is
//! kept only as internal detail for audit, so callers cannot probe which
//! token ids exist.

use crate::argon2_config::argon2_instance;
use argon2::password_hash::rand_core::{OsRng, RngCore};
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use chrono::{DateTime, Utc};
use loom_access_core::{Claims, ServiceTokenId};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use tracing::{debug, instrument, warn};
use zeroize::Zeroizing;

/// One minted secret record. A token id maps to one or more of these.
#[derive(Debug, Clone)]
struct ServiceTokenRecord {
	/// Argon2 PHC string of the secret.
	secret_hash: String,
	issued_at: DateTime<Utc>,
	expires_at: Option<DateTime<Utc>>,
	revoked: bool,
}

impl ServiceTokenRecord {
	fn is_active(&self, now: DateTime<Utc>) -> bool {
		!self.revoked && self.expires_at.map_or(true, |expiry| now < expiry)
	}
}

/// Why a presented credential failed, for internal audit detail only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CredentialFailure {
	UnknownToken,
	Revoked,
	Expired,
	SecretMismatch,
}

impl fmt::Display for CredentialFailure {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let s = match self {
			CredentialFailure::UnknownToken => "unknown_token",
			CredentialFailure::Revoked => "revoked",
			CredentialFailure::Expired => "expired",
			CredentialFailure::SecretMismatch => "secret_mismatch",
		};
		write!(f, "{s}")
	}
}

/// The single externally visible credential failure.
///
/// Deliberately carries no variant information in its `Display`; the
/// internal failure mode travels separately into audit detail.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("credential_invalid")]
pub struct CredentialError {
	pub(crate) detail: &'static str,
}

impl CredentialError {
	fn from_failure(failure: CredentialFailure) -> Self {
		let detail = match failure {
			CredentialFailure::UnknownToken => "unknown_token",
			CredentialFailure::Revoked => "revoked",
			CredentialFailure::Expired => "expired",
			CredentialFailure::SecretMismatch => "secret_mismatch",
		};
		Self { detail }
	}

	/// Internal failure detail. Audit-only; never part of the external
	/// decision surface.
	pub(crate) fn detail(&self) -> &'static str {
		self.detail
	}
}

/// In-memory registry of minted service tokens.
pub struct ServiceTokenRegistry {
	records: RwLock<HashMap<ServiceTokenId, Vec<ServiceTokenRecord>>>,
}

impl ServiceTokenRegistry {
	pub fn new() -> Self {
		Self {
			records: RwLock::new(HashMap::new()),
		}
	}

	/// Mints a new secret under the given token id and returns the plaintext
	/// exactly once.
	///
	/// Minting under an id that already has live records begins a rotation
	/// overlap: all active records validate until revoked or expired.
	#[instrument(skip(self, expires_in), fields(token_id = %token_id))]
	pub fn mint(
		&self,
		token_id: ServiceTokenId,
		expires_in: Option<Duration>,
	) -> Result<Zeroizing<String>, argon2::password_hash::Error> {
		let mut secret_bytes = Zeroizing::new([0u8; 32]);
		OsRng.fill_bytes(secret_bytes.as_mut());
		let secret = Zeroizing::new(hex::encode(secret_bytes.as_ref()));

		let salt = SaltString::generate(&mut OsRng);
		let secret_hash = argon2_instance()
			.hash_password(secret.as_bytes(), &salt)?
			.to_string();

		let issued_at = Utc::now();
		let expires_at = expires_in.and_then(|d| {
			chrono::Duration::from_std(d)
				.ok()
				.and_then(|d| issued_at.checked_add_signed(d))
		});

		let record = ServiceTokenRecord {
			secret_hash,
			issued_at,
			expires_at,
			revoked: false,
		};
		let overlap = {
			let mut records = self.records.write();
			let entry = records.entry(token_id.clone()).or_default();
			entry.push(record);
			entry.len()
		};
		debug!(records = overlap, "service token minted");
		Ok(secret)
	}

	/// Verifies a presented secret against every active record for the id.
	///
	/// Candidate hashes are cloned out of the lock so no lock is held across
	/// Argon2 verification.
	pub(crate) fn verify_detailed(
		&self,
		token_id: &ServiceTokenId,
		secret: &str,
	) -> Result<(), CredentialFailure> {
		let now = Utc::now();
		let candidates: Vec<ServiceTokenRecord> = {
			let records = self.records.read();
			match records.get(token_id) {
				Some(entries) => entries.clone(),
				None => return Err(CredentialFailure::UnknownToken),
			}
		};

		// Failure detail reflects the most recoverable state seen: an active
		// record mismatching beats expired beats revoked.
		let mut failure = CredentialFailure::UnknownToken;
		for record in &candidates {
			if record.revoked {
				if failure == CredentialFailure::UnknownToken {
					failure = CredentialFailure::Revoked;
				}
				continue;
			}
			if !record.is_active(now) {
				if failure != CredentialFailure::SecretMismatch {
					failure = CredentialFailure::Expired;
				}
				continue;
			}
			let Ok(parsed) = PasswordHash::new(&record.secret_hash) else {
				warn!(token_id = %token_id, "stored secret hash is not a valid PHC string");
				continue;
			};
			if argon2_instance()
				.verify_password(secret.as_bytes(), &parsed)
				.is_ok()
			{
				return Ok(());
			}
			failure = CredentialFailure::SecretMismatch;
		}
		Err(failure)
	}

	/// Returns true if the presented secret matches any active record.
	pub fn verify(&self, token_id: &ServiceTokenId, secret: &str) -> bool {
		self.verify_detailed(token_id, secret).is_ok()
	}

	/// Revokes records under the id, returning how many were newly revoked.
	///
	/// With `issued_before` set, only records issued strictly before that
	/// instant are revoked; this is the rotation endgame where the fresh
	/// record survives.
	#[instrument(skip(self), fields(token_id = %token_id))]
	pub fn revoke(
		&self,
		token_id: &ServiceTokenId,
		issued_before: Option<DateTime<Utc>>,
	) -> usize {
		let mut records = self.records.write();
		let Some(entries) = records.get_mut(token_id) else {
			return 0;
		};
		let mut revoked = 0;
		for record in entries.iter_mut() {
			if record.revoked {
				continue;
			}
			if issued_before.map_or(true, |cutoff| record.issued_at < cutoff) {
				record.revoked = true;
				revoked += 1;
			}
		}
		debug!(revoked, "service token records revoked");
		revoked
	}
}

impl Default for ServiceTokenRegistry {
	fn default() -> Self {
		Self::new()
	}
}

/// A machine credential as presented on the wire.
pub struct ServiceTokenCredential {
	pub client_id: ServiceTokenId,
	pub client_secret: Zeroizing<String>,
}

impl ServiceTokenCredential {
	pub fn new(client_id: impl Into<ServiceTokenId>, client_secret: impl Into<String>) -> Self {
		Self {
			client_id: client_id.into(),
			client_secret: Zeroizing::new(client_secret.into()),
		}
	}
}

impl fmt::Debug for ServiceTokenCredential {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ServiceTokenCredential")
			.field("client_id", &self.client_id)
			.field("client_secret", &"[REDACTED]")
			.finish()
	}
}

/// Upstream-verified attributes as presented to the engine, before
/// normalization into [`Claims`].
#[derive(Debug, Default)]
pub struct PresentedCredentials {
	pub subject_email: Option<String>,
	pub email_domain: Option<String>,
	pub login_method: Option<String>,
	pub service_token: Option<ServiceTokenCredential>,
	pub source_ip: Option<std::net::IpAddr>,
}

impl PresentedCredentials {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_subject_email(mut self, email: impl Into<String>) -> Self {
		self.subject_email = Some(email.into());
		self
	}

	pub fn with_email_domain(mut self, domain: impl Into<String>) -> Self {
		self.email_domain = Some(domain.into());
		self
	}

	pub fn with_login_method(mut self, method: impl Into<String>) -> Self {
		self.login_method = Some(method.into());
		self
	}

	pub fn with_service_token(mut self, credential: ServiceTokenCredential) -> Self {
		self.service_token = Some(credential);
		self
	}

	pub fn with_source_ip(mut self, ip: std::net::IpAddr) -> Self {
		self.source_ip = Some(ip);
		self
	}
}

/// Normalizes presented credentials into evaluation-ready [`Claims`].
///
/// Identity attributes pass through with domains lower-cased; machine
/// credentials must verify against the registry before their token id is
/// allowed into the claims at all.
pub struct CredentialValidator {
	registry: std::sync::Arc<ServiceTokenRegistry>,
}

impl CredentialValidator {
	pub fn new(registry: std::sync::Arc<ServiceTokenRegistry>) -> Self {
		Self { registry }
	}

	/// The registry this validator verifies machine credentials against.
	pub fn registry(&self) -> &ServiceTokenRegistry {
		&self.registry
	}

	/// Produces claims from presented credentials, verifying any machine
	/// credential along the way.
	#[instrument(skip(self, presented))]
	pub fn normalize(&self, presented: &PresentedCredentials) -> Result<Claims, CredentialError> {
		let mut claims = Claims::new();

		if let Some(email) = &presented.subject_email {
			claims.subject_email = Some(email.clone());
		}
		if let Some(domain) = &presented.email_domain {
			claims.email_domain = Some(domain.to_ascii_lowercase());
		}
		if let Some(method) = &presented.login_method {
			claims.login_method = Some(method.as_str().into());
		}
		claims.source_ip = presented.source_ip;

		if let Some(credential) = &presented.service_token {
			match self
				.registry
				.verify_detailed(&credential.client_id, &credential.client_secret)
			{
				Ok(()) => {
					claims.service_token_id = Some(credential.client_id.clone());
				}
				Err(failure) => {
					debug!(
						token_id = %credential.client_id,
						failure = %failure,
						"machine credential rejected"
					);
					return Err(CredentialError::from_failure(failure));
				}
			}
		}

		Ok(claims)
	}
}
