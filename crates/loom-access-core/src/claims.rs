// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Verified request claims.
//!
//! [`Claims`] is the ephemeral input to policy evaluation. It is produced by
//! the credential validator from an upstream identity step's already-verified
//! output; the engine trusts its authenticity and performs no signature
//! checks of its own.
//!
//! # Design Principles
//!
//! 1. **Immutable evaluation**: all attributes are computed before policy
//!    evaluation
//! 2. **No I/O**: rule predicates over claims are pure; all data is pre-loaded
//! 3. **Explicit attributes**: every relevant fact is an explicit field

use crate::types::{LoginMethod, ServiceTokenId};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// Attributes describing the already-verified identity or machine credential
/// behind a request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
	/// The verified email address of a human subject, if identity auth.
	pub subject_email: Option<String>,
	/// The email domain, lower-cased. Derived from `subject_email` when not
	/// supplied explicitly.
	pub email_domain: Option<String>,
	/// How the identity was established upstream.
	pub login_method: Option<LoginMethod>,
	/// The validated machine credential id, if machine auth. Only ever set
	/// after the presented secret verified against a live token record.
	pub service_token_id: Option<ServiceTokenId>,
	/// Source address of the request.
	pub source_ip: Option<IpAddr>,
}

impl Claims {
	/// Creates an empty claims object.
	pub fn new() -> Self {
		Self::default()
	}

	/// Builder: set the verified subject email.
	pub fn with_subject_email(mut self, email: impl Into<String>) -> Self {
		self.subject_email = Some(email.into());
		self
	}

	/// Builder: set the email domain explicitly.
	pub fn with_email_domain(mut self, domain: impl Into<String>) -> Self {
		self.email_domain = Some(domain.into());
		self
	}

	/// Builder: set the login method.
	pub fn with_login_method(mut self, method: impl Into<LoginMethod>) -> Self {
		self.login_method = Some(method.into());
		self
	}

	/// Builder: set the validated service token id.
	pub fn with_service_token(mut self, token_id: impl Into<ServiceTokenId>) -> Self {
		self.service_token_id = Some(token_id.into());
		self
	}

	/// Builder: set the source IP.
	pub fn with_source_ip(mut self, ip: IpAddr) -> Self {
		self.source_ip = Some(ip);
		self
	}

	/// The effective email domain for rule matching, lower-cased.
	///
	/// Falls back to the domain part of `subject_email` when no explicit
	/// domain claim was supplied.
	pub fn effective_email_domain(&self) -> Option<String> {
		if let Some(domain) = &self.email_domain {
			return Some(domain.to_ascii_lowercase());
		}
		self
			.subject_email
			.as_deref()
			.and_then(|email| email.rsplit_once('@'))
			.map(|(_, domain)| domain.to_ascii_lowercase())
	}

	/// Returns true if these claims carry a validated machine credential.
	pub fn is_machine(&self) -> bool {
		self.service_token_id.is_some()
	}
}
