// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Core type definitions for the access policy decision engine.
//!
//! This module defines the foundational types used throughout the engine:
//!
//! - **ID newtypes**: Type-safe wrappers around UUIDs for different entity
//!   types ([`ApplicationId`], [`PolicyId`], [`SessionId`]) preventing
//!   accidental mixing
//! - [`ServiceTokenId`]: the opaque client id of a machine credential
//! - [`LoginMethod`]: how a human identity was established upstream
//! - [`Decision`]: the engine's verdict for a request
//! - [`ReasonCode`]: machine-readable explanation attached to every decision
//!
//! All ID types implement transparent serde serialization (as UUID strings)
//! and provide conversion to/from [`uuid::Uuid`].

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// =============================================================================
// ID Newtypes
// =============================================================================

macro_rules! define_id_type {
	($name:ident, $doc:expr) => {
		#[doc = $doc]
		#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
		#[serde(transparent)]
		pub struct $name(Uuid);

		impl $name {
			/// Create a new ID from a UUID.
			pub fn new(id: Uuid) -> Self {
				Self(id)
			}

			/// Generate a new random ID.
			pub fn generate() -> Self {
				Self(Uuid::new_v4())
			}

			/// Get the inner UUID value.
			pub fn into_inner(self) -> Uuid {
				self.0
			}

			/// Get a reference to the inner UUID.
			pub fn as_uuid(&self) -> &Uuid {
				&self.0
			}
		}

		impl fmt::Display for $name {
			fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
				write!(f, "{}", self.0)
			}
		}

		impl From<Uuid> for $name {
			fn from(id: Uuid) -> Self {
				Self(id)
			}
		}

		impl From<$name> for Uuid {
			fn from(id: $name) -> Self {
				id.0
			}
		}
	};
}

define_id_type!(ApplicationId, "Unique identifier for a protected application.");
define_id_type!(PolicyId, "Unique identifier for an access policy.");
define_id_type!(SessionId, "Unique identifier for an issued session.");

// =============================================================================
// Service Token Id
// =============================================================================

/// The opaque client id of a machine credential.
///
/// Several token records may share one id simultaneously: that is how
/// rotation overlap works. The id is chosen by provisioning tooling and is
/// matched verbatim by `ServiceTokenIs` rules.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServiceTokenId(String);

impl ServiceTokenId {
	pub fn new(id: impl Into<String>) -> Self {
		Self(id.into())
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl fmt::Display for ServiceTokenId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

impl From<&str> for ServiceTokenId {
	fn from(id: &str) -> Self {
		Self(id.to_string())
	}
}

impl From<String> for ServiceTokenId {
	fn from(id: String) -> Self {
		Self(id)
	}
}

// =============================================================================
// Login Method
// =============================================================================

/// How a human identity was established by the upstream identity step.
///
/// Compared exactly; identity providers are expected to emit stable method
/// names such as `otp`, `oidc`, or `saml`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LoginMethod(String);

impl LoginMethod {
	pub fn new(method: impl Into<String>) -> Self {
		Self(method.into())
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl fmt::Display for LoginMethod {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

impl From<&str> for LoginMethod {
	fn from(method: &str) -> Self {
		Self(method.to_string())
	}
}

impl From<String> for LoginMethod {
	fn from(method: String) -> Self {
		Self(method)
	}
}

// =============================================================================
// Decision
// =============================================================================

/// The engine's final verdict for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
	/// A human identity satisfied a policy; a session may be issued.
	Allow,
	/// Access is refused. Never overridden by a later-evaluated policy.
	Deny,
	/// A machine credential satisfied a policy; a session may be issued
	/// without a human identity attached.
	NonIdentityAllow,
}

impl Decision {
	/// Returns true if this decision permits a session to be issued.
	pub fn grants_access(&self) -> bool {
		matches!(self, Decision::Allow | Decision::NonIdentityAllow)
	}
}

impl fmt::Display for Decision {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Decision::Allow => write!(f, "allow"),
			Decision::Deny => write!(f, "deny"),
			Decision::NonIdentityAllow => write!(f, "non_identity_allow"),
		}
	}
}

// =============================================================================
// Reason Codes
// =============================================================================

/// Machine-readable explanation attached to every decision.
///
/// Reason codes are safe to surface to callers and audit sinks; they never
/// distinguish between the internal credential failure modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCode {
	/// A policy applied and its decision is the outcome.
	PolicyMatched,
	/// No policy in the application's sequence applied (default-deny).
	NoMatchingPolicy,
	/// The presented credential failed validation. Covers unknown, revoked,
	/// and expired tokens as well as secret mismatches.
	CredentialInvalid,
	/// Upstream claims verification timed out or was cancelled (fail-closed).
	IndeterminateClaims,
	/// The identity's login method is not allowed for this application.
	LoginMethodNotAllowed,
	/// No application with the requested id exists in the snapshot.
	UnknownApplication,
	/// The presented session has passed its expiry.
	SessionExpired,
	/// The presented session was explicitly revoked.
	SessionRevoked,
	/// The presented session is live; access continues under the policy
	/// that issued it.
	SessionValid,
}

impl fmt::Display for ReasonCode {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let s = match self {
			ReasonCode::PolicyMatched => "policy_matched",
			ReasonCode::NoMatchingPolicy => "no_matching_policy",
			ReasonCode::CredentialInvalid => "credential_invalid",
			ReasonCode::IndeterminateClaims => "indeterminate_claims",
			ReasonCode::LoginMethodNotAllowed => "login_method_not_allowed",
			ReasonCode::UnknownApplication => "unknown_application",
			ReasonCode::SessionExpired => "session_expired",
			ReasonCode::SessionRevoked => "session_revoked",
			ReasonCode::SessionValid => "session_valid",
		};
		write!(f, "{s}")
	}
}
