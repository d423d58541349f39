// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Policy evaluation engine.
//!
//! This module contains the core [`evaluate`] function that produces an
//! access decision from a snapshot and a claims object. Evaluation walks the
//! application's policy sequence in precedence order; for each policy the
//! exclude set is consulted first (any match disqualifies), then include
//! (OR), then require (AND). The first policy that applies wins and later
//! policies are never consulted. If nothing applies the outcome is the
//! default deny.
//!
//! Evaluation is a pure function over immutable inputs with no side effects:
//! identical snapshot + claims always produce the identical decision.

use loom_access_core::{ApplicationId, Claims, Decision, PolicyId, PolicySnapshot, ReasonCode};
use tracing::instrument;

/// The outcome of one policy evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
	pub decision: Decision,
	pub matched_policy_id: Option<PolicyId>,
	pub reason: ReasonCode,
}

impl Evaluation {
	fn deny(reason: ReasonCode) -> Self {
		Self {
			decision: Decision::Deny,
			matched_policy_id: None,
			reason,
		}
	}
}

/// Evaluates the application's policy sequence against the given claims.
///
/// Every well-formed request terminates with exactly one decision; there is
/// no error path out of evaluation. Denials carry a reason code suitable for
/// audit.
///
/// # Tracing
///
/// Instrumented at debug level; the decision and matched policy are recorded
/// for audit correlation.
#[instrument(
	level = "debug",
	skip(snapshot, claims),
	fields(application_id = %application_id, generation = snapshot.generation())
)]
pub fn evaluate(
	snapshot: &PolicySnapshot,
	application_id: ApplicationId,
	claims: &Claims,
) -> Evaluation {
	let Some(application) = snapshot.application(application_id) else {
		return Evaluation::deny(ReasonCode::UnknownApplication);
	};

	// Identity-method gate: a login method the application does not accept
	// denies before any policy is consulted.
	if let Some(method) = &claims.login_method {
		if !application.allows_login_method(method) {
			return Evaluation::deny(ReasonCode::LoginMethodNotAllowed);
		}
	}

	for policy in snapshot.policies_for(application_id) {
		if policy.applies(claims) {
			return Evaluation {
				decision: policy.decision,
				matched_policy_id: Some(policy.id),
				reason: ReasonCode::PolicyMatched,
			};
		}
	}

	Evaluation::deny(ReasonCode::NoMatchingPolicy)
}
