// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use crate::types::{ApplicationId, PolicyId};
use thiserror::Error;

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Structural errors detected when a candidate policy set is published.
///
/// A `ConfigError` is reported synchronously to the publisher and never
/// surfaced to end users; the previously published snapshot stays active.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
	#[error("no application with id {application_id} is registered")]
	UnknownApplication { application_id: ApplicationId },

	#[error("policy {policy_id} has an empty include set")]
	EmptyInclude { policy_id: PolicyId },

	#[error("non_identity_allow policy {policy_id} has no service_token_is include rule")]
	NonIdentityAllowWithoutServiceToken { policy_id: PolicyId },

	#[error("policy {policy_id} targets application {found}, expected {expected}")]
	ApplicationMismatch {
		policy_id: PolicyId,
		expected: ApplicationId,
		found: ApplicationId,
	},

	#[error("policy id {policy_id} appears more than once in the candidate set")]
	DuplicatePolicyId { policy_id: PolicyId },
}
