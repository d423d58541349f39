// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Atomic policy rules.
//!
//! A [`Rule`] is a closed, tagged predicate over a [`Claims`] object. Rules
//! carry no state and never perform I/O; evaluating one is a pure function,
//! which keeps policy evaluation deterministic and easy to test.

use crate::claims::Claims;
use crate::types::{LoginMethod, ServiceTokenId};
use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single condition matched against request claims.
///
/// The set of rule kinds is closed: configuration is deserialized into this
/// enum, so an unknown kind is rejected at the serde boundary rather than
/// surviving as an untyped object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Rule {
	/// The subject's verified email equals the given address exactly.
	EmailEquals { address: String },
	/// The subject's email domain equals the given domain, case-insensitive.
	EmailDomainEquals { domain: String },
	/// The request authenticated with the given machine credential.
	ServiceTokenIs { token_id: ServiceTokenId },
	/// The identity was established with the given login method.
	LoginMethodIs { method: LoginMethod },
	/// The request's source address falls inside the given CIDR range.
	IpInRange { cidr: IpNet },
}

impl Rule {
	/// Evaluates this rule against a claims object.
	///
	/// A rule over an attribute the claims do not carry never matches.
	pub fn matches(&self, claims: &Claims) -> bool {
		match self {
			Rule::EmailEquals { address } => claims
				.subject_email
				.as_deref()
				.is_some_and(|email| email == address),
			Rule::EmailDomainEquals { domain } => claims
				.effective_email_domain()
				.is_some_and(|claimed| claimed == domain.to_ascii_lowercase()),
			Rule::ServiceTokenIs { token_id } => claims
				.service_token_id
				.as_ref()
				.is_some_and(|claimed| claimed == token_id),
			Rule::LoginMethodIs { method } => claims
				.login_method
				.as_ref()
				.is_some_and(|claimed| claimed == method),
			Rule::IpInRange { cidr } => claims.source_ip.is_some_and(|ip| cidr.contains(&ip)),
		}
	}

	/// Returns true if this rule matches on a machine credential.
	pub fn is_service_token(&self) -> bool {
		matches!(self, Rule::ServiceTokenIs { .. })
	}

	/// The snake_case kind tag, as used in serialization and audit detail.
	pub fn kind(&self) -> &'static str {
		match self {
			Rule::EmailEquals { .. } => "email_equals",
			Rule::EmailDomainEquals { .. } => "email_domain_equals",
			Rule::ServiceTokenIs { .. } => "service_token_is",
			Rule::LoginMethodIs { .. } => "login_method_is",
			Rule::IpInRange { .. } => "ip_in_range",
		}
	}
}

impl fmt::Display for Rule {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Rule::EmailEquals { address } => write!(f, "email_equals({address})"),
			Rule::EmailDomainEquals { domain } => write!(f, "email_domain_equals({domain})"),
			Rule::ServiceTokenIs { token_id } => write!(f, "service_token_is({token_id})"),
			Rule::LoginMethodIs { method } => write!(f, "login_method_is({method})"),
			Rule::IpInRange { cidr } => write!(f, "ip_in_range({cidr})"),
		}
	}
}
