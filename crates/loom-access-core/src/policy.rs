// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Applications, policies, and versioned policy snapshots.
//!
//! A [`Policy`] is an ordered bundle of include/exclude/require rule sets
//! with a decision outcome; the policies of one application form an ordered
//! sequence keyed by precedence. A [`PolicySnapshot`] is an immutable,
//! generation-versioned view of every application's sequence. Snapshots are
//! never mutated in place: publication builds a complete successor and the
//! store swaps a pointer, so in-flight evaluations always see one consistent
//! version end-to-end.
//!
//! Structural validation happens here, at snapshot construction time. A
//! malformed candidate is rejected with a [`ConfigError`] before it can
//! replace anything.

use crate::claims::Claims;
use crate::error::{ConfigError, ConfigResult};
use crate::rule::Rule;
use crate::types::{ApplicationId, Decision, LoginMethod, PolicyId};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::time::Duration;

/// A protected resource scope with its own policy sequence and session
/// duration ceiling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Application {
	pub id: ApplicationId,
	/// The hostname this application is served under.
	pub domain: String,
	/// Ceiling for any session issued against this application.
	pub max_session_duration: Duration,
	/// Identity methods accepted for this application. Empty means no
	/// restriction.
	pub allowed_identity_methods: HashSet<LoginMethod>,
}

impl Application {
	pub fn new(id: ApplicationId, domain: impl Into<String>, max_session_duration: Duration) -> Self {
		Self {
			id,
			domain: domain.into(),
			max_session_duration,
			allowed_identity_methods: HashSet::new(),
		}
	}

	/// Builder: restrict the application to the given identity methods.
	pub fn with_allowed_identity_methods(
		mut self,
		methods: impl IntoIterator<Item = LoginMethod>,
	) -> Self {
		self.allowed_identity_methods = methods.into_iter().collect();
		self
	}

	/// Returns true if the given login method is acceptable here.
	pub fn allows_login_method(&self, method: &LoginMethod) -> bool {
		self.allowed_identity_methods.is_empty() || self.allowed_identity_methods.contains(method)
	}
}

/// An ordered rule bundle with a decision outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
	pub id: PolicyId,
	pub application_id: ApplicationId,
	/// Lower precedence evaluates first. Ties keep publication order.
	pub precedence: i32,
	pub decision: Decision,
	/// OR-combined: the policy can apply if any include rule matches.
	pub include: Vec<Rule>,
	/// OR-combined: any match disqualifies the policy outright.
	#[serde(default)]
	pub exclude: Vec<Rule>,
	/// AND-combined: every require rule must match.
	#[serde(default)]
	pub require: Vec<Rule>,
}

impl Policy {
	pub fn new(
		id: PolicyId,
		application_id: ApplicationId,
		precedence: i32,
		decision: Decision,
		include: Vec<Rule>,
	) -> Self {
		Self {
			id,
			application_id,
			precedence,
			decision,
			include,
			exclude: Vec::new(),
			require: Vec::new(),
		}
	}

	/// Builder: set the exclude rule set.
	pub fn with_exclude(mut self, exclude: Vec<Rule>) -> Self {
		self.exclude = exclude;
		self
	}

	/// Builder: set the require rule set.
	pub fn with_require(mut self, require: Vec<Rule>) -> Self {
		self.require = require;
		self
	}

	/// Returns true if this policy applies to the given claims.
	///
	/// Exclude is consulted first and disqualifies on any match, regardless
	/// of the include/require outcome. Include is true when empty or when at
	/// least one rule matches; require is true when empty or when every rule
	/// matches.
	pub fn applies(&self, claims: &Claims) -> bool {
		if self.exclude.iter().any(|rule| rule.matches(claims)) {
			return false;
		}
		if !self.include.is_empty() && !self.include.iter().any(|rule| rule.matches(claims)) {
			return false;
		}
		self.require.iter().all(|rule| rule.matches(claims))
	}
}

/// Validates a candidate policy sequence for one application.
///
/// Enforced invariants:
/// - every policy targets the application it is published under
/// - no policy id appears twice
/// - the include set is non-empty (a policy no claims can enter is a
///   configuration mistake, even though evaluation itself treats an empty
///   include as vacuously true)
/// - a `non_identity_allow` policy names at least one `service_token_is`
///   include rule; a human-identity rule alone can never satisfy it
pub fn validate_policies(application_id: ApplicationId, policies: &[Policy]) -> ConfigResult<()> {
	let mut seen = HashSet::new();
	for policy in policies {
		if policy.application_id != application_id {
			return Err(ConfigError::ApplicationMismatch {
				policy_id: policy.id,
				expected: application_id,
				found: policy.application_id,
			});
		}
		if !seen.insert(policy.id) {
			return Err(ConfigError::DuplicatePolicyId { policy_id: policy.id });
		}
		if policy.include.is_empty() {
			return Err(ConfigError::EmptyInclude { policy_id: policy.id });
		}
		if policy.decision == Decision::NonIdentityAllow
			&& !policy.include.iter().any(Rule::is_service_token)
		{
			return Err(ConfigError::NonIdentityAllowWithoutServiceToken { policy_id: policy.id });
		}
	}
	Ok(())
}

/// An immutable, generation-versioned view of all policies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicySnapshot {
	generation: u64,
	applications: HashMap<ApplicationId, Application>,
	/// Per-application sequences, pre-sorted by precedence (stable).
	policies: HashMap<ApplicationId, Vec<Policy>>,
}

impl PolicySnapshot {
	/// The empty snapshot at generation zero.
	pub fn empty() -> Self {
		Self {
			generation: 0,
			applications: HashMap::new(),
			policies: HashMap::new(),
		}
	}

	pub fn generation(&self) -> u64 {
		self.generation
	}

	pub fn application(&self, id: ApplicationId) -> Option<&Application> {
		self.applications.get(&id)
	}

	/// The application's policy sequence in evaluation order.
	pub fn policies_for(&self, id: ApplicationId) -> &[Policy] {
		self.policies.get(&id).map_or(&[], Vec::as_slice)
	}

	/// Builds a successor snapshot with the given application registered.
	///
	/// Re-registering an existing id replaces the application record; its
	/// policy sequence is untouched.
	pub fn with_application(&self, application: Application) -> PolicySnapshot {
		let mut next = self.clone();
		next.generation += 1;
		next.applications.insert(application.id, application);
		next
	}

	/// Builds a successor snapshot with the application's policy sequence
	/// replaced by the given candidate list.
	///
	/// The candidate is validated structurally first; on error the successor
	/// is never built, leaving the current snapshot untouched. The sequence
	/// is stored sorted by precedence with ties keeping list order.
	pub fn with_policies(
		&self,
		application_id: ApplicationId,
		mut candidate: Vec<Policy>,
	) -> ConfigResult<PolicySnapshot> {
		if !self.applications.contains_key(&application_id) {
			return Err(ConfigError::UnknownApplication { application_id });
		}
		validate_policies(application_id, &candidate)?;

		// sort_by_key is stable: equal precedence keeps publication order.
		candidate.sort_by_key(|policy| policy.precedence);

		let mut next = self.clone();
		next.generation += 1;
		next.policies.insert(application_id, candidate);
		Ok(next)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::types::ServiceTokenId;

	fn test_app() -> Application {
		Application::new(
			ApplicationId::generate(),
			"acme.example.com",
			Duration::from_secs(3600),
		)
	}

	fn include_domain(app: ApplicationId, precedence: i32, decision: Decision) -> Policy {
		Policy::new(
			PolicyId::generate(),
			app,
			precedence,
			decision,
			vec![Rule::EmailDomainEquals {
				domain: "company.com".to_string(),
			}],
		)
	}

	mod applies {
		use super::*;

		#[test]
		fn exclude_disqualifies_even_when_include_and_require_match() {
			let app = ApplicationId::generate();
			let policy = include_domain(app, 1, Decision::Allow)
				.with_exclude(vec![Rule::EmailEquals {
					address: "bad@company.com".to_string(),
				}])
				.with_require(vec![Rule::LoginMethodIs {
					method: LoginMethod::new("otp"),
				}]);

			let claims = Claims::new()
				.with_subject_email("bad@company.com")
				.with_login_method("otp");
			assert!(!policy.applies(&claims));

			let other = Claims::new()
				.with_subject_email("good@company.com")
				.with_login_method("otp");
			assert!(policy.applies(&other));
		}

		#[test]
		fn include_is_or_combined() {
			let app = ApplicationId::generate();
			let policy = Policy::new(
				PolicyId::generate(),
				app,
				1,
				Decision::Allow,
				vec![
					Rule::EmailEquals {
						address: "a@x.com".to_string(),
					},
					Rule::EmailEquals {
						address: "b@x.com".to_string(),
					},
				],
			);
			assert!(policy.applies(&Claims::new().with_subject_email("b@x.com")));
			assert!(!policy.applies(&Claims::new().with_subject_email("c@x.com")));
		}

		#[test]
		fn require_is_and_combined() {
			let app = ApplicationId::generate();
			let policy = include_domain(app, 1, Decision::Allow).with_require(vec![
				Rule::LoginMethodIs {
					method: LoginMethod::new("otp"),
				},
				Rule::IpInRange {
					cidr: "10.0.0.0/8".parse().unwrap(),
				},
			]);

			let both = Claims::new()
				.with_subject_email("a@company.com")
				.with_login_method("otp")
				.with_source_ip("10.1.1.1".parse().unwrap());
			assert!(policy.applies(&both));

			let one = Claims::new()
				.with_subject_email("a@company.com")
				.with_login_method("otp");
			assert!(!policy.applies(&one));
		}

		#[test]
		fn absent_required_claim_fails_require() {
			// Scenario B: include matches but require is unsatisfiable.
			let app = ApplicationId::generate();
			let policy = include_domain(app, 2, Decision::Allow).with_require(vec![
				Rule::LoginMethodIs {
					method: LoginMethod::new("otp"),
				},
			]);
			let claims = Claims::new().with_subject_email("a@company.com");
			assert!(!policy.applies(&claims));
		}

		#[test]
		fn empty_include_is_vacuously_true() {
			let app = ApplicationId::generate();
			let policy = Policy::new(PolicyId::generate(), app, 1, Decision::Deny, vec![]);
			assert!(policy.applies(&Claims::new()));
		}
	}

	mod validation {
		use super::*;

		#[test]
		fn accepts_well_formed_sequence() {
			let app = ApplicationId::generate();
			let policies = vec![
				include_domain(app, 1, Decision::Allow),
				include_domain(app, 2, Decision::Deny),
			];
			assert!(validate_policies(app, &policies).is_ok());
		}

		#[test]
		fn rejects_empty_include() {
			let app = ApplicationId::generate();
			let policy = Policy::new(PolicyId::generate(), app, 1, Decision::Allow, vec![]);
			assert_eq!(
				validate_policies(app, &[policy.clone()]),
				Err(ConfigError::EmptyInclude { policy_id: policy.id })
			);
		}

		#[test]
		fn rejects_non_identity_allow_without_service_token_rule() {
			let app = ApplicationId::generate();
			let policy = include_domain(app, 1, Decision::NonIdentityAllow);
			assert_eq!(
				validate_policies(app, &[policy.clone()]),
				Err(ConfigError::NonIdentityAllowWithoutServiceToken { policy_id: policy.id })
			);
		}

		#[test]
		fn accepts_non_identity_allow_with_service_token_include() {
			let app = ApplicationId::generate();
			let policy = Policy::new(
				PolicyId::generate(),
				app,
				1,
				Decision::NonIdentityAllow,
				vec![Rule::ServiceTokenIs {
					token_id: ServiceTokenId::new("jobs-token"),
				}],
			);
			assert!(validate_policies(app, &[policy]).is_ok());
		}

		#[test]
		fn rejects_application_mismatch() {
			let app = ApplicationId::generate();
			let other = ApplicationId::generate();
			let policy = include_domain(other, 1, Decision::Allow);
			assert!(matches!(
				validate_policies(app, &[policy]),
				Err(ConfigError::ApplicationMismatch { .. })
			));
		}

		#[test]
		fn rejects_duplicate_policy_ids() {
			let app = ApplicationId::generate();
			let policy = include_domain(app, 1, Decision::Allow);
			let duplicate = policy.clone();
			assert_eq!(
				validate_policies(app, &[policy.clone(), duplicate]),
				Err(ConfigError::DuplicatePolicyId { policy_id: policy.id })
			);
		}
	}

	mod snapshot {
		use super::*;

		#[test]
		fn empty_snapshot_is_generation_zero() {
			let snapshot = PolicySnapshot::empty();
			assert_eq!(snapshot.generation(), 0);
			assert!(snapshot.policies_for(ApplicationId::generate()).is_empty());
		}

		#[test]
		fn registering_application_bumps_generation() {
			let app = test_app();
			let snapshot = PolicySnapshot::empty().with_application(app.clone());
			assert_eq!(snapshot.generation(), 1);
			assert_eq!(snapshot.application(app.id), Some(&app));
		}

		#[test]
		fn publish_for_unknown_application_fails() {
			let snapshot = PolicySnapshot::empty();
			let app = ApplicationId::generate();
			let result = snapshot.with_policies(app, vec![include_domain(app, 1, Decision::Allow)]);
			assert_eq!(
				result.unwrap_err(),
				ConfigError::UnknownApplication { application_id: app }
			);
		}

		#[test]
		fn sequences_sort_by_precedence_with_stable_ties() {
			let app = test_app();
			let p_late = include_domain(app.id, 5, Decision::Deny);
			let p_first_tie = include_domain(app.id, 1, Decision::Allow);
			let p_second_tie = include_domain(app.id, 1, Decision::Deny);

			let snapshot = PolicySnapshot::empty()
				.with_application(app.clone())
				.with_policies(
					app.id,
					vec![p_late.clone(), p_first_tie.clone(), p_second_tie.clone()],
				)
				.unwrap();

			let ordered: Vec<PolicyId> = snapshot
				.policies_for(app.id)
				.iter()
				.map(|policy| policy.id)
				.collect();
			assert_eq!(ordered, vec![p_first_tie.id, p_second_tie.id, p_late.id]);
		}

		#[test]
		fn rejected_candidate_leaves_snapshot_untouched() {
			let app = test_app();
			let good = include_domain(app.id, 1, Decision::Allow);
			let snapshot = PolicySnapshot::empty()
				.with_application(app.clone())
				.with_policies(app.id, vec![good.clone()])
				.unwrap();

			let malformed = Policy::new(PolicyId::generate(), app.id, 1, Decision::Allow, vec![]);
			assert!(snapshot.with_policies(app.id, vec![malformed]).is_err());

			// The original is unchanged; the failed publish built nothing.
			assert_eq!(snapshot.policies_for(app.id), &[good]);
		}
	}

	mod application {
		use super::*;

		#[test]
		fn empty_allowed_methods_means_no_restriction() {
			let app = test_app();
			assert!(app.allows_login_method(&LoginMethod::new("otp")));
		}

		#[test]
		fn restricted_methods_enforced() {
			let app = test_app().with_allowed_identity_methods([LoginMethod::new("otp")]);
			assert!(app.allows_login_method(&LoginMethod::new("otp")));
			assert!(!app.allows_login_method(&LoginMethod::new("password")));
		}
	}
}
