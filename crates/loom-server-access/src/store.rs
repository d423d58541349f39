// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Generation-versioned policy store with atomic snapshot replacement.
//!
//! Readers call [`PolicyStore::current`] and get an `Arc` to the latest
//! published [`PolicySnapshot`]; the read lock is held only for the pointer
//! clone, never for the evaluation that follows. Writers build the complete
//! successor snapshot and swap the pointer under a write lock, so an
//! evaluation that started against generation N runs to completion against
//! generation N even if N+1 is published mid-flight.
//!
//! Publication validates the candidate before anything is swapped: a
//! malformed policy set is rejected with a [`ConfigError`] and the previous
//! snapshot stays active.

use loom_access_core::{Application, ApplicationId, ConfigResult, Policy, PolicySnapshot};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

pub struct PolicyStore {
	current: RwLock<Arc<PolicySnapshot>>,
}

impl PolicyStore {
	/// Creates a store holding the empty generation-zero snapshot.
	pub fn new() -> Self {
		Self {
			current: RwLock::new(Arc::new(PolicySnapshot::empty())),
		}
	}

	/// The latest published snapshot.
	///
	/// Cheap: clones an `Arc` under a momentary read lock. Callers evaluate
	/// entirely against the returned snapshot.
	pub fn current(&self) -> Arc<PolicySnapshot> {
		Arc::clone(&self.current.read())
	}

	/// Registers (or replaces) an application, returning the new generation.
	#[instrument(skip(self, application), fields(application_id = %application.id))]
	pub fn register_application(&self, application: Application) -> u64 {
		let mut guard = self.current.write();
		let next = guard.with_application(application);
		let generation = next.generation();
		*guard = Arc::new(next);
		debug!(generation, "application registered");
		generation
	}

	/// Replaces the application's policy sequence, returning the new
	/// generation.
	///
	/// The candidate is validated structurally before the swap; on error the
	/// previous snapshot remains active and is never partially replaced.
	#[instrument(skip(self, policies), fields(application_id = %application_id, count = policies.len()))]
	pub fn publish(
		&self,
		application_id: ApplicationId,
		policies: Vec<Policy>,
	) -> ConfigResult<u64> {
		let mut guard = self.current.write();
		match guard.with_policies(application_id, policies) {
			Ok(next) => {
				let generation = next.generation();
				*guard = Arc::new(next);
				debug!(generation, "policy snapshot published");
				Ok(generation)
			}
			Err(e) => {
				warn!(error = %e, "rejected malformed policy snapshot");
				Err(e)
			}
		}
	}
}

impl Default for PolicyStore {
	fn default() -> Self {
		Self::new()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use loom_access_core::{Claims, Decision, PolicyId, Rule};
	use std::time::Duration;

	fn test_app() -> Application {
		Application::new(
			ApplicationId::generate(),
			"acme.example.com",
			Duration::from_secs(3600),
		)
	}

	fn domain_policy(app: ApplicationId, precedence: i32) -> Policy {
		Policy::new(
			PolicyId::generate(),
			app,
			precedence,
			Decision::Allow,
			vec![Rule::EmailDomainEquals {
				domain: "company.com".to_string(),
			}],
		)
	}

	#[test]
	fn starts_at_generation_zero() {
		let store = PolicyStore::new();
		assert_eq!(store.current().generation(), 0);
	}

	#[test]
	fn generations_increase_monotonically() {
		let store = PolicyStore::new();
		let app = test_app();

		let g1 = store.register_application(app.clone());
		let g2 = store.publish(app.id, vec![domain_policy(app.id, 1)]).unwrap();
		let g3 = store.publish(app.id, vec![domain_policy(app.id, 1)]).unwrap();

		assert!(g1 < g2);
		assert!(g2 < g3);
		assert_eq!(store.current().generation(), g3);
	}

	#[test]
	fn publish_for_unknown_application_is_rejected() {
		let store = PolicyStore::new();
		let app = ApplicationId::generate();
		assert!(store.publish(app, vec![domain_policy(app, 1)]).is_err());
		assert_eq!(store.current().generation(), 0);
	}

	#[test]
	fn rejected_publish_keeps_previous_snapshot_active() {
		let store = PolicyStore::new();
		let app = test_app();
		store.register_application(app.clone());
		let good = domain_policy(app.id, 1);
		let generation = store.publish(app.id, vec![good.clone()]).unwrap();

		// Malformed: empty include set.
		let malformed = Policy::new(PolicyId::generate(), app.id, 1, Decision::Allow, vec![]);
		assert!(store.publish(app.id, vec![malformed]).is_err());

		let current = store.current();
		assert_eq!(current.generation(), generation);
		assert_eq!(current.policies_for(app.id), &[good]);
	}

	#[test]
	fn in_flight_snapshot_is_unaffected_by_publication() {
		let store = PolicyStore::new();
		let app = test_app();
		store.register_application(app.clone());
		store.publish(app.id, vec![domain_policy(app.id, 1)]).unwrap();

		// An "in-flight evaluation" holds this snapshot.
		let held = store.current();
		let held_generation = held.generation();
		let claims = Claims::new().with_subject_email("a@company.com");
		assert!(held.policies_for(app.id)[0].applies(&claims));

		// Publication replaces the current pointer with a deny-everything
		// sequence, but the held snapshot is immutable.
		let deny = Policy::new(
			PolicyId::generate(),
			app.id,
			1,
			Decision::Deny,
			vec![Rule::EmailDomainEquals {
				domain: "company.com".to_string(),
			}],
		);
		store.publish(app.id, vec![deny]).unwrap();

		assert_eq!(held.generation(), held_generation);
		assert_eq!(held.policies_for(app.id)[0].decision, Decision::Allow);
		assert_eq!(
			store.current().policies_for(app.id)[0].decision,
			Decision::Deny
		);
	}
}
