// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The access decision service.
//!
//! [`AccessService`] ties the pieces together: credential normalization,
//! snapshot lookup, policy evaluation, session issuance, and audit. It is
//! the single entry point request handling talks to; everything below it is
//! deterministic and side-effect free except the session table and the
//! audit queue.
//!
//! Audit is strictly fire-and-forget on the decision path: a full audit
//! queue drops the entry rather than delaying or failing the request.

use crate::credential::{CredentialValidator, PresentedCredentials, ServiceTokenRegistry};
use crate::engine::evaluate;
use crate::session::{AuthMethod, SessionManager, SessionStatus, SessionToken};
use crate::store::PolicyStore;
use loom_access_core::{
	ApplicationId, Claims, ConfigResult, Decision, Policy, PolicyId, ReasonCode,
};
use loom_server_access_audit::{AccessEventType, AccessLogEntry, AuditService};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{instrument, warn};

/// A request as it arrives at the decision point.
///
/// `Indeterminate` models the fail-closed case: the upstream verification
/// step timed out or was cancelled, so no claims can be trusted and the
/// only safe outcome is a deny.
#[derive(Debug)]
pub enum AccessRequest {
	Verified(PresentedCredentials),
	Indeterminate,
}

/// The externally visible outcome of one authorization or resume call.
#[derive(Debug)]
pub struct AccessDecision {
	pub outcome: Decision,
	pub reason: ReasonCode,
	pub matched_policy_id: Option<PolicyId>,
	/// Present exactly when the outcome grants access on `authorize`.
	pub session_token: Option<SessionToken>,
}

impl AccessDecision {
	fn deny(reason: ReasonCode) -> Self {
		Self {
			outcome: Decision::Deny,
			reason,
			matched_policy_id: None,
			session_token: None,
		}
	}
}

/// Default session length when the caller does not request one.
const DEFAULT_SESSION_DURATION: Duration = Duration::from_secs(24 * 60 * 60);

pub struct AccessService {
	store: Arc<PolicyStore>,
	validator: CredentialValidator,
	sessions: Arc<SessionManager>,
	audit: Arc<AuditService>,
}

impl AccessService {
	pub fn new(
		store: Arc<PolicyStore>,
		registry: Arc<ServiceTokenRegistry>,
		sessions: Arc<SessionManager>,
		audit: Arc<AuditService>,
	) -> Self {
		Self {
			store,
			validator: CredentialValidator::new(registry),
			sessions,
			audit,
		}
	}

	/// Authorizes one request against the current snapshot.
	///
	/// Grants issue a session whose token is returned in the decision; every
	/// deny carries a reason code and no session. All paths emit audit.
	#[instrument(skip(self, request, requested_session), fields(application_id = %application_id))]
	pub fn authorize(
		&self,
		application_id: ApplicationId,
		request: AccessRequest,
		requested_session: Option<Duration>,
	) -> AccessDecision {
		let presented = match request {
			AccessRequest::Verified(presented) => presented,
			AccessRequest::Indeterminate => {
				// Fail closed: unverifiable claims are treated as a deny, not
				// retried or guessed at.
				let decision = AccessDecision::deny(ReasonCode::IndeterminateClaims);
				self.audit_denied(application_id, None, &decision, serde_json::Value::Null);
				return decision;
			}
		};

		let claims = match self.validator.normalize(&presented) {
			Ok(claims) => claims,
			Err(error) => {
				let decision = AccessDecision::deny(ReasonCode::CredentialInvalid);
				let subject = presented
					.service_token
					.as_ref()
					.map(|credential| credential.client_id.to_string())
					.or_else(|| presented.subject_email.clone());
				self.audit.log(
					AccessLogEntry::builder(AccessEventType::CredentialRejected)
						.application(application_id.to_string())
						.subject(subject.clone().unwrap_or_default())
						.reason(decision.reason.to_string())
						.details(json!({ "credential_failure": error.detail() }))
						.build(),
				);
				self.audit_denied(
					application_id,
					subject.as_deref(),
					&decision,
					serde_json::Value::Null,
				);
				return decision;
			}
		};

		let snapshot = self.store.current();
		let evaluation = evaluate(&snapshot, application_id, &claims);

		if !evaluation.decision.grants_access() {
			let decision = AccessDecision {
				outcome: Decision::Deny,
				reason: evaluation.reason,
				matched_policy_id: evaluation.matched_policy_id,
				session_token: None,
			};
			self.audit_denied(
				application_id,
				subject_ref(&claims).as_deref(),
				&decision,
				json!({ "generation": snapshot.generation() }),
			);
			return decision;
		}

		// Granted: issue a session. The application is known to exist, or
		// evaluation could not have granted.
		let Some(application) = snapshot.application(application_id) else {
			return AccessDecision::deny(ReasonCode::UnknownApplication);
		};
		let auth_method = match evaluation.decision {
			Decision::NonIdentityAllow => AuthMethod::ServiceToken,
			_ => AuthMethod::Identity,
		};
		let subject = subject_ref(&claims).unwrap_or_default();
		let requested = requested_session.unwrap_or(DEFAULT_SESSION_DURATION);
		let (token, session) = self.sessions.issue(
			subject.clone(),
			application,
			auth_method,
			evaluation.matched_policy_id,
			requested,
		);

		self.audit.log(
			AccessLogEntry::builder(AccessEventType::AccessGranted)
				.application(application_id.to_string())
				.subject(subject.clone())
				.matched_policy(
					evaluation
						.matched_policy_id
						.map(|id| id.to_string())
						.unwrap_or_default(),
				)
				.reason(evaluation.reason.to_string())
				.details(json!({ "generation": snapshot.generation() }))
				.build(),
		);
		self.audit.log(
			AccessLogEntry::builder(AccessEventType::SessionIssued)
				.application(application_id.to_string())
				.subject(subject)
				.details(json!({
					"session_id": session.id.to_string(),
					"auth_method": auth_method.to_string(),
					"expires_at": session.expires_at.to_rfc3339(),
				}))
				.build(),
		);

		AccessDecision {
			outcome: evaluation.decision,
			reason: evaluation.reason,
			matched_policy_id: evaluation.matched_policy_id,
			session_token: Some(token),
		}
	}

	/// Validates a bearer session on a subsequent request.
	///
	/// A live session continues under the decision that issued it; anything
	/// else is a deny that forces re-authorization. A session presented
	/// against a different application than it was issued for is treated as
	/// an invalid credential.
	#[instrument(skip(self, token), fields(application_id = %application_id))]
	pub fn resume(&self, application_id: ApplicationId, token: &str) -> AccessDecision {
		match self.sessions.validate(token) {
			SessionStatus::Valid(session) => {
				if session.application_id != application_id {
					let decision = AccessDecision::deny(ReasonCode::CredentialInvalid);
					self.audit_denied(
						application_id,
						Some(&session.subject_ref),
						&decision,
						json!({ "credential_failure": "session_application_mismatch" }),
					);
					return decision;
				}
				let outcome = match session.auth_method {
					AuthMethod::ServiceToken => Decision::NonIdentityAllow,
					AuthMethod::Identity => Decision::Allow,
				};
				AccessDecision {
					outcome,
					reason: ReasonCode::SessionValid,
					matched_policy_id: session.matched_policy_id,
					session_token: None,
				}
			}
			SessionStatus::Expired => {
				let decision = AccessDecision::deny(ReasonCode::SessionExpired);
				self.audit.log(
					AccessLogEntry::builder(AccessEventType::SessionExpired)
						.application(application_id.to_string())
						.reason(decision.reason.to_string())
						.build(),
				);
				self.audit_denied(application_id, None, &decision, serde_json::Value::Null);
				decision
			}
			SessionStatus::Revoked => {
				let decision = AccessDecision::deny(ReasonCode::SessionRevoked);
				self.audit_denied(application_id, None, &decision, serde_json::Value::Null);
				decision
			}
			SessionStatus::NotFound => {
				let decision = AccessDecision::deny(ReasonCode::CredentialInvalid);
				self.audit_denied(
					application_id,
					None,
					&decision,
					json!({ "credential_failure": "unknown_session" }),
				);
				decision
			}
		}
	}

	/// Revokes the session behind a bearer token.
	pub fn revoke_session(&self, token: &str) -> bool {
		match self.sessions.revoke(token) {
			Some(session) => {
				self.audit.log(
					AccessLogEntry::builder(AccessEventType::SessionRevoked)
						.application(session.application_id.to_string())
						.subject(session.subject_ref)
						.details(json!({ "session_id": session.id.to_string() }))
						.build(),
				);
				true
			}
			None => false,
		}
	}

	/// Publishes a policy sequence, auditing the outcome either way.
	///
	/// Unlike the decision path, publication waits for audit queue space:
	/// losing the record of a policy change is worse than a slow publish.
	pub async fn publish_policies(
		&self,
		application_id: ApplicationId,
		policies: Vec<Policy>,
	) -> ConfigResult<u64> {
		let (result, entry) = match self.store.publish(application_id, policies) {
			Ok(generation) => (
				Ok(generation),
				AccessLogEntry::builder(AccessEventType::SnapshotPublished)
					.application(application_id.to_string())
					.details(json!({ "generation": generation }))
					.build(),
			),
			Err(error) => {
				let entry = AccessLogEntry::builder(AccessEventType::SnapshotRejected)
					.application(application_id.to_string())
					.details(json!({ "error": error.to_string() }))
					.build();
				(Err(error), entry)
			}
		};
		if let Err(e) = self.audit.log_blocking(entry).await {
			warn!(error = %e, "publication audit entry lost");
		}
		result
	}

	/// Mints a machine credential, auditing the issuance. The returned
	/// plaintext secret exists nowhere else.
	pub fn mint_service_token(
		&self,
		token_id: loom_access_core::ServiceTokenId,
		expires_in: Option<Duration>,
	) -> Result<zeroize::Zeroizing<String>, argon2::password_hash::Error> {
		let secret = self.validator.registry().mint(token_id.clone(), expires_in)?;
		self.audit.log(
			AccessLogEntry::builder(AccessEventType::TokenMinted)
				.subject(token_id.to_string())
				.build(),
		);
		Ok(secret)
	}

	/// Revokes machine credential records, auditing when anything changed.
	pub fn revoke_service_token(
		&self,
		token_id: &loom_access_core::ServiceTokenId,
		issued_before: Option<chrono::DateTime<chrono::Utc>>,
	) -> usize {
		let revoked = self.validator.registry().revoke(token_id, issued_before);
		if revoked > 0 {
			self.audit.log(
				AccessLogEntry::builder(AccessEventType::TokenRevoked)
					.subject(token_id.to_string())
					.details(json!({ "records_revoked": revoked }))
					.build(),
			);
		}
		revoked
	}

	fn audit_denied(
		&self,
		application_id: ApplicationId,
		subject: Option<&str>,
		decision: &AccessDecision,
		details: serde_json::Value,
	) {
		let mut builder = AccessLogEntry::builder(AccessEventType::AccessDenied)
			.application(application_id.to_string())
			.reason(decision.reason.to_string())
			.details(details);
		if let Some(subject) = subject {
			builder = builder.subject(subject);
		}
		if let Some(policy_id) = decision.matched_policy_id {
			builder = builder.matched_policy(policy_id.to_string());
		}
		self.audit.log(builder.build());
	}
}

/// Email for identity claims, token id for machine claims.
fn subject_ref(claims: &Claims) -> Option<String> {
	claims
		.subject_email
		.clone()
		.or_else(|| claims.service_token_id.as_ref().map(|id| id.to_string()))
}

#[cfg(test)]
mod tests {
	use super::*;
	use loom_access_core::{Application, LoginMethod, Rule, ServiceTokenId};
	use loom_server_access_audit::{AuditSink, MemorySink};

	struct Fixture {
		service: AccessService,
		registry: Arc<ServiceTokenRegistry>,
		sink: Arc<MemorySink>,
		app: Application,
	}

	/// An application with Scenario A's two policies: machine access for
	/// `jobs-token` at precedence 1, otp-gated identity access for
	/// `company.com` at precedence 2.
	fn fixture() -> Fixture {
		let store = Arc::new(PolicyStore::new());
		let app = Application::new(
			ApplicationId::generate(),
			"acme.example.com",
			Duration::from_secs(3600),
		);
		store.register_application(app.clone());
		store
			.publish(
				app.id,
				vec![
					Policy::new(
						PolicyId::generate(),
						app.id,
						1,
						Decision::NonIdentityAllow,
						vec![Rule::ServiceTokenIs {
							token_id: ServiceTokenId::new("jobs-token"),
						}],
					),
					Policy::new(
						PolicyId::generate(),
						app.id,
						2,
						Decision::Allow,
						vec![Rule::EmailDomainEquals {
							domain: "company.com".to_string(),
						}],
					)
					.with_require(vec![Rule::LoginMethodIs {
						method: LoginMethod::new("otp"),
					}]),
				],
			)
			.unwrap();

		let registry = Arc::new(ServiceTokenRegistry::new());
		let sessions = Arc::new(SessionManager::new());
		let sink = Arc::new(MemorySink::new());
		let audit = Arc::new(AuditService::new(
			64,
			vec![Arc::clone(&sink) as Arc<dyn AuditSink>],
		));
		let service = AccessService::new(store, Arc::clone(&registry), sessions, audit);

		Fixture {
			service,
			registry,
			sink,
			app,
		}
	}

	fn identity(email: &str, method: &str) -> AccessRequest {
		AccessRequest::Verified(
			PresentedCredentials::new()
				.with_subject_email(email)
				.with_login_method(method),
		)
	}

	async fn drain() {
		tokio::time::sleep(Duration::from_millis(50)).await;
	}

	mod authorize {
		use super::*;
		use crate::credential::ServiceTokenCredential;

		#[tokio::test]
		async fn identity_grant_issues_a_session() {
			let f = fixture();
			let decision = f
				.service
				.authorize(f.app.id, identity("a@company.com", "otp"), None);

			assert_eq!(decision.outcome, Decision::Allow);
			assert_eq!(decision.reason, ReasonCode::PolicyMatched);
			assert!(decision.matched_policy_id.is_some());
			assert!(decision.session_token.is_some());

			drain().await;
			let events: Vec<AccessEventType> = f
				.sink
				.entries()
				.await
				.iter()
				.map(|entry| entry.event_type)
				.collect();
			assert!(events.contains(&AccessEventType::AccessGranted));
			assert!(events.contains(&AccessEventType::SessionIssued));
		}

		#[tokio::test]
		async fn machine_grant_uses_non_identity_allow() {
			let f = fixture();
			let secret = f
				.registry
				.mint(ServiceTokenId::new("jobs-token"), None)
				.unwrap();
			let request = AccessRequest::Verified(PresentedCredentials::new().with_service_token(
				ServiceTokenCredential::new("jobs-token", secret.to_string()),
			));

			let decision = f.service.authorize(f.app.id, request, None);
			assert_eq!(decision.outcome, Decision::NonIdentityAllow);
			assert!(decision.session_token.is_some());
		}

		#[tokio::test]
		async fn deny_carries_reason_and_no_session() {
			let f = fixture();
			let decision = f
				.service
				.authorize(f.app.id, identity("a@other.com", "otp"), None);

			assert_eq!(decision.outcome, Decision::Deny);
			assert_eq!(decision.reason, ReasonCode::NoMatchingPolicy);
			assert!(decision.session_token.is_none());

			drain().await;
			let entries = f.sink.entries().await;
			assert!(entries
				.iter()
				.any(|entry| entry.event_type == AccessEventType::AccessDenied
					&& entry.reason.as_deref() == Some("no_matching_policy")));
		}

		#[tokio::test]
		async fn missing_login_method_fails_the_require_set() {
			let f = fixture();
			let request = AccessRequest::Verified(
				PresentedCredentials::new().with_subject_email("a@company.com"),
			);
			let decision = f.service.authorize(f.app.id, request, None);
			assert_eq!(decision.outcome, Decision::Deny);
			assert_eq!(decision.reason, ReasonCode::NoMatchingPolicy);
		}

		#[tokio::test]
		async fn indeterminate_claims_fail_closed() {
			let f = fixture();
			let decision = f
				.service
				.authorize(f.app.id, AccessRequest::Indeterminate, None);
			assert_eq!(decision.outcome, Decision::Deny);
			assert_eq!(decision.reason, ReasonCode::IndeterminateClaims);
			assert!(decision.session_token.is_none());
		}

		#[tokio::test]
		async fn bad_machine_secret_collapses_to_credential_invalid() {
			let f = fixture();
			f.registry
				.mint(ServiceTokenId::new("jobs-token"), None)
				.unwrap();
			let request = AccessRequest::Verified(PresentedCredentials::new().with_service_token(
				ServiceTokenCredential::new("jobs-token", "wrong-secret"),
			));

			let decision = f.service.authorize(f.app.id, request, None);
			assert_eq!(decision.outcome, Decision::Deny);
			assert_eq!(decision.reason, ReasonCode::CredentialInvalid);

			drain().await;
			let entries = f.sink.entries().await;
			let rejected = entries
				.iter()
				.find(|entry| entry.event_type == AccessEventType::CredentialRejected)
				.unwrap();
			// The internal distinction lives only in audit detail.
			assert_eq!(rejected.details["credential_failure"], "secret_mismatch");
		}

		#[tokio::test]
		async fn unknown_application_denies() {
			let f = fixture();
			let decision = f.service.authorize(
				ApplicationId::generate(),
				identity("a@company.com", "otp"),
				None,
			);
			assert_eq!(decision.outcome, Decision::Deny);
			assert_eq!(decision.reason, ReasonCode::UnknownApplication);
		}
	}

	mod resume {
		use super::*;

		#[tokio::test]
		async fn live_session_resumes_with_session_valid() {
			let f = fixture();
			let granted = f
				.service
				.authorize(f.app.id, identity("a@company.com", "otp"), None);
			let token = granted.session_token.unwrap();

			let resumed = f.service.resume(f.app.id, token.as_str());
			assert_eq!(resumed.outcome, Decision::Allow);
			assert_eq!(resumed.reason, ReasonCode::SessionValid);
			assert_eq!(resumed.matched_policy_id, granted.matched_policy_id);
		}

		#[tokio::test]
		async fn revoked_session_denies_and_requires_reauth() {
			let f = fixture();
			let granted = f
				.service
				.authorize(f.app.id, identity("a@company.com", "otp"), None);
			let token = granted.session_token.unwrap();

			assert!(f.service.revoke_session(token.as_str()));
			let resumed = f.service.resume(f.app.id, token.as_str());
			assert_eq!(resumed.outcome, Decision::Deny);
			assert_eq!(resumed.reason, ReasonCode::SessionRevoked);
		}

		#[tokio::test]
		async fn unknown_token_is_a_generic_credential_failure() {
			let f = fixture();
			let resumed = f.service.resume(f.app.id, "deadbeef");
			assert_eq!(resumed.outcome, Decision::Deny);
			assert_eq!(resumed.reason, ReasonCode::CredentialInvalid);
		}

		#[tokio::test]
		async fn session_is_bound_to_its_application() {
			let f = fixture();
			let granted = f
				.service
				.authorize(f.app.id, identity("a@company.com", "otp"), None);
			let token = granted.session_token.unwrap();

			let other_app = ApplicationId::generate();
			let resumed = f.service.resume(other_app, token.as_str());
			assert_eq!(resumed.outcome, Decision::Deny);
			assert_eq!(resumed.reason, ReasonCode::CredentialInvalid);
		}
	}

	mod provisioning {
		use super::*;

		#[tokio::test]
		async fn minted_token_authorizes_until_revoked() {
			let f = fixture();
			let id = ServiceTokenId::new("jobs-token");
			let secret = f.service.mint_service_token(id.clone(), None).unwrap();

			let request = |secret: &str| {
				AccessRequest::Verified(PresentedCredentials::new().with_service_token(
					crate::credential::ServiceTokenCredential::new("jobs-token", secret),
				))
			};

			let granted = f.service.authorize(f.app.id, request(&secret), None);
			assert_eq!(granted.outcome, Decision::NonIdentityAllow);

			assert_eq!(f.service.revoke_service_token(&id, None), 1);
			let denied = f.service.authorize(f.app.id, request(&secret), None);
			assert_eq!(denied.outcome, Decision::Deny);
			assert_eq!(denied.reason, ReasonCode::CredentialInvalid);

			drain().await;
			let events: Vec<AccessEventType> = f
				.sink
				.entries()
				.await
				.iter()
				.map(|entry| entry.event_type)
				.collect();
			assert!(events.contains(&AccessEventType::TokenMinted));
			assert!(events.contains(&AccessEventType::TokenRevoked));
		}
	}

	mod publication {
		use super::*;

		#[tokio::test]
		async fn rejected_publish_audits_and_keeps_serving() {
			let f = fixture();
			// Malformed: empty include.
			let malformed = Policy::new(PolicyId::generate(), f.app.id, 1, Decision::Allow, vec![]);
			assert!(f
				.service
				.publish_policies(f.app.id, vec![malformed])
				.await
				.is_err());

			// The previous snapshot still grants.
			let decision = f
				.service
				.authorize(f.app.id, identity("a@company.com", "otp"), None);
			assert_eq!(decision.outcome, Decision::Allow);

			drain().await;
			let entries = f.sink.entries().await;
			assert!(entries
				.iter()
				.any(|entry| entry.event_type == AccessEventType::SnapshotRejected));
		}

		#[tokio::test]
		async fn successful_publish_takes_effect_for_new_requests() {
			let f = fixture();
			let deny_all = Policy::new(
				PolicyId::generate(),
				f.app.id,
				1,
				Decision::Deny,
				vec![Rule::EmailDomainEquals {
					domain: "company.com".to_string(),
				}],
			);
			f.service
				.publish_policies(f.app.id, vec![deny_all])
				.await
				.unwrap();

			let decision = f
				.service
				.authorize(f.app.id, identity("a@company.com", "otp"), None);
			assert_eq!(decision.outcome, Decision::Deny);
			assert_eq!(decision.reason, ReasonCode::PolicyMatched);

			drain().await;
			let entries = f.sink.entries().await;
			assert!(entries
				.iter()
				.any(|entry| entry.event_type == AccessEventType::SnapshotPublished));
		}
	}
}
