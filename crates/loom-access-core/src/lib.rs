// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Core types for the Loom access policy decision engine.
//!
//! This crate provides the pure data model shared by the server-side engine
//! (`loom-server-access`) and its audit pipeline: rules, policies,
//! applications, claims, decisions, and generation-versioned policy
//! snapshots. Everything here is side-effect free: no I/O, no clocks, no
//! locks, so policy semantics can be tested exhaustively in isolation.
//!
//! # Overview
//!
//! - A [`Rule`] is an atomic predicate over request [`Claims`]
//! - A [`Policy`] combines include (OR) / exclude (OR, disqualifying) /
//!   require (AND) rule sets with a [`Decision`] and a precedence
//! - A [`PolicySnapshot`] is an immutable, versioned view of every
//!   application's policy sequence, validated at construction
//!
//! # Example
//!
//! ```
//! use loom_access_core::{
//!     Application, ApplicationId, Claims, Decision, Policy, PolicyId,
//!     PolicySnapshot, Rule,
//! };
//! use std::time::Duration;
//!
//! let app = Application::new(
//!     ApplicationId::generate(),
//!     "acme.example.com",
//!     Duration::from_secs(24 * 3600),
//! );
//! let policy = Policy::new(
//!     PolicyId::generate(),
//!     app.id,
//!     1,
//!     Decision::Allow,
//!     vec![Rule::EmailDomainEquals { domain: "company.com".into() }],
//! );
//! let snapshot = PolicySnapshot::empty()
//!     .with_application(app.clone())
//!     .with_policies(app.id, vec![policy])
//!     .unwrap();
//!
//! let claims = Claims::new().with_subject_email("a@company.com");
//! assert!(snapshot.policies_for(app.id)[0].applies(&claims));
//! ```

pub mod claims;
pub mod error;
pub mod policy;
pub mod rule;
pub mod types;

pub use claims::Claims;
pub use error::{ConfigError, ConfigResult};
pub use policy::{validate_policies, Application, Policy, PolicySnapshot};
pub use rule::Rule;
pub use types::{
	ApplicationId, Decision, LoginMethod, PolicyId, ReasonCode, ServiceTokenId, SessionId,
};
