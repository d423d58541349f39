// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The Loom access decision engine.
//!
//! This crate hosts the runtime side of zero-trust access control: the
//! generation-versioned [`PolicyStore`], the pure policy [`evaluate`]
//! function, the Argon2-backed [`ServiceTokenRegistry`], the
//! [`SessionManager`], and the [`AccessService`] glue that turns a request
//! into an auditable [`AccessDecision`].
//!
//! Policy semantics themselves live in `loom-access-core`; audit transport
//! lives in `loom-server-access-audit`. This crate is where they meet the
//! clock, the locks, and the random number generator.

mod argon2_config;

pub mod credential;
pub mod engine;
pub mod service;
pub mod session;
pub mod store;

pub use credential::{
	CredentialError, CredentialValidator, PresentedCredentials, ServiceTokenCredential,
	ServiceTokenRegistry,
};
pub use engine::{evaluate, Evaluation};
pub use service::{AccessDecision, AccessRequest, AccessService};
pub use session::{AuthMethod, Session, SessionManager, SessionStatus, SessionToken};
pub use store::PolicyStore;
