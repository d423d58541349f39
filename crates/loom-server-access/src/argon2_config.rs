// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Shared Argon2 instance for service-token secret hashing.
//!
//! Every secret the registry mints is stored as an Argon2id PHC string and
//! verified through the same instance, so cost parameters live in exactly
//! one place. Outside of tests the instance is `Argon2::default()`
//! (Argon2id, 19 MiB memory, 2 iterations); under `cfg(test)` the cost is
//! dropped to 1 MiB and a single iteration so registry tests that mint and
//! verify repeatedly stay fast.
//!
//! The test parameters are far below any acceptable production cost and are
//! compiled out of non-test builds entirely.

use argon2::Argon2;
#[cfg(test)]
use argon2::{Algorithm, Params, Version};

/// The Argon2 instance used for all secret hashing and verification.
#[inline]
pub(crate) fn argon2_instance() -> Argon2<'static> {
	#[cfg(test)]
	{
		// 1 MiB, one pass, one lane. Test-only cost floor.
		let params = Params::new(1024, 1, 1, None).expect("valid Argon2 params for tests");
		Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
	}

	#[cfg(not(test))]
	{
		Argon2::default()
	}
}
