// Copyright lowRISC contributors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! Implementations of [`crate::crypto`] traits based on the `ring` crate.
//!
//! Only available with the `ring` feature enabled. These implementations
//! are software stand-ins for device- or platform-provided primitives,
//! intended for tests and host-side tooling.

pub mod csrng;
pub mod hash;
pub mod kdf;
