// Copyright lowRISC contributors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! Cryptographic primitives, as consumed by the engine.
//!
//! The engine does not implement cryptography; it consumes the object-safe
//! traits in this module's submodules. Integrators plug in whatever backs
//! them on their platform (a hardware block, a vendor library). Software
//! implementations based on `ring` are provided under the `ring` feature
//! for tests and host tooling.

pub mod csrng;
pub mod hash;
pub mod kdf;

#[cfg(feature = "ring")]
pub mod ring;
