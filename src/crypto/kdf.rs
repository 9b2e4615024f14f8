// Copyright lowRISC contributors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! Provisioning-key derivation.
//!
//! Each key slot on the device is provisioned under a key derived from a
//! device root key and the slot's packed identifier. The derivation itself
//! is device-family-specific, so the engine consumes it through this trait.

use crate::keys::Key;

/// An error returned by a KDF.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Error {
    /// Indicates an unspecified, internal error.
    Unspecified,
}

/// A key-derivation function for provisioning keys.
pub trait Kdf {
    /// Derives the provisioning key for the slot whose packed identifier is
    /// `kid` from the device root key `root`.
    ///
    /// The derivation must be deterministic: the device performs the same
    /// computation internally, and session authentication fails if the two
    /// sides disagree.
    fn derive_provisioning_key(
        &mut self,
        kid: u8,
        root: &Key,
    ) -> Result<Key, Error>;
}
impl dyn Kdf {} // Ensure object-safe.
