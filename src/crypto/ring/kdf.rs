// Copyright lowRISC contributors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! Implementations of [`crate::crypto::kdf`] based on `ring`.

use ring::hmac;

use crate::crypto::kdf;
use crate::keys::Key;

/// A `ring`-based [`kdf::Kdf`]: HMAC-SHA256 over the packed key identifier,
/// truncated to the key width.
///
/// This is a software stand-in for the device family's native derivation;
/// production integrations substitute their own [`kdf::Kdf`].
pub struct Kdf;

impl kdf::Kdf for Kdf {
    fn derive_provisioning_key(
        &mut self,
        kid: u8,
        root: &Key,
    ) -> Result<Key, kdf::Error> {
        let key = hmac::Key::new(hmac::HMAC_SHA256, root);
        let tag = hmac::sign(&key, &[kid]);
        let mut out = [0; 16];
        out.copy_from_slice(&tag.as_ref()[..16]);
        Ok(out)
    }
}
