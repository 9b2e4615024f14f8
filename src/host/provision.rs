// Copyright lowRISC contributors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! Key provisioning.
//!
//! A key slot is provisioned by writing it inside a session opened under
//! its provisioning-authority key, which both sides derive from the device
//! root key. [`SecureFlash::provision_key`] is verify-first: if the
//! desired value already opens a session on the slot, nothing is written,
//! so rerunning a provisioning sequence on an already-provisioned device
//! touches no key slots.

use crate::crypto::kdf;
use crate::host::SecureFlash;
use crate::keys;
use crate::keys::Key;
use crate::keys::KeyId;
use crate::keys::KeyKind;
use crate::Error;

impl SecureFlash<'_> {
    /// Ensures the key slot `kid` holds `value`.
    ///
    /// Returns whether the slot was written. With `verify_only`, a slot
    /// that does not already hold `value` fails with
    /// `AuthenticationError` instead of being written; verification
    /// failures other than an authentication error come from unrelated
    /// device state, not the key value, and report `Ok(false)`.
    pub fn provision_key(
        &mut self,
        kid: KeyId,
        value: &Key,
        root_key: &Key,
        verify_only: bool,
    ) -> Result<bool, Error> {
        self.gate()?;
        check!(keys::is_valid(value), Error::InvalidParameter);

        // Verify first: a throwaway session under the candidate value.
        match self.with_session_key(kid, value, true, |_| Ok(())) {
            Ok(()) => return Ok(false),
            Err(Error::AuthenticationError) if verify_only => {
                return Err(Error::AuthenticationError)
            }
            Err(Error::AuthenticationError) => {}
            // Only an authentication failure says anything about the key
            // value; a verify-only caller is not asking for a write, so
            // other failures are not theirs to handle.
            Err(_) if verify_only => return Ok(false),
            Err(e) => return Err(e),
        }

        let authority = kid.provisioning_for()?;
        let authority_key = self
            .kdf
            .derive_provisioning_key(authority.to_wire_byte(), root_key)
            .map_err(map_kdf_error)?;
        self.with_session_key(authority, &authority_key, true, |zelf| {
            zelf.channel.set_key(kid.to_wire_byte(), value)
        })?;

        // The write is only done when the new value opens a session.
        self.with_session_key(kid, value, true, |_| Ok(()))?;
        info!("provisioned key slot {:#04x}", kid.to_wire_byte());
        Ok(true)
    }

    /// Reports whether `kid`'s slot has been changed from its factory
    /// value.
    ///
    /// Only the four session-key kinds are reportable; the device does not
    /// disclose the state of provisioning-authority slots.
    pub fn is_key_provisioned(&mut self, kid: KeyId) -> Result<bool, Error> {
        self.gate()?;
        let status = self.channel.get_keys_status()?;
        let bit = 1u16 << kid.region;
        Ok(match kid.kind {
            KeyKind::FullAccessRegion => status.full_access & bit != 0,
            KeyKind::RestrictedAccessRegion => status.restricted & bit != 0,
            KeyKind::DeviceMaster => status.device_master,
            KeyKind::DeviceSecret => status.device_secret,
            _ => return Err(fail!(Error::InvalidParameter)),
        })
    }
}

fn map_kdf_error(error: kdf::Error) -> Error {
    match error {
        kdf::Error::Unspecified => fail!(Error::SecurityError),
    }
}
