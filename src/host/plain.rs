// Copyright lowRISC contributors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! Plain-access window management.
//!
//! Regions whose policy carries the auth-gated plain-access bit keep their
//! sessionless read/write windows closed until a key holder grants them.
//! Newer devices have dedicated grant/revoke commands; older ones only
//! open the window as a side effect of a session open, so the engine
//! emulates grant and revoke there with a session open/close pair,
//! preserving any session the caller already had open. The exception is a
//! session on the region being revoked: reopening it would grant the
//! window again, so the revoke consumes it.

use crate::cmd::RevokeType;
use crate::device::PlainAccess;
use crate::host::SecureFlash;
use crate::keys::KeyId;
use crate::Error;

impl SecureFlash<'_> {
    /// Opens `region`'s plain-access windows per its policy.
    ///
    /// Needs a cached session key for the region; the restricted key is
    /// preferred, since granting does not require full access.
    pub fn grant_plain_access(&mut self, region: u8) -> Result<(), Error> {
        self.gate()?;
        check!((region as usize) < self.region_slots(), Error::OutOfRange);
        let kid = self
            .session_kid_for(region)
            .ok_or_else(|| fail!(Error::DevicePrivilegeError))?;

        if self.caps.native_plain_access {
            self.channel.pa_grant(kid.to_wire_byte())?;
            self.refresh_plain_shadow(region, false)?;
            return Ok(());
        }

        // Emulated: a session open grants the window, and closing without
        // revocation leaves it open. Any other session the caller had open
        // is put back afterwards.
        let saved = self.ctx.die().keys.session_kid();
        if saved.is_some() {
            self.close_session(false)?;
        }
        self.open_session(kid, true)?;
        self.close_session(false)?;
        if let Some(saved) = saved {
            self.open_session(saved, true)?;
        }
        Ok(())
    }

    /// Closes `region`'s plain-access windows.
    ///
    /// Devices without the native revoke command can only drop both
    /// windows together; `RevokeType::WriteOnly` is `NotSupported` there.
    /// A session open on `region` itself is consumed by the revoke, since
    /// reopening it would grant the window right back.
    pub fn revoke_plain_access(
        &mut self,
        region: u8,
        revoke: RevokeType,
    ) -> Result<(), Error> {
        self.gate()?;
        check!((region as usize) < self.region_slots(), Error::OutOfRange);

        if self.caps.native_plain_access {
            self.channel.pa_revoke(region, revoke)?;
        } else {
            check!(revoke == RevokeType::All, Error::NotSupported);
            let saved = self.ctx.die().keys.session_kid();
            let on_target = saved.map_or(false, |kid| {
                kid.region_scoped() && kid.region == region
            });
            if on_target {
                if self.caps.session_close {
                    self.close_session(true)?;
                } else {
                    self.close_session(false)?;
                    self.channel.init_section_pa(region)?;
                }
            } else {
                if saved.is_some() {
                    self.close_session(false)?;
                }
                match self.session_kid_for(region) {
                    Some(kid) if self.caps.session_close => {
                        self.open_session(kid, true)?;
                        self.close_session(true)?;
                    }
                    _ => self.channel.init_section_pa(region)?,
                }
                if let Some(saved) = saved {
                    self.open_session(saved, true)?;
                }
            }
        }

        let state = &mut self.ctx.die_mut().regions[region as usize];
        state.plain = state.plain & !PlainAccess::Write;
        if revoke == RevokeType::All {
            state.plain = state.plain & !PlainAccess::Read;
        }
        Ok(())
    }

    fn session_kid_for(&self, region: u8) -> Option<KeyId> {
        let keys = &self.ctx.die().keys;
        for kid in [KeyId::restricted(region), KeyId::full_access(region)] {
            if keys.key_for(kid).is_some() {
                return Some(kid);
            }
        }
        None
    }
}
