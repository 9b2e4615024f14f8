// Copyright lowRISC contributors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! Session state machine.
//!
//! At most one session is open per die. Opening burns one transaction
//! counter use, closing erases the cached session key material, and every
//! open (success or failure) ends with a PRNG reseed. Multi-step sequences
//! should go through [`SecureFlash::with_session`], which closes on every
//! exit path.

use crate::cmd::Channel;
use crate::device::PlainAccess;
use crate::device::PlainAccessFlags;
use crate::host::SecureFlash;
use crate::keys::Key;
use crate::keys::KeyId;
use crate::regs::Policy;
use crate::regs::Scr;
use crate::regs::Ssr;
use crate::Error;

/// Bounded-retry policy for register writes that can catch the device
/// mid-housekeeping.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct RetryPolicy {
    /// Total attempts per write, including the first.
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 3 }
    }
}

impl RetryPolicy {
    /// Classifies a failed write: retry only transient system errors where
    /// the status shows the device abandoned the session.
    pub fn should_retry(&self, attempt: u32, error: Error, ssr: Ssr) -> bool {
        attempt < self.max_attempts
            && error == Error::DeviceSystemError
            && !ssr.session_ready()
    }
}

impl SecureFlash<'_> {
    /// Opens a session under `kid` using the cached key for that slot.
    ///
    /// `ignore_scr_validity` tolerates the device flagging the section's
    /// configuration invalid; the session still opens so the caller can
    /// repair it, but the plain-read shadow is withheld.
    pub fn open_session(
        &mut self,
        kid: KeyId,
        ignore_scr_validity: bool,
    ) -> Result<(), Error> {
        let key = *self
            .ctx
            .die()
            .keys
            .key_for(kid)
            .ok_or_else(|| fail!(Error::DevicePrivilegeError))?;
        self.open_session_with(kid, &key, ignore_scr_validity)
    }

    /// Opens a session under `kid` with explicit key material, for keys
    /// the store does not cache (device master, provisioning keys).
    pub fn open_session_with(
        &mut self,
        kid: KeyId,
        key: &Key,
        ignore_scr_validity: bool,
    ) -> Result<(), Error> {
        self.gate()?;
        check!(
            !self.ctx.die().keys.session_is_open(),
            Error::IncorrectState
        );

        // Resync the counter mirror first: authentication fails hard if
        // the host's TC has fallen behind the device's.
        self.ctx.die_mut().counters = self.channel.sync_mc()?;
        self.ctx.die_mut().counters.use_transaction(&self.limits)?;
        let result = self.channel.session_open(kid.to_wire_byte(), key);
        let out = match result {
            Ok(ssr) => self.finish_open(kid, key, ssr, ignore_scr_validity),
            Err(e) => {
                self.ctx.die_mut().ssr_valid = false;
                Err(e)
            }
        };
        // Unconditional, success or failure: keeps PRNG state from
        // correlating with session outcomes.
        self.csrng.reseed();
        out
    }

    fn finish_open(
        &mut self,
        kid: KeyId,
        key: &Key,
        ssr: Ssr,
        ignore_scr_validity: bool,
    ) -> Result<(), Error> {
        let integrity_warning = ssr.integrity_err();
        if integrity_warning && !ignore_scr_validity {
            // The device opened the session; do not leave it dangling.
            let _ = self.channel.session_close(false);
            return Err(fail!(Error::IntegrityError));
        }

        let die = self.ctx.die_mut();
        die.keys.mark_open(kid, key);
        die.ssr = ssr;
        die.ssr_valid = true;

        if kid.region_scoped() {
            self.refresh_plain_shadow(kid.region, integrity_warning)?;
        }
        Ok(())
    }

    /// Refreshes a region's plain-access shadow from its policy bits, the
    /// way the device grants the window on session open. An integrity
    /// warning suppresses the read grant.
    pub(crate) fn refresh_plain_shadow(
        &mut self,
        region: u8,
        integrity_warning: bool,
    ) -> Result<(), Error> {
        let scr = Scr::from_bytes(&self.channel.get_scr(region)?)?;
        let mut plain = PlainAccessFlags::EMPTY;
        if scr.policy.contains(Policy::PlainReadEn) && !integrity_warning {
            plain |= PlainAccess::Read;
        }
        if scr.policy.contains(Policy::PlainWriteEn) {
            plain |= PlainAccess::Write;
        }
        self.ctx.die_mut().regions[region as usize].plain = plain;
        Ok(())
    }

    /// Closes the open session.
    ///
    /// With `revoke_plain_access`, the close also revokes the section's
    /// plain-access window; only meaningful for region-scoped sessions,
    /// and only on devices whose close command supports the revoke flag.
    pub fn close_session(
        &mut self,
        revoke_plain_access: bool,
    ) -> Result<(), Error> {
        self.gate()?;
        let kid = self
            .ctx
            .die()
            .keys
            .session_kid()
            .ok_or_else(|| fail!(Error::IncorrectState))?;
        if revoke_plain_access {
            check!(kid.region_scoped(), Error::InvalidParameter);
            check!(self.caps.session_close, Error::NotSupported);
        }

        self.channel.session_close(revoke_plain_access)?;
        let die = self.ctx.die_mut();
        die.keys.mark_closed();
        if revoke_plain_access {
            die.regions[kid.region as usize].plain = PlainAccessFlags::EMPTY;
        }
        Ok(())
    }

    /// Runs `f` inside a session on `kid`, closing on every exit path.
    ///
    /// If both `f` and the close fail, `f`'s error wins.
    pub fn with_session<T>(
        &mut self,
        kid: KeyId,
        ignore_scr_validity: bool,
        f: impl FnOnce(&mut Self) -> Result<T, Error>,
    ) -> Result<T, Error> {
        self.open_session(kid, ignore_scr_validity)?;
        let result = f(self);
        let closed = self.close_session(false);
        result.and_then(|t| closed.map(|_| t))
    }

    /// Like [`SecureFlash::with_session`], with explicit key material.
    pub fn with_session_key<T>(
        &mut self,
        kid: KeyId,
        key: &Key,
        ignore_scr_validity: bool,
        f: impl FnOnce(&mut Self) -> Result<T, Error>,
    ) -> Result<T, Error> {
        self.open_session_with(kid, key, ignore_scr_validity)?;
        let result = f(self);
        let closed = self.close_session(false);
        result.and_then(|t| closed.map(|_| t))
    }

    /// Issues a register write through `op`, transparently reopening the
    /// session and retrying when the device answers busy and drops the
    /// session (it does this when the write collides with internal
    /// housekeeping).
    pub(crate) fn write_with_retry(
        &mut self,
        mut op: impl FnMut(&mut dyn Channel) -> Result<(), Error>,
    ) -> Result<(), Error> {
        let mut attempt = 1;
        loop {
            let error = match op(&mut *self.channel) {
                Ok(()) => return Ok(()),
                Err(e) => e,
            };
            let ssr = self.channel.last_ssr();
            if !self.retry.should_retry(attempt, error, ssr) {
                return Err(error);
            }
            attempt += 1;
            warn!(
                "device dropped session mid-write; reopening (attempt {})",
                attempt
            );
            self.reopen_session()?;
        }
    }

    /// Reopens the session the device dropped, reusing the cached key
    /// material. The local open-session record is kept as-is.
    fn reopen_session(&mut self) -> Result<(), Error> {
        let die = self.ctx.die();
        let kid = die
            .keys
            .session_kid()
            .ok_or_else(|| fail!(Error::IncorrectState))?;
        let key = die
            .keys
            .session_key()
            .ok_or_else(|| fail!(Error::IncorrectState))?;
        self.ctx.die_mut().counters.use_transaction(&self.limits)?;
        self.channel.session_open(kid.to_wire_byte(), &key)?;
        Ok(())
    }
}
