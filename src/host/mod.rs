// Copyright lowRISC contributors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! The secure flash engine.
//!
//! [`SecureFlash`] is the crate's entry point. It composes a
//! [`cmd::Channel`] with the crypto collaborators and an owned
//! [`device::Context`], and implements everything the protocol layers on
//! top of raw commands: the session state machine, versioned register
//! writes with read-back verification, chunked data transfer, plain-access
//! grant/revoke, key provisioning, and the attestation CDI chain.
//!
//! The engine is single-threaded per context: callers serialize all access
//! to one `SecureFlash`, including across dies.
//!
//! ```no_run
//! # fn doc(channel: &mut dyn basilisk::cmd::Channel) {
//! use basilisk::crypto::ring;
//! use basilisk::host::{Options, SecureFlash};
//!
//! let mut hash = ring::hash::Engine::new();
//! let mut kdf = ring::kdf::Kdf;
//! let mut csrng = ring::csrng::Csrng::new();
//! let mut engine = SecureFlash::new(Options {
//!     channel,
//!     hash: &mut hash,
//!     kdf: &mut kdf,
//!     csrng: &mut csrng,
//!     caps: Default::default(),
//!     limits: Default::default(),
//!     retry: Default::default(),
//! });
//! engine.sync_after_reset().unwrap();
//! # }
//! ```

use crate::cmd::Channel;
use crate::counter::CounterLimits;
use crate::counter::Notifications;
use crate::crypto::csrng::Csrng;
use crate::crypto::hash;
use crate::crypto::kdf::Kdf;
use crate::device::Caps;
use crate::device::Context;
use crate::device::PlainAccessFlags;
use crate::keys::Key;
use crate::regs::Gmc;
use crate::regs::Gmt;
use crate::Error;

mod attest;
mod config;
mod plain;
mod provision;
mod session;
mod transfer;

pub use attest::CDI_LEN;
pub use config::ConfigSummary;
pub use config::DeviceProfile;
pub use config::GlobalUpdate;
pub use config::IntegrityCheck;
pub use config::SectionConfiguration;
pub use config::SectionProfile;
pub use config::SectionUpdate;
pub use session::RetryPolicy;

/// Options struct for initializing a [`SecureFlash`].
pub struct Options<'a> {
    /// The secure command layer for the device.
    pub channel: &'a mut dyn Channel,
    /// A handle to a hashing engine, used by the CDI chain.
    pub hash: &'a mut dyn hash::Engine,
    /// The provisioning-key derivation function for this device family.
    pub kdf: &'a mut dyn Kdf,
    /// A random number source, reseeded around session opens.
    pub csrng: &'a mut dyn Csrng,
    /// The device's capabilities.
    pub caps: Caps,
    /// Counter thresholds for the device family.
    pub limits: CounterLimits,
    /// Retry policy for busy register writes.
    pub retry: RetryPolicy,
}

/// A secure flash engine: the host side of one device's protocol state.
pub struct SecureFlash<'a> {
    channel: &'a mut dyn Channel,
    hash: &'a mut dyn hash::Engine,
    kdf: &'a mut dyn Kdf,
    csrng: &'a mut dyn Csrng,
    caps: Caps,
    limits: CounterLimits,
    retry: RetryPolicy,
    ctx: Context,
}

impl<'a> SecureFlash<'a> {
    /// Creates a new `SecureFlash` with the given `Options`.
    ///
    /// The engine starts with an empty device mirror; call
    /// [`SecureFlash::sync_after_reset`] before anything else to populate
    /// it from the device.
    pub fn new(opts: Options<'a>) -> Self {
        let ctx = Context::new(opts.caps.dies);
        Self {
            channel: opts.channel,
            hash: opts.hash,
            kdf: opts.kdf,
            csrng: opts.csrng,
            caps: opts.caps,
            limits: opts.limits,
            retry: opts.retry,
            ctx,
        }
    }

    /// The engine's device mirror.
    pub fn context(&self) -> &Context {
        &self.ctx
    }

    /// The device capabilities this engine was built with.
    pub fn caps(&self) -> &Caps {
        &self.caps
    }

    /// Fails with `CommandIgnored` unless the active die is reachable.
    ///
    /// Every operation that would touch the device calls this first, so a
    /// powered-down or suspended device skips commands entirely instead of
    /// hanging the bus.
    pub(crate) fn gate(&self) -> Result<(), Error> {
        check!(!self.ctx.suspended, Error::CommandIgnored);
        check!(!self.ctx.die().powered_down, Error::CommandIgnored);
        Ok(())
    }

    /// Records the active die's power state.
    pub fn set_power_down(&mut self, on: bool) {
        let die = self.ctx.die_mut();
        die.powered_down = on;
        die.ssr_valid = false;
    }

    /// Records that the device is in erase/program suspend.
    pub fn set_suspended(&mut self, on: bool) {
        self.ctx.suspended = on;
    }

    /// Makes `die` the active die.
    ///
    /// Fails with `IncorrectState` while a session is open; the device
    /// drops sessions on die switch, so the engine refuses to lose one
    /// silently.
    pub fn select_die(&mut self, die: u8) -> Result<(), Error> {
        self.gate()?;
        check!(
            !self.ctx.die().keys.session_is_open(),
            Error::IncorrectState
        );
        self.channel.select_die(die)?;
        self.ctx.set_active(die as usize)?;
        self.ctx.die_mut().ssr_valid = false;
        Ok(())
    }

    /// Caches `key` as a session key for `region` on the active die.
    pub fn load_key(
        &mut self,
        region: u8,
        key: &Key,
        full_access: bool,
    ) -> Result<(), Error> {
        let vault = self.caps.vault;
        self.ctx.die_mut().keys.load_key(region, key, full_access, vault)
    }

    /// Drops the cached session key for `region` on the active die.
    pub fn remove_key(
        &mut self,
        region: u8,
        full_access: bool,
    ) -> Result<(), Error> {
        let vault = self.caps.vault;
        self.ctx.die_mut().keys.remove_key(region, full_access, vault)
    }

    /// Rebuilds the active die's mirror from the device.
    ///
    /// Used at startup and after any reset-type operation: re-reads the
    /// status register and counters, re-derives region sizes from the
    /// mapping table, and discards session and plain-access shadows, which
    /// a reset invalidates.
    pub fn sync_after_reset(&mut self) -> Result<(), Error> {
        self.gate()?;
        let ssr = self.channel.get_ssr()?;
        let counters = self.channel.sync_mc()?;
        let gmt = Gmt::from_bytes(&self.channel.get_gmt()?)?;
        // Decode to validate the register is intelligible; the fields
        // themselves are re-read on use.
        let _ = Gmc::from_bytes(&self.channel.get_gmc()?)?;

        let die = self.ctx.die_mut();
        die.ssr = ssr;
        die.ssr_valid = true;
        die.counters = counters;
        die.keys.mark_closed();
        for (state, row) in die.regions.iter_mut().zip(gmt.regions.iter()) {
            state.size = row.size;
            state.enabled = row.enabled;
            state.plain = PlainAccessFlags::EMPTY;
        }
        Ok(())
    }

    /// Resets the device and resynchronizes the mirror.
    pub fn reset_device(&mut self) -> Result<(), Error> {
        self.gate()?;
        self.channel.reset_device()?;
        self.ctx.die_mut().ssr_valid = false;
        self.sync_after_reset()
    }

    /// Reports counter-maintenance advice for the active die.
    ///
    /// Refreshes the cached status register if it is stale or was sampled
    /// busy, and resynchronizes the counter mirror from the device first.
    pub fn get_notifications(&mut self) -> Result<Notifications, Error> {
        self.gate()?;
        if !self.ctx.die().ssr_valid || self.ctx.die().ssr.busy() {
            let ssr = self.channel.get_ssr()?;
            let die = self.ctx.die_mut();
            die.ssr = ssr;
            die.ssr_valid = true;
        }
        let counters = self.channel.sync_mc()?;
        let die = self.ctx.die_mut();
        die.counters = counters;
        Ok(die
            .counters
            .notifications(&self.limits, die.ssr.mc_maintenance()))
    }

    /// Reads the device's secure user id.
    pub fn get_suid(&mut self) -> Result<[u8; 16], Error> {
        self.gate()?;
        self.channel.get_suid()
    }
}
