// Copyright lowRISC contributors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! Host-side device state.
//!
//! One [`Context`] mirrors one physical device, which may contain several
//! logical dies. All engine operations mutate the context through an
//! explicit accessor for the active die; nothing here is global, and
//! nothing here is synchronized. Callers serialize access to a `Context`
//! (see the crate docs).

use arrayvec::ArrayVec;
use enumflags2::bitflags;
use enumflags2::BitFlags;

use crate::counter::CounterPair;
use crate::keys::KeyStore;
use crate::regs::RegionSize;
use crate::regs::Ssr;
use crate::regs::NUM_REGIONS;
use crate::Error;

/// The most logical dies a single device can contain.
pub const MAX_DIES: usize = 4;

/// Variable device capabilities, fixed at engine construction.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct Caps {
    /// The device has a vault region.
    pub vault: bool,
    /// The device has the native plain-access grant/revoke command; when
    /// false, grant/revoke is emulated through session open/close.
    pub native_plain_access: bool,
    /// The device's session-close command accepts the revoke-plain-access
    /// flag; when false, revocation falls back to reinitializing the
    /// section's plain-access state.
    pub session_close: bool,
    /// Number of logical dies.
    pub dies: u8,
}

impl Default for Caps {
    fn default() -> Self {
        Self {
            vault: false,
            native_plain_access: true,
            session_close: true,
            dies: 1,
        }
    }
}

/// One region's plain-access grants.
#[bitflags]
#[repr(u8)]
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum PlainAccess {
    /// Plain reads granted.
    Read = 1 << 0,
    /// Plain writes granted.
    Write = 1 << 1,
}

/// A set of [`PlainAccess`] bits.
pub type PlainAccessFlags = BitFlags<PlainAccess>;

/// The host's last-known state of one region.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct RegionState {
    /// The region's size, if mapped.
    pub size: Option<RegionSize>,
    /// Whether the region is enabled in the mapping table.
    pub enabled: bool,
    /// Shadow of the region's plain-access window: the last-known effect
    /// of grant/revoke, maintained so reads need not re-query hardware.
    pub plain: PlainAccessFlags,
}

impl RegionState {
    const EMPTY: Self = Self {
        size: None,
        enabled: false,
        plain: PlainAccessFlags::EMPTY,
    };
}

/// The host's state for one logical die.
pub struct DieState {
    /// The die is in its power-down state; secure commands to it are
    /// skipped, not sent.
    pub powered_down: bool,
    /// Last status snapshot read from the die.
    pub ssr: Ssr,
    /// Whether `ssr` can be trusted without a re-read.
    pub ssr_valid: bool,
    /// Session keys and the open-session record.
    pub keys: KeyStore,
    /// Per-region shadows, vault last.
    pub regions: [RegionState; NUM_REGIONS + 1],
    /// Mirror of the die's monotonic counters.
    pub counters: CounterPair,
}

impl DieState {
    fn new() -> Self {
        Self {
            powered_down: false,
            ssr: Ssr::default(),
            ssr_valid: false,
            keys: KeyStore::new(),
            regions: [RegionState::EMPTY; NUM_REGIONS + 1],
            counters: CounterPair::default(),
        }
    }
}

/// The host's complete state for one device.
pub struct Context {
    dies: ArrayVec<DieState, MAX_DIES>,
    active: usize,
    /// The device is in erase/program suspend; secure commands are skipped
    /// until resume.
    pub suspended: bool,
}

impl Context {
    /// Creates a context for a device with `dies` logical dies.
    ///
    /// `dies` is clamped to `1..=MAX_DIES`.
    pub fn new(dies: u8) -> Self {
        let n = (dies as usize).max(1).min(MAX_DIES);
        let mut v = ArrayVec::new();
        for _ in 0..n {
            v.push(DieState::new());
        }
        Self {
            dies: v,
            active: 0,
            suspended: false,
        }
    }

    /// The number of dies this context tracks.
    pub fn num_dies(&self) -> usize {
        self.dies.len()
    }

    /// The index of the active die.
    pub fn active_die(&self) -> usize {
        self.active
    }

    /// The active die's state.
    pub fn die(&self) -> &DieState {
        &self.dies[self.active]
    }

    /// The active die's state, mutably.
    pub fn die_mut(&mut self) -> &mut DieState {
        &mut self.dies[self.active]
    }

    /// Records that `die` is now active. The engine issues the device
    /// command; this only moves the host-side cursor.
    pub(crate) fn set_active(&mut self, die: usize) -> Result<(), Error> {
        check!(die < self.dies.len(), Error::OutOfRange);
        self.active = die;
        Ok(())
    }
}
