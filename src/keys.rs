// Copyright lowRISC contributors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! Key management.
//!
//! A secure flash device holds a pair of 128-bit keys per protected region
//! (a "full-access" key and a "restricted-access" key) plus a handful of
//! device-scoped keys. The host mirrors the keys it has been given in a
//! [`KeyStore`], so it can authenticate session traffic without asking the
//! caller for key material on every call.
//!
//! Key identifiers are modeled as a [`KeyId`] struct rather than the packed
//! byte the device speaks; packing only happens at the command boundary via
//! [`KeyId::to_wire_byte`].

use crate::regs::NUM_REGIONS;
use crate::Error;

/// A 128-bit symmetric key.
pub type Key = [u8; 16];

/// The factory-default key value, present in every slot of a fresh device.
pub const FACTORY_DEFAULT_KEY: Key = [0xff; 16];

/// Returns `true` if `key` is usable as key material.
///
/// The all-zero key is the device's "slot empty" marker and is never valid.
pub fn is_valid(key: &Key) -> bool {
    *key != [0; 16]
}

/// The kind of a key, independent of which region (if any) it scopes.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum KeyKind {
    /// Per-region key granting restricted (read-mostly) session access.
    RestrictedAccessRegion,
    /// Per-region key granting full session access.
    FullAccessRegion,
    /// Per-region key used to authorize re-provisioning of that region's
    /// keys.
    Provisioning,
    /// Per-region LMS public key slot.
    LmsPublic,
    /// The device secret key.
    DeviceSecret,
    /// The device master key.
    DeviceMaster,
    /// Key used to authorize provisioning of the device-scoped keys.
    DeviceKeyProvisioning,
}

impl KeyKind {
    /// Returns `true` if keys of this kind are scoped to a region.
    pub fn region_scoped(self) -> bool {
        matches!(
            self,
            Self::RestrictedAccessRegion
                | Self::FullAccessRegion
                | Self::Provisioning
                | Self::LmsPublic
        )
    }
}

/// An identifier naming one key slot on the device.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct KeyId {
    /// What kind of key this is.
    pub kind: KeyKind,
    /// The region the key scopes, or `0` for device-scoped kinds.
    pub region: u8,
}

impl KeyId {
    /// The restricted-access key for `region`.
    pub fn restricted(region: u8) -> Self {
        Self {
            kind: KeyKind::RestrictedAccessRegion,
            region,
        }
    }

    /// The full-access key for `region`.
    pub fn full_access(region: u8) -> Self {
        Self {
            kind: KeyKind::FullAccessRegion,
            region,
        }
    }

    /// The LMS public key slot for `region`.
    pub fn lms_public(region: u8) -> Self {
        Self {
            kind: KeyKind::LmsPublic,
            region,
        }
    }

    /// The device secret key.
    pub fn device_secret() -> Self {
        Self {
            kind: KeyKind::DeviceSecret,
            region: 0,
        }
    }

    /// The device master key.
    pub fn device_master() -> Self {
        Self {
            kind: KeyKind::DeviceMaster,
            region: 0,
        }
    }

    /// Returns `true` if this id names a region-scoped key.
    pub fn region_scoped(self) -> bool {
        self.kind.region_scoped()
    }

    /// Returns the id of the key that authorizes provisioning the key slot
    /// named by `self`.
    ///
    /// Region-scoped slots are provisioned under that region's provisioning
    /// key; device-scoped slots under the device key-provisioning key.
    pub fn provisioning_for(self) -> Result<Self, Error> {
        match self.kind {
            KeyKind::RestrictedAccessRegion
            | KeyKind::FullAccessRegion
            | KeyKind::LmsPublic => Ok(Self {
                kind: KeyKind::Provisioning,
                region: self.region,
            }),
            KeyKind::DeviceSecret | KeyKind::DeviceMaster => Ok(Self {
                kind: KeyKind::DeviceKeyProvisioning,
                region: 0,
            }),
            _ => Err(fail!(Error::OutOfRange)),
        }
    }

    /// Packs this id into the single-byte form the device speaks.
    ///
    /// Region-scoped kinds occupy the low half of the byte space, with the
    /// kind in the high nibble and the region in the low nibble. Each
    /// device-scoped kind has a fixed byte.
    pub fn to_wire_byte(self) -> u8 {
        match self.kind {
            KeyKind::RestrictedAccessRegion => self.region,
            KeyKind::FullAccessRegion => 0x10 | self.region,
            KeyKind::Provisioning => 0x20 | self.region,
            KeyKind::LmsPublic => 0x30 | self.region,
            KeyKind::DeviceSecret => 0x8f,
            KeyKind::DeviceMaster => 0x9f,
            KeyKind::DeviceKeyProvisioning => 0xaf,
        }
    }

    /// Unpacks a wire byte into a `KeyId`. Returns `None` for bytes that do
    /// not name a key slot (in particular `0xff`, the "invalid key" marker).
    pub fn from_wire_byte(byte: u8) -> Option<Self> {
        let region = byte & 0x0f;
        match byte & 0xf0 {
            0x00 => Some(Self::restricted(region)),
            0x10 => Some(Self::full_access(region)),
            0x20 => Some(Self {
                kind: KeyKind::Provisioning,
                region,
            }),
            0x30 => Some(Self::lms_public(region)),
            _ => match byte {
                0x8f => Some(Self::device_secret()),
                0x9f => Some(Self::device_master()),
                0xaf => Some(Self {
                    kind: KeyKind::DeviceKeyProvisioning,
                    region: 0,
                }),
                _ => None,
            },
        }
    }
}

/// The host-side mirror of the device's per-region session keys, plus the
/// identity of the currently-open session.
///
/// One `KeyStore` belongs to one die. Only the two session-key kinds are
/// cached here; provisioning and device-scoped keys are supplied by the
/// caller at the point of use and never retained.
pub struct KeyStore {
    open_kid: Option<KeyId>,
    session_key: Option<Key>,
    full_access: [Option<Key>; NUM_REGIONS + 1],
    restricted: [Option<Key>; NUM_REGIONS + 1],
}

impl KeyStore {
    /// Creates an empty store with no open session.
    pub fn new() -> Self {
        Self {
            open_kid: None,
            session_key: None,
            full_access: [None; NUM_REGIONS + 1],
            restricted: [None; NUM_REGIONS + 1],
        }
    }

    /// Caches `key` as the session key for `region`.
    ///
    /// `vault` must be set for the vault region (index [`NUM_REGIONS`]) to
    /// be addressable.
    pub fn load_key(
        &mut self,
        region: u8,
        key: &Key,
        full_access: bool,
        vault: bool,
    ) -> Result<(), Error> {
        check!(is_valid(key), Error::InvalidParameter);
        let slot = self.slot_index(region, vault)?;
        if full_access {
            self.full_access[slot] = Some(*key);
        } else {
            self.restricted[slot] = Some(*key);
        }
        Ok(())
    }

    /// Drops the cached session key for `region`.
    ///
    /// Fails with `IncorrectState` if that key backs the currently-open
    /// session; close the session first.
    pub fn remove_key(
        &mut self,
        region: u8,
        full_access: bool,
        vault: bool,
    ) -> Result<(), Error> {
        let slot = self.slot_index(region, vault)?;
        let kid = if full_access {
            KeyId::full_access(region)
        } else {
            KeyId::restricted(region)
        };
        check!(self.open_kid != Some(kid), Error::IncorrectState);
        let table = if full_access {
            &mut self.full_access
        } else {
            &mut self.restricted
        };
        if let Some(key) = &mut table[slot] {
            *key = [0; 16];
        }
        table[slot] = None;
        Ok(())
    }

    /// Looks up the cached key for `kid`, if it is a session-key id with a
    /// key loaded.
    pub fn key_for(&self, kid: KeyId) -> Option<&Key> {
        let slot = kid.region as usize;
        match kid.kind {
            KeyKind::FullAccessRegion => {
                self.full_access.get(slot)?.as_ref()
            }
            KeyKind::RestrictedAccessRegion => {
                self.restricted.get(slot)?.as_ref()
            }
            _ => None,
        }
    }

    /// Returns `true` if a session is currently open on this die.
    pub fn session_is_open(&self) -> bool {
        self.open_kid.is_some()
    }

    /// The id of the key backing the open session, if any.
    pub fn session_kid(&self) -> Option<KeyId> {
        self.open_kid
    }

    /// The key material backing the open session, retained so the session
    /// can be transparently reopened if the device drops it mid-write.
    pub(crate) fn session_key(&self) -> Option<Key> {
        self.session_key
    }

    /// Records that a session was opened under `kid` with `key`.
    pub(crate) fn mark_open(&mut self, kid: KeyId, key: &Key) {
        self.open_kid = Some(kid);
        self.session_key = Some(*key);
    }

    /// Records that the session is closed, erasing the cached session key
    /// material.
    pub(crate) fn mark_closed(&mut self) {
        self.open_kid = None;
        if let Some(key) = &mut self.session_key {
            *key = [0; 16];
        }
        self.session_key = None;
    }

    fn slot_index(&self, region: u8, vault: bool) -> Result<usize, Error> {
        let limit = if vault { NUM_REGIONS + 1 } else { NUM_REGIONS };
        check!((region as usize) < limit, Error::InvalidParameter);
        Ok(region as usize)
    }
}

impl Default for KeyStore {
    fn default() -> Self {
        Self::new()
    }
}
