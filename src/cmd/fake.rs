// Copyright lowRISC contributors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! A model secure flash device, for testing the engine without hardware.
//!
//! [`FakeFlash`] implements [`Channel`] over plain in-memory state: key
//! slots, one session, registers with storage but no version logic (the
//! engine owns versioning), page storage, counters, and per-region plain
//! access windows. Failure injection knobs cover the busy-retry and
//! invalid-configuration paths.

use std::collections::HashMap;

use crate::cmd::Channel;
use crate::cmd::KeysStatus;
use crate::cmd::RevokeType;
use crate::cmd::WriteAction;
use crate::cmd::READ_PAGE;
use crate::cmd::WRITE_PAGE;
use crate::counter::CounterPair;
use crate::keys::Key;
use crate::keys::KeyId;
use crate::keys::FACTORY_DEFAULT_KEY;
use crate::regs::GmcBytes;
use crate::regs::GmtBytes;
use crate::regs::Policy;
use crate::regs::Scr;
use crate::regs::ScrBytes;
use crate::regs::Ssr;
use crate::regs::SsrBit;
use crate::regs::NUM_REGIONS;
use crate::regs::VERSION_UNSET;
use crate::Error;

/// Bytes of page storage the fake backs each region with.
const REGION_BYTES: usize = 64 * 1024;

/// The fake's stand-in for the device's 64-bit content digest (FNV-1a).
pub fn digest64(data: &[u8]) -> u64 {
    let mut h = 0xcbf2_9ce4_8422_2325u64;
    for &b in data {
        h ^= b as u64;
        h = h.wrapping_mul(0x100_0000_01b3);
    }
    h
}

/// The fake's stand-in for the device's content CRC.
pub fn checksum(data: &[u8]) -> u32 {
    data.iter()
        .fold(0u32, |acc, &b| acc.rotate_left(3) ^ b as u32)
}

/// An in-memory model device.
pub struct FakeFlash {
    keys: HashMap<u8, Key>,
    session: Option<u8>,
    counters: CounterPair,
    gmc: GmcBytes,
    gmt: GmtBytes,
    scr: [ScrBytes; NUM_REGIONS + 1],
    storage: Vec<Vec<u8>>,
    plain_read: [bool; NUM_REGIONS + 1],
    plain_write: [bool; NUM_REGIONS + 1],
    config_invalid: [bool; NUM_REGIONS + 1],
    suid: [u8; 16],
    watchdog: u32,
    root_key: Key,
    native_pa: bool,
    busy_failures: u32,
    multi_depth: u32,
    multi_opens: u32,
    register_writes: u32,
    resets: u32,
    active_die: u8,
    dies: u8,
    last_ssr: Ssr,
}

impl FakeFlash {
    /// Creates a fresh, factory-state device with `dies` logical dies.
    pub fn new(dies: u8) -> Self {
        let unset_scr = Scr {
            version: VERSION_UNSET,
            checksum: 0,
            digest: 0,
            policy: Default::default(),
        }
        .to_bytes();
        let mut gmc = [0; crate::regs::GMC_LEN];
        let mut gmt = [0; crate::regs::GMT_LEN];
        // Fresh registers carry the never-written version marker; the
        // engine's first write must turn it into version 0.
        gmc[0..4].copy_from_slice(&VERSION_UNSET.to_le_bytes());
        gmt[0..4].copy_from_slice(&VERSION_UNSET.to_le_bytes());
        // Every row starts with the all-ones "unmapped" size tag; a zero
        // tag would decode as a mapped one-block region.
        for row in 0..NUM_REGIONS {
            gmt[4 + row * 8 + 4] = 0xff;
        }
        Self {
            keys: HashMap::new(),
            session: None,
            counters: CounterPair::default(),
            gmc,
            gmt,
            scr: [unset_scr; NUM_REGIONS + 1],
            storage: vec![vec![0xff; REGION_BYTES]; NUM_REGIONS + 1],
            plain_read: [false; NUM_REGIONS + 1],
            plain_write: [false; NUM_REGIONS + 1],
            config_invalid: [false; NUM_REGIONS + 1],
            suid: [0; 16],
            watchdog: 0,
            root_key: FACTORY_DEFAULT_KEY,
            native_pa: true,
            busy_failures: 0,
            multi_depth: 0,
            multi_opens: 0,
            register_writes: 0,
            resets: 0,
            active_die: 0,
            dies,
            last_ssr: Ssr::default().with(SsrBit::SessionReady, true),
        }
    }

    /// Makes the next `n` register writes fail busy, with the session
    /// dropped device-side, the way a power glitch mid-write presents.
    pub fn inject_busy(&mut self, n: u32) {
        self.busy_failures = n;
    }

    /// Controls whether the device has the native plain-access
    /// grant/revoke command.
    pub fn set_native_pa(&mut self, native: bool) {
        self.native_pa = native;
    }

    /// Marks `region`'s configuration invalid, so session opens against it
    /// report the integrity warning.
    pub fn set_config_invalid(&mut self, region: u8, invalid: bool) {
        self.config_invalid[region as usize] = invalid;
    }

    /// The key slot backing the open session, if any.
    pub fn session_kid(&self) -> Option<u8> {
        self.session
    }

    /// How many register writes the device has accepted.
    pub fn register_writes(&self) -> u32 {
        self.register_writes
    }

    /// How many resets the device has performed.
    pub fn resets(&self) -> u32 {
        self.resets
    }

    /// Whether a multi-transaction batch is currently active.
    pub fn multi_active(&self) -> bool {
        self.multi_depth > 0
    }

    /// Whether `region`'s plain read window is granted.
    pub fn plain_read_granted(&self, region: u8) -> bool {
        self.plain_read[region as usize]
    }

    /// Direct view of `region`'s backing storage.
    pub fn storage(&self, region: u8) -> &[u8] {
        &self.storage[region as usize]
    }

    /// Sets the root key the device derives provisioning keys from.
    pub fn set_root_key(&mut self, root: Key) {
        self.root_key = root;
    }

    /// Plants a section register directly, bypassing the session
    /// requirement, for states the engine refuses to write.
    pub fn set_scr_direct(&mut self, region: u8, scr: &ScrBytes) {
        self.scr[region as usize] = *scr;
    }

    /// How many multi-transaction brackets have been opened.
    pub fn multi_opens(&self) -> u32 {
        self.multi_opens
    }

    fn slot_key(&self, kid: u8) -> Key {
        if let Some(key) = self.keys.get(&kid) {
            return *key;
        }
        // Provisioning slots are never written directly; the device
        // derives them from its root key and the slot id, the same
        // derivation hosts reproduce through [`crate::crypto::kdf`].
        match kid & 0xf0 {
            0x20 => self.derived_key(kid),
            _ if kid == 0xaf => self.derived_key(kid),
            _ => FACTORY_DEFAULT_KEY,
        }
    }

    fn derived_key(&self, kid: u8) -> Key {
        let key = ring::hmac::Key::new(ring::hmac::HMAC_SHA256, &self.root_key);
        let tag = ring::hmac::sign(&key, &[kid]);
        let mut out = [0; 16];
        out.copy_from_slice(&tag.as_ref()[..16]);
        out
    }

    fn status(&mut self) -> Ssr {
        let ssr = Ssr::default()
            .with(SsrBit::SessionReady, true)
            .with(SsrBit::SessionOpen, self.session.is_some());
        self.last_ssr = ssr;
        ssr
    }

    fn fail(&mut self, bit: SsrBit, error: Error) -> Error {
        self.last_ssr = self.status().with(bit, true);
        error
    }

    fn busy_fail(&mut self) -> Error {
        self.busy_failures -= 1;
        // The device abandons the session along with the write.
        self.session = None;
        self.last_ssr = Ssr::default()
            .with(SsrBit::Busy, true)
            .with(SsrBit::SystemErr, true);
        Error::DeviceSystemError
    }

    fn require_session(&mut self, kid: u8) -> Result<(), Error> {
        match self.session {
            None => {
                Err(self.fail(SsrBit::SystemErr, Error::DeviceSessionError))
            }
            Some(open) if open != kid => {
                Err(self
                    .fail(SsrBit::SystemErr, Error::DevicePrivilegeError))
            }
            Some(_) => Ok(()),
        }
    }

    fn region_policy(&self, region: u8) -> crate::regs::PolicyFlags {
        Scr::from_bytes(&self.scr[region as usize])
            .map(|scr| scr.policy)
            .unwrap_or_default()
    }

    fn apply_action(&mut self, region: u8, action: WriteAction) {
        match action {
            WriteAction::None => {}
            WriteAction::Reload => {
                self.plain_read[region as usize] = false;
                self.plain_write[region as usize] = false;
            }
            WriteAction::Reset => self.reset_state(),
        }
    }

    fn reset_state(&mut self) {
        // Reset folds transaction-counter progress into the DMC.
        self.counters.dmc += 1;
        self.counters.tc = 0;
        self.session = None;
        self.plain_read = [false; NUM_REGIONS + 1];
        self.plain_write = [false; NUM_REGIONS + 1];
        self.resets += 1;
    }
}

impl Channel for FakeFlash {
    fn get_ssr(&mut self) -> Result<Ssr, Error> {
        Ok(self.status())
    }

    fn sync_mc(&mut self) -> Result<CounterPair, Error> {
        Ok(self.counters)
    }

    fn session_open(&mut self, kid: u8, key: &Key) -> Result<Ssr, Error> {
        if self.slot_key(kid) != *key {
            return Err(
                self.fail(SsrBit::AuthErr, Error::AuthenticationError)
            );
        }
        self.session = Some(kid);
        self.counters.tc += 1;
        let mut ssr = self.status();
        if let Some(id) = KeyId::from_wire_byte(kid) {
            if id.region_scoped() {
                let region = id.region as usize;
                let invalid = self.config_invalid[region];
                // Opening a section session grants its plain-access window
                // per policy; an invalid configuration withholds reads.
                let policy = self.region_policy(id.region);
                self.plain_read[region] =
                    policy.contains(Policy::PlainReadEn) && !invalid;
                self.plain_write[region] =
                    policy.contains(Policy::PlainWriteEn);
                if invalid {
                    ssr = ssr.with(SsrBit::IntegrityErr, true);
                    self.last_ssr = ssr;
                }
            }
        }
        Ok(ssr)
    }

    fn session_close(
        &mut self,
        revoke_plain_access: bool,
    ) -> Result<(), Error> {
        let kid = match self.session.take() {
            Some(kid) => kid,
            None => {
                return Err(
                    self.fail(SsrBit::SystemErr, Error::DeviceSystemError)
                )
            }
        };
        if revoke_plain_access {
            let region = (kid & 0x0f) as usize;
            self.plain_read[region] = false;
            self.plain_write[region] = false;
        }
        self.status();
        Ok(())
    }

    fn get_gmc(&mut self) -> Result<GmcBytes, Error> {
        Ok(self.gmc)
    }

    fn set_gmc(&mut self, gmc: &GmcBytes) -> Result<(), Error> {
        self.require_session(KeyId::device_master().to_wire_byte())?;
        if self.busy_failures > 0 {
            return Err(self.busy_fail());
        }
        self.gmc = *gmc;
        self.register_writes += 1;
        Ok(())
    }

    fn get_gmt(&mut self) -> Result<GmtBytes, Error> {
        Ok(self.gmt)
    }

    fn set_gmt(&mut self, gmt: &GmtBytes) -> Result<(), Error> {
        self.require_session(KeyId::device_master().to_wire_byte())?;
        if self.busy_failures > 0 {
            return Err(self.busy_fail());
        }
        self.gmt = *gmt;
        self.register_writes += 1;
        Ok(())
    }

    fn get_scr(&mut self, region: u8) -> Result<ScrBytes, Error> {
        Ok(self.scr[region as usize])
    }

    fn set_scr(
        &mut self,
        region: u8,
        scr: &ScrBytes,
        action: WriteAction,
    ) -> Result<(), Error> {
        self.require_session(KeyId::full_access(region).to_wire_byte())?;
        if self.busy_failures > 0 {
            return Err(self.busy_fail());
        }
        self.scr[region as usize] = *scr;
        self.config_invalid[region as usize] = false;
        self.register_writes += 1;
        self.apply_action(region, action);
        Ok(())
    }

    fn set_scr_swap(
        &mut self,
        region: u8,
        scr: &ScrBytes,
        action: WriteAction,
    ) -> Result<(), Error> {
        self.set_scr(region, scr, WriteAction::None)?;
        let half = REGION_BYTES / 2;
        self.storage[region as usize].rotate_left(half);
        self.apply_action(region, action);
        Ok(())
    }

    fn set_key(&mut self, kid: u8, key: &Key) -> Result<(), Error> {
        let id = KeyId::from_wire_byte(kid)
            .ok_or_else(|| fail!(Error::InvalidParameter))?;
        let authority = id
            .provisioning_for()
            .map_err(|_| fail!(Error::InvalidParameter))?;
        self.require_session(authority.to_wire_byte())?;
        self.keys.insert(kid, *key);
        Ok(())
    }

    fn get_keys_status(&mut self) -> Result<KeysStatus, Error> {
        let mut status = KeysStatus::default();
        for region in 0..NUM_REGIONS as u8 + 1 {
            let full = KeyId::full_access(region).to_wire_byte();
            if self.slot_key(full) != FACTORY_DEFAULT_KEY {
                status.full_access |= 1 << region;
            }
            let restricted = KeyId::restricted(region).to_wire_byte();
            if self.slot_key(restricted) != FACTORY_DEFAULT_KEY {
                status.restricted |= 1 << region;
            }
        }
        let master = KeyId::device_master().to_wire_byte();
        status.device_master = self.slot_key(master) != FACTORY_DEFAULT_KEY;
        let secret = KeyId::device_secret().to_wire_byte();
        status.device_secret = self.slot_key(secret) != FACTORY_DEFAULT_KEY;
        Ok(status)
    }

    fn pa_grant(&mut self, kid: u8) -> Result<(), Error> {
        check!(self.native_pa, Error::NotSupported);
        let region = (kid & 0x0f) as usize;
        let policy = self.region_policy(region as u8);
        self.plain_read[region] = policy.contains(Policy::PlainReadEn);
        self.plain_write[region] = policy.contains(Policy::PlainWriteEn);
        Ok(())
    }

    fn pa_revoke(
        &mut self,
        region: u8,
        revoke: RevokeType,
    ) -> Result<(), Error> {
        check!(self.native_pa, Error::NotSupported);
        self.plain_write[region as usize] = false;
        if revoke == RevokeType::All {
            self.plain_read[region as usize] = false;
        }
        Ok(())
    }

    fn init_section_pa(&mut self, region: u8) -> Result<(), Error> {
        self.plain_read[region as usize] = false;
        self.plain_write[region as usize] = false;
        Ok(())
    }

    fn read_page(
        &mut self,
        region: u8,
        offset: u32,
        authenticated: bool,
        out: &mut [u8; READ_PAGE],
    ) -> Result<(), Error> {
        if authenticated {
            let restricted = KeyId::restricted(region).to_wire_byte();
            let full = KeyId::full_access(region).to_wire_byte();
            match self.session {
                None => {
                    return Err(self.fail(
                        SsrBit::SystemErr,
                        Error::DeviceSessionError,
                    ))
                }
                Some(kid) if kid != restricted && kid != full => {
                    return Err(self.fail(
                        SsrBit::SystemErr,
                        Error::DevicePrivilegeError,
                    ))
                }
                Some(_) => {}
            }
        } else {
            let policy = self.region_policy(region);
            let allowed = if policy.contains(Policy::AuthPlainAccess) {
                self.plain_read[region as usize]
            } else {
                policy.contains(Policy::PlainReadEn)
            };
            if !allowed {
                return Err(self.fail(
                    SsrBit::SystemErr,
                    Error::DevicePrivilegeError,
                ));
            }
        }
        let start = offset as usize;
        let data = &self.storage[region as usize][start..start + READ_PAGE];
        out.copy_from_slice(data);
        Ok(())
    }

    fn read_pages(
        &mut self,
        region: u8,
        offset: u32,
        authenticated: bool,
        out: &mut [u8],
    ) -> Result<(), Error> {
        assert!(out.len() % READ_PAGE == 0);
        let mut page = [0; READ_PAGE];
        for (i, chunk) in out.chunks_exact_mut(READ_PAGE).enumerate() {
            let offset = offset + (i * READ_PAGE) as u32;
            self.read_page(region, offset, authenticated, &mut page)?;
            chunk.copy_from_slice(&page);
        }
        Ok(())
    }

    fn write_page(
        &mut self,
        region: u8,
        offset: u32,
        page: &[u8; WRITE_PAGE],
    ) -> Result<(), Error> {
        self.require_session(KeyId::full_access(region).to_wire_byte())?;
        let start = offset as usize;
        self.storage[region as usize][start..start + WRITE_PAGE]
            .copy_from_slice(page);
        Ok(())
    }

    fn get_suid(&mut self) -> Result<[u8; 16], Error> {
        Ok(self.suid)
    }

    fn set_suid(&mut self, suid: &[u8; 16]) -> Result<(), Error> {
        self.require_session(KeyId::device_master().to_wire_byte())?;
        self.suid = *suid;
        Ok(())
    }

    fn get_watchdog(&mut self) -> Result<u32, Error> {
        Ok(self.watchdog)
    }

    fn set_watchdog(&mut self, value: u32) -> Result<(), Error> {
        self.watchdog = value;
        Ok(())
    }

    fn calc_section_digest(&mut self, region: u8) -> Result<u64, Error> {
        Ok(digest64(&self.storage[region as usize]))
    }

    fn verify_section_crc(&mut self, region: u8) -> Result<(), Error> {
        let scr = Scr::from_bytes(&self.scr[region as usize])?;
        let actual = checksum(&self.storage[region as usize]);
        check!(actual == scr.checksum, Error::SecurityError);
        Ok(())
    }

    fn calc_cdi(&mut self, region: u8) -> Result<[u8; 32], Error> {
        let digest = digest64(&self.storage[region as usize]);
        let mut out = [region; 32];
        out[..8].copy_from_slice(&digest.to_le_bytes());
        Ok(out)
    }

    fn multi_transaction(&mut self, active: bool) {
        if active {
            self.multi_depth += 1;
            self.multi_opens += 1;
        } else {
            self.multi_depth = self.multi_depth.saturating_sub(1);
        }
    }

    fn reset_device(&mut self) -> Result<(), Error> {
        self.reset_state();
        Ok(())
    }

    fn select_die(&mut self, die: u8) -> Result<(), Error> {
        check!(die < self.dies, Error::OutOfRange);
        // Die selection tears down any open session.
        self.session = None;
        self.active_die = die;
        Ok(())
    }

    fn last_ssr(&self) -> Ssr {
        self.last_ssr
    }
}
