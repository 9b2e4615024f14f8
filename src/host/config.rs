// Copyright lowRISC contributors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! Versioned register configuration.
//!
//! All three configuration registers follow one write protocol: read the
//! current record, merge the caller's optional fields, and if the merged
//! record differs, bump the version, write inside the owning session, and
//! read back bit-exact. An unchanged record performs no I/O at all, which
//! is what makes "ensure the configuration equals X" calls idempotent and
//! safe to rerun on every boot.
//!
//! [`SecureFlash::configure_device`] strings the per-register writes into
//! the full provisioning sequence, including the policy-before-or-after-
//! size ordering decision.

use crate::cmd::WriteAction;
use crate::device::PlainAccessFlags;
use crate::keys::Key;
use crate::keys::KeyId;
use crate::host::SecureFlash;
use crate::regs::next_version;
use crate::regs::DeviceConfig;
use crate::regs::Gmc;
use crate::regs::Gmt;
use crate::regs::Policy;
use crate::regs::PolicyFlags;
use crate::regs::RegionMapping;
use crate::regs::RegionSize;
use crate::regs::Scr;
use crate::regs::WatchdogConfig;
use crate::regs::WatchdogThreshold;
use crate::regs::NUM_REGIONS;
use crate::wire::WireEnum;
use crate::Error;

/// Optional updates to the global device register; `None` leaves a field
/// unchanged.
#[derive(Copy, Clone, Debug, Default)]
pub struct GlobalUpdate {
    /// New watchdog defaults.
    pub watchdog: Option<WatchdogConfig>,
    /// New device-level settings.
    pub device: Option<DeviceConfig>,
}

/// Optional updates to one section register; `None` leaves a field
/// unchanged.
#[derive(Copy, Clone, Debug)]
pub struct SectionUpdate {
    /// New access policy.
    pub policy: Option<PolicyFlags>,
    /// New content digest.
    pub digest: Option<u64>,
    /// New content CRC.
    pub checksum: Option<u32>,
    /// What the device does after accepting the write.
    pub action: WriteAction,
    /// Atomically swap the section's storage halves with the write.
    pub swap: bool,
}

/// Everything known about one region's configuration.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct SectionConfiguration {
    /// Region base address.
    pub base: u32,
    /// Region size, if mapped.
    pub size: Option<RegionSize>,
    /// Whether the region is enabled.
    pub enabled: bool,
    /// Access policy.
    pub policy: PolicyFlags,
    /// Content digest on record.
    pub digest: u64,
    /// Content CRC on record.
    pub checksum: u32,
    /// The section register's write version.
    pub version: u32,
}

/// Which integrity protection to verify.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum IntegrityCheck {
    /// Recompute the 64-bit digest and compare to the section register.
    Digest,
    /// Have the device check the CRC against the section register.
    Checksum,
}

/// Desired end state for one region, as consumed by
/// [`SecureFlash::configure_device`].
#[derive(Copy, Clone, Debug)]
pub struct SectionProfile {
    /// Region base address.
    pub base: u32,
    /// Region size in bytes; must be expressible as a tag/scale pair.
    pub size_bytes: u32,
    /// Access policy.
    pub policy: PolicyFlags,
    /// Content digest to record, if digest integrity is in use.
    pub digest: Option<u64>,
    /// Content CRC to record, if checksum integrity is in use.
    pub checksum: Option<u32>,
    /// Session key for full access, provisioned and cached if present.
    pub full_access_key: Option<Key>,
    /// Session key for restricted access, provisioned if present.
    pub restricted_key: Option<Key>,
}

/// Desired end state for the whole device: a snapshot description, not a
/// live structure.
#[derive(Clone, Debug, Default)]
pub struct DeviceProfile {
    /// Secure user id to program.
    pub suid: Option<[u8; 16]>,
    /// Global register fields to pin.
    pub global: GlobalUpdate,
    /// Per-region end states; `None` leaves a region untouched.
    pub sections: [Option<SectionProfile>; NUM_REGIONS],
    /// Device master key to provision.
    pub device_master_key: Option<Key>,
    /// Device secret key to provision.
    pub device_secret_key: Option<Key>,
}

/// What [`SecureFlash::configure_device`] actually wrote.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
pub struct ConfigSummary {
    /// The global device register changed.
    pub gmc_changed: bool,
    /// The mapping table changed (and the device was reset).
    pub gmt_changed: bool,
}

/// Decides write order when a region's size and policy change together.
///
/// The size must land first when the region is currently unmapped, or when
/// its current size is not a clean power-of-two block count while the
/// target is: policy bits like rollback protection are only meaningful
/// against the target geometry, and touching the policy of an odd-sized
/// region first can brick its mapping.
pub(crate) fn size_must_precede_policy(
    current: Option<RegionSize>,
    target: RegionSize,
) -> bool {
    match current {
        None => true,
        Some(cur) => {
            !cur.power_of_two_blocks() && target.power_of_two_blocks()
        }
    }
}

impl SecureFlash<'_> {
    /// The number of addressable region slots on this device.
    pub(crate) fn region_slots(&self) -> usize {
        NUM_REGIONS + self.caps.vault as usize
    }

    /// Ensures the global device register matches `update`.
    ///
    /// Returns whether a write was performed. Requires the device master
    /// key.
    pub fn configure_global(
        &mut self,
        update: &GlobalUpdate,
        master_key: &Key,
    ) -> Result<bool, Error> {
        self.gate()?;
        let current_bytes = self.channel.get_gmc()?;
        let current = Gmc::from_bytes(&current_bytes)?;
        let mut target = current;
        if let Some(w) = update.watchdog {
            target.watchdog = w;
        }
        if let Some(d) = update.device {
            target.device = d;
        }
        if target.to_bytes() == current_bytes {
            return Ok(false);
        }

        target.version = next_version(current.version);
        let bytes = target.to_bytes();
        self.with_session_key(
            KeyId::device_master(),
            master_key,
            false,
            |zelf| zelf.write_with_retry(|ch| ch.set_gmc(&bytes)),
        )?;
        let back = self.channel.get_gmc()?;
        check!(back == bytes, Error::CommandFailed);
        Ok(true)
    }

    /// Ensures the mapping table matches `rows` (per-region, `None`
    /// leaves a row unchanged).
    ///
    /// Returns whether a write was performed. The new mapping only takes
    /// effect after a device reset; [`SecureFlash::configure_device`]
    /// handles that.
    pub fn configure_mapping(
        &mut self,
        rows: &[Option<RegionMapping>; NUM_REGIONS],
        master_key: &Key,
    ) -> Result<bool, Error> {
        self.gate()?;
        let current_bytes = self.channel.get_gmt()?;
        let current = Gmt::from_bytes(&current_bytes)?;
        let mut target = current;
        for (row, update) in target.regions.iter_mut().zip(rows.iter()) {
            if let Some(update) = update {
                *row = *update;
            }
        }
        if target.to_bytes() == current_bytes {
            return Ok(false);
        }

        target.version = next_version(current.version);
        let bytes = target.to_bytes();
        self.with_session_key(
            KeyId::device_master(),
            master_key,
            false,
            |zelf| zelf.write_with_retry(|ch| ch.set_gmt(&bytes)),
        )?;
        let back = self.channel.get_gmt()?;
        check!(back == bytes, Error::CommandFailed);

        let die = self.ctx.die_mut();
        for (state, row) in die.regions.iter_mut().zip(target.regions.iter())
        {
            state.size = row.size;
            state.enabled = row.enabled;
        }
        Ok(true)
    }

    /// Ensures `region`'s section register matches `update`.
    ///
    /// Returns whether a write was performed. Opens the region's
    /// full-access session, tolerating an invalid-configuration warning so
    /// a broken section can be repaired through this same path.
    pub fn configure_section(
        &mut self,
        region: u8,
        update: &SectionUpdate,
    ) -> Result<bool, Error> {
        self.gate()?;
        check!((region as usize) < self.region_slots(), Error::OutOfRange);
        let current_bytes = self.channel.get_scr(region)?;
        let current = Scr::from_bytes(&current_bytes)?;
        let mut target = current;
        if let Some(p) = update.policy {
            target.policy = p;
        }
        if let Some(d) = update.digest {
            target.digest = d;
        }
        if let Some(c) = update.checksum {
            target.checksum = c;
        }

        // Rollback protection keeps the recovery copy in the upper half of
        // the region, so the mapped size must split into two equal
        // power-of-two block halves. Digest integrity is meaningless
        // without a digest on record.
        if target.policy.contains(Policy::RollbackProtect) {
            let size = self.ctx.die().regions[region as usize].size;
            let halvable = size
                .map_or(false, |s| s.tag >= 1 && s.power_of_two_blocks());
            check!(halvable, Error::InvalidParameter);
        }
        if target.policy.contains(Policy::DigestIntegrity) {
            check!(target.digest != 0, Error::InvalidParameter);
        }

        if target.to_bytes() == current_bytes && !update.swap {
            return Ok(false);
        }

        // A policy that auth-gates an already-granted plain window must
        // force the window back to not-granted; a plain reload does that
        // without a reboot.
        let mut action = update.action;
        let plain = self.ctx.die().regions[region as usize].plain;
        if action == WriteAction::None
            && target.policy.contains(Policy::AuthPlainAccess)
            && !plain.is_empty()
        {
            action = WriteAction::Reload;
        }

        target.version = next_version(current.version);
        let bytes = target.to_bytes();
        let swap = update.swap;

        self.open_session(KeyId::full_access(region), true)?;
        let write = self.write_with_retry(|ch| {
            if swap {
                ch.set_scr_swap(region, &bytes, action)
            } else {
                ch.set_scr(region, &bytes, action)
            }
        });
        if action == WriteAction::Reset {
            // The accepted write rebooted the device; the session is gone
            // without a close.
            self.ctx.die_mut().keys.mark_closed();
            write?;
            self.sync_after_reset()?;
        } else {
            let closed = self.close_session(false);
            write?;
            closed?;
            if action == WriteAction::Reload {
                self.ctx.die_mut().regions[region as usize].plain =
                    PlainAccessFlags::EMPTY;
            }
        }
        let back = self.channel.get_scr(region)?;
        check!(back == bytes, Error::CommandFailed);
        Ok(true)
    }

    /// Reads back everything known about `region`'s configuration.
    pub fn get_section_configuration(
        &mut self,
        region: u8,
    ) -> Result<SectionConfiguration, Error> {
        self.gate()?;
        check!((region as usize) < self.region_slots(), Error::OutOfRange);
        let scr = Scr::from_bytes(&self.channel.get_scr(region)?)?;
        let (base, size, enabled) = if (region as usize) < NUM_REGIONS {
            let gmt = Gmt::from_bytes(&self.channel.get_gmt()?)?;
            let row = gmt.regions[region as usize];
            (row.base, row.size, row.enabled)
        } else {
            // The vault is not in the mapping table; report the mirror.
            let state = self.ctx.die().regions[region as usize];
            (0, state.size, state.enabled)
        };
        Ok(SectionConfiguration {
            base,
            size,
            enabled,
            policy: scr.policy,
            digest: scr.digest,
            checksum: scr.checksum,
            version: scr.version,
        })
    }

    /// Verifies `region`'s contents against its recorded integrity data.
    ///
    /// Fails with `IncorrectState` if the region's policy does not carry
    /// the requested protection, and `SecurityError` on mismatch.
    pub fn check_integrity(
        &mut self,
        region: u8,
        kind: IntegrityCheck,
    ) -> Result<(), Error> {
        self.gate()?;
        check!((region as usize) < self.region_slots(), Error::OutOfRange);
        let scr = Scr::from_bytes(&self.channel.get_scr(region)?)?;
        match kind {
            IntegrityCheck::Digest => {
                check!(
                    scr.policy.contains(Policy::DigestIntegrity),
                    Error::IncorrectState
                );
                let digest = self.channel.calc_section_digest(region)?;
                check!(digest == scr.digest, Error::SecurityError);
            }
            IntegrityCheck::Checksum => {
                check!(
                    scr.policy.contains(Policy::ChecksumIntegrity),
                    Error::IncorrectState
                );
                self.channel.verify_section_crc(region)?;
            }
        }
        Ok(())
    }

    /// Ensures the secure user id equals `suid`. Returns whether a write
    /// was performed.
    pub fn set_suid(
        &mut self,
        suid: &[u8; 16],
        master_key: &Key,
    ) -> Result<bool, Error> {
        self.gate()?;
        if self.channel.get_suid()? == *suid {
            return Ok(false);
        }
        self.with_session_key(
            KeyId::device_master(),
            master_key,
            false,
            |zelf| zelf.channel.set_suid(suid),
        )?;
        check!(self.channel.get_suid()? == *suid, Error::CommandFailed);
        Ok(true)
    }

    /// Writes the watchdog configuration register atomically and verifies
    /// the write.
    ///
    /// The oscillator rate is carried at 64 Hz granularity; rates that do
    /// not divide evenly are rejected rather than rounded.
    pub fn watchdog_config_set(
        &mut self,
        config: &WatchdogConfig,
    ) -> Result<(), Error> {
        self.gate()?;
        check!(config.osc_rate_hz % 64 == 0, Error::InvalidParameter);
        check!(config.osc_rate_hz / 64 < 1 << 20, Error::OutOfRange);
        check!(config.section < NUM_REGIONS as u8 + 1, Error::OutOfRange);
        let raw = pack_watchdog(config);
        self.channel.set_watchdog(raw)?;
        check!(self.channel.get_watchdog()? == raw, Error::CommandFailed);
        Ok(())
    }

    /// Reads the watchdog configuration register.
    pub fn watchdog_config_get(&mut self) -> Result<WatchdogConfig, Error> {
        self.gate()?;
        unpack_watchdog(self.channel.get_watchdog()?)
    }

    /// Drives the device to the end state described by `profile`: key
    /// provisioning, then SUID, then the global register, then section
    /// policies and the mapping table in dependency order.
    ///
    /// The sequence is idempotent: a second call with the same profile
    /// performs zero register writes and reports an all-false summary.
    /// Only the active die is configured; callers loop over dies.
    pub fn configure_device(
        &mut self,
        profile: &DeviceProfile,
        master_key: &Key,
        root_key: &Key,
    ) -> Result<ConfigSummary, Error> {
        self.gate()?;

        // Keys first: everything below opens sessions under them.
        if let Some(key) = &profile.device_master_key {
            self.provision_key(KeyId::device_master(), key, root_key, false)?;
        }
        if let Some(key) = &profile.device_secret_key {
            self.provision_key(KeyId::device_secret(), key, root_key, false)?;
        }
        for (i, section) in profile.sections.iter().enumerate() {
            let section = match section {
                Some(s) => s,
                None => continue,
            };
            let region = i as u8;
            if let Some(key) = &section.full_access_key {
                self.provision_key(
                    KeyId::full_access(region),
                    key,
                    root_key,
                    false,
                )?;
                self.load_key(region, key, true)?;
            }
            if let Some(key) = &section.restricted_key {
                self.provision_key(
                    KeyId::restricted(region),
                    key,
                    root_key,
                    false,
                )?;
                self.load_key(region, key, false)?;
            }
        }

        if let Some(suid) = &profile.suid {
            self.set_suid(suid, master_key)?;
        }

        let gmc_changed = self.configure_global(&profile.global, master_key)?;

        // Policies that may precede their region's size change are written
        // now, with integrity fields stripped; the rest wait until the new
        // mapping is live.
        let mut rows = [None; NUM_REGIONS];
        for (i, section) in profile.sections.iter().enumerate() {
            let section = match section {
                Some(s) => s,
                None => continue,
            };
            let target_size = RegionSize::from_bytes(section.size_bytes)
                .ok_or_else(|| fail!(Error::InvalidParameter))?;
            rows[i] = Some(RegionMapping {
                base: section.base,
                size: Some(target_size),
                enabled: true,
            });
            let current = self.ctx.die().regions[i].size;
            if !size_must_precede_policy(current, target_size) {
                self.configure_section(
                    i as u8,
                    &SectionUpdate {
                        policy: Some(section.policy),
                        digest: None,
                        checksum: None,
                        action: WriteAction::None,
                        swap: false,
                    },
                )?;
            }
        }

        let gmt_changed = self.configure_mapping(&rows, master_key)?;
        if gmt_changed {
            // A new mapping only takes effect across a reboot.
            self.reset_device()?;
        }

        for (i, section) in profile.sections.iter().enumerate() {
            let section = match section {
                Some(s) => s,
                None => continue,
            };
            self.configure_section(
                i as u8,
                &SectionUpdate {
                    policy: Some(section.policy),
                    digest: section.digest,
                    checksum: section.checksum,
                    action: WriteAction::None,
                    swap: false,
                },
            )?;
        }

        Ok(ConfigSummary {
            gmc_changed,
            gmt_changed,
        })
    }
}

fn pack_watchdog(config: &WatchdogConfig) -> u32 {
    (config.enable as u32)
        | (config.lock as u32) << 1
        | (config.authenticated as u32) << 2
        | (config.sw_reset as u32) << 3
        | (config.threshold.to_wire_value() as u32) << 4
        | (config.section as u32) << 8
        | (config.osc_rate_hz / 64) << 12
}

fn unpack_watchdog(raw: u32) -> Result<WatchdogConfig, Error> {
    let threshold =
        WatchdogThreshold::from_wire_value((raw >> 4 & 0xf) as u8)
            .ok_or_else(|| fail!(Error::OutOfRange))?;
    Ok(WatchdogConfig {
        enable: raw & 1 != 0,
        lock: raw & 2 != 0,
        authenticated: raw & 4 != 0,
        sw_reset: raw & 8 != 0,
        threshold,
        section: (raw >> 8 & 0xf) as u8,
        osc_rate_hz: (raw >> 12) * 64,
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::device::Caps;
    use crate::host::test::harness;
    use crate::keys::KeyId;
    use crate::keys::FACTORY_DEFAULT_KEY;
    use crate::regs::AddressMode;
    use crate::regs::PinMux;
    use crate::regs::ResetResponse;
    use crate::regs::BLOCK_SIZE;
    use crate::regs::VERSION_UNSET;
    use pretty_assertions::assert_eq;

    const KEY: Key = FACTORY_DEFAULT_KEY;
    const MASTER: Key = FACTORY_DEFAULT_KEY;
    const ROOT: Key = FACTORY_DEFAULT_KEY;

    fn watchdog() -> WatchdogConfig {
        WatchdogConfig {
            enable: true,
            lock: false,
            authenticated: false,
            sw_reset: true,
            threshold: WatchdogThreshold::Minutes4,
            section: 1,
            osc_rate_hz: 64 * 512,
        }
    }

    fn device() -> DeviceConfig {
        DeviceConfig {
            address_mode: AddressMode::FourByte,
            pin_mux: PinMux::QuadEnable,
            reset_response: ResetResponse::Standard,
            non_secure_format_en: false,
        }
    }

    fn profile() -> DeviceProfile {
        let mut profile = DeviceProfile {
            suid: Some([0xa5; 16]),
            global: GlobalUpdate {
                watchdog: Some(watchdog()),
                device: Some(device()),
            },
            ..Default::default()
        };
        profile.sections[0] = Some(SectionProfile {
            base: 0,
            size_bytes: 4 * BLOCK_SIZE,
            policy: Policy::DigestIntegrity | Policy::WriteProtect,
            digest: Some(0x1122_3344_5566_7788),
            checksum: Some(0xcafe_f00d),
            full_access_key: Some(KEY),
            restricted_key: None,
        });
        profile.sections[2] = Some(SectionProfile {
            base: 4 * BLOCK_SIZE,
            size_bytes: 2 * BLOCK_SIZE,
            policy: Policy::PlainReadEn.into(),
            digest: None,
            checksum: None,
            full_access_key: Some(KEY),
            restricted_key: None,
        });
        profile
    }

    #[test]
    fn scr_round_trip() {
        harness(Caps::default(), |_| (), |engine| {
            engine.load_key(1, &KEY, true).unwrap();
            let update = SectionUpdate {
                policy: Some(
                    Policy::DigestIntegrity | Policy::ChecksumIntegrity,
                ),
                digest: Some(0xdead_beef_0bad_cafe),
                checksum: Some(0x1234_5678),
                action: WriteAction::None,
                swap: false,
            };
            assert!(engine.configure_section(1, &update).unwrap());
            let config = engine.get_section_configuration(1).unwrap();
            assert_eq!(
                config.policy,
                Policy::DigestIntegrity | Policy::ChecksumIntegrity
            );
            assert_eq!(config.digest, 0xdead_beef_0bad_cafe);
            assert_eq!(config.checksum, 0x1234_5678);
        });
    }

    #[test]
    fn version_increments_from_unset() {
        harness(Caps::default(), |_| (), |engine| {
            engine.load_key(1, &KEY, true).unwrap();
            assert_eq!(
                engine.get_section_configuration(1).unwrap().version,
                VERSION_UNSET
            );
            let mut update = SectionUpdate {
                policy: Some(Policy::WriteProtect.into()),
                digest: None,
                checksum: None,
                action: WriteAction::None,
                swap: false,
            };
            engine.configure_section(1, &update).unwrap();
            assert_eq!(
                engine.get_section_configuration(1).unwrap().version,
                0
            );
            update.digest = Some(7);
            engine.configure_section(1, &update).unwrap();
            assert_eq!(
                engine.get_section_configuration(1).unwrap().version,
                1
            );
        });
    }

    #[test]
    fn unchanged_write_is_no_io() {
        let (flash, ()) = harness(Caps::default(), |_| (), |engine| {
            engine.load_key(1, &KEY, true).unwrap();
            let update = SectionUpdate {
                policy: Some(Policy::WriteProtect.into()),
                digest: Some(1),
                checksum: Some(2),
                action: WriteAction::None,
                swap: false,
            };
            assert!(engine.configure_section(1, &update).unwrap());
            assert!(!engine.configure_section(1, &update).unwrap());
        });
        assert_eq!(flash.register_writes(), 1);
    }

    #[test]
    fn configure_device_is_idempotent() {
        let (once, ()) = harness(Caps::default(), |_| (), |engine| {
            let first = engine
                .configure_device(&profile(), &MASTER, &ROOT)
                .unwrap();
            assert!(first.gmc_changed);
            assert!(first.gmt_changed);
        });
        let (twice, ()) = harness(Caps::default(), |_| (), |engine| {
            engine.configure_device(&profile(), &MASTER, &ROOT).unwrap();
            let second = engine
                .configure_device(&profile(), &MASTER, &ROOT)
                .unwrap();
            assert_eq!(second, ConfigSummary::default());
        });
        // The second run with the same profile performs no writes at all.
        assert!(once.register_writes() > 0);
        assert_eq!(twice.register_writes(), once.register_writes());
    }

    #[test]
    fn busy_write_retries_after_reopen() {
        let (flash, ()) = harness(
            Caps::default(),
            |flash| flash.inject_busy(1),
            |engine| {
                let update = GlobalUpdate {
                    watchdog: Some(watchdog()),
                    device: None,
                };
                assert!(engine.configure_global(&update, &MASTER).unwrap());
            },
        );
        assert_eq!(flash.register_writes(), 1);
    }

    #[test]
    fn busy_exhaustion_surfaces_error() {
        harness(
            Caps::default(),
            |flash| flash.inject_busy(100),
            |engine| {
                let update = GlobalUpdate {
                    watchdog: Some(watchdog()),
                    device: None,
                };
                assert_eq!(
                    engine.configure_global(&update, &MASTER),
                    Err(Error::DeviceSystemError)
                );
            },
        );
    }

    #[test]
    fn reset_action_resyncs_after_reboot() {
        let (flash, ()) = harness(Caps::default(), |_| (), |engine| {
            engine.load_key(1, &KEY, true).unwrap();
            let update = SectionUpdate {
                policy: Some(Policy::WriteProtect.into()),
                digest: None,
                checksum: None,
                action: WriteAction::Reset,
                swap: false,
            };
            assert!(engine.configure_section(1, &update).unwrap());
            // The device rebooted: no session, TC folded into the DMC.
            assert!(!engine.context().die().keys.session_is_open());
            assert_eq!(engine.context().die().counters.tc, 0);
            assert!(engine.context().die().counters.dmc > 0);
        });
        assert_eq!(flash.resets(), 1);
    }

    #[test]
    fn swap_write_rotates_section_halves() {
        let (flash, ()) = harness(Caps::default(), |_| (), |engine| {
            let mut rows = [None; NUM_REGIONS];
            rows[2] = Some(RegionMapping {
                base: 0,
                size: RegionSize::from_bytes(BLOCK_SIZE),
                enabled: true,
            });
            engine.configure_mapping(&rows, &MASTER).unwrap();
            engine.load_key(2, &KEY, true).unwrap();
            engine.open_session(KeyId::full_access(2), false).unwrap();
            engine.secure_write(2, 0, b"half marker!").unwrap();
            engine.close_session(false).unwrap();

            let update = SectionUpdate {
                policy: None,
                digest: None,
                checksum: None,
                action: WriteAction::None,
                swap: true,
            };
            assert!(engine.configure_section(2, &update).unwrap());
        });
        // The marker written into the first half now lives in the second.
        let half = BLOCK_SIZE as usize / 2;
        assert_eq!(&flash.storage(2)[half..half + 12], b"half marker!");
    }

    #[test]
    fn watchdog_round_trip() {
        harness(Caps::default(), |_| (), |engine| {
            let config = watchdog();
            engine.watchdog_config_set(&config).unwrap();
            assert_eq!(engine.watchdog_config_get().unwrap(), config);
            assert_eq!(
                engine.watchdog_config_set(&WatchdogConfig {
                    osc_rate_hz: 100,
                    ..config
                }),
                Err(Error::InvalidParameter)
            );
        });
    }

    #[test]
    fn integrity_check_requires_matching_policy() {
        harness(Caps::default(), |_| (), |engine| {
            engine.load_key(1, &KEY, true).unwrap();
            let update = SectionUpdate {
                policy: Some(Policy::ChecksumIntegrity.into()),
                digest: None,
                checksum: Some(crate::cmd::fake::checksum(
                    &[0xff; 64 * 1024],
                )),
                action: WriteAction::None,
                swap: false,
            };
            engine.configure_section(1, &update).unwrap();
            // Checksum protection is on record and matches the (erased)
            // contents.
            engine
                .check_integrity(1, IntegrityCheck::Checksum)
                .unwrap();
            // Digest protection is not.
            assert_eq!(
                engine.check_integrity(1, IntegrityCheck::Digest),
                Err(Error::IncorrectState)
            );
        });
    }

    #[test]
    fn policy_is_validated_against_region_geometry() {
        harness(Caps::default(), |_| (), |engine| {
            engine.load_key(1, &KEY, true).unwrap();
            let rollback = SectionUpdate {
                policy: Some(Policy::RollbackProtect.into()),
                digest: None,
                checksum: None,
                action: WriteAction::None,
                swap: false,
            };
            // Unmapped: no geometry to keep a recovery copy in.
            assert_eq!(
                engine.configure_section(1, &rollback),
                Err(Error::InvalidParameter)
            );

            // Three blocks cannot split into two equal halves.
            let mut rows = [None; NUM_REGIONS];
            rows[1] = Some(RegionMapping {
                base: 0,
                size: RegionSize::from_bytes(3 * BLOCK_SIZE),
                enabled: true,
            });
            engine.configure_mapping(&rows, &MASTER).unwrap();
            assert_eq!(
                engine.configure_section(1, &rollback),
                Err(Error::InvalidParameter)
            );

            // A single block has no upper half either.
            rows[1] = Some(RegionMapping {
                base: 0,
                size: RegionSize::from_bytes(BLOCK_SIZE),
                enabled: true,
            });
            engine.configure_mapping(&rows, &MASTER).unwrap();
            assert_eq!(
                engine.configure_section(1, &rollback),
                Err(Error::InvalidParameter)
            );

            rows[1] = Some(RegionMapping {
                base: 0,
                size: RegionSize::from_bytes(2 * BLOCK_SIZE),
                enabled: true,
            });
            engine.configure_mapping(&rows, &MASTER).unwrap();
            assert!(engine.configure_section(1, &rollback).unwrap());
        });
    }

    #[test]
    fn digest_integrity_requires_a_digest() {
        harness(Caps::default(), |_| (), |engine| {
            engine.load_key(2, &KEY, true).unwrap();
            let update = SectionUpdate {
                policy: Some(Policy::DigestIntegrity.into()),
                digest: None,
                checksum: None,
                action: WriteAction::None,
                swap: false,
            };
            assert_eq!(
                engine.configure_section(2, &update),
                Err(Error::InvalidParameter)
            );
            assert!(engine
                .configure_section(
                    2,
                    &SectionUpdate {
                        digest: Some(0x1111),
                        ..update
                    },
                )
                .unwrap());
        });
    }

    #[test]
    fn size_ordering_rule() {
        let two = RegionSize::from_bytes(2 * BLOCK_SIZE).unwrap();
        let three = RegionSize::from_bytes(3 * BLOCK_SIZE).unwrap();
        // Unmapped regions take the size first.
        assert!(size_must_precede_policy(None, two));
        // Odd-sized now, power-of-two target: size first.
        assert!(size_must_precede_policy(Some(three), two));
        // Power-of-two now: policy may go first.
        assert!(!size_must_precede_policy(Some(two), two));
        // Odd target: policy may go first.
        assert!(!size_must_precede_policy(Some(three), three));
    }
}
