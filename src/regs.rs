// Copyright lowRISC contributors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! Versioned configuration registers.
//!
//! The device exposes three writable configuration registers: the global
//! device register (GMC), the global region-mapping table (GMT), and one
//! section configuration register (SCR) per protected region. Each carries
//! a version field that the device increments on every accepted write; the
//! engine relies on that to detect lost or reordered writes.
//!
//! On the wire each register is a fixed-size little-endian record. The
//! structs here decode those records into typed fields and re-encode them
//! bit-exactly, which is what the write-then-read-back verification in
//! [`crate::host`] compares.

use byteorder::ByteOrder as _;
use byteorder::LittleEndian;
use enumflags2::bitflags;
use enumflags2::BitFlags;
use zerocopy::AsBytes;
use zerocopy::FromBytes;

use crate::Error;

/// The number of protected regions on a die, excluding the vault.
pub const NUM_REGIONS: usize = 8;

/// The region index of the vault, on devices that have one.
pub const VAULT_REGION: u8 = NUM_REGIONS as u8;

/// The base unit of region sizing, in bytes.
pub const BLOCK_SIZE: u32 = 64 * 1024;

/// The encoded length of an [`Scr`] record.
pub const SCR_LEN: usize = 20;

/// The encoded length of a [`Gmc`] record.
pub const GMC_LEN: usize = 20;

/// The encoded length of a [`Gmt`] record.
pub const GMT_LEN: usize = 4 + 8 * NUM_REGIONS;

/// An encoded [`Scr`] as it crosses the command layer.
pub type ScrBytes = [u8; SCR_LEN];

/// An encoded [`Gmc`] as it crosses the command layer.
pub type GmcBytes = [u8; GMC_LEN];

/// An encoded [`Gmt`] as it crosses the command layer.
pub type GmtBytes = [u8; GMT_LEN];

/// The "register has never been written" version marker.
pub const VERSION_UNSET: u32 = 0xffff_ffff;

/// Computes the version a register must carry after a mutating write.
///
/// Versions increment on every accepted write and wrap to 0, with the
/// special case that [`VERSION_UNSET`] marks a never-written register and
/// its first write produces version 0.
pub fn next_version(old: u32) -> u32 {
    if old == VERSION_UNSET {
        0
    } else {
        old.wrapping_add(1)
    }
}

/// A per-region access policy.
///
/// Stored in the low bits of the SCR policy halfword.
#[bitflags]
#[repr(u16)]
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Policy {
    /// The region's 64-bit digest is integrity-protecting its contents.
    DigestIntegrity = 1 << 0,
    /// The region's CRC is integrity-protecting its contents.
    ChecksumIntegrity = 1 << 1,
    /// The region is write-protected.
    WriteProtect = 1 << 2,
    /// The region is rollback-protected.
    RollbackProtect = 1 << 3,
    /// Plain (sessionless) reads are enabled.
    PlainReadEn = 1 << 4,
    /// Plain (sessionless) writes are enabled.
    PlainWriteEn = 1 << 5,
    /// Plain access must be explicitly granted through an authenticated
    /// session before use.
    AuthPlainAccess = 1 << 6,
    /// The digest is re-verified on every access, not just at boot.
    DigestIntegrityOnAccess = 1 << 7,
    /// The region is a secure log (append-only write discipline).
    SecureLog = 1 << 8,
}

/// A set of [`Policy`] bits.
pub type PolicyFlags = BitFlags<Policy>;

/// A region size, encoded the way the mapping table stores it: a block
/// count minus one ("tag") and a power-of-two multiplier on the block size
/// ("scale").
///
/// Decoded, the size is `(tag + 1) * (BLOCK_SIZE << scale)` bytes.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct RegionSize {
    /// Block count minus one. At most 15.
    pub tag: u8,
    /// log2 multiplier on [`BLOCK_SIZE`]. At most 7.
    pub scale: u8,
}

impl RegionSize {
    const TAG_MAX: u8 = 15;
    const SCALE_MAX: u8 = 7;

    /// Encodes a byte length as a tag/scale pair, preferring the smallest
    /// scale that fits. Returns `None` for zero or inexpressible lengths.
    pub fn from_bytes(len: u32) -> Option<Self> {
        if len == 0 {
            return None;
        }
        for scale in 0..=Self::SCALE_MAX {
            let unit = BLOCK_SIZE << scale;
            if len % unit == 0 {
                let blocks = len / unit;
                if blocks <= Self::TAG_MAX as u32 + 1 {
                    return Some(Self {
                        tag: (blocks - 1) as u8,
                        scale,
                    });
                }
            }
        }
        None
    }

    /// Decodes back to a byte length.
    pub fn in_bytes(self) -> u32 {
        (self.tag as u32 + 1) * (BLOCK_SIZE << self.scale)
    }

    /// Returns `true` if the block count is a power of two.
    ///
    /// Rollback protection requires a power-of-two block count, and the
    /// ordering of policy-vs-size writes during provisioning turns on this
    /// property of the *current* size.
    pub fn power_of_two_blocks(self) -> bool {
        self.tag & (self.tag + 1) == 0
    }
}

/// One row of the global mapping table.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct RegionMapping {
    /// Byte address of the region's base within the die.
    pub base: u32,
    /// The region's size; `None` for a zero-length (unmapped) region.
    pub size: Option<RegionSize>,
    /// Whether the region is enabled.
    pub enabled: bool,
}

impl RegionMapping {
    /// An unmapped, disabled region.
    pub const UNMAPPED: Self = Self {
        base: 0,
        size: None,
        enabled: false,
    };
}

/// A section configuration register.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct Scr {
    /// Write version.
    pub version: u32,
    /// CRC over the region contents, if checksum integrity is in use.
    pub checksum: u32,
    /// 64-bit digest over the region contents, if digest integrity is in
    /// use.
    pub digest: u64,
    /// The region's access policy.
    pub policy: PolicyFlags,
}

impl Scr {
    /// Encodes into the wire record.
    pub fn to_bytes(&self) -> ScrBytes {
        let mut out = [0; SCR_LEN];
        LittleEndian::write_u32(&mut out[0..4], self.version);
        LittleEndian::write_u32(&mut out[4..8], self.checksum);
        LittleEndian::write_u64(&mut out[8..16], self.digest);
        LittleEndian::write_u16(&mut out[16..18], self.policy.bits());
        out
    }

    /// Decodes from the wire record.
    pub fn from_bytes(bytes: &ScrBytes) -> Result<Self, Error> {
        let policy = PolicyFlags::from_bits(LittleEndian::read_u16(
            &bytes[16..18],
        ))
        .map_err(|_| fail!(Error::OutOfRange))?;
        Ok(Self {
            version: LittleEndian::read_u32(&bytes[0..4]),
            checksum: LittleEndian::read_u32(&bytes[4..8]),
            digest: LittleEndian::read_u64(&bytes[8..16]),
            policy,
        })
    }
}

wire_enum! {
    /// The watchdog expiry threshold.
    pub enum WatchdogThreshold: u8 {
        /// One second.
        Seconds1 = 0x00,
        /// Sixteen seconds.
        Seconds16 = 0x01,
        /// Sixty-four seconds.
        Seconds64 = 0x02,
        /// Four minutes.
        Minutes4 = 0x03,
        /// Sixteen minutes.
        Minutes16 = 0x04,
        /// One hour.
        Hours1 = 0x05,
        /// Four hours.
        Hours4 = 0x06,
        /// Sixteen hours.
        Hours16 = 0x07,
        /// Three days.
        Days3 = 0x08,
        /// Twelve days.
        Days12 = 0x09,
    }
}

wire_enum! {
    /// The flash addressing mode.
    pub enum AddressMode: u8 {
        /// Three-byte (24-bit) addressing.
        ThreeByte = 0x00,
        /// Four-byte (32-bit) addressing.
        FourByte = 0x01,
    }
}

wire_enum! {
    /// The function of the device's multiplexed auxiliary pin.
    pub enum PinMux: u8 {
        /// Legacy write-protect / hold behavior.
        Legacy = 0x00,
        /// Quad-I/O data line.
        QuadEnable = 0x01,
        /// Reset-output signal.
        ResetOut = 0x02,
    }
}

wire_enum! {
    /// How the device responds to a host reset indication.
    pub enum ResetResponse: u8 {
        /// Reset indications are ignored.
        Disabled = 0x00,
        /// The device resets with the host.
        Standard = 0x01,
        /// The device answers "up and running" polls during host reset.
        UpAndRunning = 0x02,
    }
}

/// The watchdog portion of the global device register.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct WatchdogConfig {
    /// Whether the watchdog runs.
    pub enable: bool,
    /// Whether the watchdog configuration is locked until reset.
    pub lock: bool,
    /// Whether touching the watchdog requires an authenticated session.
    pub authenticated: bool,
    /// Whether expiry triggers a software reset (rather than a full
    /// power cycle).
    pub sw_reset: bool,
    /// Expiry threshold.
    pub threshold: WatchdogThreshold,
    /// The region whose key authenticates watchdog touches.
    pub section: u8,
    /// Calibrated rate of the low-frequency oscillator, in Hz.
    pub osc_rate_hz: u32,
}

/// The device-settings portion of the global device register.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct DeviceConfig {
    /// Flash addressing mode.
    pub address_mode: AddressMode,
    /// Auxiliary pin function.
    pub pin_mux: PinMux,
    /// Reset-indication response policy.
    pub reset_response: ResetResponse,
    /// Whether legacy (non-secure) format commands are accepted.
    pub non_secure_format_en: bool,
}

/// The global device configuration register.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct Gmc {
    /// Write version.
    pub version: u32,
    /// Watchdog defaults.
    pub watchdog: WatchdogConfig,
    /// Device-level settings.
    pub device: DeviceConfig,
}

impl Gmc {
    /// Encodes into the wire record.
    pub fn to_bytes(&self) -> GmcBytes {
        use crate::wire::WireEnum;

        let mut out = [0; GMC_LEN];
        LittleEndian::write_u32(&mut out[0..4], self.version);
        let w = &self.watchdog;
        out[4] = (w.enable as u8)
            | (w.lock as u8) << 1
            | (w.authenticated as u8) << 2
            | (w.sw_reset as u8) << 3;
        out[5] = w.threshold.to_wire_value();
        out[6] = w.section;
        LittleEndian::write_u32(&mut out[8..12], w.osc_rate_hz);
        let d = &self.device;
        out[12] = d.address_mode.to_wire_value();
        out[13] = d.pin_mux.to_wire_value();
        out[14] = d.reset_response.to_wire_value();
        out[15] = d.non_secure_format_en as u8;
        out
    }

    /// Decodes from the wire record.
    pub fn from_bytes(bytes: &GmcBytes) -> Result<Self, Error> {
        use crate::wire::WireEnum;

        let threshold = WatchdogThreshold::from_wire_value(bytes[5])
            .ok_or_else(|| fail!(Error::OutOfRange))?;
        let address_mode = AddressMode::from_wire_value(bytes[12])
            .ok_or_else(|| fail!(Error::OutOfRange))?;
        let pin_mux = PinMux::from_wire_value(bytes[13])
            .ok_or_else(|| fail!(Error::OutOfRange))?;
        let reset_response = ResetResponse::from_wire_value(bytes[14])
            .ok_or_else(|| fail!(Error::OutOfRange))?;
        Ok(Self {
            version: LittleEndian::read_u32(&bytes[0..4]),
            watchdog: WatchdogConfig {
                enable: bytes[4] & 1 != 0,
                lock: bytes[4] & 2 != 0,
                authenticated: bytes[4] & 4 != 0,
                sw_reset: bytes[4] & 8 != 0,
                threshold,
                section: bytes[6],
                osc_rate_hz: LittleEndian::read_u32(&bytes[8..12]),
            },
            device: DeviceConfig {
                address_mode,
                pin_mux,
                reset_response,
                non_secure_format_en: bytes[15] != 0,
            },
        })
    }
}

/// The global mapping table.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct Gmt {
    /// Write version, shared by all rows.
    pub version: u32,
    /// One row per region.
    pub regions: [RegionMapping; NUM_REGIONS],
}

impl Gmt {
    /// Encodes into the wire record.
    pub fn to_bytes(&self) -> GmtBytes {
        let mut out = [0; GMT_LEN];
        LittleEndian::write_u32(&mut out[0..4], self.version);
        for (i, r) in self.regions.iter().enumerate() {
            let row = &mut out[4 + i * 8..12 + i * 8];
            LittleEndian::write_u32(&mut row[0..4], r.base);
            match r.size {
                Some(size) => {
                    row[4] = size.tag;
                    row[5] = size.scale;
                }
                // An unmapped row stores the all-ones tag.
                None => row[4] = 0xff,
            }
            row[6] = r.enabled as u8;
        }
        out
    }

    /// Decodes from the wire record.
    pub fn from_bytes(bytes: &GmtBytes) -> Result<Self, Error> {
        let mut regions = [RegionMapping::UNMAPPED; NUM_REGIONS];
        for (i, r) in regions.iter_mut().enumerate() {
            let row = &bytes[4 + i * 8..12 + i * 8];
            let size = match row[4] {
                0xff => None,
                tag => {
                    check!(tag <= RegionSize::TAG_MAX, Error::OutOfRange);
                    check!(
                        row[5] <= RegionSize::SCALE_MAX,
                        Error::OutOfRange
                    );
                    Some(RegionSize {
                        tag,
                        scale: row[5],
                    })
                }
            };
            *r = RegionMapping {
                base: LittleEndian::read_u32(&row[0..4]),
                size,
                enabled: row[6] != 0,
            };
        }
        Ok(Self {
            version: LittleEndian::read_u32(&bytes[0..4]),
            regions,
        })
    }
}

/// A snapshot of the device's secure status register.
#[derive(
    Copy, Clone, PartialEq, Eq, Debug, Default, AsBytes, FromBytes,
)]
#[repr(transparent)]
pub struct Ssr(pub u32);

impl Ssr {
    const BUSY: u32 = 1 << 0;
    const SESSION_READY: u32 = 1 << 1;
    const SESSION_OPEN: u32 = 1 << 2;
    const MC_MAINTENANCE: u32 = 1 << 3;
    const INTEGRITY_ERR: u32 = 1 << 4;
    const AUTH_ERR: u32 = 1 << 5;
    const SYSTEM_ERR: u32 = 1 << 6;
    const POWERED_DOWN: u32 = 1 << 7;

    /// The device is busy with a previous command.
    pub fn busy(self) -> bool {
        self.0 & Self::BUSY != 0
    }

    /// The device is ready to open (or continue) a session.
    pub fn session_ready(self) -> bool {
        self.0 & Self::SESSION_READY != 0
    }

    /// A session is open on the device.
    pub fn session_open(self) -> bool {
        self.0 & Self::SESSION_OPEN != 0
    }

    /// Counter maintenance is due.
    pub fn mc_maintenance(self) -> bool {
        self.0 & Self::MC_MAINTENANCE != 0
    }

    /// The last command tripped an integrity check.
    pub fn integrity_err(self) -> bool {
        self.0 & Self::INTEGRITY_ERR != 0
    }

    /// The last command failed authentication.
    pub fn auth_err(self) -> bool {
        self.0 & Self::AUTH_ERR != 0
    }

    /// The device reported an internal system error.
    pub fn system_err(self) -> bool {
        self.0 & Self::SYSTEM_ERR != 0
    }

    /// The device is in its power-down state.
    pub fn powered_down(self) -> bool {
        self.0 & Self::POWERED_DOWN != 0
    }

    /// Builder-style bit setter, for tests and fakes.
    pub fn with(self, bit: SsrBit, value: bool) -> Self {
        let mask = match bit {
            SsrBit::Busy => Self::BUSY,
            SsrBit::SessionReady => Self::SESSION_READY,
            SsrBit::SessionOpen => Self::SESSION_OPEN,
            SsrBit::McMaintenance => Self::MC_MAINTENANCE,
            SsrBit::IntegrityErr => Self::INTEGRITY_ERR,
            SsrBit::AuthErr => Self::AUTH_ERR,
            SsrBit::SystemErr => Self::SYSTEM_ERR,
            SsrBit::PoweredDown => Self::POWERED_DOWN,
        };
        if value {
            Self(self.0 | mask)
        } else {
            Self(self.0 & !mask)
        }
    }
}

/// Names of the individual [`Ssr`] bits, for [`Ssr::with`].
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum SsrBit {
    /// See [`Ssr::busy`].
    Busy,
    /// See [`Ssr::session_ready`].
    SessionReady,
    /// See [`Ssr::session_open`].
    SessionOpen,
    /// See [`Ssr::mc_maintenance`].
    McMaintenance,
    /// See [`Ssr::integrity_err`].
    IntegrityErr,
    /// See [`Ssr::auth_err`].
    AuthErr,
    /// See [`Ssr::system_err`].
    SystemErr,
    /// See [`Ssr::powered_down`].
    PoweredDown,
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn version_rule() {
        assert_eq!(next_version(0), 1);
        assert_eq!(next_version(41), 42);
        assert_eq!(next_version(VERSION_UNSET), 0);
        // The wrap lands on 0, same as the first write.
        assert_eq!(next_version(0xffff_fffe), 0xffff_ffff);
        assert_eq!(next_version(next_version(0xffff_fffe)), 0);
    }

    #[test]
    fn size_tag_round_trip() {
        for len in [
            BLOCK_SIZE,
            2 * BLOCK_SIZE,
            3 * BLOCK_SIZE,
            16 * BLOCK_SIZE,
            64 * BLOCK_SIZE,
            1024 * BLOCK_SIZE,
        ] {
            let size = RegionSize::from_bytes(len).unwrap();
            assert_eq!(size.in_bytes(), len, "len = {:#x}", len);
        }
        assert_eq!(RegionSize::from_bytes(0), None);
        assert_eq!(RegionSize::from_bytes(BLOCK_SIZE / 2), None);
        assert_eq!(RegionSize::from_bytes(BLOCK_SIZE + 1), None);
    }

    #[test]
    fn power_of_two_blocks() {
        assert!(RegionSize::from_bytes(BLOCK_SIZE)
            .unwrap()
            .power_of_two_blocks());
        assert!(RegionSize::from_bytes(4 * BLOCK_SIZE)
            .unwrap()
            .power_of_two_blocks());
        assert!(!RegionSize::from_bytes(3 * BLOCK_SIZE)
            .unwrap()
            .power_of_two_blocks());
    }

    #[test]
    fn scr_codec() {
        let scr = Scr {
            version: 7,
            checksum: 0xdead_beef,
            digest: 0x0123_4567_89ab_cdef,
            policy: Policy::DigestIntegrity | Policy::WriteProtect,
        };
        let bytes = scr.to_bytes();
        assert_eq!(Scr::from_bytes(&bytes), Ok(scr));

        let mut bad = bytes;
        // An undefined policy bit must not decode.
        bad[17] |= 0x80;
        assert_eq!(Scr::from_bytes(&bad), Err(Error::OutOfRange));
    }

    #[test]
    fn gmc_codec() {
        let gmc = Gmc {
            version: VERSION_UNSET,
            watchdog: WatchdogConfig {
                enable: true,
                lock: false,
                authenticated: true,
                sw_reset: false,
                threshold: WatchdogThreshold::Minutes4,
                section: 2,
                osc_rate_hz: 32_768,
            },
            device: DeviceConfig {
                address_mode: AddressMode::FourByte,
                pin_mux: PinMux::QuadEnable,
                reset_response: ResetResponse::Standard,
                non_secure_format_en: false,
            },
        };
        assert_eq!(Gmc::from_bytes(&gmc.to_bytes()), Ok(gmc));
    }

    #[test]
    fn gmt_codec() {
        let mut gmt = Gmt {
            version: 1,
            regions: [RegionMapping::UNMAPPED; NUM_REGIONS],
        };
        gmt.regions[0] = RegionMapping {
            base: 0,
            size: RegionSize::from_bytes(4 * BLOCK_SIZE),
            enabled: true,
        };
        gmt.regions[3] = RegionMapping {
            base: 4 * BLOCK_SIZE,
            size: RegionSize::from_bytes(3 * BLOCK_SIZE),
            enabled: false,
        };
        assert_eq!(Gmt::from_bytes(&gmt.to_bytes()), Ok(gmt));
    }

    #[test]
    fn ssr_bits() {
        let ssr = Ssr::default()
            .with(SsrBit::Busy, true)
            .with(SsrBit::SessionOpen, true)
            .with(SsrBit::Busy, false);
        assert!(!ssr.busy());
        assert!(ssr.session_open());
        assert!(!ssr.auth_err());
    }
}
