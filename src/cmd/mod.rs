// Copyright lowRISC contributors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! Command-layer contracts.
//!
//! The engine drives the device through two traits it does not implement:
//! [`StandardBus`], the raw flash command interface (legacy reads, status
//! polls), and [`Channel`], the secure command set. A `Channel` impl owns
//! command encoding, MAC computation, and busy-polling; the engine owns
//! everything above that: session bookkeeping, versioning, retry, and
//! chunking.
//!
//! Both traits are object-safe, and the engine holds them as `&mut dyn`, so
//! an implementation may live behind a SPI controller, a QPI controller, or
//! a remote relay that forwards commands over a socket (see [`crate::net`]
//! for the framing types such a relay uses).

use crate::counter::CounterPair;
use crate::keys::Key;
use crate::regs::GmcBytes;
use crate::regs::GmtBytes;
use crate::regs::ScrBytes;
use crate::regs::Ssr;
use crate::Error;

#[cfg(test)]
pub mod fake;

/// The size of one secure read page, in bytes.
pub const READ_PAGE: usize = 32;

/// The size of one secure write page, in bytes.
pub const WRITE_PAGE: usize = 32;

wire_enum! {
    /// The electrical format of a bus transaction.
    pub enum BusFormat: u8 {
        /// Single-line SPI.
        Spi = 0x00,
        /// Quad-line data, single-line command.
        Quad = 0x01,
        /// Quad-line command and data.
        Qpi = 0x02,
        /// Octal command and data.
        Opi = 0x03,
    }
}

wire_enum! {
    /// Which plain-access grants a revoke removes.
    pub enum RevokeType: u8 {
        /// Revoke both read and write access.
        All = 0x00,
        /// Revoke write access only.
        WriteOnly = 0x01,
    }
}

wire_enum! {
    /// What the device should do after accepting a section-register write.
    pub enum WriteAction: u8 {
        /// Nothing; the new configuration takes effect lazily.
        None = 0x00,
        /// Reload the section's configuration without rebooting.
        Reload = 0x01,
        /// Reboot the device so the configuration takes effect globally.
        Reset = 0x02,
    }
}

/// One raw flash bus transaction, as handed to a [`StandardBus`].
///
/// The engine fills in protocol-level fields only; electrical details like
/// dummy-cycle counts are chosen by whoever builds the `Transaction`, and
/// pass through the engine untouched.
#[derive(Clone, Debug)]
pub struct Transaction<'a> {
    /// Bus format to issue the transaction in.
    pub format: BusFormat,
    /// The command opcode.
    pub cmd: u8,
    /// The command's address field, if it has one.
    pub address: Option<u32>,
    /// Dummy cycles between address and data phases.
    pub dummy_cycles: u32,
    /// Data to transmit after the address phase.
    pub write_data: &'a [u8],
    /// Whether a write-enable command must precede this transaction.
    pub need_write_enable: bool,
    /// Whether to poll the legacy busy bit to completion afterwards.
    pub wait_while_busy: bool,
}

/// The raw flash command interface.
pub trait StandardBus {
    /// Issues `txn`, reading any response data into `out`.
    ///
    /// Returns the secure status register snapshot sampled after the
    /// transaction completes.
    fn send(
        &mut self,
        txn: &Transaction,
        out: &mut [u8],
    ) -> Result<Ssr, Error>;
}
impl dyn StandardBus {} // Ensure object-safe.

/// Provisioning status of the device's key slots, as reported by the
/// device.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
pub struct KeysStatus {
    /// Bit `n`: region `n`'s full-access key differs from factory default.
    pub full_access: u16,
    /// Bit `n`: region `n`'s restricted key differs from factory default.
    pub restricted: u16,
    /// The device master key is provisioned.
    pub device_master: bool,
    /// The device secret key is provisioned.
    pub device_secret: bool,
}

/// The secure command set.
///
/// Every method maps to one device command. Implementations report device
/// status through errors ([`Error::AuthenticationError`],
/// [`Error::DeviceSystemError`], ...) and must keep [`Channel::last_ssr`]
/// pointing at the most recent status snapshot, which the engine's retry
/// logic inspects.
pub trait Channel {
    /// Reads the secure status register.
    fn get_ssr(&mut self) -> Result<Ssr, Error>;

    /// Reads the device's monotonic counter pair.
    fn sync_mc(&mut self) -> Result<CounterPair, Error>;

    /// Opens a session under the key slot `kid`, authenticating with
    /// `key`.
    ///
    /// On an accepted open the returned SSR may still carry the
    /// integrity-error bit, meaning the device considers the section's
    /// configuration invalid; whether that is tolerable is the caller's
    /// decision.
    fn session_open(&mut self, kid: u8, key: &Key) -> Result<Ssr, Error>;

    /// Closes the open session, optionally revoking the section's plain
    /// access window as part of the close.
    fn session_close(&mut self, revoke_plain_access: bool)
        -> Result<(), Error>;

    /// Reads the global device register.
    fn get_gmc(&mut self) -> Result<GmcBytes, Error>;

    /// Writes the global device register. Requires a device-master
    /// session.
    fn set_gmc(&mut self, gmc: &GmcBytes) -> Result<(), Error>;

    /// Reads the global mapping table.
    fn get_gmt(&mut self) -> Result<GmtBytes, Error>;

    /// Writes the global mapping table. Requires a device-master session.
    fn set_gmt(&mut self, gmt: &GmtBytes) -> Result<(), Error>;

    /// Reads a section configuration register.
    fn get_scr(&mut self, region: u8) -> Result<ScrBytes, Error>;

    /// Writes a section configuration register. Requires a full-access
    /// session on `region`.
    fn set_scr(
        &mut self,
        region: u8,
        scr: &ScrBytes,
        action: WriteAction,
    ) -> Result<(), Error>;

    /// Like [`Channel::set_scr`], but atomically swaps the section's two
    /// storage halves as the register is written.
    fn set_scr_swap(
        &mut self,
        region: u8,
        scr: &ScrBytes,
        action: WriteAction,
    ) -> Result<(), Error>;

    /// Programs key slot `kid`. Requires a session under the slot's
    /// provisioning key.
    fn set_key(&mut self, kid: u8, key: &Key) -> Result<(), Error>;

    /// Reads the key-slot provisioning status record.
    fn get_keys_status(&mut self) -> Result<KeysStatus, Error>;

    /// Issues the native plain-access grant for the section owning key
    /// slot `kid`.
    fn pa_grant(&mut self, kid: u8) -> Result<(), Error>;

    /// Issues the native plain-access revoke for `region`.
    fn pa_revoke(
        &mut self,
        region: u8,
        revoke: RevokeType,
    ) -> Result<(), Error>;

    /// Marks `region`'s plain-access window not-granted at the device,
    /// without a session. Substitute for revoke-via-close on devices that
    /// cannot close sessions.
    fn init_section_pa(&mut self, region: u8) -> Result<(), Error>;

    /// Reads one page from `region` at `offset` (bytes from region base).
    ///
    /// `authenticated` selects MAC'd reads; otherwise the read is
    /// plain-secure and subject to the region's plain-access window.
    fn read_page(
        &mut self,
        region: u8,
        offset: u32,
        authenticated: bool,
        out: &mut [u8; READ_PAGE],
    ) -> Result<(), Error>;

    /// Bulk form of [`Channel::read_page`]: reads `out.len() / READ_PAGE`
    /// consecutive pages. `out` must be a page multiple.
    fn read_pages(
        &mut self,
        region: u8,
        offset: u32,
        authenticated: bool,
        out: &mut [u8],
    ) -> Result<(), Error>;

    /// Programs one page into `region` at `offset`. Requires a
    /// full-access session.
    fn write_page(
        &mut self,
        region: u8,
        offset: u32,
        page: &[u8; WRITE_PAGE],
    ) -> Result<(), Error>;

    /// Reads the secure user id.
    fn get_suid(&mut self) -> Result<[u8; 16], Error>;

    /// Writes the secure user id. Requires a device-master session.
    fn set_suid(&mut self, suid: &[u8; 16]) -> Result<(), Error>;

    /// Reads the raw watchdog configuration register.
    fn get_watchdog(&mut self) -> Result<u32, Error>;

    /// Writes the raw watchdog configuration register.
    fn set_watchdog(&mut self, value: u32) -> Result<(), Error>;

    /// Asks the device to compute the 64-bit digest over `region`'s
    /// current contents.
    fn calc_section_digest(&mut self, region: u8) -> Result<u64, Error>;

    /// Asks the device to verify `region`'s CRC against its section
    /// register. Fails with [`Error::SecurityError`] on mismatch.
    fn verify_section_crc(&mut self, region: u8) -> Result<(), Error>;

    /// Runs the device's native CDI computation for `region`.
    fn calc_cdi(&mut self, region: u8) -> Result<[u8; 32], Error>;

    /// Hints that the following commands belong to one logical operation,
    /// so the transport may batch physical transactions. Purely advisory.
    fn multi_transaction(&mut self, active: bool);

    /// Resets the device.
    fn reset_device(&mut self) -> Result<(), Error>;

    /// Routes subsequent commands to logical die `die`.
    fn select_die(&mut self, die: u8) -> Result<(), Error>;

    /// The status snapshot sampled by the most recent command.
    fn last_ssr(&self) -> Ssr;
}
impl dyn Channel {} // Ensure object-safe.
