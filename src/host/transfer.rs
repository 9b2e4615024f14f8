// Copyright lowRISC contributors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! Chunked data transfer.
//!
//! The device moves data in fixed-size pages; callers work in byte ranges
//! at arbitrary offsets. The splitting logic here is shared by the
//! authenticated and plain paths: an unaligned head goes through a staging
//! page, the aligned middle is handed to the command layer in bulk, and a
//! partial tail goes through staging again.
//!
//! Every transfer is bracketed in the device's multi-transaction mode for
//! its whole duration, and the bracket is closed on every exit path, error
//! included.

use crate::cmd::READ_PAGE;
use crate::cmd::WRITE_PAGE;
use crate::host::SecureFlash;
use crate::keys::KeyId;
use crate::keys::KeyKind;
use crate::regs::VAULT_REGION;
use crate::Error;

impl SecureFlash<'_> {
    /// Reads `out.len()` bytes from `region` at byte `offset` through the
    /// open session.
    ///
    /// Requires a session on one of `region`'s two session keys. An empty
    /// `out` is a no-op.
    pub fn secure_read(
        &mut self,
        region: u8,
        offset: u32,
        out: &mut [u8],
    ) -> Result<(), Error> {
        self.gate()?;
        self.check_transfer_bounds(region, offset, out.len())?;
        let kid = self
            .ctx
            .die()
            .keys
            .session_kid()
            .ok_or_else(|| fail!(Error::DeviceSessionError))?;
        let granted = kid.region == region
            && matches!(
                kid.kind,
                KeyKind::FullAccessRegion | KeyKind::RestrictedAccessRegion
            );
        check!(granted, Error::DevicePrivilegeError);
        if out.is_empty() {
            return Ok(());
        }

        self.channel.multi_transaction(true);
        let result = self.read_chunks(region, offset, true, out);
        self.channel.multi_transaction(false);
        result
    }

    /// Reads `out.len()` bytes from `region` at byte `offset` without a
    /// session, using the region's plain-access window.
    ///
    /// The device enforces the window; a region whose policy gates plain
    /// access behind a session grant fails with `DevicePrivilegeError`
    /// until [`SecureFlash::grant_plain_access`] has run.
    pub fn plain_read(
        &mut self,
        region: u8,
        offset: u32,
        out: &mut [u8],
    ) -> Result<(), Error> {
        self.gate()?;
        self.check_transfer_bounds(region, offset, out.len())?;
        if out.is_empty() {
            return Ok(());
        }

        self.channel.multi_transaction(true);
        let result = self.read_chunks(region, offset, false, out);
        self.channel.multi_transaction(false);
        result
    }

    /// Writes `data` to `region` at byte `offset` through the open
    /// session.
    ///
    /// Requires a full-access session on `region`. Partial pages are
    /// padded with the erased value (`0xff`), which leaves the bytes the
    /// caller did not name in their erased state. An empty `data` is a
    /// no-op.
    pub fn secure_write(
        &mut self,
        region: u8,
        offset: u32,
        data: &[u8],
    ) -> Result<(), Error> {
        self.gate()?;
        self.check_transfer_bounds(region, offset, data.len())?;
        let kid = self
            .ctx
            .die()
            .keys
            .session_kid()
            .ok_or_else(|| fail!(Error::DeviceSessionError))?;
        check!(
            kid == KeyId::full_access(region),
            Error::DevicePrivilegeError
        );
        if data.is_empty() {
            return Ok(());
        }

        self.channel.multi_transaction(true);
        let result = self.write_chunks(region, offset, data);
        self.channel.multi_transaction(false);
        result
    }

    fn check_transfer_bounds(
        &self,
        region: u8,
        offset: u32,
        len: usize,
    ) -> Result<(), Error> {
        check!((region as usize) < self.region_slots(), Error::OutOfRange);
        let end = offset as u64 + len as u64;
        match self.ctx.die().regions[region as usize].size {
            Some(size) => {
                check!(end <= size.in_bytes() as u64, Error::OutOfRange)
            }
            // The vault is not in the mapping table; its bounds are only
            // known to the device.
            None => check!(
                region == VAULT_REGION && self.caps.vault,
                Error::OutOfRange
            ),
        }
        Ok(())
    }

    fn read_chunks(
        &mut self,
        region: u8,
        mut offset: u32,
        authenticated: bool,
        out: &mut [u8],
    ) -> Result<(), Error> {
        let mut out = out;

        let head = offset as usize % READ_PAGE;
        if head != 0 {
            let mut staging = [0; READ_PAGE];
            self.channel.read_page(
                region,
                offset - head as u32,
                authenticated,
                &mut staging,
            )?;
            let n = out.len().min(READ_PAGE - head);
            let rest = {
                let (chunk, rest) = out.split_at_mut(n);
                chunk.copy_from_slice(&staging[head..head + n]);
                rest
            };
            out = rest;
            offset += n as u32;
        }

        let bulk = out.len() - out.len() % READ_PAGE;
        if bulk > 0 {
            let (mid, rest) = out.split_at_mut(bulk);
            self.channel.read_pages(region, offset, authenticated, mid)?;
            out = rest;
            offset += bulk as u32;
        }

        if !out.is_empty() {
            let mut staging = [0; READ_PAGE];
            self.channel.read_page(
                region,
                offset,
                authenticated,
                &mut staging,
            )?;
            let n = out.len();
            out.copy_from_slice(&staging[..n]);
        }
        Ok(())
    }

    fn write_chunks(
        &mut self,
        region: u8,
        mut offset: u32,
        mut data: &[u8],
    ) -> Result<(), Error> {
        let head = offset as usize % WRITE_PAGE;
        if head != 0 {
            let mut staging = [0xff; WRITE_PAGE];
            let n = data.len().min(WRITE_PAGE - head);
            staging[head..head + n].copy_from_slice(&data[..n]);
            self.channel.write_page(
                region,
                offset - head as u32,
                &staging,
            )?;
            data = &data[n..];
            offset += n as u32;
        }

        while data.len() >= WRITE_PAGE {
            let mut page = [0; WRITE_PAGE];
            page.copy_from_slice(&data[..WRITE_PAGE]);
            self.channel.write_page(region, offset, &page)?;
            data = &data[WRITE_PAGE..];
            offset += WRITE_PAGE as u32;
        }

        if !data.is_empty() {
            let mut staging = [0xff; WRITE_PAGE];
            staging[..data.len()].copy_from_slice(data);
            self.channel.write_page(region, offset, &staging)?;
        }
        Ok(())
    }
}
