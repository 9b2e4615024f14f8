// Copyright lowRISC contributors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! The attestation CDI chain.
//!
//! Each boot stage's compound device identifier (CDI) binds the previous
//! stage's CDI to the measured contents of the region holding that stage.
//! Stage zero's CDI comes from the device itself; later stages are hashed
//! host-side from the previous CDI and the region's digest. The *recorded*
//! digest is only trustworthy when the region's policy makes the recording
//! tamper-evident; otherwise the device measures the region afresh for the
//! chain.

use crate::crypto::hash;
use crate::crypto::hash::EngineExt as _;
use crate::host::SecureFlash;
use crate::regs::Policy;
use crate::regs::Scr;
use crate::Error;

/// The length of one CDI.
pub const CDI_LEN: usize = 32;

/// The fixed length of the material hashed into a non-root CDI: the
/// previous CDI, the region digest, zero padding, and the region index.
const MATERIAL_LEN: usize = CDI_LEN + 8 + 14 + 1;

impl SecureFlash<'_> {
    /// Computes the CDI for the boot stage held in `region`.
    ///
    /// Region zero asks the device for the root CDI and takes no previous
    /// value; every other region extends `prev` with the region's digest.
    /// The digest on record is used when the region's policy protects it
    /// against rewriting (digest integrity plus write or rollback
    /// protection); otherwise the device recomputes the digest so the
    /// chain never attests unmeasured content. A protected region whose
    /// recorded digest is zero was never measured, and fails with
    /// `IncorrectState`.
    pub fn compute_cdi(
        &mut self,
        region: u8,
        prev: Option<&[u8; CDI_LEN]>,
    ) -> Result<[u8; CDI_LEN], Error> {
        self.gate()?;
        check!((region as usize) < self.region_slots(), Error::OutOfRange);

        if region == 0 {
            check!(prev.is_none(), Error::InvalidParameter);
            return self.channel.calc_cdi(0);
        }
        let prev = prev.ok_or_else(|| fail!(Error::InvalidParameter))?;

        let scr = Scr::from_bytes(&self.channel.get_scr(region)?)?;
        let trusted = scr.policy.contains(Policy::DigestIntegrity)
            && (scr.policy.contains(Policy::WriteProtect)
                || scr.policy.contains(Policy::RollbackProtect));
        let digest = if trusted {
            // A zero digest means "never measured".
            check!(scr.digest != 0, Error::IncorrectState);
            scr.digest
        } else {
            self.channel.calc_section_digest(region)?
        };

        let mut material = [0; MATERIAL_LEN];
        material[..CDI_LEN].copy_from_slice(prev);
        material[CDI_LEN..CDI_LEN + 8]
            .copy_from_slice(&digest.to_le_bytes());
        material[MATERIAL_LEN - 1] = region;

        let mut out = [0; CDI_LEN];
        self.hash
            .contiguous_hash(hash::Algo::Sha256, &material, &mut out)
            .map_err(|_| fail!(Error::SecurityError))?;
        Ok(out)
    }
}
