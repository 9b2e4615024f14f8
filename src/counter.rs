// Copyright lowRISC contributors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! Monotonic counter tracking.
//!
//! The device carries two monotonic counters: the transaction counter (TC),
//! which advances on every authenticated exchange, and the DMC, which
//! advances across device lifecycle events. The host keeps a local mirror of
//! both and must never let its TC mirror fall behind the device, or every
//! subsequent authenticated command would fail.
//!
//! The arithmetic here is deliberately pure; reading the counters back from
//! the device is the engine's job.

use crate::Error;

/// A mirror of the device's transaction and DMC counters.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
pub struct CounterPair {
    /// The transaction counter.
    pub tc: u32,
    /// The DMC lifecycle counter.
    pub dmc: u32,
}

/// Counter thresholds for the device family in use.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct CounterLimits {
    /// The maximum TC value; at this value the device is end-of-life for
    /// authenticated traffic.
    pub tc_max: u32,
    /// TC value past which the host should arrange a device reset, which
    /// lets the device fold TC progress into the DMC.
    pub tc_reset_threshold: u32,
    /// DMC value past which the device should be replaced.
    pub dmc_eol_threshold: u32,
}

impl Default for CounterLimits {
    fn default() -> Self {
        Self {
            tc_max: 0x3fff_ffff,
            tc_reset_threshold: 0x3fff_fff0,
            dmc_eol_threshold: 0x3fff_f000,
        }
    }
}

/// Maintenance advice derived from the counter state.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
pub struct Notifications {
    /// The device has flagged that counter maintenance is due.
    pub mc_maintenance: bool,
    /// The DMC has crossed its end-of-life threshold; plan replacement.
    pub replace_device: bool,
    /// The TC is close to its maximum; reset the device to fold TC into
    /// the DMC.
    pub reset_device: bool,
}

impl CounterPair {
    /// Consumes one TC use for an authenticated transaction.
    ///
    /// Fails with [`Error::CounterExhausted`] when the counter has reached
    /// `limits.tc_max`; the mirror is left unchanged so the failure is
    /// visible to retry logic.
    pub fn use_transaction(
        &mut self,
        limits: &CounterLimits,
    ) -> Result<(), Error> {
        check!(self.tc < limits.tc_max, Error::CounterExhausted);
        self.tc += 1;
        Ok(())
    }

    /// Evaluates maintenance advice for this counter state.
    ///
    /// `mc_maintenance` comes from the device's status register rather than
    /// the counters themselves, so the caller passes it through.
    pub fn notifications(
        &self,
        limits: &CounterLimits,
        mc_maintenance: bool,
    ) -> Notifications {
        Notifications {
            mc_maintenance,
            replace_device: self.dmc >= limits.dmc_eol_threshold,
            reset_device: self.tc >= limits.tc_reset_threshold,
        }
    }
}
