// Copyright lowRISC contributors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! Implementations of [`crate::crypto::csrng`] based on `ring`.

use ring::rand::SecureRandom as _;
use ring::rand::SystemRandom;

use crate::crypto::csrng;

/// A `ring`-based [`csrng::Csrng`], backed by the operating system's
/// entropy source.
pub struct Csrng {
    rng: SystemRandom,
}

impl Csrng {
    /// Creates a new `Csrng`.
    pub fn new() -> Self {
        Self {
            rng: SystemRandom::new(),
        }
    }
}

impl Default for Csrng {
    fn default() -> Self {
        Self::new()
    }
}

impl csrng::Csrng for Csrng {
    fn fill(&mut self, buf: &mut [u8]) -> Result<(), csrng::Error> {
        self.rng
            .fill(buf)
            .map_err(|_| fail!(csrng::Error::Unspecified))
    }

    fn reseed(&mut self) {
        // `SystemRandom` draws from the OS on every fill, so there is no
        // host-side state to discard; a fresh handle is still taken so a
        // cached-state implementation swapped in later keeps the contract.
        self.rng = SystemRandom::new();
    }
}
