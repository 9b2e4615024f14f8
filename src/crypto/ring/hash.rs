// Copyright lowRISC contributors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! Implementations of [`crate::crypto::hash`] based on `ring`.

use core::mem;

use ring::digest;

use crate::crypto::hash;

/// A `ring`-based [`hash::Engine`].
pub struct Engine {
    inner: Option<digest::Context>,
}

impl Engine {
    /// Creates a new `Engine`.
    pub fn new() -> Self {
        Self { inner: None }
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl hash::Engine for Engine {
    fn supports(&mut self, _: hash::Algo) -> bool {
        true
    }

    fn start_raw(&mut self, algo: hash::Algo) -> Result<(), hash::Error> {
        self.inner = Some(digest::Context::new(match algo {
            hash::Algo::Sha256 => &digest::SHA256,
        }));
        Ok(())
    }

    fn write_raw(&mut self, data: &[u8]) -> Result<(), hash::Error> {
        match &mut self.inner {
            None => Err(fail!(hash::Error::Idle)),
            Some(c) => {
                c.update(data);
                Ok(())
            }
        }
    }

    fn finish_raw(&mut self, out: &mut [u8]) -> Result<(), hash::Error> {
        match mem::replace(&mut self.inner, None) {
            None => Err(fail!(hash::Error::Idle)),
            Some(c) => {
                check!(
                    out.len() == c.algorithm().output_len,
                    hash::Error::WrongSize
                );
                let digest = c.finish();
                out.copy_from_slice(digest.as_ref());
                Ok(())
            }
        }
    }
}
