// Copyright lowRISC contributors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! `basilisk` is a host-side implementation of the security protocol spoken
//! by authenticated, encrypted serial flash devices ("secure flash").
//!
//! A secure flash device divides its storage into protected regions
//! ("sections"), each governed by an access policy and a pair of 128-bit
//! keys. The host drives the device through cryptographic sessions: it opens
//! a session against a key, performs configuration or data transfer, and
//! closes the session again. Replay protection comes from a pair of
//! monotonic counters that the host must keep in sync with the device.
//!
//! `basilisk` implements the host side of that protocol: the session state
//! machine, key management, versioned register configuration, chunked
//! authenticated data transfer, plain-access grant/revoke, and the key
//! provisioning handshake. It does *not* implement the raw bus transaction
//! codec, a network transport, or cryptographic primitives; those are
//! consumed through the traits in the [`cmd`] and [`crypto`] modules, so the
//! engine can run over SPI, QPI, or a remote relay alike.
//!
//! The top-level entry point is [`host::SecureFlash`], which composes a
//! [`cmd::Channel`] with the crypto collaborators and an owned device
//! context.

#![cfg_attr(
    not(any(test, feature = "std", feature = "arbitrary-derive")),
    no_std
)]
#![deny(missing_docs)]
#![deny(warnings)]
#![deny(unused)]
#![deny(unsafe_code)]

#[macro_use]
mod debug;

#[macro_use]
pub mod wire;

pub mod cmd;
pub mod counter;
pub mod crypto;
pub mod device;
pub mod error;
pub mod host;
pub mod keys;
pub mod net;
pub mod regs;

pub use error::Error;
