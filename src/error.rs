// Copyright lowRISC contributors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! Engine error taxonomy.
//!
//! Every fallible operation in `basilisk` returns [`Error`]. The variants
//! are deliberately coarse: they describe what the *caller* can do about a
//! failure (retry after power-up, replace the device, fix the call), not
//! which internal step tripped.

use core::fmt;

/// An error produced by a secure flash operation.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Error {
    /// The device is powered down or suspended; the operation was skipped
    /// entirely. Not fatal: the caller may retry once the device is back up.
    CommandIgnored,

    /// The operation requires an open session, and none is open on the
    /// device.
    DeviceSessionError,

    /// A session is open, but it does not grant the access level the
    /// operation needs.
    DevicePrivilegeError,

    /// A protocol invariant was violated: opening an already-open session,
    /// closing a closed one, removing the key backing the open session.
    IncorrectState,

    /// The device reported a transient system error (typically "busy").
    /// Bounded automatic retry is applied where the protocol allows it;
    /// otherwise this surfaces to the caller.
    DeviceSystemError,

    /// A monotonic counter reached its maximum value. Fatal: the device has
    /// reached end-of-life and must be replaced. Never retryable.
    CounterExhausted,

    /// A register write did not read back bit-exact. Fatal for that write.
    CommandFailed,

    /// An integrity check over stored data or configuration failed.
    SecurityError,

    /// The device rejected the key used to authenticate an operation.
    AuthenticationError,

    /// The device flagged a section configuration as invalid during session
    /// open. Callers may elect to tolerate this warning when opening a
    /// session for the purpose of repairing the configuration.
    IntegrityError,

    /// A caller-supplied parameter was invalid (zero key, bad combination
    /// of policy flags, unsupported region).
    InvalidParameter,

    /// A caller-supplied index or size was out of its valid range.
    OutOfRange,

    /// The operation is not supported by this device's capabilities.
    NotSupported,
}

impl Error {
    /// Returns `true` if the error is fatal for the device itself, rather
    /// than for the single call that produced it.
    pub fn is_fatal(self) -> bool {
        matches!(self, Self::CounterExhausted)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let msg = match self {
            Self::CommandIgnored => "device powered down or suspended",
            Self::DeviceSessionError => "operation requires an open session",
            Self::DevicePrivilegeError => "session lacks required privilege",
            Self::IncorrectState => "protocol state invariant violated",
            Self::DeviceSystemError => "transient device system error",
            Self::CounterExhausted => "monotonic counter exhausted",
            Self::CommandFailed => "register write-back verification failed",
            Self::SecurityError => "integrity check failed",
            Self::AuthenticationError => "device authentication failed",
            Self::IntegrityError => "section configuration flagged invalid",
            Self::InvalidParameter => "invalid parameter",
            Self::OutOfRange => "parameter out of range",
            Self::NotSupported => "not supported by this device",
        };
        write!(f, "{}", msg)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}
