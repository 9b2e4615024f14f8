// Copyright lowRISC contributors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! Relay transport framing.
//!
//! When the command layer runs remotely (a relay process sitting next to
//! the flash, driven over a socket), requests and responses are framed with
//! the little-endian records defined here. This module provides only the
//! framing types; sockets, timeouts, and the relay loop itself live with
//! the integrator.

use byteorder::ByteOrder as _;
use byteorder::LittleEndian;
use zerocopy::AsBytes;
use zerocopy::FromBytes;

use crate::Error;

/// How long a relay client should wait for a response before declaring the
/// relay dead, in milliseconds.
///
/// Generous because a single secure command may cover a full region erase.
pub const RESPONSE_TIMEOUT_MS: u32 = 50_000;

wire_enum! {
    /// The type of a relay packet.
    pub enum PacketType: u16 {
        /// A client announcing itself to the relay.
        Register = 0x0001,
        /// The relay acknowledging a registration.
        RegisterResp = 0x0002,
        /// A client taking ownership of the device.
        Connect = 0x0003,
        /// A client releasing the device.
        Disconnect = 0x0004,
        /// A raw bus transaction (see [`crate::cmd::StandardBus`]).
        StdCmd = 0x0005,
        /// A secure command (see [`crate::cmd::Channel`]).
        SecCmd = 0x0006,
        /// The response to a `StdCmd` or `SecCmd`.
        CmdResp = 0x0007,
        /// An integrator-defined exchange.
        Custom = 0x0008,
    }
}

/// The length of an encoded [`PacketHeader`].
pub const PACKET_HEADER_LEN: usize = 4;

/// The frame header preceding every relay packet.
#[derive(Copy, Clone, PartialEq, Eq, Debug, AsBytes, FromBytes)]
#[repr(C)]
pub struct PacketHeader {
    /// The packet type, as a [`PacketType`] wire value.
    pub ty: u16,
    /// The length of the packet body, excluding this header.
    pub size: u16,
}

impl PacketHeader {
    /// Builds a header for a `ty` packet with a `size`-byte body.
    pub fn new(ty: PacketType, size: u16) -> Self {
        use crate::wire::WireEnum;
        Self {
            ty: ty.to_wire_value(),
            size,
        }
    }

    /// The header's packet type, if it is a known one.
    pub fn packet_type(&self) -> Result<PacketType, Error> {
        use crate::wire::WireEnum;
        PacketType::from_wire_value(self.ty)
            .ok_or_else(|| fail!(Error::OutOfRange))
    }

    /// Encodes into the 4-byte frame prefix.
    pub fn to_bytes(&self) -> [u8; PACKET_HEADER_LEN] {
        let mut out = [0; PACKET_HEADER_LEN];
        LittleEndian::write_u16(&mut out[0..2], self.ty);
        LittleEndian::write_u16(&mut out[2..4], self.size);
        out
    }

    /// Decodes from the 4-byte frame prefix.
    pub fn from_bytes(bytes: &[u8; PACKET_HEADER_LEN]) -> Self {
        Self {
            ty: LittleEndian::read_u16(&bytes[0..2]),
            size: LittleEndian::read_u16(&bytes[2..4]),
        }
    }
}

/// The length of an encoded [`ResponseHeader`].
pub const RESPONSE_HEADER_LEN: usize = 8;

/// The fixed prefix of every command response, ahead of any response data.
#[derive(Copy, Clone, PartialEq, Eq, Debug, AsBytes, FromBytes)]
#[repr(C)]
pub struct ResponseHeader {
    /// The relay-side status of the command: zero for success.
    pub status: u32,
    /// The device status register sampled after the command.
    pub ssr: u32,
}

impl ResponseHeader {
    /// Encodes into the 8-byte response prefix.
    pub fn to_bytes(&self) -> [u8; RESPONSE_HEADER_LEN] {
        let mut out = [0; RESPONSE_HEADER_LEN];
        LittleEndian::write_u32(&mut out[0..4], self.status);
        LittleEndian::write_u32(&mut out[4..8], self.ssr);
        out
    }

    /// Decodes from the 8-byte response prefix.
    pub fn from_bytes(bytes: &[u8; RESPONSE_HEADER_LEN]) -> Self {
        Self {
            status: LittleEndian::read_u32(&bytes[0..4]),
            ssr: LittleEndian::read_u32(&bytes[4..8]),
        }
    }
}
