//! Domains and scalability patterns.
//!
//! Numbers match the values used on the wire in the SP protocol header, so a
//! `SocketType` can be sent and checked during the connection handshake.

use std::fmt;

/// Full-featured sockets.
pub const AF_SP: i32 = 1;
/// Raw sockets, used to build devices.
pub const AF_SP_RAW: i32 = 2;

pub const PAIR: i32 = 16;
pub const PUB: i32 = 32;
pub const SUB: i32 = 33;
pub const REQ: i32 = 48;
pub const REP: i32 = 49;
pub const PUSH: i32 = 80;
pub const PULL: i32 = 81;
pub const SURVEYOR: i32 = 98;
pub const RESPONDENT: i32 = 99;
pub const BUS: i32 = 112;

/// Socket domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Domain {
    /// Cooked socket implementing the full pattern state machine
    Sp,
    /// Raw socket exposing protocol headers
    SpRaw,
}

impl Domain {
    #[must_use]
    pub const fn from_i32(domain: i32) -> Option<Self> {
        match domain {
            AF_SP => Some(Self::Sp),
            AF_SP_RAW => Some(Self::SpRaw),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_i32(self) -> i32 {
        match self {
            Self::Sp => AF_SP,
            Self::SpRaw => AF_SP_RAW,
        }
    }

    #[inline]
    #[must_use]
    pub const fn is_raw(self) -> bool {
        matches!(self, Self::SpRaw)
    }
}

/// Scalability pattern of a socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum SocketType {
    /// One-to-one bidirectional
    Pair = 16,
    /// Publisher side of pub/sub
    Pub = 32,
    /// Subscriber side of pub/sub
    Sub = 33,
    /// Requester
    Req = 48,
    /// Replier
    Rep = 49,
    /// Pipeline producer
    Push = 80,
    /// Pipeline consumer
    Pull = 81,
    /// Survey originator
    Surveyor = 98,
    /// Survey responder
    Respondent = 99,
    /// Many-to-many broadcast
    Bus = 112,
}

impl SocketType {
    #[must_use]
    pub const fn from_i32(protocol: i32) -> Option<Self> {
        match protocol {
            PAIR => Some(Self::Pair),
            PUB => Some(Self::Pub),
            SUB => Some(Self::Sub),
            REQ => Some(Self::Req),
            REP => Some(Self::Rep),
            PUSH => Some(Self::Push),
            PULL => Some(Self::Pull),
            SURVEYOR => Some(Self::Surveyor),
            RESPONDENT => Some(Self::Respondent),
            BUS => Some(Self::Bus),
            _ => None,
        }
    }

    #[must_use]
    pub fn from_u16(protocol: u16) -> Option<Self> {
        Self::from_i32(i32::from(protocol))
    }

    #[inline]
    #[must_use]
    pub const fn number(self) -> u16 {
        self as u16
    }

    /// The pattern a socket of this type talks to.
    #[must_use]
    pub const fn peer(self) -> Self {
        match self {
            Self::Pair => Self::Pair,
            Self::Pub => Self::Sub,
            Self::Sub => Self::Pub,
            Self::Req => Self::Rep,
            Self::Rep => Self::Req,
            Self::Push => Self::Pull,
            Self::Pull => Self::Push,
            Self::Surveyor => Self::Respondent,
            Self::Respondent => Self::Surveyor,
            Self::Bus => Self::Bus,
        }
    }

    /// Check if this socket type is compatible with the given peer type.
    #[must_use]
    pub fn is_compatible(self, peer: SocketType) -> bool {
        self.peer() == peer
    }

    /// Get the socket type as a string name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pair => "PAIR",
            Self::Pub => "PUB",
            Self::Sub => "SUB",
            Self::Req => "REQ",
            Self::Rep => "REP",
            Self::Push => "PUSH",
            Self::Pull => "PULL",
            Self::Surveyor => "SURVEYOR",
            Self::Respondent => "RESPONDENT",
            Self::Bus => "BUS",
        }
    }
}

impl fmt::Display for SocketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
