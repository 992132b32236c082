use crate::{wire, Message, Result};
use bytes::{BufMut, BytesMut};
use nom::number::complete::{be_i16, be_u16};
use nom::sequence::tuple;
use std::fmt;
use tracing::{instrument, trace};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// The DNS Message Header as per RFC1035, minus the section counts which are
/// taken from the [`Message`] itself when it is written.
pub struct Header {
    /// RFC1035 - A 16 bit identifier assigned by the program that generates any
    /// kind of query. This identifier is copied the corresponding reply and
    /// can be used by the requester to match up replies to outstanding queries.
    ///
    /// Kept signed: clients only ever compare the raw bit pattern.
    pub id: i16,

    /// The QR, Opcode, AA, TC, RD, RA, Z and RCODE bits.
    pub flags: Flags,
}

/// The four section counts as read from the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Counts {
    pub qd_count: u16,
    pub an_count: u16,
    pub ns_count: u16,
    pub ar_count: u16,
}

impl Header {
    #[instrument(skip(buf))]
    pub(crate) fn read(buf: &[u8]) -> Result<(Header, Counts, usize)> {
        let ((id, flags, qd_count, an_count, ns_count, ar_count), offset) = wire::parse_at(
            buf,
            0,
            tuple((be_i16, be_u16, be_u16, be_u16, be_u16, be_u16)),
        )?;

        trace!("Read header id {} flags {:#06x}", id, flags);

        Ok((
            Header {
                id,
                flags: Flags(flags),
            },
            Counts {
                qd_count,
                an_count,
                ns_count,
                ar_count,
            },
            offset,
        ))
    }

    #[instrument(skip(buf, message))]
    pub(crate) fn to_bytes(&self, message: &Message, buf: &mut BytesMut) -> Result<usize> {
        buf.put_i16(self.id);
        buf.put_u16(self.flags.0);
        buf.put_u16(wire::count(message.questions.len())?);
        buf.put_u16(wire::count(message.answers.len())?);
        buf.put_u16(wire::count(message.name_servers.len())?);
        buf.put_u16(wire::count(message.additional_records.len())?);

        trace!("Wrote 12 bytes");

        Ok(12)
    }
}

/// The 16 bit flags word of the header, kept as the raw bit pattern so that
/// anything a client sends is written back unchanged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Flags(pub u16);

impl Flags {
    /// QR=1, AA=1, RD=1, RA=1: the bits every authoritative reply carries.
    pub const RESPONSE: Flags = Flags(0x8580);

    const QR: u16 = 1 << 15;
    const AA: u16 = 1 << 10;
    const TC: u16 = 1 << 9;
    const RD: u16 = 1 << 8;
    const RA: u16 = 1 << 7;

    pub fn bits(&self) -> u16 {
        self.0
    }

    pub fn qr(&self) -> bool {
        self.0 & Self::QR != 0
    }

    pub fn opcode(&self) -> OpCode {
        OpCode::from(((self.0 >> 11) & 0xf) as u8)
    }

    pub fn aa(&self) -> bool {
        self.0 & Self::AA != 0
    }

    pub fn tc(&self) -> bool {
        self.0 & Self::TC != 0
    }

    pub fn rd(&self) -> bool {
        self.0 & Self::RD != 0
    }

    pub fn ra(&self) -> bool {
        self.0 & Self::RA != 0
    }

    pub fn rcode(&self) -> RCode {
        RCode::from((self.0 & 0xf) as u8)
    }

    /// ORs the response code into the low four bits.
    pub fn with_rcode(self, rcode: RCode) -> Flags {
        Flags(self.0 | (rcode.as_u8() & 0xf) as u16)
    }
}

impl fmt::Display for Flags {
    fn fmt(&self, f: &mut fmt::Formatter) -> std::result::Result<(), fmt::Error> {
        write!(f, "{:#06x}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// A four bit field that specifies kind of query in this message.  This value
/// is set by the originator of a query and copied into the response.
pub enum OpCode {
    /// A standard query.
    Query,

    /// An inverse query.
    IQuery,

    /// A server status request.
    Status,

    /// An unknown OpCode (contained within).
    Unknown(u8),
}

impl From<u8> for OpCode {
    fn from(val: u8) -> Self {
        match val {
            0 => OpCode::Query,
            1 => OpCode::IQuery,
            2 => OpCode::Status,
            n => OpCode::Unknown(n),
        }
    }
}

impl Default for OpCode {
    fn default() -> Self {
        OpCode::Query
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Response code - this 4 bit field is set as part of responses.
pub enum RCode {
    /// No error condition.
    NoError,

    /// Format error - The name server was unable to interpret the query.
    FormatError,

    /// Server failure - The name server was unable to process this query due to
    /// a problem with the name server.
    ServerFailure,

    /// Name Error - Meaningful only for responses from an authoritative name
    /// server, this code signifies that the domain name referenced in the query
    /// does not exist.
    NameError,

    /// Not Implemented - The name server does not support the requested kind of
    /// query.
    NotImplemented,

    /// Refused - The name server refuses to perform the specified operation for
    /// policy reasons.
    Refused,

    /// The response code was unknown (contained within).
    Unknown(u8),
}

impl RCode {
    pub fn as_u8(&self) -> u8 {
        match self {
            RCode::NoError => 0,
            RCode::FormatError => 1,
            RCode::ServerFailure => 2,
            RCode::NameError => 3,
            RCode::NotImplemented => 4,
            RCode::Refused => 5,
            RCode::Unknown(i) => *i,
        }
    }
}

impl From<u8> for RCode {
    fn from(val: u8) -> Self {
        match val {
            0 => RCode::NoError,
            1 => RCode::FormatError,
            2 => RCode::ServerFailure,
            3 => RCode::NameError,
            4 => RCode::NotImplemented,
            5 => RCode::Refused,
            x => RCode::Unknown(x),
        }
    }
}

impl Default for RCode {
    fn default() -> Self {
        RCode::NoError
    }
}
