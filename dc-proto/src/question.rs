use crate::{wire, Name, NameMap, Result};
use bytes::{BufMut, BytesMut};
use nom::number::complete::be_u16;
use nom::sequence::pair;
use std::fmt;

use tracing::{instrument, trace};

#[derive(Debug, Clone, PartialEq)]
/// The question section is used to carry the "question" in most queries, i.e.,
/// the parameters that define what is being asked.
pub struct Question {
    /// RFC1035 - a domain name represented as a sequence of labels.
    pub q_name: Name,

    /// RFC1035 - a two octet code which specifies the type of the query.
    pub q_type: Type,

    /// RFC1035 - a two octet code that specifies the [`Class`] of the query.
    pub q_class: Class,
}

impl Question {
    pub fn new(q_name: Name, q_type: Type, q_class: Class) -> Self {
        Question {
            q_name,
            q_type,
            q_class,
        }
    }

    #[instrument(skip(buf))]
    pub(crate) fn read(buf: &[u8], offset: usize) -> Result<(Question, usize)> {
        let (q_name, offset) = Name::decode(buf, offset)?;
        let ((q_type, q_class), offset) = wire::parse_at(buf, offset, pair(be_u16, be_u16))?;

        trace!("Read question {} {}", q_name, Type::from(q_type));

        Ok((
            Question {
                q_name,
                q_type: Type::from(q_type),
                q_class: Class::from(q_class),
            },
            offset,
        ))
    }

    #[instrument(skip(buf, names))]
    pub(crate) fn to_bytes(&self, buf: &mut BytesMut, names: &mut NameMap) -> Result<usize> {
        let mut byte_count = self.q_name.encode(buf, names, true)?;
        buf.put_u16(self.q_type.into());
        buf.put_u16(self.q_class.into());
        byte_count += 4;

        trace!("Wrote {} bytes", byte_count);

        Ok(byte_count)
    }
}

macro_rules! record_types {
    ($($(#[$doc:meta])* $variant:ident = $code:literal,)+) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        /// Record types used in [`Question`]s and resource records. Only A,
        /// AAAA, SOA and SRV carry decodable rdata; the rest are named so that
        /// questions for them can be logged and echoed.
        pub enum Type {
            $($(#[$doc])* $variant,)+

            /// An unknown [`Type`] - the value is contained within.
            Unknown(u16),
        }

        impl From<Type> for u16 {
            fn from(t: Type) -> u16 {
                match t {
                    $(Type::$variant => $code,)+
                    Type::Unknown(i) => i,
                }
            }
        }

        impl From<u16> for Type {
            fn from(val: u16) -> Self {
                match val {
                    $($code => Type::$variant,)+
                    _ => Type::Unknown(val),
                }
            }
        }

        impl fmt::Display for Type {
            fn fmt(&self, f: &mut fmt::Formatter) -> std::result::Result<(), fmt::Error> {
                match self {
                    $(Type::$variant => write!(f, stringify!($variant)),)+
                    Type::Unknown(i) => write!(f, "Unknown({})", i),
                }
            }
        }
    };
}

record_types! {
    /// RFC1035 - (1) a host address.
    A = 1,
    /// RFC1035 - (2) an authoritative name server.
    NS = 2,
    /// RFC1035 - (5) the canonical name for an alias.
    CNAME = 5,
    /// RFC1035 - (6) marks the start of a zone of authority.
    SOA = 6,
    /// RFC1035 - (12) a domain name pointer.
    PTR = 12,
    /// RFC1035 - (13) host information.
    HINFO = 13,
    /// RFC1035 - (15) mail exchange.
    MX = 15,
    /// RFC1035 - (16) text strings.
    TXT = 16,
    RP = 17,
    AFSDB = 18,
    SIG = 24,
    KEY = 25,
    KX = 26,
    /// RFC3596 - a single IPv6 address.
    AAAA = 28,
    LOC = 29,
    /// RFC2782 - the location of a service.
    SRV = 33,
    NAPTR = 35,
    CERT = 37,
    DNAME = 39,
    APL = 42,
    DS = 43,
    SSHFP = 44,
    IPSECKEY = 45,
    RRSIG = 46,
    NSEC = 47,
    DNSKEY = 48,
    DHCID = 49,
    NSEC3 = 50,
    NSEC3PARAM = 51,
    TLSA = 52,
    SMIMEA = 53,
    HIP = 55,
    CDS = 59,
    CDNSKEY = 60,
    OPENPGPKEY = 61,
    CSYNC = 62,
    ZONEMD = 63,
    SVCB = 64,
    HTTPS = 65,
    EUI48 = 108,
    EUI64 = 109,
    TKEY = 249,
    TSIG = 250,
    URI = 256,
    WALLET = 262,
    TA = 32768,
    DLV = 32769,
}

impl Default for Type {
    fn default() -> Self {
        Self::A
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// The class of the query - you will want [`Class::IN`] (the default) 99.99% of
/// the time.
pub enum Class {
    /// RFC1035 - 1 the Internet.
    IN,

    /// RFC1035 - 2 the CSNET class (Obsolete - used only for examples in some
    /// obsolete RFCs)
    CS,

    /// RFC1035 - 3 the CHAOS class.
    CH,

    /// RFC1035 - 4 Hesiod [Dyer 87].
    HS,

    /// RFC1035 - 255 any class.
    ANY,

    /// An unknown class - contained within.
    Unknown(u16),
}

impl Default for Class {
    fn default() -> Self {
        Class::IN
    }
}

impl From<Class> for u16 {
    fn from(c: Class) -> u16 {
        match c {
            Class::IN => 1,
            Class::CS => 2,
            Class::CH => 3,
            Class::HS => 4,
            Class::ANY => 255,
            Class::Unknown(i) => i,
        }
    }
}

impl From<u16> for Class {
    fn from(val: u16) -> Self {
        match val {
            1 => Class::IN,
            2 => Class::CS,
            3 => Class::CH,
            4 => Class::HS,
            255 => Class::ANY,
            _ => Class::Unknown(val),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_type_codes() {
        assert_eq!(Type::from(33), Type::SRV);
        assert_eq!(u16::from(Type::AAAA), 28);
        assert_eq!(Type::from(32769), Type::DLV);
        assert_eq!(Type::from(999), Type::Unknown(999));
        assert_eq!(u16::from(Type::Unknown(999)), 999);
        assert_eq!(Type::SRV.to_string(), "SRV");
    }

    #[test]
    fn test_read_question_then_write() {
        let input: &[u8] = &[
            3, 119, 119, 119, // len: 3 - www
            6, 103, 111, 111, 103, 108, 101, // len: 6 - google
            3, 99, 111, 109, // len: 3 - com
            0,   // name terminator
            0, 65, // qtype - HTTPS
            0, 1, // qclass
        ];

        let (question, offset) = Question::read(input, 0).unwrap();
        assert_eq!(offset, input.len());
        assert_eq!(question.q_name, Name::from("www.google.com"));
        assert_eq!(question.q_type, Type::HTTPS);
        assert_eq!(question.q_class, Class::IN);

        let mut buf = BytesMut::new();
        let written = question.to_bytes(&mut buf, &mut NameMap::new()).unwrap();
        assert_eq!(written, input.len());
        assert_eq!(&buf[..], input);
    }
}
