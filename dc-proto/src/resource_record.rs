use crate::{wire, Class, MessageError, Name, NameMap, Result, Type};
use bytes::{BufMut, BytesMut};
use nom::number::complete::{be_i32, be_u128, be_u16, be_u32};
use nom::sequence::tuple;
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};
use tracing::{instrument, trace};

#[derive(Debug, Clone, PartialEq)]
/// The answer, authority and additional sections all share the same format,
/// that is a variable number of [`ResourceRecord`]s.
///
/// These can be constructed with a [`crate::ResourceRecordBuilder`].
pub struct ResourceRecord {
    /// A domain name to which this resource record pertains.
    pub name: Name,

    /// The type and data of the resource record.
    pub data: RData,

    /// The class of the data in the `data` field.
    pub class: Class,

    /// Seconds the record may be cached. Signed on the wire as far as the
    /// clients we talk to are concerned.
    pub ttl: i32,
}

impl ResourceRecord {
    pub fn r_type(&self) -> Type {
        self.data.r_type()
    }

    /// Reads one record at `offset`. The rdata is decoded against the buffer
    /// cut off at the end of the declared rdata length, and the returned
    /// offset always skips exactly that many bytes.
    #[instrument(skip(buf))]
    pub(crate) fn read(buf: &[u8], offset: usize) -> Result<(ResourceRecord, usize)> {
        let (name, offset) = Name::decode(buf, offset)?;
        let ((r_type, class, ttl, rdlength), rdata_start) =
            wire::parse_at(buf, offset, tuple((be_u16, be_u16, be_i32, be_u16)))?;

        trace!("Found rdata of length: {}", rdlength);

        let rdata_end = rdata_start + rdlength as usize;
        if rdata_end > buf.len() {
            return Err(MessageError::TruncatedMessage {
                offset: rdata_start,
            });
        }
        let block = &buf[..rdata_end];

        let data = RData::read(Type::from(r_type), block, rdata_start)?;
        trace!("Parsed rdata as {}", data);

        Ok((
            ResourceRecord {
                name,
                data,
                class: Class::from(class),
                ttl,
            },
            rdata_end,
        ))
    }

    #[instrument(skip(buf, names))]
    pub(crate) fn to_bytes(&self, buf: &mut BytesMut, names: &mut NameMap) -> Result<usize> {
        let start = buf.len();
        self.name.encode(buf, names, true)?;

        buf.put_u16(self.r_type().into());
        buf.put_u16(self.class.into());
        buf.put_i32(self.ttl);

        // The rdata may hold compressed names whose pointers are absolute, so
        // it is written in place and its length patched in afterwards.
        let rdlength_at = buf.len();
        buf.put_u16(0);
        let rdlength = self.data.to_bytes(buf, names)?;
        let rdlength =
            u16::try_from(rdlength).map_err(|_| MessageError::SectionOverflow(rdlength))?;
        buf[rdlength_at..rdlength_at + 2].copy_from_slice(&rdlength.to_be_bytes());

        trace!("Wrote {} bytes", buf.len() - start);

        Ok(buf.len() - start)
    }
}

#[derive(Debug, Clone, PartialEq)]
/// The [`ResourceRecord`] data.
pub enum RData {
    /// RFC1035 - (1) a host address.
    A(Ipv4Addr),

    /// RFC3596 - The AAAA resource record type is a record specific to the
    /// Internet class that stores a single IPv6 address.
    AAAA(Ipv6Addr),

    /// RFC1035 - (6) marks the start of a zone of authority.
    SOA(Soa),

    /// RFC2782 - (33) the location of a service.
    SRV(Srv),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Soa {
    /// MNAME - the name server that was the original or primary source of data
    /// for this zone.
    pub primary_name_server: Name,

    /// RNAME - the mailbox of the person responsible for this zone.
    pub mailbox: Name,

    pub serial: u32,
    pub refresh: u32,
    pub retry: u32,
    pub expire: u32,
    pub minimum: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Srv {
    pub priority: u16,
    pub weight: u16,
    pub port: u16,

    /// Always written uncompressed; Windows clients reject a compressed
    /// target.
    pub target: Name,
}

impl RData {
    pub fn r_type(&self) -> Type {
        match self {
            RData::A(_) => Type::A,
            RData::AAAA(_) => Type::AAAA,
            RData::SOA(_) => Type::SOA,
            RData::SRV(_) => Type::SRV,
        }
    }

    #[instrument(skip(block))]
    fn read(r_type: Type, block: &[u8], offset: usize) -> Result<RData> {
        match r_type {
            Type::A => {
                let (addr, _) = wire::parse_at(block, offset, be_u32)?;
                Ok(RData::A(Ipv4Addr::from(addr)))
            }
            Type::AAAA => {
                let (addr, _) = wire::parse_at(block, offset, be_u128)?;
                Ok(RData::AAAA(Ipv6Addr::from(addr)))
            }
            Type::SOA => {
                let (primary_name_server, offset) = Name::decode(block, offset)?;
                let (mailbox, offset) = Name::decode(block, offset)?;
                let ((serial, refresh, retry, expire, minimum), _) = wire::parse_at(
                    block,
                    offset,
                    tuple((be_u32, be_u32, be_u32, be_u32, be_u32)),
                )?;
                Ok(RData::SOA(Soa {
                    primary_name_server,
                    mailbox,
                    serial,
                    refresh,
                    retry,
                    expire,
                    minimum,
                }))
            }
            Type::SRV => {
                let ((priority, weight, port), offset) =
                    wire::parse_at(block, offset, tuple((be_u16, be_u16, be_u16)))?;
                let (target, _) = Name::decode(block, offset)?;
                Ok(RData::SRV(Srv {
                    priority,
                    weight,
                    port,
                    target,
                }))
            }
            other => Err(MessageError::UnsupportedRecordType(other.into())),
        }
    }

    #[instrument(skip(buf, names))]
    fn to_bytes(&self, buf: &mut BytesMut, names: &mut NameMap) -> Result<usize> {
        trace!("Writing {}", self);

        let start = buf.len();
        match self {
            RData::A(v4) => buf.put_slice(&v4.octets()),
            RData::AAAA(v6) => buf.put_slice(&v6.octets()),
            RData::SOA(soa) => {
                soa.primary_name_server.encode(buf, names, true)?;
                soa.mailbox.encode(buf, names, true)?;
                buf.put_u32(soa.serial);
                buf.put_u32(soa.refresh);
                buf.put_u32(soa.retry);
                buf.put_u32(soa.expire);
                buf.put_u32(soa.minimum);
            }
            RData::SRV(srv) => {
                buf.put_u16(srv.priority);
                buf.put_u16(srv.weight);
                buf.put_u16(srv.port);
                srv.target.encode(buf, names, false)?;
            }
        }
        Ok(buf.len() - start)
    }
}

impl fmt::Display for RData {
    fn fmt(&self, f: &mut fmt::Formatter) -> std::result::Result<(), fmt::Error> {
        match self {
            Self::A(v4) => write!(f, "A({})", v4),
            Self::AAAA(v6) => write!(f, "AAAA({})", v6),
            Self::SOA(soa) => write!(
                f,
                "SOA({}, {}, {}, {}, {}, {}, {})",
                soa.primary_name_server,
                soa.mailbox,
                soa.serial,
                soa.refresh,
                soa.retry,
                soa.expire,
                soa.minimum
            ),
            Self::SRV(srv) => write!(
                f,
                "SRV({} {} {} {})",
                srv.priority, srv.weight, srv.port, srv.target
            ),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test::setup;

    #[test]
    fn test_srv_target_is_never_compressed() {
        setup();
        let mut buf = BytesMut::new();
        let mut names = NameMap::new();
        Name::from("dc01.domain.test")
            .encode(&mut buf, &mut names, true)
            .unwrap();

        let record = ResourceRecord {
            name: Name::from("_ldap._tcp.domain.test"),
            data: RData::SRV(Srv {
                priority: 0,
                weight: 100,
                port: 389,
                target: Name::from("dc01.domain.test"),
            }),
            class: Class::IN,
            ttl: 600,
        };
        let start = buf.len();
        record.to_bytes(&mut buf, &mut names).unwrap();

        // The owner name points back at "domain.test", the target does not.
        let target = &buf[buf.len() - 18..];
        assert_eq!(target[0], 4);
        assert_eq!(&target[1..5], b"dc01");
        assert_eq!(target[17], 0);

        let (read, end) = ResourceRecord::read(&buf, start).unwrap();
        assert_eq!(read, record);
        assert_eq!(end, buf.len());
    }

    #[test]
    fn test_unsupported_type() {
        setup();
        let input: &[u8] = &[
            0, // root
            0, 5, // CNAME
            0, 1, // IN
            0, 0, 0, 60, // ttl
            0, 1, // rdlength
            0, // rdata
        ];
        assert_eq!(
            ResourceRecord::read(input, 0),
            Err(MessageError::UnsupportedRecordType(5))
        );
    }

    #[test]
    fn test_rdata_past_end_is_truncated() {
        setup();
        let input: &[u8] = &[
            0, // root
            0, 1, // A
            0, 1, // IN
            0, 0, 0, 60, // ttl
            0, 4, // rdlength
            10, 0, 0, // rdata, one byte short
        ];
        assert_eq!(
            ResourceRecord::read(input, 0),
            Err(MessageError::TruncatedMessage { offset: 11 })
        );
    }

    #[test]
    fn test_negative_ttl_round_trips() {
        setup();
        let record = ResourceRecord {
            name: Name::from("dc01.domain.test"),
            data: RData::A(Ipv4Addr::new(192, 168, 56, 10)),
            class: Class::IN,
            ttl: -1,
        };
        let mut buf = BytesMut::new();
        record.to_bytes(&mut buf, &mut NameMap::new()).unwrap();
        assert_eq!(&buf[22..26], &[0xff, 0xff, 0xff, 0xff]);

        let (read, _) = ResourceRecord::read(&buf, 0).unwrap();
        assert_eq!(read.ttl, -1);
    }
}
