use super::ber::{self, Reader};
use crate::{MessageError, Result};
use bytes::BytesMut;
use std::fmt;

const AND: u8 = 0;
const EQUALITY_MATCH: u8 = 3;

/// Deepest run of nested AND choices accepted when decoding.
const MAX_FILTER_DEPTH: usize = 32;

/// An LDAP search filter. Only the choices the DC locator sends are
/// supported; any other choice fails to decode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    And(Vec<Filter>),
    Equality { attribute: String, value: Vec<u8> },
}

impl Filter {
    pub fn equality(attribute: &str, value: impl Into<Vec<u8>>) -> Self {
        Filter::Equality {
            attribute: attribute.to_string(),
            value: value.into(),
        }
    }

    /// The value of the first equality clause on `attribute` (compared
    /// case-insensitively), looking through a top level AND.
    pub fn equality_value(&self, attribute: &str) -> Option<&[u8]> {
        match self {
            Filter::Equality {
                attribute: name,
                value,
            } if name.eq_ignore_ascii_case(attribute) => Some(value.as_slice()),
            Filter::Equality { .. } => None,
            Filter::And(filters) => filters.iter().find_map(|f| match f {
                Filter::Equality { .. } => f.equality_value(attribute),
                Filter::And(_) => None,
            }),
        }
    }

    pub(crate) fn read(reader: &mut Reader<'_>) -> Result<Filter> {
        Filter::read_nested(reader, 0)
    }

    fn read_nested(reader: &mut Reader<'_>, depth: usize) -> Result<Filter> {
        if depth >= MAX_FILTER_DEPTH {
            return Err(MessageError::InvalidBer("filter nested too deeply"));
        }

        let tag = reader.peek_tag()?;
        match tag {
            t if t == ber::context(AND) => {
                let mut contents = reader.read_constructed(t)?;
                let mut filters = Vec::new();
                while contents.has_data() {
                    filters.push(Filter::read_nested(&mut contents, depth + 1)?);
                }
                Ok(Filter::And(filters))
            }
            t if t == ber::context(EQUALITY_MATCH) => {
                let mut contents = reader.read_constructed(t)?;
                let attribute = contents.read_string()?;
                let value = contents.read_octet_string()?.to_vec();
                Ok(Filter::Equality { attribute, value })
            }
            t => Err(MessageError::UnsupportedLdapChoice {
                class: ber::class_of(t),
                number: ber::number_of(t),
            }),
        }
    }

    pub(crate) fn write(&self, buf: &mut BytesMut) -> Result<()> {
        match self {
            Filter::And(filters) => ber::write_constructed(buf, ber::context(AND), |buf| {
                for filter in filters {
                    filter.write(buf)?;
                }
                Ok(())
            }),
            Filter::Equality { attribute, value } => {
                ber::write_constructed(buf, ber::context(EQUALITY_MATCH), |buf| {
                    ber::write_octet_string(buf, attribute.as_bytes());
                    ber::write_octet_string(buf, value);
                    Ok(())
                })
            }
        }
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> std::result::Result<(), fmt::Error> {
        match self {
            Filter::And(filters) => {
                write!(f, "(&")?;
                for filter in filters {
                    write!(f, "{}", filter)?;
                }
                write!(f, ")")
            }
            Filter::Equality { attribute, value } => match std::str::from_utf8(value) {
                Ok(text) if text.chars().all(|c| !c.is_control()) => {
                    write!(f, "({}={})", attribute, text)
                }
                _ => {
                    write!(f, "({}=", attribute)?;
                    for b in value {
                        write!(f, "\\{:02x}", b)?;
                    }
                    write!(f, ")")
                }
            },
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::TagClass;

    fn locator_filter() -> Filter {
        Filter::And(vec![
            Filter::equality("DnsDomain", "DOMAIN.TEST"),
            Filter::equality("Host", "WIN-L4BVCP0QLRF"),
            Filter::equality("NtVer", vec![0x16, 0x00, 0x00, 0x20]),
        ])
    }

    #[test]
    fn test_equality_value() {
        let filter = locator_filter();
        assert_eq!(filter.equality_value("dnsdomain"), Some(&b"DOMAIN.TEST"[..]));
        assert_eq!(
            filter.equality_value("NTVER"),
            Some(&[0x16, 0x00, 0x00, 0x20][..])
        );
        assert_eq!(filter.equality_value("User"), None);

        let nested = Filter::And(vec![locator_filter()]);
        assert_eq!(nested.equality_value("DnsDomain"), None);
    }

    #[test]
    fn test_write_then_read() {
        let filter = locator_filter();
        let mut buf = BytesMut::new();
        filter.write(&mut buf).unwrap();
        assert_eq!(buf[0], 0xa0);
        assert_eq!(buf[2], 0xa3);

        let mut reader = Reader::new(&buf);
        assert_eq!(Filter::read(&mut reader).unwrap(), filter);
        assert!(!reader.has_data());
    }

    #[test]
    fn test_unsupported_choice() {
        // (objectClass=*) is a present filter, context tag 7.
        let input = [0x87, 0x0b, b'o', b'b', b'j', b'e', b'c', b't', b'C', b'l', b'a', b's', b's'];
        assert_eq!(
            Filter::read(&mut Reader::new(&input)),
            Err(MessageError::UnsupportedLdapChoice {
                class: TagClass::ContextSpecific,
                number: 7
            })
        );
    }

    fn nested_and(depth: usize) -> Vec<u8> {
        let mut filter = vec![0xa0, 0x00];
        for _ in 1..depth {
            let mut buf = BytesMut::new();
            ber::write_tlv(&mut buf, ber::context(AND), &filter);
            filter = buf.to_vec();
        }
        filter
    }

    #[test]
    fn test_nesting_limit() {
        let input = nested_and(MAX_FILTER_DEPTH);
        let mut expected = Filter::And(vec![]);
        for _ in 1..MAX_FILTER_DEPTH {
            expected = Filter::And(vec![expected]);
        }
        assert_eq!(Filter::read(&mut Reader::new(&input)), Ok(expected));

        let input = nested_and(MAX_FILTER_DEPTH + 1);
        assert_eq!(
            Filter::read(&mut Reader::new(&input)),
            Err(MessageError::InvalidBer("filter nested too deeply"))
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(
            locator_filter().to_string(),
            "(&(DnsDomain=DOMAIN.TEST)(Host=WIN-L4BVCP0QLRF)(NtVer=\\16\\00\\00\\20))"
        );
    }
}
