//! The slice of BER needed by LDAP: single octet tags, definite lengths and
//! the handful of universal types a search uses.

use crate::{MessageError, Result, TagClass};
use bytes::{BufMut, BytesMut};
use nom::bytes::complete::take;
use nom::number::complete::be_u8;
use nom::sequence::pair;
use nom::IResult;
use tracing::trace;

pub(crate) const BOOLEAN: u8 = 0x01;
pub(crate) const INTEGER: u8 = 0x02;
pub(crate) const OCTET_STRING: u8 = 0x04;
pub(crate) const ENUMERATED: u8 = 0x0a;
pub(crate) const SEQUENCE: u8 = 0x30;
pub(crate) const SET: u8 = 0x31;

const CONSTRUCTED: u8 = 0x20;
const NUMBER_MASK: u8 = 0x1f;
const LONG_FORM: u8 = 0x80;
const MAX_LENGTH_OCTETS: usize = 8;

/// A constructed tag in the application class.
pub(crate) const fn application(number: u8) -> u8 {
    0x40 | CONSTRUCTED | number
}

/// A constructed tag in the context specific class.
pub(crate) const fn context(number: u8) -> u8 {
    0x80 | CONSTRUCTED | number
}

pub(crate) fn class_of(tag: u8) -> TagClass {
    match tag >> 6 {
        0 => TagClass::Universal,
        1 => TagClass::Application,
        2 => TagClass::ContextSpecific,
        _ => TagClass::Private,
    }
}

pub(crate) fn number_of(tag: u8) -> u8 {
    tag & NUMBER_MASK
}

fn ber<'a, O, P>(input: &'a [u8], mut parser: P, what: &'static str) -> Result<(&'a [u8], O)>
where
    P: FnMut(&'a [u8]) -> IResult<&'a [u8], O>,
{
    parser(input).map_err(|_| MessageError::InvalidBer(what))
}

/// Walks the elements of one BER encoded value, or the contents of a
/// constructed one.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Reader<'a> {
    buf: &'a [u8],
}

impl<'a> Reader<'a> {
    pub(crate) fn new(buf: &'a [u8]) -> Self {
        Reader { buf }
    }

    pub(crate) fn has_data(&self) -> bool {
        !self.buf.is_empty()
    }

    pub(crate) fn remaining(&self) -> &'a [u8] {
        self.buf
    }

    pub(crate) fn peek_tag(&self) -> Result<u8> {
        self.buf
            .first()
            .copied()
            .ok_or(MessageError::InvalidBer("missing tag"))
    }

    /// Reads the next tag-length-value, returning the tag and the contents.
    pub(crate) fn read_any(&mut self) -> Result<(u8, &'a [u8])> {
        let (input, (tag, first)) = ber(self.buf, pair(be_u8, be_u8), "missing tag or length")?;
        if number_of(tag) == NUMBER_MASK {
            return Err(MessageError::InvalidBer("high tag numbers are not supported"));
        }

        let (input, len) = if first & LONG_FORM == 0 {
            (input, first as usize)
        } else {
            let count = (first & !LONG_FORM) as usize;
            if count == 0 {
                return Err(MessageError::InvalidBer("indefinite length"));
            }
            if count > MAX_LENGTH_OCTETS {
                return Err(MessageError::InvalidBer("length has too many octets"));
            }
            let (input, octets) = ber(input, take(count), "truncated length")?;
            let len = octets
                .iter()
                .fold(0u64, |len, octet| (len << 8) | *octet as u64);
            let len = usize::try_from(len).map_err(|_| MessageError::InvalidBer("length too large"))?;
            (input, len)
        };

        let (input, contents) = ber(input, take(len), "contents run past end of input")?;
        trace!("Read tag {:#04x} with {} content bytes", tag, len);

        self.buf = input;
        Ok((tag, contents))
    }

    fn read_tagged(&mut self, expected: u8, what: &'static str) -> Result<&'a [u8]> {
        let (tag, contents) = self.read_any()?;
        if tag != expected {
            return Err(MessageError::InvalidBer(what));
        }
        Ok(contents)
    }

    pub(crate) fn read_constructed(&mut self, tag: u8) -> Result<Reader<'a>> {
        Ok(Reader::new(self.read_tagged(tag, "unexpected constructed tag")?))
    }

    pub(crate) fn read_sequence(&mut self) -> Result<Reader<'a>> {
        Ok(Reader::new(self.read_tagged(SEQUENCE, "expected SEQUENCE")?))
    }

    pub(crate) fn read_set(&mut self) -> Result<Reader<'a>> {
        Ok(Reader::new(self.read_tagged(SET, "expected SET")?))
    }

    pub(crate) fn read_integer(&mut self) -> Result<i32> {
        decode_integer(self.read_tagged(INTEGER, "expected INTEGER")?)
    }

    pub(crate) fn read_enumerated(&mut self) -> Result<i32> {
        decode_integer(self.read_tagged(ENUMERATED, "expected ENUMERATED")?)
    }

    pub(crate) fn read_boolean(&mut self) -> Result<bool> {
        match self.read_tagged(BOOLEAN, "expected BOOLEAN")? {
            [value] => Ok(*value != 0),
            _ => Err(MessageError::InvalidBer("BOOLEAN must be one octet")),
        }
    }

    pub(crate) fn read_octet_string(&mut self) -> Result<&'a [u8]> {
        self.read_tagged(OCTET_STRING, "expected OCTET STRING")
    }

    /// An OCTET STRING holding UTF-8 text. Invalid sequences become U+FFFD.
    pub(crate) fn read_string(&mut self) -> Result<String> {
        Ok(String::from_utf8_lossy(self.read_octet_string()?).into_owned())
    }
}

fn decode_integer(contents: &[u8]) -> Result<i32> {
    if contents.is_empty() {
        return Err(MessageError::InvalidBer("empty INTEGER"));
    }
    if contents.len() > 4 {
        return Err(MessageError::InvalidBer("INTEGER wider than 32 bits"));
    }
    let fill = if contents[0] & 0x80 != 0 { 0xff } else { 0x00 };
    let mut bytes = [fill; 4];
    bytes[4 - contents.len()..].copy_from_slice(contents);
    Ok(i32::from_be_bytes(bytes))
}

fn write_length(buf: &mut BytesMut, len: usize) {
    if len < LONG_FORM as usize {
        buf.put_u8(len as u8);
        return;
    }
    let octets = (len as u64).to_be_bytes();
    let skip = octets.iter().take_while(|o| **o == 0).count();
    buf.put_u8(LONG_FORM | (octets.len() - skip) as u8);
    buf.put_slice(&octets[skip..]);
}

pub(crate) fn write_tlv(buf: &mut BytesMut, tag: u8, contents: &[u8]) {
    buf.put_u8(tag);
    write_length(buf, contents.len());
    buf.put_slice(contents);
}

/// Writes a constructed value whose contents are produced by `f`.
pub(crate) fn write_constructed<F>(buf: &mut BytesMut, tag: u8, f: F) -> Result<()>
where
    F: FnOnce(&mut BytesMut) -> Result<()>,
{
    let mut contents = BytesMut::new();
    f(&mut contents)?;
    write_tlv(buf, tag, &contents);
    Ok(())
}

fn write_int(buf: &mut BytesMut, tag: u8, value: i32) {
    let bytes = value.to_be_bytes();
    let mut start = 0;
    while start < 3 {
        let redundant = (bytes[start] == 0x00 && bytes[start + 1] & 0x80 == 0)
            || (bytes[start] == 0xff && bytes[start + 1] & 0x80 != 0);
        if !redundant {
            break;
        }
        start += 1;
    }
    write_tlv(buf, tag, &bytes[start..]);
}

pub(crate) fn write_integer(buf: &mut BytesMut, value: i32) {
    write_int(buf, INTEGER, value);
}

pub(crate) fn write_enumerated(buf: &mut BytesMut, value: i32) {
    write_int(buf, ENUMERATED, value);
}

pub(crate) fn write_boolean(buf: &mut BytesMut, value: bool) {
    write_tlv(buf, BOOLEAN, &[if value { 0xff } else { 0x00 }]);
}

pub(crate) fn write_octet_string(buf: &mut BytesMut, value: &[u8]) {
    write_tlv(buf, OCTET_STRING, value);
}
