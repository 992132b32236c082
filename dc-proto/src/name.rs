use crate::{MessageError, Result};
use bytes::{BufMut, BytesMut};
use std::collections::{HashMap, HashSet};
use std::fmt;
use tracing::{instrument, trace};

const POINTER_MASK: u8 = 0xc0;
const MAX_POINTER: usize = 0x3fff;
const MAX_LABEL_LEN: usize = 63;

/// Offsets of label suffixes already written into one message, used to emit
/// rfc1035 compression pointers. Build a fresh map for every message.
pub type NameMap = HashMap<Vec<String>, u16>;

/// A domain name as an ordered sequence of labels, e.g.
/// `["_kerberos", "_tcp", "dc", "_msdcs", "DOMAIN", "TEST"]`.
///
/// Equality is exact; use [`Name::eq_ignore_case`] or [`Name::lookup_key`]
/// when comparing names the way a resolver would.
///
/// Labels are held as text. Bytes that are not UTF-8 are replaced with
/// U+FFFD when decoding, so such a name does not re-encode to the bytes it
/// was read from, and a long enough label no longer fits in 63 bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Name(Vec<String>);

impl Name {
    pub fn new(labels: Vec<String>) -> Self {
        Name(labels)
    }

    /// Splits a dotted name into labels. `""` becomes a single empty label,
    /// which is written as the root.
    pub fn from_dotted(name: &str) -> Self {
        Name(name.split('.').map(str::to_string).collect())
    }

    /// A name made of exactly one label, dots included.
    pub fn single(label: &str) -> Self {
        Name(vec![label.to_string()])
    }

    pub fn labels(&self) -> &[String] {
        &self.0
    }

    pub fn to_dotted(&self) -> String {
        self.0.join(".")
    }

    /// The case-insensitive form used as a record store key.
    pub fn lookup_key(&self) -> String {
        self.to_dotted().to_lowercase()
    }

    pub fn eq_ignore_case(&self, other: &Name) -> bool {
        self.0.len() == other.0.len()
            && self
                .0
                .iter()
                .zip(other.0.iter())
                .all(|(a, b)| a.eq_ignore_ascii_case(b))
    }

    /// Reads a possibly compressed name starting at `offset`.
    ///
    /// Returns the name and the offset just past it at the original call
    /// site: literal labels count their length byte and contents, and the
    /// first pointer followed counts two bytes. Nothing read through a
    /// pointer advances the returned offset.
    #[instrument(skip(buf))]
    pub fn decode(buf: &[u8], offset: usize) -> Result<(Name, usize)> {
        let mut labels = Vec::new();
        let mut seen_ptrs = HashSet::new();
        let mut pos = offset;
        let mut end = None;

        loop {
            let len = *buf
                .get(pos)
                .ok_or(MessageError::TruncatedMessage { offset: pos })?;

            match len & POINTER_MASK {
                POINTER_MASK => {
                    let low = *buf
                        .get(pos + 1)
                        .ok_or(MessageError::TruncatedMessage { offset: pos + 1 })?;
                    let ptr = (((len & !POINTER_MASK) as usize) << 8) | low as usize;
                    trace!("Name pointer at {} to offset {}", pos, ptr);

                    if end.is_none() {
                        end = Some(pos + 2);
                    }
                    if !seen_ptrs.insert(ptr) {
                        return Err(MessageError::MalformedName {
                            offset: pos,
                            reason: "compression pointer loop",
                        });
                    }
                    if ptr >= buf.len() {
                        return Err(MessageError::MalformedName {
                            offset: pos,
                            reason: "compression pointer out of bounds",
                        });
                    }
                    pos = ptr;
                }
                0 => {
                    if len == 0 {
                        break;
                    }
                    let start = pos + 1;
                    let label = buf.get(start..start + len as usize).ok_or(
                        MessageError::MalformedName {
                            offset: pos,
                            reason: "label runs past end of buffer",
                        },
                    )?;
                    labels.push(String::from_utf8_lossy(label).into_owned());
                    pos = start + len as usize;
                }
                _ => {
                    return Err(MessageError::MalformedName {
                        offset: pos,
                        reason: "reserved label type",
                    })
                }
            }
        }

        let end = end.unwrap_or(pos + 1);
        trace!("Read name {:?} ending at {}", labels, end);
        Ok((Name(labels), end))
    }

    /// Writes the name at the end of `buf`.
    ///
    /// Each suffix is looked up in `names`; when found and `compress` is set
    /// a pointer to it ends the name. Suffixes not yet in the map are
    /// recorded at their offset. With `compress` unset the name is always
    /// written literally.
    #[instrument(skip(buf, names))]
    pub fn encode(&self, buf: &mut BytesMut, names: &mut NameMap, compress: bool) -> Result<usize> {
        let start = buf.len();
        let labels = &self.0;

        for (i, label) in labels.iter().enumerate() {
            let suffix = &labels[i..];
            if label.is_empty() {
                if suffix.len() == 1 {
                    break;
                }
                return Err(MessageError::EmptyLabel(self.to_dotted()));
            }
            if label.len() > MAX_LABEL_LEN {
                return Err(MessageError::LabelTooLong(label.len(), label.clone()));
            }

            match names.get(suffix) {
                Some(&ptr) if compress => {
                    buf.put_u16(ptr | ((POINTER_MASK as u16) << 8));
                    trace!("Wrote pointer to {} for {:?}", ptr, suffix);
                    return Ok(buf.len() - start);
                }
                Some(_) => {}
                None => {
                    if buf.len() <= MAX_POINTER {
                        names.insert(suffix.to_vec(), buf.len() as u16);
                    }
                }
            }

            buf.put_u8(label.len() as u8);
            buf.put_slice(label.as_bytes());
        }
        buf.put_u8(0);

        trace!("Wrote {} bytes", buf.len() - start);
        Ok(buf.len() - start)
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter) -> std::result::Result<(), fmt::Error> {
        write!(f, "{}", self.to_dotted())
    }
}

impl From<&str> for Name {
    fn from(name: &str) -> Self {
        Name::from_dotted(name)
    }
}

impl From<Vec<&str>> for Name {
    fn from(labels: Vec<&str>) -> Self {
        Name(labels.into_iter().map(str::to_string).collect())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test::setup;

    #[test]
    fn test_decode_literal() {
        setup();
        let buf = [3, b'w', b'w', b'w', 6, b'g', b'o', b'o', b'g', b'l', b'e', 0, 0xff];
        let (name, offset) = Name::decode(&buf, 0).unwrap();
        assert_eq!(name, Name::from(vec!["www", "google"]));
        assert_eq!(offset, 12);
    }

    #[test]
    fn test_decode_pointer_counts_two_bytes() {
        setup();
        let buf = [
            4, b't', b'e', b's', b't', 0, // "test" @ 0
            3, b'f', b'o', b'o', 0xc0, 0, // "foo" + pointer to 0 @ 6
        ];
        let (name, offset) = Name::decode(&buf, 6).unwrap();
        assert_eq!(name, Name::from(vec!["foo", "test"]));
        assert_eq!(offset, 12);
    }

    #[test]
    fn test_decode_chained_pointers() {
        setup();
        let buf = [
            4, b't', b'e', b's', b't', 0, // "test" @ 0
            3, b'f', b'o', b'o', 0xc0, 0, // "foo.test" @ 6
            3, b'b', b'a', b'r', 0xc0, 6, // "bar.foo.test" @ 12
            0xc0, 12, // pointer only @ 18
        ];
        let (name, offset) = Name::decode(&buf, 18).unwrap();
        assert_eq!(name, Name::from(vec!["bar", "foo", "test"]));
        assert_eq!(offset, 20);
    }

    #[test]
    fn test_decode_pointer_loop_fails() {
        setup();
        let buf = [3, b'f', b'o', b'o', 0xc0, 0];
        assert!(matches!(
            Name::decode(&buf, 0),
            Err(MessageError::MalformedName { .. })
        ));

        let buf = [0xc0, 0];
        assert!(matches!(
            Name::decode(&buf, 0),
            Err(MessageError::MalformedName { .. })
        ));
    }

    #[test]
    fn test_decode_out_of_bounds() {
        setup();
        assert!(matches!(
            Name::decode(&[0xc0, 0x40], 0),
            Err(MessageError::MalformedName { .. })
        ));
        assert!(matches!(
            Name::decode(&[5, b'a', b'b'], 0),
            Err(MessageError::MalformedName { .. })
        ));
        assert_eq!(
            Name::decode(&[1, b'a'], 0),
            Err(MessageError::TruncatedMessage { offset: 2 })
        );
        assert!(matches!(
            Name::decode(&[0x40, b'a'], 0),
            Err(MessageError::MalformedName { .. })
        ));
    }

    #[test]
    fn test_encode_compresses_shared_suffix() {
        setup();
        let mut buf = BytesMut::new();
        let mut names = NameMap::new();
        Name::from("dc01.domain.test")
            .encode(&mut buf, &mut names, true)
            .unwrap();
        let written = Name::from("www.domain.test")
            .encode(&mut buf, &mut names, true)
            .unwrap();

        assert_eq!(written, 6);
        assert_eq!(&buf[18..], &[3, b'w', b'w', b'w', 0xc0, 5]);

        let (name, offset) = Name::decode(&buf, 18).unwrap();
        assert_eq!(name, Name::from("www.domain.test"));
        assert_eq!(offset, 24);
    }

    #[test]
    fn test_encode_without_compression_writes_literally() {
        setup();
        let mut buf = BytesMut::new();
        let mut names = NameMap::new();
        let name = Name::from("dc01.domain.test");
        name.encode(&mut buf, &mut names, true).unwrap();
        let written = name.encode(&mut buf, &mut names, false).unwrap();

        assert_eq!(written, 18);
        assert_eq!(&buf[..18], &buf[18..]);
        assert_eq!(names.get(&vec!["dc01".to_string(), "domain".into(), "test".into()][..]), Some(&0));
    }

    #[test]
    fn test_encode_is_case_sensitive() {
        setup();
        let mut buf = BytesMut::new();
        let mut names = NameMap::new();
        Name::from("DOMAIN.TEST").encode(&mut buf, &mut names, true).unwrap();
        let written = Name::from("domain.test")
            .encode(&mut buf, &mut names, true)
            .unwrap();
        assert_eq!(written, 13);
    }

    #[test]
    fn test_encode_root() {
        setup();
        let mut buf = BytesMut::new();
        let mut names = NameMap::new();
        assert_eq!(Name::single("").encode(&mut buf, &mut names, true).unwrap(), 1);
        assert_eq!(Name::default().encode(&mut buf, &mut names, true).unwrap(), 1);
        assert_eq!(&buf[..], &[0, 0]);
        assert!(names.is_empty());

        let (name, offset) = Name::decode(&buf, 0).unwrap();
        assert_eq!(name, Name::default());
        assert_eq!(offset, 1);
    }

    #[test]
    fn test_encode_rejects_bad_labels() {
        setup();
        let mut buf = BytesMut::new();
        let mut names = NameMap::new();
        assert!(matches!(
            Name::from("a..b").encode(&mut buf, &mut names, true),
            Err(MessageError::EmptyLabel(_))
        ));
        let long = "x".repeat(64);
        assert!(matches!(
            Name::single(&long).encode(&mut buf, &mut names, true),
            Err(MessageError::LabelTooLong(64, _))
        ));
    }

    #[test]
    fn test_decode_replaces_invalid_utf8() {
        setup();
        let buf = [2, 0xc3, 0x28, 0];
        let (name, _) = Name::decode(&buf, 0).unwrap();
        assert_eq!(name.labels(), ["\u{fffd}("]);

        let mut buf = BytesMut::new();
        name.encode(&mut buf, &mut NameMap::new(), false).unwrap();
        assert_eq!(&buf[..], &[4, 0xef, 0xbf, 0xbd, b'(', 0][..]);

        let mut buf = vec![63];
        buf.extend([0xff; 63]);
        buf.push(0);
        let (name, _) = Name::decode(&buf, 0).unwrap();
        assert!(matches!(
            name.encode(&mut BytesMut::new(), &mut NameMap::new(), false),
            Err(MessageError::LabelTooLong(189, _))
        ));
    }

    #[test]
    fn test_lookup_equality_ignores_case() {
        let a = Name::from("DC01.Domain.TEST");
        let b = Name::from("dc01.domain.test");
        assert_ne!(a, b);
        assert!(a.eq_ignore_case(&b));
        assert_eq!(a.lookup_key(), b.lookup_key());
    }
}
