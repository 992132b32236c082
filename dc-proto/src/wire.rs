use crate::{MessageError, Result};
use nom::IResult;

/// Runs a nom parser over `buf[offset..]`, returning the parsed value and the
/// offset just past it. Parser failures are reported as truncation at the
/// position the parser gave up.
pub(crate) fn parse_at<'a, O, P>(buf: &'a [u8], offset: usize, mut parser: P) -> Result<(O, usize)>
where
    P: FnMut(&'a [u8]) -> IResult<&'a [u8], O>,
{
    let input = buf
        .get(offset..)
        .ok_or(MessageError::TruncatedMessage { offset })?;
    match parser(input) {
        Ok((rest, value)) => Ok((value, buf.len() - rest.len())),
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => {
            Err(MessageError::TruncatedMessage {
                offset: buf.len() - e.input.len(),
            })
        }
        Err(nom::Err::Incomplete(_)) => Err(MessageError::TruncatedMessage { offset }),
    }
}

/// Converts a section length into its 16 bit wire count.
pub(crate) fn count(len: usize) -> Result<u16> {
    u16::try_from(len).map_err(|_| MessageError::SectionOverflow(len))
}

#[cfg(test)]
mod test {
    use super::*;
    use nom::number::complete::be_u16;

    #[test]
    fn test_parse_at_advances_offset() {
        let buf = [0xde, 0xad, 0xbe, 0xef];
        let (value, offset) = parse_at(&buf, 2, be_u16).unwrap();
        assert_eq!(value, 0xbeef);
        assert_eq!(offset, 4);
    }

    #[test]
    fn test_parse_at_reports_truncation() {
        let buf = [0xde, 0xad, 0xbe];
        assert_eq!(
            parse_at(&buf, 2, be_u16),
            Err(MessageError::TruncatedMessage { offset: 2 })
        );
        assert_eq!(
            parse_at(&buf, 7, be_u16),
            Err(MessageError::TruncatedMessage { offset: 7 })
        );
    }
}
