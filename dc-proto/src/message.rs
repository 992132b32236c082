use crate::{Header, NameMap, Question, ResourceRecord, Result};
use bytes::BytesMut;
use std::fmt;
use tracing::{instrument, trace};

#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub header: Header,
    pub questions: Vec<Question>,
    pub answers: Vec<ResourceRecord>,
    pub name_servers: Vec<ResourceRecord>,
    pub additional_records: Vec<ResourceRecord>,
}

impl Message {
    /// Reads the u8 buffer and parses the DNS message from it.
    ///
    /// This includes the dereferencing of rfc1035 Message Compression pointers.
    /// Exactly the number of entries the header declares is read for each
    /// section; trailing bytes are ignored.
    #[instrument(skip(input))]
    pub fn from_bytes(input: &[u8]) -> Result<Message> {
        let (header, counts, mut offset) = Header::read(input)?;

        let mut questions = Vec::with_capacity(counts.qd_count as usize);
        for _ in 0..counts.qd_count {
            let (question, next) = Question::read(input, offset)?;
            questions.push(question);
            offset = next;
        }

        let mut sections = [
            Vec::with_capacity(counts.an_count as usize),
            Vec::with_capacity(counts.ns_count as usize),
            Vec::with_capacity(counts.ar_count as usize),
        ];
        let declared = [counts.an_count, counts.ns_count, counts.ar_count];
        for (section, count) in sections.iter_mut().zip(declared) {
            for _ in 0..count {
                let (record, next) = ResourceRecord::read(input, offset)?;
                section.push(record);
                offset = next;
            }
        }
        let [answers, name_servers, additional_records] = sections;

        let message = Message {
            header,
            questions,
            answers,
            name_servers,
            additional_records,
        };

        trace!("Read input as: {}", message);

        Ok(message)
    }

    /// Serializes the Message to bytes into the provided buffer, returning the
    /// number of bytes written to the buffer.
    ///
    /// One compression map is shared by every name in the message, so the
    /// message must start at the beginning of `buf`.
    #[instrument(skip(buf))]
    pub fn to_bytes(&self, buf: &mut BytesMut) -> Result<usize> {
        let mut names = NameMap::new();

        let mut byte_count = self.header.to_bytes(self, buf)?;
        for q in self.questions.iter() {
            byte_count += q.to_bytes(buf, &mut names)?;
        }
        for a in self
            .answers
            .iter()
            .chain(self.name_servers.iter())
            .chain(self.additional_records.iter())
        {
            byte_count += a.to_bytes(buf, &mut names)?;
        }

        trace!("Wrote {} bytes", byte_count);

        Ok(byte_count)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> std::result::Result<(), fmt::Error> {
        write!(f, "Message(id:{}, flags:{}) - ", self.header.id, self.header.flags)?;
        write!(f, "Query [")?;
        for (i, q) in self.questions.iter().enumerate() {
            if i != 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}({})", q.q_name, q.q_type)?;
        }
        write!(f, "]")?;
        if self.header.flags.qr() {
            write!(f, " - Response [")?;
            for (i, a) in self
                .answers
                .iter()
                .chain(self.name_servers.iter())
                .chain(self.additional_records.iter())
                .enumerate()
            {
                if i != 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{} => {}", a.name, a.data)?;
            }
            write!(f, "]")?;
        }
        Ok(())
    }
}
