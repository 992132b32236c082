//! The LDAP messages exchanged by the DC locator over connectionless LDAP:
//! a base object search for the `Netlogon` attribute and its replies.

mod ber;
mod filter;

pub use filter::Filter;

use crate::{MessageError, Result};
use ber::Reader;
use bytes::{Bytes, BytesMut};
use std::fmt;
use tracing::{instrument, trace};

const SEARCH_REQUEST: u8 = 3;
const SEARCH_RESULT_ENTRY: u8 = 4;
const SEARCH_RESULT_DONE: u8 = 5;

#[derive(Debug, Clone, PartialEq)]
pub struct LdapMessage {
    pub message_id: i32,
    pub protocol_op: ProtocolOp,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProtocolOp {
    SearchRequest(SearchRequest),
    SearchResultEntry(SearchResultEntry),
    SearchResultDone(SearchResultDone),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    pub base_object: String,
    pub scope: SearchScope,
    pub deref_aliases: DerefAliases,
    pub size_limit: i32,
    pub time_limit: i32,
    pub types_only: bool,
    pub filter: Filter,
    pub attributes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchResultEntry {
    pub object_name: String,
    pub attributes: Vec<PartialAttribute>,
}

/// An attribute description and its raw values.
#[derive(Debug, Clone, PartialEq)]
pub struct PartialAttribute {
    pub attr_type: String,
    pub values: Vec<Bytes>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchResultDone {
    pub result_code: ResultCode,
    pub matched_dn: String,
    pub diagnostic_message: String,
}

impl LdapMessage {
    pub fn new(message_id: i32, protocol_op: ProtocolOp) -> Self {
        LdapMessage {
            message_id,
            protocol_op,
        }
    }

    /// Decodes the first message in `input`, returning it with whatever
    /// follows it. A reply datagram may hold several messages back to back.
    #[instrument(skip(input))]
    pub fn decode(input: &[u8]) -> Result<(LdapMessage, &[u8])> {
        let mut outer = Reader::new(input);
        let mut envelope = outer.read_sequence()?;
        let message_id = envelope.read_integer()?;

        let tag = envelope.peek_tag()?;
        let protocol_op = match tag {
            t if t == ber::application(SEARCH_REQUEST) => {
                ProtocolOp::SearchRequest(SearchRequest::read(envelope.read_constructed(t)?)?)
            }
            t if t == ber::application(SEARCH_RESULT_ENTRY) => ProtocolOp::SearchResultEntry(
                SearchResultEntry::read(envelope.read_constructed(t)?)?,
            ),
            t if t == ber::application(SEARCH_RESULT_DONE) => ProtocolOp::SearchResultDone(
                SearchResultDone::read(envelope.read_constructed(t)?)?,
            ),
            t => {
                return Err(MessageError::UnsupportedLdapChoice {
                    class: ber::class_of(t),
                    number: ber::number_of(t),
                })
            }
        };

        let message = LdapMessage::new(message_id, protocol_op);
        trace!("Read {}", message);

        Ok((message, outer.remaining()))
    }

    /// Decodes the first message in `input`.
    pub fn from_bytes(input: &[u8]) -> Result<LdapMessage> {
        LdapMessage::decode(input).map(|(message, _)| message)
    }

    /// Appends the BER encoding of the message to `buf`, returning the number
    /// of bytes written.
    #[instrument(skip(buf))]
    pub fn to_bytes(&self, buf: &mut BytesMut) -> Result<usize> {
        let start = buf.len();
        ber::write_constructed(buf, ber::SEQUENCE, |buf| {
            ber::write_integer(buf, self.message_id);
            match &self.protocol_op {
                ProtocolOp::SearchRequest(op) => {
                    ber::write_constructed(buf, ber::application(SEARCH_REQUEST), |buf| {
                        op.write(buf)
                    })
                }
                ProtocolOp::SearchResultEntry(op) => {
                    ber::write_constructed(buf, ber::application(SEARCH_RESULT_ENTRY), |buf| {
                        op.write(buf)
                    })
                }
                ProtocolOp::SearchResultDone(op) => {
                    ber::write_constructed(buf, ber::application(SEARCH_RESULT_DONE), |buf| {
                        op.write(buf)
                    })
                }
            }
        })?;

        trace!("Wrote {} bytes", buf.len() - start);
        Ok(buf.len() - start)
    }
}

impl SearchRequest {
    fn read(mut reader: Reader<'_>) -> Result<SearchRequest> {
        let base_object = reader.read_string()?;
        let scope = SearchScope::try_from(reader.read_enumerated()?)?;
        let deref_aliases = DerefAliases::try_from(reader.read_enumerated()?)?;
        let size_limit = reader.read_integer()?;
        let time_limit = reader.read_integer()?;
        let types_only = reader.read_boolean()?;
        let filter = Filter::read(&mut reader)?;

        let mut attributes = Vec::new();
        let mut list = reader.read_sequence()?;
        while list.has_data() {
            attributes.push(list.read_string()?);
        }

        Ok(SearchRequest {
            base_object,
            scope,
            deref_aliases,
            size_limit,
            time_limit,
            types_only,
            filter,
            attributes,
        })
    }

    fn write(&self, buf: &mut BytesMut) -> Result<()> {
        ber::write_octet_string(buf, self.base_object.as_bytes());
        ber::write_enumerated(buf, self.scope as i32);
        ber::write_enumerated(buf, self.deref_aliases as i32);
        ber::write_integer(buf, self.size_limit);
        ber::write_integer(buf, self.time_limit);
        ber::write_boolean(buf, self.types_only);
        self.filter.write(buf)?;
        ber::write_constructed(buf, ber::SEQUENCE, |buf| {
            for attr in &self.attributes {
                ber::write_octet_string(buf, attr.as_bytes());
            }
            Ok(())
        })
    }
}

impl SearchResultEntry {
    fn read(mut reader: Reader<'_>) -> Result<SearchResultEntry> {
        let object_name = reader.read_string()?;

        let mut attributes = Vec::new();
        let mut list = reader.read_sequence()?;
        while list.has_data() {
            attributes.push(PartialAttribute::read(list.read_sequence()?)?);
        }

        Ok(SearchResultEntry {
            object_name,
            attributes,
        })
    }

    fn write(&self, buf: &mut BytesMut) -> Result<()> {
        ber::write_octet_string(buf, self.object_name.as_bytes());
        ber::write_constructed(buf, ber::SEQUENCE, |buf| {
            for attr in &self.attributes {
                attr.write(buf)?;
            }
            Ok(())
        })
    }
}

impl PartialAttribute {
    pub fn new(attr_type: &str, values: Vec<Bytes>) -> Self {
        PartialAttribute {
            attr_type: attr_type.to_string(),
            values,
        }
    }

    fn read(mut reader: Reader<'_>) -> Result<PartialAttribute> {
        let attr_type = reader.read_string()?;

        let mut values = Vec::new();
        let mut set = reader.read_set()?;
        while set.has_data() {
            values.push(Bytes::copy_from_slice(set.read_octet_string()?));
        }

        Ok(PartialAttribute { attr_type, values })
    }

    fn write(&self, buf: &mut BytesMut) -> Result<()> {
        ber::write_constructed(buf, ber::SEQUENCE, |buf| {
            ber::write_octet_string(buf, self.attr_type.as_bytes());
            ber::write_constructed(buf, ber::SET, |buf| {
                for value in &self.values {
                    ber::write_octet_string(buf, value);
                }
                Ok(())
            })
        })
    }
}

impl SearchResultDone {
    pub fn new(result_code: ResultCode, diagnostic_message: &str) -> Self {
        SearchResultDone {
            result_code,
            matched_dn: String::new(),
            diagnostic_message: diagnostic_message.to_string(),
        }
    }

    fn read(mut reader: Reader<'_>) -> Result<SearchResultDone> {
        let result_code = ResultCode::from(reader.read_enumerated()?);
        let matched_dn = reader.read_string()?;
        let diagnostic_message = reader.read_string()?;

        Ok(SearchResultDone {
            result_code,
            matched_dn,
            diagnostic_message,
        })
    }

    fn write(&self, buf: &mut BytesMut) -> Result<()> {
        ber::write_enumerated(buf, self.result_code.into());
        ber::write_octet_string(buf, self.matched_dn.as_bytes());
        ber::write_octet_string(buf, self.diagnostic_message.as_bytes());
        Ok(())
    }
}

impl fmt::Display for LdapMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> std::result::Result<(), fmt::Error> {
        write!(f, "LdapMessage(id:{}) - ", self.message_id)?;
        match &self.protocol_op {
            ProtocolOp::SearchRequest(op) => write!(
                f,
                "SearchRequest base:'{}' scope:{:?} filter:{} attributes:{:?}",
                op.base_object, op.scope, op.filter, op.attributes
            ),
            ProtocolOp::SearchResultEntry(op) => {
                write!(f, "SearchResultEntry object:'{}' [", op.object_name)?;
                for (i, attr) in op.attributes.iter().enumerate() {
                    if i != 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}({} values)", attr.attr_type, attr.values.len())?;
                }
                write!(f, "]")
            }
            ProtocolOp::SearchResultDone(op) => write!(
                f,
                "SearchResultDone {:?} '{}'",
                op.result_code, op.diagnostic_message
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchScope {
    BaseObject = 0,
    SingleLevel = 1,
    WholeSubtree = 2,
}

impl TryFrom<i32> for SearchScope {
    type Error = MessageError;

    fn try_from(value: i32) -> Result<Self> {
        match value {
            0 => Ok(SearchScope::BaseObject),
            1 => Ok(SearchScope::SingleLevel),
            2 => Ok(SearchScope::WholeSubtree),
            _ => Err(MessageError::InvalidEnumerated {
                field: "scope",
                value: value as i64,
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DerefAliases {
    Never = 0,
    InSearching = 1,
    FindingBaseObj = 2,
    Always = 3,
}

impl TryFrom<i32> for DerefAliases {
    type Error = MessageError;

    fn try_from(value: i32) -> Result<Self> {
        match value {
            0 => Ok(DerefAliases::Never),
            1 => Ok(DerefAliases::InSearching),
            2 => Ok(DerefAliases::FindingBaseObj),
            3 => Ok(DerefAliases::Always),
            _ => Err(MessageError::InvalidEnumerated {
                field: "derefAliases",
                value: value as i64,
            }),
        }
    }
}

macro_rules! result_codes {
    ($($variant:ident = $code:literal,)+) => {
        /// LDAPv3 result codes (rfc4511 appendix A).
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub enum ResultCode {
            $($variant,)+
            Unknown(i32),
        }

        impl From<ResultCode> for i32 {
            fn from(code: ResultCode) -> i32 {
                match code {
                    $(ResultCode::$variant => $code,)+
                    ResultCode::Unknown(i) => i,
                }
            }
        }

        impl From<i32> for ResultCode {
            fn from(val: i32) -> Self {
                match val {
                    $($code => ResultCode::$variant,)+
                    _ => ResultCode::Unknown(val),
                }
            }
        }
    };
}

result_codes! {
    Success = 0,
    OperationsError = 1,
    ProtocolError = 2,
    TimeLimitExceeded = 3,
    SizeLimitExceeded = 4,
    CompareFalse = 5,
    CompareTrue = 6,
    AuthMethodNotSupported = 7,
    StrongerAuthRequired = 8,
    Referral = 10,
    AdminLimitExceeded = 11,
    UnavailableCriticalExtension = 12,
    ConfidentialityRequired = 13,
    SaslBindInProgress = 14,
    NoSuchAttribute = 16,
    UndefinedAttributeType = 17,
    InappropriateMatching = 18,
    ConstraintViolation = 19,
    AttributeOrValueExists = 20,
    InvalidAttributeSyntax = 21,
    NoSuchObject = 32,
    AliasProblem = 33,
    InvalidDnSyntax = 34,
    IsLeaf = 35,
    AliasDereferencingProblem = 36,
    InappropriateAuthentication = 48,
    InvalidCredentials = 49,
    InsufficientAccessRights = 50,
    Busy = 51,
    Unavailable = 52,
    UnwillingToPerform = 53,
    LoopDetect = 54,
    NamingViolation = 64,
    ObjectClassViolation = 65,
    NotAllowedOnNonLeaf = 66,
    NotAllowedOnRdn = 67,
    EntryAlreadyExists = 68,
    ObjectClassModsProhibited = 69,
    AffectsMultipleDsas = 71,
    Other = 80,
}
