use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MessageError {
    /// A compression pointer or label could not be followed.
    #[error("malformed name at offset {offset}: {reason}")]
    MalformedName { offset: usize, reason: &'static str },

    /// The buffer ended before the field starting at `offset` was complete.
    #[error("truncated message at offset {offset}")]
    TruncatedMessage { offset: usize },

    #[error("unsupported resource record type {0}")]
    UnsupportedRecordType(u16),

    #[error("unsupported LDAP choice {class:?} [{number}]")]
    UnsupportedLdapChoice { class: TagClass, number: u8 },

    #[error("invalid BER encoding: {0}")]
    InvalidBer(&'static str),

    #[error("invalid {field} value {value}")]
    InvalidEnumerated { field: &'static str, value: i64 },

    #[error("label of {0} bytes exceeds 63: {1}")]
    LabelTooLong(usize, String),

    #[error("empty label inside name {0}")]
    EmptyLabel(String),

    #[error("section of {0} records does not fit a 16 bit count")]
    SectionOverflow(usize),
}

/// The class bits of a BER identifier octet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagClass {
    Universal,
    Application,
    ContextSpecific,
    Private,
}
