//! Wire formats spoken by a domain controller's discovery surface: DNS
//! messages, the LDAP search subset used by the DC locator and the Netlogon
//! SAM logon response it carries.

mod builder;
mod error;
mod header;
pub mod ldap;
mod message;
mod name;
pub mod netlogon;
mod question;
mod resource_record;
mod wire;

pub use builder::{MessageBuilder, ResourceRecordBuilder};
pub use error::{MessageError, TagClass};
pub use header::{Flags, Header, OpCode, RCode};
pub use message::Message;
pub use name::{Name, NameMap};
pub use question::{Class, Question, Type};
pub use resource_record::{RData, ResourceRecord, Soa, Srv};

pub type Result<T> = std::result::Result<T, MessageError>;

#[cfg(test)]
mod test {
    use std::sync::Once;

    static INIT: Once = Once::new();

    pub fn setup() {
        INIT.call_once(|| {
            tracing_subscriber::fmt::init();
        });
    }
}
