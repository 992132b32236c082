mod config;
mod dns;
mod error;
mod ldap;
mod server;
mod store;

pub use config::{Config, ErrorPolicy, DEFAULT_REALM, DEFAULT_SITE, DNS_PORT, KDC_PORT, LDAP_PORT};
pub use dns::DnsHandler;
pub use error::{Result, ServerError};
pub use ldap::LdapHandler;
pub use server::{DatagramHandler, DatagramServer, ServerState};
pub use store::{DnsZone, RecordStore};

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
