use std::net::{IpAddr, Ipv4Addr, SocketAddr};

pub const DNS_PORT: u16 = 53;
pub const KDC_PORT: u16 = 88;
pub const LDAP_PORT: u16 = 389;
pub const DEFAULT_REALM: &str = "contoso.com";
pub const DEFAULT_SITE: &str = "Default-First-Site-Name";

/// What a [`crate::DatagramServer`] does when its handler fails on a
/// datagram.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ErrorPolicy {
    /// Log the error and stop the server with it.
    #[default]
    Abort,

    /// Log the error, drop the datagram and keep serving.
    Continue,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Address both servers listen on and the A record for the DC points at.
    pub listen_addr: IpAddr,
    pub dns_port: u16,
    pub ldap_port: u16,

    /// Only advertised in SRV records; nothing listens on it here.
    pub kdc_port: u16,

    pub realm: String,

    /// First label of the DC's host name.
    pub host: String,
    pub site: String,
    pub error_policy: ErrorPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            listen_addr: IpAddr::V4(Ipv4Addr::LOCALHOST),
            dns_port: DNS_PORT,
            ldap_port: LDAP_PORT,
            kdc_port: KDC_PORT,
            realm: DEFAULT_REALM.to_string(),
            host: "dc01".to_string(),
            site: DEFAULT_SITE.to_string(),
            error_policy: ErrorPolicy::Abort,
        }
    }
}

impl Config {
    pub fn dns_addr(&self) -> SocketAddr {
        SocketAddr::new(self.listen_addr, self.dns_port)
    }

    pub fn ldap_addr(&self) -> SocketAddr {
        SocketAddr::new(self.listen_addr, self.ldap_port)
    }

    /// The DC's fully qualified host name, e.g. `dc01.contoso.com`.
    pub fn host_name(&self) -> String {
        format!("{}.{}", self.host, self.realm)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.dns_addr(), "127.0.0.1:53".parse().unwrap());
        assert_eq!(config.ldap_addr(), "127.0.0.1:389".parse().unwrap());
        assert_eq!(config.host_name(), "dc01.contoso.com");
        assert_eq!(config.error_policy, ErrorPolicy::Abort);
    }
}
