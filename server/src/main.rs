use anyhow::Context;
use clap::Parser;
use dc_proto::netlogon::{DsFlags, NetlogonOpcode, NetlogonSamLogonResponseEx, NtVersion};
use dc_server::{
    Config, DatagramHandler, DatagramServer, DnsHandler, DnsZone, ErrorPolicy, LdapHandler,
    RecordStore, DEFAULT_REALM,
};
use std::future::Future;
use std::io;
use std::net::IpAddr;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "dc-server")]
#[command(about = "Answers DC locator DNS and CLDAP pings for a single realm")]
struct Cli {
    /// Address to listen on and to publish for the DC
    listen: Option<IpAddr>,

    /// Realm (DNS domain) to serve
    #[arg(short, long, default_value = DEFAULT_REALM)]
    realm: String,

    /// DNS server port
    #[arg(long)]
    dns_port: Option<u16>,

    /// CLDAP server port
    #[arg(long)]
    ldap_port: Option<u16>,

    /// Drop datagrams that fail to process instead of stopping
    #[arg(long)]
    continue_on_error: bool,
}

impl Cli {
    fn into_config(self) -> Config {
        let defaults = Config::default();
        Config {
            listen_addr: self.listen.unwrap_or(defaults.listen_addr),
            dns_port: self.dns_port.unwrap_or(defaults.dns_port),
            ldap_port: self.ldap_port.unwrap_or(defaults.ldap_port),
            realm: self.realm,
            error_policy: if self.continue_on_error {
                ErrorPolicy::Continue
            } else {
                ErrorPolicy::Abort
            },
            ..defaults
        }
    }
}

fn zone(config: &Config) -> anyhow::Result<DnsZone> {
    let host_name = config.host_name();
    let mut zone = DnsZone::new(&config.realm);

    match config.listen_addr {
        IpAddr::V4(addr) => zone.add_a(&host_name, addr)?,
        IpAddr::V6(addr) => warn!("Not publishing an A record for IPv6 address {}", addr),
    }
    zone.add_srv(
        &format!("_kerberos._tcp.dc._msdcs.{}", config.realm),
        &host_name,
        config.kdc_port,
    )?;
    zone.add_srv(
        &format!("_ldap._tcp.dc._msdcs.{}", config.realm),
        &host_name,
        config.ldap_port,
    )?;

    Ok(zone)
}

fn netlogon(config: &Config, domain_guid: Uuid) -> NetlogonSamLogonResponseEx {
    NetlogonSamLogonResponseEx {
        opcode: NetlogonOpcode::SamLogonResponseEx,
        flags: DsFlags::PDC
            | DsFlags::GC
            | DsFlags::LDAP
            | DsFlags::DS
            | DsFlags::KDC
            | DsFlags::TIMESERV
            | DsFlags::CLOSEST
            | DsFlags::WRITABLE
            | DsFlags::GOOD_TIMESERV
            | DsFlags::FULL_SECRET_DOMAIN_6
            | DsFlags::WS
            | DsFlags::DS_8
            | DsFlags::DS_9
            | DsFlags::DS_10
            | DsFlags::KEY_LIST
            | DsFlags::DS_13,
        domain_guid,
        dns_forest_name: config.realm.clone(),
        dns_domain_name: config.realm.clone(),
        dns_host_name: config.host_name(),
        netbios_domain_name: String::new(),
        netbios_computer_name: String::new(),
        user_name: String::new(),
        dc_site_name: config.site.clone(),
        client_site_name: config.site.clone(),
        next_closest_site_name: None,
        nt_version: NtVersion::V1 | NtVersion::V5EX,
        lm_nt_token: 0xffff,
        lm20_token: 0xffff,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Cli::parse().into_config();
    info!("Serving realm {} on {}", config.realm, config.listen_addr);

    let mut responses = RecordStore::new();
    responses.insert(&config.realm, netlogon(&config, Uuid::new_v4()))?;

    let mut dns = DatagramServer::new(
        "dns",
        config.dns_addr(),
        DnsHandler::new(zone(&config)?),
        config.error_policy,
    );
    let mut ldap = DatagramServer::new(
        "ldap",
        config.ldap_addr(),
        LdapHandler::new(responses),
        config.error_policy,
    );

    dns.start()
        .await
        .with_context(|| format!("failed to bind DNS on {}", config.dns_addr()))?;
    ldap.start()
        .await
        .with_context(|| format!("failed to bind CLDAP on {}", config.ldap_addr()))?;

    serve_until(&mut dns, &mut ldap, tokio::signal::ctrl_c()).await
}

/// Runs until `shutdown` completes or either server stops by itself, then
/// stops both. A server that stopped on an error fails the whole run.
async fn serve_until<D, L>(
    dns: &mut DatagramServer<D>,
    ldap: &mut DatagramServer<L>,
    shutdown: impl Future<Output = io::Result<()>>,
) -> anyhow::Result<()>
where
    D: DatagramHandler,
    L: DatagramHandler,
{
    let outcome = tokio::select! {
        signal = shutdown => {
            signal?;
            info!("Shutting down");
            Ok(())
        }
        outcome = dns.wait() => outcome.context("DNS server stopped"),
        outcome = ldap.wait() => outcome.context("CLDAP server stopped"),
    };
    if let Err(e) = &outcome {
        error!("{:#}", e);
    }

    dns.stop().await?;
    ldap.stop().await?;

    outcome
}
