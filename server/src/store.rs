use crate::{Result, ServerError};
use dc_proto::{Class, Name, RData, ResourceRecord, ResourceRecordBuilder, Soa, Srv};
use std::collections::HashMap;
use std::net::Ipv4Addr;
use tracing::debug;

const SOA_TTL: i32 = 900;
const A_TTL: i32 = 3600;
const SRV_TTL: i32 = 600;
const SRV_PRIORITY: u16 = 0;
const SRV_WEIGHT: u16 = 100;

/// Values keyed by a case-insensitive name. Only exact matches are found:
/// no wildcards and no parent domains.
#[derive(Debug, Clone)]
pub struct RecordStore<V> {
    entries: HashMap<String, V>,
}

impl<V> Default for RecordStore<V> {
    fn default() -> Self {
        RecordStore {
            entries: HashMap::new(),
        }
    }
}

impl<V> RecordStore<V> {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn insert(&mut self, key: &str, value: V) -> Result<()> {
        let key = key.to_lowercase();
        if self.entries.contains_key(&key) {
            return Err(ServerError::DuplicateKey(key));
        }
        self.entries.insert(key, value);
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&V> {
        self.entries.get(&key.to_lowercase())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// The records served for one realm, plus the SOA returned with every name
/// error.
#[derive(Debug, Clone)]
pub struct DnsZone {
    soa: ResourceRecord,
    a_records: RecordStore<ResourceRecord>,
    srv_records: RecordStore<ResourceRecord>,
}

impl DnsZone {
    pub fn new(realm: &str) -> Self {
        let apex = Name::from_dotted(realm);
        let soa = ResourceRecordBuilder::new(
            apex.clone(),
            RData::SOA(Soa {
                primary_name_server: apex.clone(),
                mailbox: apex,
                serial: 16,
                refresh: 900,
                retry: 300,
                expire: 604800,
                minimum: 900,
            }),
        )
        .class(Class::IN)
        .ttl(SOA_TTL)
        .build();

        DnsZone {
            soa,
            a_records: RecordStore::new(),
            srv_records: RecordStore::new(),
        }
    }

    pub fn add_a(&mut self, name: &str, addr: Ipv4Addr) -> Result<()> {
        let record = ResourceRecordBuilder::new(name, RData::A(addr))
            .ttl(A_TTL)
            .build();
        self.a_records.insert(name, record)?;
        debug!("Added A {} -> {}", name, addr);
        Ok(())
    }

    pub fn add_srv(&mut self, name: &str, target: &str, port: u16) -> Result<()> {
        let record = ResourceRecordBuilder::new(
            name,
            RData::SRV(Srv {
                priority: SRV_PRIORITY,
                weight: SRV_WEIGHT,
                port,
                target: Name::from_dotted(target),
            }),
        )
        .ttl(SRV_TTL)
        .build();
        self.srv_records.insert(name, record)?;
        debug!("Added SRV {} -> {}:{}", name, target, port);
        Ok(())
    }

    pub fn a(&self, name: &Name) -> Option<&ResourceRecord> {
        self.a_records.get(&name.to_dotted())
    }

    pub fn srv(&self, name: &Name) -> Option<&ResourceRecord> {
        self.srv_records.get(&name.to_dotted())
    }

    pub fn soa(&self) -> &ResourceRecord {
        &self.soa
    }
}
