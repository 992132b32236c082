//! NETLOGON_SAM_LOGON_RESPONSE_EX, the value of the `Netlogon` attribute a
//! domain controller returns to the DC locator (MS-ADTS 6.3.1.9).

use crate::{wire, MessageError, Name, NameMap, Result};
use bitflags::bitflags;
use bytes::{BufMut, Bytes, BytesMut};
use nom::bytes::complete::take;
use nom::number::complete::{le_u16, le_u32};
use nom::sequence::tuple;
use std::fmt;
use tracing::{instrument, trace};
use uuid::Uuid;

/// Bytes of DcSockAddrSize and DcSockAddr present when the request asked for
/// [`NtVersion::V5EX_WITH_IP`].
const SOCK_ADDR_LEN: usize = 17;

/// NtVersion, two tokens.
const TRAILER_LEN: usize = 8;

bitflags! {
    /// The NETLOGON_NT_VERSION options a client sends in its `NtVer` filter
    /// and a server echoes back.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct NtVersion: u32 {
        const V1 = 0x0000_0001;
        const V5 = 0x0000_0002;
        const V5EX = 0x0000_0004;
        const V5EX_WITH_IP = 0x0000_0008;
        const WITH_CLOSEST_SITE = 0x0000_0010;
        const AVOID_NT4EMUL = 0x0100_0000;
        const PDC = 0x1000_0000;
        const IP = 0x2000_0000;
        const LOCAL = 0x4000_0000;
        const GC = 0x8000_0000;
    }
}

bitflags! {
    /// DS_FLAG options describing the capabilities of the responding server.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct DsFlags: u32 {
        const PDC = 0x0000_0001;
        const GC = 0x0000_0004;
        const LDAP = 0x0000_0008;
        const DS = 0x0000_0010;
        const KDC = 0x0000_0020;
        const TIMESERV = 0x0000_0040;
        const CLOSEST = 0x0000_0080;
        const WRITABLE = 0x0000_0100;
        const GOOD_TIMESERV = 0x0000_0200;
        const NDNC = 0x0000_0400;
        const SELECT_SECRET_DOMAIN_6 = 0x0000_0800;
        const FULL_SECRET_DOMAIN_6 = 0x0000_1000;
        const WS = 0x0000_2000;
        const DS_8 = 0x0000_4000;
        const DS_9 = 0x0000_8000;
        const DS_10 = 0x0001_0000;
        const KEY_LIST = 0x0002_0000;
        /// Missing from the published headers; nltest reports it.
        const DS_13 = 0x0004_0000;
        const DNS_CONTROLLER = 0x2000_0000;
        const DNS_DOMAIN = 0x4000_0000;
        const DNS_FOREST = 0x8000_0000;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetlogonOpcode {
    PrimaryQuery,
    PrimaryResponse,
    SamLogonRequest,
    SamLogonResponse,
    SamPauseResponse,
    SamUserUnknown,
    SamLogonResponseEx,
    SamPauseResponseEx,
    SamUserUnknownEx,
    Unknown(u16),
}

impl From<NetlogonOpcode> for u16 {
    fn from(op: NetlogonOpcode) -> u16 {
        match op {
            NetlogonOpcode::PrimaryQuery => 7,
            NetlogonOpcode::PrimaryResponse => 12,
            NetlogonOpcode::SamLogonRequest => 18,
            NetlogonOpcode::SamLogonResponse => 19,
            NetlogonOpcode::SamPauseResponse => 20,
            NetlogonOpcode::SamUserUnknown => 21,
            NetlogonOpcode::SamLogonResponseEx => 23,
            NetlogonOpcode::SamPauseResponseEx => 24,
            NetlogonOpcode::SamUserUnknownEx => 25,
            NetlogonOpcode::Unknown(i) => i,
        }
    }
}

impl From<u16> for NetlogonOpcode {
    fn from(val: u16) -> Self {
        match val {
            7 => NetlogonOpcode::PrimaryQuery,
            12 => NetlogonOpcode::PrimaryResponse,
            18 => NetlogonOpcode::SamLogonRequest,
            19 => NetlogonOpcode::SamLogonResponse,
            20 => NetlogonOpcode::SamPauseResponse,
            21 => NetlogonOpcode::SamUserUnknown,
            23 => NetlogonOpcode::SamLogonResponseEx,
            24 => NetlogonOpcode::SamPauseResponseEx,
            25 => NetlogonOpcode::SamUserUnknownEx,
            n => NetlogonOpcode::Unknown(n),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetlogonSamLogonResponseEx {
    pub opcode: NetlogonOpcode,
    pub flags: DsFlags,
    pub domain_guid: Uuid,
    pub dns_forest_name: String,
    pub dns_domain_name: String,
    pub dns_host_name: String,
    pub netbios_domain_name: String,
    pub netbios_computer_name: String,
    pub user_name: String,
    pub dc_site_name: String,
    pub client_site_name: String,
    pub next_closest_site_name: Option<String>,
    pub nt_version: NtVersion,
    pub lm_nt_token: u16,
    pub lm20_token: u16,
}

impl NetlogonSamLogonResponseEx {
    /// Serializes the response. DNS names are split on dots, NetBIOS, user
    /// and site names are written as one label each, and all of them share
    /// one compression map.
    #[instrument(skip(self), fields(domain = %self.dns_domain_name))]
    pub fn pack(&self) -> Result<Bytes> {
        let mut buf = BytesMut::with_capacity(128);
        let mut names = NameMap::new();

        buf.put_u16_le(self.opcode.into());
        buf.put_u16_le(0); // Sbz
        buf.put_u32_le(self.flags.bits());
        buf.put_slice(&self.domain_guid.to_bytes_le());

        for dns_name in [
            &self.dns_forest_name,
            &self.dns_domain_name,
            &self.dns_host_name,
        ] {
            Name::from_dotted(dns_name).encode(&mut buf, &mut names, true)?;
        }
        for label in [
            &self.netbios_domain_name,
            &self.netbios_computer_name,
            &self.user_name,
            &self.dc_site_name,
            &self.client_site_name,
        ] {
            Name::single(label).encode(&mut buf, &mut names, true)?;
        }
        if let Some(site) = &self.next_closest_site_name {
            Name::single(site).encode(&mut buf, &mut names, true)?;
        }

        buf.put_u32_le(self.nt_version.bits());
        buf.put_u16_le(self.lm_nt_token);
        buf.put_u16_le(self.lm20_token);

        trace!("Packed {} bytes", buf.len());

        Ok(buf.freeze())
    }

    /// Reads a response. The layout depends on what the client asked for, so
    /// the `request` NtVersion flags must be the ones sent in the search that
    /// produced `data`.
    #[instrument(skip(data))]
    pub fn unpack(data: &[u8], request: NtVersion) -> Result<Self> {
        let ((opcode, _sbz, flags, guid), offset) =
            wire::parse_at(data, 0, tuple((le_u16, le_u16, le_u32, take(16usize))))?;
        let domain_guid = Uuid::from_slice_le(guid)
            .map_err(|_| MessageError::TruncatedMessage { offset: 8 })?;

        let mut offset = offset;
        let mut read_name = || -> Result<String> {
            let (name, next) = Name::decode(data, offset)?;
            offset = next;
            Ok(name.to_dotted())
        };
        let dns_forest_name = read_name()?;
        let dns_domain_name = read_name()?;
        let dns_host_name = read_name()?;
        let netbios_domain_name = read_name()?;
        let netbios_computer_name = read_name()?;
        let user_name = read_name()?;
        let dc_site_name = read_name()?;
        let client_site_name = read_name()?;

        if request.contains(NtVersion::V5EX_WITH_IP) {
            offset += SOCK_ADDR_LEN;
        }

        let mut next_closest_site_name = None;
        if request.contains(NtVersion::WITH_CLOSEST_SITE)
            && data.len().saturating_sub(offset) > TRAILER_LEN
        {
            let (name, next) = Name::decode(data, offset)?;
            next_closest_site_name = Some(name.to_dotted());
            offset = next;
        }

        let ((nt_version, lm_nt_token, lm20_token), _) =
            wire::parse_at(data, offset, tuple((le_u32, le_u16, le_u16)))?;

        Ok(NetlogonSamLogonResponseEx {
            opcode: NetlogonOpcode::from(opcode),
            flags: DsFlags::from_bits_retain(flags),
            domain_guid,
            dns_forest_name,
            dns_domain_name,
            dns_host_name,
            netbios_domain_name,
            netbios_computer_name,
            user_name,
            dc_site_name,
            client_site_name,
            next_closest_site_name,
            nt_version: NtVersion::from_bits_retain(nt_version),
            lm_nt_token,
            lm20_token,
        })
    }
}

impl fmt::Display for NetlogonSamLogonResponseEx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> std::result::Result<(), fmt::Error> {
        write!(
            f,
            "{:?} domain:{} host:{} guid:{} site:{} flags:{:#010x} nt_version:{:#x}",
            self.opcode,
            self.dns_domain_name,
            self.dns_host_name,
            self.domain_guid,
            self.dc_site_name,
            self.flags.bits(),
            self.nt_version.bits()
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test::setup;

    const PAYLOAD: &str = "17000000FDF307001AEB7668C6B2CA4BB69CFEDA682E82FD06646F6D61696E047465737400C0180444433031C01806444F4D41494E00044443303100001744656661756C742D46697273742D536974652D4E616D6500C03D05000000FFFFFFFF";

    fn response() -> NetlogonSamLogonResponseEx {
        NetlogonSamLogonResponseEx {
            opcode: NetlogonOpcode::SamLogonResponseEx,
            flags: DsFlags::from_bits_retain(521213),
            domain_guid: "6876eb1a-b2c6-4bca-b69c-feda682e82fd".parse().unwrap(),
            dns_forest_name: "domain.test".to_string(),
            dns_domain_name: "domain.test".to_string(),
            dns_host_name: "DC01.domain.test".to_string(),
            netbios_domain_name: "DOMAIN".to_string(),
            netbios_computer_name: "DC01".to_string(),
            user_name: String::new(),
            dc_site_name: "Default-First-Site-Name".to_string(),
            client_site_name: "Default-First-Site-Name".to_string(),
            next_closest_site_name: None,
            nt_version: NtVersion::V1 | NtVersion::V5EX,
            lm_nt_token: 0xffff,
            lm20_token: 0xffff,
        }
    }

    #[test]
    fn test_unpack() {
        setup();
        let data = hex::decode(PAYLOAD).unwrap();
        let request = NtVersion::from_bits_retain(0x2000_0016);
        assert!(request.contains(NtVersion::WITH_CLOSEST_SITE));

        let unpacked = NetlogonSamLogonResponseEx::unpack(&data, request).unwrap();
        assert_eq!(unpacked, response());
        assert_eq!(unpacked.next_closest_site_name, None);
        assert!(unpacked.flags.contains(DsFlags::PDC | DsFlags::KDC | DsFlags::DS_13));
        assert!(!unpacked.flags.contains(DsFlags::NDNC));
    }

    #[test]
    fn test_pack() {
        setup();
        let packed = response().pack().unwrap();
        assert_eq!(hex::encode_upper(&packed), PAYLOAD);
    }

    #[test]
    fn test_next_closest_site() {
        setup();
        let mut expected = response();
        expected.next_closest_site_name = Some("Branch".to_string());
        let packed = expected.pack().unwrap();
        assert_eq!(packed.len(), 96 + 8);

        let without = NetlogonSamLogonResponseEx::unpack(&packed, NtVersion::V5EX).unwrap();
        assert_eq!(without.next_closest_site_name, None);
        // Without the flag the site name is read as the trailer.
        assert_eq!(without.nt_version.bits(), 0x6172_4206);

        let with = NetlogonSamLogonResponseEx::unpack(
            &packed,
            NtVersion::V5EX | NtVersion::WITH_CLOSEST_SITE,
        )
        .unwrap();
        assert_eq!(with, expected);
    }

    #[test]
    fn test_sock_addr_is_skipped() {
        setup();
        let data = hex::decode(PAYLOAD).unwrap();
        let mut with_ip = data[..88].to_vec();
        with_ip.extend_from_slice(&[0x10; SOCK_ADDR_LEN]);
        with_ip.extend_from_slice(&data[88..]);

        let unpacked = NetlogonSamLogonResponseEx::unpack(
            &with_ip,
            NtVersion::V5EX | NtVersion::V5EX_WITH_IP,
        )
        .unwrap();
        assert_eq!(unpacked, response());
    }

    #[test]
    fn test_truncated() {
        setup();
        let data = hex::decode(PAYLOAD).unwrap();
        assert!(matches!(
            NetlogonSamLogonResponseEx::unpack(&data[..20], NtVersion::V5EX),
            Err(MessageError::TruncatedMessage { .. })
        ));
        assert!(matches!(
            NetlogonSamLogonResponseEx::unpack(&data[..92], NtVersion::V5EX),
            Err(MessageError::TruncatedMessage { offset: 92 })
        ));
    }

    #[test]
    fn test_opcodes() {
        assert_eq!(u16::from(NetlogonOpcode::SamLogonResponseEx), 23);
        assert_eq!(NetlogonOpcode::from(19), NetlogonOpcode::SamLogonResponse);
        assert_eq!(NetlogonOpcode::from(99), NetlogonOpcode::Unknown(99));
    }
}
