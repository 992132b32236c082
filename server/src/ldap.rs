use crate::{DatagramHandler, RecordStore, Result, ServerError};
use bytes::{Bytes, BytesMut};
use dc_proto::ldap::{
    LdapMessage, PartialAttribute, ProtocolOp, ResultCode, SearchResultDone, SearchResultEntry,
};
use dc_proto::netlogon::{NetlogonSamLogonResponseEx, NtVersion};
use tracing::{info, instrument};

const NETLOGON_ATTRIBUTE: &str = "Netlogon";

/// Answers the DC locator's connectionless LDAP ping with the Netlogon
/// response registered for the requested DNS domain.
#[derive(Debug)]
pub struct LdapHandler {
    responses: RecordStore<NetlogonSamLogonResponseEx>,
}

impl LdapHandler {
    /// `responses` is keyed by DNS domain name.
    pub fn new(responses: RecordStore<NetlogonSamLogonResponseEx>) -> Self {
        LdapHandler { responses }
    }

    /// The messages to send back, in order.
    pub fn respond(&self, request: &LdapMessage) -> Result<Vec<LdapMessage>> {
        let search = match &request.protocol_op {
            ProtocolOp::SearchRequest(search) => search,
            ProtocolOp::SearchResultEntry(_) => {
                return Err(ServerError::UnexpectedLdapOperation("SearchResultEntry"))
            }
            ProtocolOp::SearchResultDone(_) => {
                return Err(ServerError::UnexpectedLdapOperation("SearchResultDone"))
            }
        };
        let id = request.message_id;

        let domain = search
            .filter
            .equality_value("DnsDomain")
            .map(|v| String::from_utf8_lossy(v).into_owned());
        let nt_ver = match search.filter.equality_value("NtVer") {
            Some(v) => {
                let bytes: [u8; 4] = v
                    .get(..4)
                    .and_then(|b| b.try_into().ok())
                    .ok_or(ServerError::InvalidNtVersion(v.len()))?;
                NtVersion::from_bits_retain(u32::from_le_bytes(bytes))
            }
            None => NtVersion::empty(),
        };

        info!(
            "Parsing LdapSearch for DnsDomain '{}' and NtVer {:?}",
            domain.as_deref().unwrap_or_default(),
            nt_ver
        );

        let response = match domain.as_deref().and_then(|d| self.responses.get(d)) {
            Some(response) => response,
            None => {
                return Ok(vec![done(
                    id,
                    ResultCode::Other,
                    &format!(
                        "cannot find registered info for domain '{}'",
                        domain.unwrap_or_default()
                    ),
                )])
            }
        };
        if !nt_ver.contains(NtVersion::V5EX) || nt_ver.contains(NtVersion::V5EX_WITH_IP) {
            return Ok(vec![done(
                id,
                ResultCode::Other,
                "can only respond to requests for NETLOGON_NT_VERSION_5EX",
            )]);
        }

        info!("Replying with NT_VERSION info: {}", response);

        let entry = LdapMessage::new(
            id,
            ProtocolOp::SearchResultEntry(SearchResultEntry {
                object_name: String::new(),
                attributes: vec![PartialAttribute::new(
                    NETLOGON_ATTRIBUTE,
                    vec![response.pack()?],
                )],
            }),
        );

        Ok(vec![entry, done(id, ResultCode::Success, "")])
    }
}

fn done(id: i32, result_code: ResultCode, diagnostic_message: &str) -> LdapMessage {
    LdapMessage::new(
        id,
        ProtocolOp::SearchResultDone(SearchResultDone::new(result_code, diagnostic_message)),
    )
}

impl DatagramHandler for LdapHandler {
    #[instrument(skip(self, request))]
    fn process_datagram(&self, request: &[u8]) -> Result<Bytes> {
        let request = LdapMessage::from_bytes(request)?;
        info!("Received {}", request);

        let mut buf = BytesMut::with_capacity(256);
        for message in self.respond(&request)? {
            message.to_bytes(&mut buf)?;
        }

        Ok(buf.freeze())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test::setup;
    use dc_proto::ldap::{DerefAliases, Filter, SearchRequest, SearchScope};
    use dc_proto::netlogon::{DsFlags, NetlogonOpcode};

    // Captured from a Windows client locating DOMAIN.TEST with NtVer 0x20000016.
    const LOCATOR_SEARCH: &str = "3084000000a202010163840000009904000a01000a0100020100020100010100a08400000072a384000000180409446e73446f6d61696e040b444f4d41494e2e54455354a384000000170404486f7374040f57494e2d4c344256435030514c5246a3840000000d04054e74566572040416000020a3840000001e040b446e73486f73744e616d65040f57494e2d4c344256435030514c524630840000000a04084e65746c6f676f6e";

    fn netlogon() -> NetlogonSamLogonResponseEx {
        NetlogonSamLogonResponseEx {
            opcode: NetlogonOpcode::SamLogonResponseEx,
            flags: DsFlags::PDC | DsFlags::GC | DsFlags::LDAP | DsFlags::DS | DsFlags::KDC,
            domain_guid: "6876eb1a-b2c6-4bca-b69c-feda682e82fd".parse().unwrap(),
            dns_forest_name: "domain.test".to_string(),
            dns_domain_name: "domain.test".to_string(),
            dns_host_name: "dc01.domain.test".to_string(),
            netbios_domain_name: String::new(),
            netbios_computer_name: String::new(),
            user_name: String::new(),
            dc_site_name: "Default-First-Site-Name".to_string(),
            client_site_name: "Default-First-Site-Name".to_string(),
            next_closest_site_name: None,
            nt_version: NtVersion::V1 | NtVersion::V5EX,
            lm_nt_token: 0xffff,
            lm20_token: 0xffff,
        }
    }

    fn handler() -> LdapHandler {
        let mut responses = RecordStore::new();
        responses.insert("domain.test", netlogon()).unwrap();
        LdapHandler::new(responses)
    }

    fn search(domain: &str, nt_ver: &[u8]) -> LdapMessage {
        LdapMessage::new(
            7,
            ProtocolOp::SearchRequest(SearchRequest {
                base_object: String::new(),
                scope: SearchScope::BaseObject,
                deref_aliases: DerefAliases::Never,
                size_limit: 0,
                time_limit: 0,
                types_only: false,
                filter: Filter::And(vec![
                    Filter::equality("DnsDomain", domain),
                    Filter::equality("NtVer", nt_ver),
                ]),
                attributes: vec![NETLOGON_ATTRIBUTE.to_string()],
            }),
        )
    }

    fn diagnostic(message: &LdapMessage) -> (ResultCode, &str) {
        match &message.protocol_op {
            ProtocolOp::SearchResultDone(done) => (done.result_code, done.diagnostic_message.as_str()),
            other => panic!("expected SearchResultDone, got {:?}", other),
        }
    }

    #[test]
    fn test_locator_ping() {
        setup();
        let handler = handler();
        let request = hex::decode(LOCATOR_SEARCH).unwrap();
        let reply = handler.process_datagram(&request).unwrap();

        let (entry, rest) = LdapMessage::decode(&reply).unwrap();
        let (done, rest) = LdapMessage::decode(rest).unwrap();
        assert!(rest.is_empty());
        assert_eq!(entry.message_id, 1);
        assert_eq!(diagnostic(&done), (ResultCode::Success, ""));

        let ProtocolOp::SearchResultEntry(entry) = entry.protocol_op else {
            panic!("expected SearchResultEntry");
        };
        assert_eq!(entry.object_name, "");
        assert_eq!(entry.attributes.len(), 1);
        assert_eq!(entry.attributes[0].attr_type, "Netlogon");

        let request_flags = NtVersion::from_bits_retain(0x2000_0016);
        let unpacked =
            NetlogonSamLogonResponseEx::unpack(&entry.attributes[0].values[0], request_flags)
                .unwrap();
        assert_eq!(unpacked, netlogon());
    }

    #[test]
    fn test_unknown_domain() {
        setup();
        let replies = handler()
            .respond(&search("other.test", &[0x06, 0, 0, 0]))
            .unwrap();
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].message_id, 7);
        assert_eq!(
            diagnostic(&replies[0]),
            (
                ResultCode::Other,
                "cannot find registered info for domain 'other.test'"
            )
        );
    }

    #[test]
    fn test_domain_lookup_ignores_case() {
        setup();
        let replies = handler()
            .respond(&search("DOMAIN.TEST", &[0x04, 0, 0, 0]))
            .unwrap();
        assert_eq!(replies.len(), 2);
    }

    #[test]
    fn test_requires_version_5ex() {
        setup();
        let handler = handler();
        for nt_ver in [[0x02, 0, 0, 0], [0x0c, 0, 0, 0]] {
            let replies = handler.respond(&search("domain.test", &nt_ver)).unwrap();
            assert_eq!(
                diagnostic(&replies[0]),
                (
                    ResultCode::Other,
                    "can only respond to requests for NETLOGON_NT_VERSION_5EX"
                )
            );
        }
    }

    #[test]
    fn test_invalid_nt_version() {
        setup();
        assert!(matches!(
            handler().respond(&search("domain.test", &[0x04, 0])),
            Err(ServerError::InvalidNtVersion(2))
        ));
    }

    #[test]
    fn test_nt_version_reads_first_four_bytes() {
        setup();
        let replies = handler()
            .respond(&search("domain.test", &[0x04, 0, 0, 0, 0x08, 0xff]))
            .unwrap();
        assert_eq!(replies.len(), 2);
        assert_eq!(diagnostic(&replies[1]), (ResultCode::Success, ""));
    }

    #[test]
    fn test_only_search_requests() {
        setup();
        let request = done(3, ResultCode::Success, "");
        assert!(matches!(
            handler().respond(&request),
            Err(ServerError::UnexpectedLdapOperation("SearchResultDone"))
        ));
    }
}
