use crate::{DatagramHandler, DnsZone, Result};
use bytes::{Bytes, BytesMut};
use dc_proto::{Message, MessageBuilder, RCode, Type};
use tracing::{info, instrument};

/// Answers A and SRV questions from a [`DnsZone`]. Anything unanswered gets
/// a name error carrying the zone's SOA.
#[derive(Debug)]
pub struct DnsHandler {
    zone: DnsZone,
}

impl DnsHandler {
    pub fn new(zone: DnsZone) -> Self {
        DnsHandler { zone }
    }

    pub fn respond(&self, request: &Message) -> Message {
        let mut response = MessageBuilder::response_to(request);

        for question in request.questions.iter() {
            info!(
                "Processing DNS request {} {} for {}",
                request.header.id, question.q_type, question.q_name
            );
            let record = match question.q_type {
                Type::A => self.zone.a(&question.q_name),
                Type::SRV => self.zone.srv(&question.q_name),
                _ => None,
            };

            match record {
                Some(record) => {
                    info!(
                        "DNS record found for {} {}: {}",
                        request.header.id, question.q_type, record.data
                    );
                    response = response.answer(record.clone());
                }
                None => info!(
                    "No DNS record found for {} {}",
                    request.header.id, question.q_type
                ),
            }
        }

        if response.answer_count() == 0 {
            response = response
                .rcode(RCode::NameError)
                .name_server(self.zone.soa().clone());
        }

        response.build()
    }
}

impl DatagramHandler for DnsHandler {
    #[instrument(skip(self, request))]
    fn process_datagram(&self, request: &[u8]) -> Result<Bytes> {
        let request = Message::from_bytes(request)?;
        let response = self.respond(&request);

        let mut buf = BytesMut::with_capacity(512);
        response.to_bytes(&mut buf)?;
        info!("Sending DNS response for {}", response.header.id);

        Ok(buf.freeze())
    }
}
