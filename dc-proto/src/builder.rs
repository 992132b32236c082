use crate::{Class, Flags, Header, Message, Name, Question, RCode, RData, ResourceRecord};
use std::default::Default;

#[derive(Debug, Default)]
pub struct MessageBuilder {
    id: i16,
    flags: Flags,
    questions: Vec<Question>,
    answers: Vec<ResourceRecord>,
    name_servers: Vec<ResourceRecord>,
    additional_records: Vec<ResourceRecord>,
}

impl MessageBuilder {
    pub fn new() -> Self {
        Default::default()
    }

    /// Starts a response to `request`: same id, every question echoed and
    /// the fixed authoritative response flags.
    pub fn response_to(request: &Message) -> Self {
        MessageBuilder {
            id: request.header.id,
            flags: Flags::RESPONSE,
            questions: request.questions.clone(),
            ..Default::default()
        }
    }

    pub fn build(self) -> Message {
        Message {
            header: Header {
                id: self.id,
                flags: self.flags,
            },
            questions: self.questions,
            answers: self.answers,
            name_servers: self.name_servers,
            additional_records: self.additional_records,
        }
    }

    pub fn id(mut self, id: i16) -> Self {
        self.id = id;
        self
    }

    pub fn flags(mut self, flags: Flags) -> Self {
        self.flags = flags;
        self
    }

    pub fn rcode(mut self, rcode: RCode) -> Self {
        self.flags = self.flags.with_rcode(rcode);
        self
    }

    pub fn question(mut self, question: Question) -> Self {
        self.questions.push(question);
        self
    }

    pub fn answer(mut self, answer: ResourceRecord) -> Self {
        self.answers.push(answer);
        self
    }

    pub fn name_server(mut self, ns: ResourceRecord) -> Self {
        self.name_servers.push(ns);
        self
    }

    pub fn additional_record(mut self, ar: ResourceRecord) -> Self {
        self.additional_records.push(ar);
        self
    }

    pub fn answer_count(&self) -> usize {
        self.answers.len()
    }
}

#[derive(Debug)]
pub struct ResourceRecordBuilder {
    name: Name,
    data: RData,
    class: Class,
    ttl: i32,
}

impl ResourceRecordBuilder {
    pub fn new(name: impl Into<Name>, data: RData) -> Self {
        Self {
            name: name.into(),
            data,
            class: Default::default(),
            ttl: Default::default(),
        }
    }

    pub fn build(self) -> ResourceRecord {
        ResourceRecord {
            name: self.name,
            data: self.data,
            class: self.class,
            ttl: self.ttl,
        }
    }

    pub fn class(mut self, cls: Class) -> Self {
        self.class = cls;
        self
    }

    pub fn ttl(mut self, ttl: i32) -> Self {
        self.ttl = ttl;
        self
    }
}
