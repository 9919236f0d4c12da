pub mod config;
pub mod crypto;
pub mod dictionary;
pub mod dispatcher;
pub mod notify;
pub mod parser;
pub mod pdu;
pub mod poller;
pub mod serial;
pub mod task;
pub mod token;
pub mod voice;
pub mod webhook;
pub mod wecom;
