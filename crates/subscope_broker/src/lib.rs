//! subscope_broker
//!
//! The broker boundary of the inspector: message/QoS types shared by the
//! whole workspace, the `BrokerClient` capability trait, and a WebSocket
//! implementation speaking JSON frames.
//!
//! Everything above this crate treats the broker as opaque: connect,
//! disconnect, subscribe, unsubscribe, publish, plus a channel of inbound
//! messages handed over at client construction.

pub mod client;
pub mod error;
pub mod message;
pub mod wire;

pub use client::{BrokerClient, TlsConfig, WsBrokerClient};
pub use error::BrokerError;
pub use message::{ApplicationMessage, InboundMessage, PayloadFormat, QoS};
