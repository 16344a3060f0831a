//! Network implementations of the engine capabilities: reqwest for one-shot
//! calls, tokio-tungstenite for streams.

pub mod channel;
pub mod http_client;

pub use channel::TungsteniteConnector;
pub use http_client::ReqwestEngine;
