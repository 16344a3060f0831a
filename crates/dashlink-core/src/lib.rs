//! Translation engine that lets a Dashboard API client drive an Engine API
//! backend.
//!
//! The crate performs no I/O of its own. Hosts hand it an [`EngineClient`] for
//! one-shot engine calls and a [`ChannelConnector`] for engine streams, then
//! offer every dashboard request to a [`RequestRouter`] and every dashboard
//! stream to a [`StreamRouter`].

pub mod address;
pub mod config;
pub mod dashboard;
pub mod delta;
pub mod engine;
pub mod error;
pub mod host;
pub mod profile;
pub mod reconcile;
pub mod request;
pub mod stream;
pub mod translate;

pub use address::{parse_address, Endpoint};
pub use config::Config;
pub use delta::{DeltaSample, MetricsDeltaTracker, Totals};
pub use error::{BridgeError, Result};
pub use host::{ChannelConnector, EngineClient, EngineRequest, MessageStream, Method, Origin};
pub use profile::{ApiProfile, ProfileName};
pub use reconcile::{PatchReconciler, StreamUpdate};
pub use request::{DashboardRequest, Reply, RequestRouter, Routed};
pub use stream::{MessageEvent, SessionId, StreamRouter, StreamSession, StreamTag, StreamTarget};
