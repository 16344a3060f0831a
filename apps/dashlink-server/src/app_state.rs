use std::sync::Arc;

use dashlink_core::{
    ApiProfile, ChannelConnector, EngineClient, Origin, RequestRouter, StreamRouter,
};

/// Shared handles behind every dashboard-facing handler.
#[derive(Clone)]
pub(crate) struct AppState {
    origin: Origin,
    requests: Arc<RequestRouter>,
    streams: Arc<StreamRouter>,
    client: Arc<dyn EngineClient>,
    connector: Arc<dyn ChannelConnector>,
    forward: reqwest::Client,
}

impl AppState {
    pub fn new(
        origin: Origin,
        profile: ApiProfile,
        client: Arc<dyn EngineClient>,
        connector: Arc<dyn ChannelConnector>,
        forward: reqwest::Client,
    ) -> Self {
        let profile = Arc::new(profile);
        Self {
            origin,
            requests: Arc::new(RequestRouter::new(profile.clone(), client.clone())),
            streams: Arc::new(StreamRouter::new(profile)),
            client,
            connector,
            forward,
        }
    }

    pub fn origin(&self) -> &Origin {
        &self.origin
    }

    pub fn requests(&self) -> &RequestRouter {
        &self.requests
    }

    pub fn streams(&self) -> Arc<StreamRouter> {
        self.streams.clone()
    }

    pub fn client(&self) -> &dyn EngineClient {
        self.client.as_ref()
    }

    pub fn connector(&self) -> &dyn ChannelConnector {
        self.connector.as_ref()
    }

    /// Client used to delegate unclaimed calls verbatim.
    pub fn forward(&self) -> &reqwest::Client {
        &self.forward
    }
}
