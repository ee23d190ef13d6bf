//! Block action handlers: detail modals and the home-tab refresh.

use std::sync::Arc;

use intelbot_core::{intel::IntelClient, payloads::PayloadStore, registry::SourceRegistry};
use tracing::{info, warn};

use crate::{
    action_value::{self, ActionValueError, DetailsRequest, EXPIRED_NOTICE},
    chunking::ChunkLimits,
    home::HomePublisher,
    messenger::{DeliveryError, MessageTransport},
    render::{self, FETCH_FAILED_TEXT},
};

pub struct ActionService {
    intel: Arc<dyn IntelClient>,
    registry: Arc<SourceRegistry>,
    payloads: Arc<PayloadStore>,
    transport: Arc<dyn MessageTransport>,
    home: Arc<HomePublisher>,
    limits: ChunkLimits,
}

impl ActionService {
    pub fn new(
        intel: Arc<dyn IntelClient>,
        registry: Arc<SourceRegistry>,
        payloads: Arc<PayloadStore>,
        transport: Arc<dyn MessageTransport>,
        home: Arc<HomePublisher>,
        limits: ChunkLimits,
    ) -> Self {
        Self { intel, registry, payloads, transport, home, limits }
    }

    /// Opens a placeholder modal while the trigger id is still valid, re-runs the
    /// lookup for the one entity on the one source, then fills the modal in.
    pub async fn show_details(
        &self,
        trigger_id: &str,
        value: &str,
        correlation_id: &str,
    ) -> Result<(), DeliveryError> {
        let handle =
            self.transport.open_view(trigger_id, &render::details_placeholder_view()).await?;

        let request = match DetailsRequest::decode(value, &self.payloads) {
            Ok(request) => request,
            Err(error) => {
                warn!(event_name = "slack.action.details_value_rejected", correlation_id, error = %error, "details button value rejected");
                let content = match error {
                    ActionValueError::Expired => EXPIRED_NOTICE,
                    ActionValueError::Malformed(_) => FETCH_FAILED_TEXT,
                };
                let view = render::details_view(None, content, &self.limits);
                return self.transport.update_view(&handle, &view).await;
            }
        };

        let source = self.registry.get(&request.integration_id);
        let content = match self.intel.lookup_text(&request.entity.value, &request.integration_id).await
        {
            Ok(response) => {
                let details = response
                    .results
                    .iter()
                    .find(|result| {
                        result.entity.value == request.entity.value
                            && result.entity.entity_type == request.entity.entity_type
                    })
                    .and_then(|result| result.details());
                render::details_content(details)
            }
            Err(error) => {
                warn!(
                    event_name = "slack.action.details_lookup_failed",
                    correlation_id,
                    source_id = %request.integration_id,
                    error = %error,
                    "details lookup failed"
                );
                FETCH_FAILED_TEXT.to_owned()
            }
        };

        info!(
            event_name = "slack.action.details_rendered",
            correlation_id,
            source_id = %request.integration_id,
            "details modal rendered"
        );
        let view = render::details_view(source.as_ref(), &content, &self.limits);
        self.transport.update_view(&handle, &view).await
    }

    pub async fn show_error_details(
        &self,
        trigger_id: &str,
        value: &str,
        correlation_id: &str,
    ) -> Result<(), DeliveryError> {
        let meta = action_value::decode(value, &self.payloads);
        if let Err(error) = &meta {
            warn!(event_name = "slack.action.error_value_rejected", correlation_id, error = %error, "error details value rejected");
        }

        let view = render::error_details_view(meta.as_ref(), &self.limits);
        self.transport.open_view(trigger_id, &view).await.map(|_| ())
    }

    pub async fn refresh_integrations(
        &self,
        user_id: &str,
        correlation_id: &str,
    ) -> Result<(), DeliveryError> {
        self.home.refresh(user_id, correlation_id).await
    }
}
