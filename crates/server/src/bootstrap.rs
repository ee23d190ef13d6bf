use std::sync::Arc;

use axum::Router;
use intelbot_core::{
    config::{AppConfig, ConfigError, LoadOptions},
    errors::IntelError,
    intel::IntelClient,
    payloads::{PayloadStore, DEFAULT_SWEEP_INTERVAL},
    registry::SourceRegistry,
};
use intelbot_slack::{
    actions::ActionService,
    chunking::ChunkLimits,
    events::bot_dispatcher,
    home::HomePublisher,
    messenger::{DeliveryError, MessageTransport},
    runner::{EnvelopeQueue, EventRunner},
    search::{SearchCoordinator, SearchSettings},
};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::info;

use crate::{
    ingress::{self, IngressState},
    intel_http::HttpIntelClient,
    slack_web::SlackWebClient,
};

pub struct Application {
    pub config: AppConfig,
    pub registry: Arc<SourceRegistry>,
    pub payloads: Arc<PayloadStore>,
    pub runner: EventRunner,
    pub ingress: Router,
    pub sweeper: JoinHandle<()>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("intel client could not be built: {0}")]
    IntelClient(#[source] IntelError),
    #[error("slack client could not be built: {0}")]
    SlackClient(#[source] DeliveryError),
    #[error("initial integration list could not be loaded: {0}")]
    RegistryLoad(#[source] IntelError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let intel = HttpIntelClient::new(&config.intel).map_err(BootstrapError::IntelClient)?;
    let transport =
        SlackWebClient::new(config.slack.bot_token.clone()).map_err(BootstrapError::SlackClient)?;

    assemble(config, Arc::new(intel), Arc::new(transport)).await
}

/// Wires the application around already-built clients. The integration list
/// must load, otherwise there is nothing to search.
pub async fn assemble(
    config: AppConfig,
    intel: Arc<dyn IntelClient>,
    transport: Arc<dyn MessageTransport>,
) -> Result<Application, BootstrapError> {
    let registry = Arc::new(SourceRegistry::new());
    let loaded = registry.refresh(intel.as_ref()).await.map_err(BootstrapError::RegistryLoad)?;
    info!(
        event_name = "system.bootstrap.registry_loaded",
        correlation_id = "bootstrap",
        source_count = loaded,
        "running integrations loaded"
    );

    let payloads = Arc::new(PayloadStore::new(config.search.payload_ttl()));
    let sweeper = payloads.spawn_sweeper(DEFAULT_SWEEP_INTERVAL);

    let limits = ChunkLimits::default();
    let settings = SearchSettings {
        command: config.search.command.clone(),
        progress_width: config.search.progress_width,
        source_timeout: config.search.source_timeout(),
        limits,
    };
    let home =
        Arc::new(HomePublisher::new(intel.clone(), registry.clone(), transport.clone(), limits));
    let search = Arc::new(SearchCoordinator::new(
        intel.clone(),
        registry.clone(),
        payloads.clone(),
        transport.clone(),
        settings,
    ));
    let actions = Arc::new(ActionService::new(
        intel,
        registry.clone(),
        payloads.clone(),
        transport,
        home.clone(),
        limits,
    ));

    let (queue, envelopes) = EnvelopeQueue::new(config.server.event_queue_capacity);
    let runner = EventRunner::new(queue, bot_dispatcher(search, actions, home));
    let ingress = ingress::router(IngressState::new(config.slack.signing_secret.clone(), envelopes));

    Ok(Application { config, registry, payloads, runner, ingress, sweeper })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use intelbot_core::{
        config::{AppConfig, ConfigOverrides, LoadOptions},
        domain::{entity::Entity, lookup::LookupResponse, source::Source},
        errors::IntelError,
        intel::IntelClient,
    };
    use intelbot_slack::messenger::NoopMessageTransport;

    use super::{assemble, bootstrap, BootstrapError};

    struct StaticIntel {
        sources: Result<Vec<Source>, IntelError>,
    }

    #[async_trait]
    impl IntelClient for StaticIntel {
        async fn parse_entities(&self, _text: &str) -> Result<Vec<Entity>, IntelError> {
            Ok(Vec::new())
        }

        async fn lookup(
            &self,
            _entities: &[Entity],
            _source_id: &str,
        ) -> Result<LookupResponse, IntelError> {
            Ok(LookupResponse::default())
        }

        async fn running_sources(&self) -> Result<Vec<Source>, IntelError> {
            self.sources.clone()
        }
    }

    fn config() -> AppConfig {
        let mut config = AppConfig::default();
        config.intel.hostname = "intel.example.com".to_owned();
        config.intel.api_key = "api-key".to_owned().into();
        config.slack.bot_token = "xoxb-test".to_owned().into();
        config.slack.signing_secret = "signing-secret".to_owned().into();
        config
    }

    #[tokio::test]
    async fn bootstrap_fails_fast_without_a_signing_secret() {
        let result = bootstrap(LoadOptions {
            overrides: ConfigOverrides {
                intel_hostname: Some("intel.example.com".to_string()),
                intel_api_key: Some("api-key".to_string()),
                slack_bot_token: Some("xoxb-valid".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .await;

        let message = result.err().expect("error").to_string();
        assert!(message.contains("slack.signing_secret"));
    }

    #[tokio::test]
    async fn assemble_loads_the_registry_before_serving() {
        let intel = StaticIntel {
            sources: Ok(vec![Source::new("vt", "VirusTotal", "VT"), Source::new("sh", "Shodan", "")]),
        };

        let app = assemble(config(), Arc::new(intel), Arc::new(NoopMessageTransport))
            .await
            .expect("assemble");

        assert_eq!(app.registry.snapshot().len(), 2);
        assert!(app.payloads.is_empty());
        app.sweeper.abort();
    }

    #[tokio::test]
    async fn assemble_aborts_when_the_integration_list_cannot_load() {
        let intel = StaticIntel { sources: Err(IntelError::Transport("connection refused".to_owned())) };

        let result = assemble(config(), Arc::new(intel), Arc::new(NoopMessageTransport)).await;

        assert!(matches!(result, Err(BootstrapError::RegistryLoad(IntelError::Transport(_)))));
    }
}
