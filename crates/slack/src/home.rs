//! App Home tab: running integrations plus an admin-only refresh control.

use std::sync::Arc;

use intelbot_core::{domain::source::Source, intel::IntelClient, registry::SourceRegistry};
use tracing::{info, warn};

use crate::{
    blocks::{ButtonElement, MessageBuilder, View},
    chunking::ChunkLimits,
    messenger::{DeliveryError, MessageTransport},
    render::budget_blocks,
};

pub const REFRESH_ACTION: &str = "refresh_integrations";
pub const REFRESH_BLOCK_ID: &str = "refresh_block";
pub const REFRESHING_NOTICE: &str = ":hourglass_flowing_sand: *Refreshing integrations…*";
pub const NO_SOURCES_TEXT: &str = "No running integrations configured.";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HomeAudience {
    Member,
    Admin { refreshing: bool },
}

pub fn home_view(audience: HomeAudience, sources: &[Source], limits: &ChunkLimits) -> View {
    let mut message = MessageBuilder::new("home");
    message = match audience {
        HomeAudience::Admin { refreshing: false } => {
            message.actions(REFRESH_BLOCK_ID, |actions| {
                actions.button(ButtonElement::new(REFRESH_ACTION, "Refresh Integrations"));
            })
        }
        HomeAudience::Admin { refreshing: true } => message.context(|context| {
            context.mrkdwn(REFRESHING_NOTICE);
        }),
        HomeAudience::Member => message.section(|section| {
            section.plain("Welcome");
        }),
    };

    message = message.section(|section| {
        section.mrkdwn("*Running Integrations*");
    });
    if sources.is_empty() {
        message = message.section(|section| {
            section.plain(NO_SOURCES_TEXT);
        });
    }
    for source in sources {
        message = message.context(|context| {
            context.mrkdwn(format!("• {}", source.heading().unwrap_or_else(|| source.id.clone())));
        });
    }

    View::home(budget_blocks(message.build().blocks, limits))
}

pub struct HomePublisher {
    intel: Arc<dyn IntelClient>,
    registry: Arc<SourceRegistry>,
    transport: Arc<dyn MessageTransport>,
    limits: ChunkLimits,
}

impl HomePublisher {
    pub fn new(
        intel: Arc<dyn IntelClient>,
        registry: Arc<SourceRegistry>,
        transport: Arc<dyn MessageTransport>,
        limits: ChunkLimits,
    ) -> Self {
        Self { intel, registry, transport, limits }
    }

    pub async fn publish(&self, user_id: &str, correlation_id: &str) -> Result<(), DeliveryError> {
        let audience = if self.is_admin(user_id, correlation_id).await {
            HomeAudience::Admin { refreshing: false }
        } else {
            HomeAudience::Member
        };
        self.publish_as(user_id, audience).await
    }

    /// Reloads the registry on behalf of an admin, showing a busy state meanwhile.
    pub async fn refresh(&self, user_id: &str, correlation_id: &str) -> Result<(), DeliveryError> {
        if !self.is_admin(user_id, correlation_id).await {
            warn!(
                event_name = "slack.home.refresh_denied",
                correlation_id,
                user = user_id,
                "refresh requested by a non-admin user"
            );
            return self.publish_as(user_id, HomeAudience::Member).await;
        }

        self.publish_as(user_id, HomeAudience::Admin { refreshing: true }).await?;
        match self.registry.refresh(self.intel.as_ref()).await {
            Ok(count) => info!(
                event_name = "slack.home.refreshed",
                correlation_id,
                source_count = count,
                "integrations refreshed from home tab"
            ),
            Err(error) => warn!(
                event_name = "slack.home.refresh_failed",
                correlation_id,
                error = %error,
                "integration refresh failed; keeping previous list"
            ),
        }
        self.publish_as(user_id, HomeAudience::Admin { refreshing: false }).await
    }

    async fn publish_as(&self, user_id: &str, audience: HomeAudience) -> Result<(), DeliveryError> {
        let view = home_view(audience, &self.registry.list(), &self.limits);
        self.transport.publish_home(user_id, &view).await
    }

    async fn is_admin(&self, user_id: &str, correlation_id: &str) -> bool {
        match self.transport.is_workspace_admin(user_id).await {
            Ok(admin) => admin,
            Err(error) => {
                warn!(
                    event_name = "slack.home.admin_check_failed",
                    correlation_id,
                    user = user_id,
                    error = %error,
                    "could not resolve admin status; treating user as member"
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use intelbot_core::{domain::source::Source, registry::SourceRegistry};

    use super::{home_view, HomeAudience, HomePublisher, NO_SOURCES_TEXT, REFRESHING_NOTICE, REFRESH_ACTION};
    use crate::{
        blocks::{Block, TextObject},
        chunking::ChunkLimits,
        testing::{section_texts, RecordingTransport, ScriptedIntel, TransportCall},
    };

    fn context_texts(blocks: &[Block]) -> Vec<String> {
        blocks
            .iter()
            .filter_map(|block| match block {
                Block::Context { elements, .. } => {
                    Some(elements.iter().map(TextObject::text).collect::<Vec<_>>().join(" "))
                }
                _ => None,
            })
            .collect()
    }

    fn has_refresh_button(blocks: &[Block]) -> bool {
        blocks.iter().any(|block| {
            matches!(block, Block::Actions { elements, .. }
                if elements.iter().any(|button| button.action_id == REFRESH_ACTION))
        })
    }

    #[test]
    fn members_see_welcome_and_the_source_list() {
        let sources = vec![Source::new("vt", "VirusTotal", "VT"), Source::new("sh", "Shodan", "")];
        let view = home_view(HomeAudience::Member, &sources, &ChunkLimits::default());

        assert!(!has_refresh_button(view.blocks()));
        assert_eq!(section_texts(view.blocks()), vec!["Welcome", "*Running Integrations*"]);
        assert_eq!(context_texts(view.blocks()), vec!["• VirusTotal (VT)", "• Shodan"]);
    }

    #[test]
    fn admins_get_a_refresh_button_hidden_while_refreshing() {
        let idle = home_view(HomeAudience::Admin { refreshing: false }, &[], &ChunkLimits::default());
        assert!(has_refresh_button(idle.blocks()));
        assert!(section_texts(idle.blocks()).contains(&NO_SOURCES_TEXT.to_owned()));

        let busy = home_view(HomeAudience::Admin { refreshing: true }, &[], &ChunkLimits::default());
        assert!(!has_refresh_button(busy.blocks()));
        assert_eq!(context_texts(busy.blocks()), vec![REFRESHING_NOTICE]);
    }

    #[tokio::test]
    async fn refresh_publishes_busy_then_reloaded_view() {
        let intel = ScriptedIntel::default().with_sources(vec![Source::new("new", "Fresh", "F")]);
        let registry = Arc::new(SourceRegistry::with_sources(vec![Source::new("old", "Stale", "S")]));
        let transport = Arc::new(RecordingTransport::with_admins(&["UADMIN"]));
        let home = HomePublisher::new(
            intel.into_arc(),
            registry.clone(),
            transport.clone(),
            ChunkLimits::default(),
        );

        home.refresh("UADMIN", "corr-1").await.expect("refresh");

        let views: Vec<_> = transport
            .calls()
            .await
            .into_iter()
            .filter_map(|call| match call {
                TransportCall::PublishHome { view, .. } => Some(view),
                _ => None,
            })
            .collect();
        assert_eq!(views.len(), 2);
        assert_eq!(context_texts(views[0].blocks()), vec![REFRESHING_NOTICE, "• Stale (S)"]);
        assert!(has_refresh_button(views[1].blocks()));
        assert_eq!(context_texts(views[1].blocks()), vec!["• Fresh (F)"]);
        assert!(registry.get("new").is_some());
    }

    #[tokio::test]
    async fn non_admins_cannot_refresh() {
        let registry = Arc::new(SourceRegistry::with_sources(vec![Source::new("old", "Stale", "S")]));
        let transport = Arc::new(RecordingTransport::default());
        let home = HomePublisher::new(
            ScriptedIntel::default().into_arc(),
            registry.clone(),
            transport.clone(),
            ChunkLimits::default(),
        );

        home.refresh("U1", "corr-2").await.expect("publish");

        assert!(registry.get("old").is_some());
        assert_eq!(transport.calls().await.len(), 1);
    }
}
