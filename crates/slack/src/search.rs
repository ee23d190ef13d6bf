//! Fan-out coordinator for the search command.
//!
//! One query is parsed once, then looked up against every running source
//! concurrently. Each source is isolated: a failure or timeout only costs its
//! own fragment. A single searched value streams one message per source as
//! results arrive; several values are grouped by entity and posted once all
//! sources settle.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use intelbot_core::{
    domain::{entity::Entity, lookup::LookupResponse, source::Source},
    errors::IntelError,
    grouping::{group_source_results, EntityGrouper, SourceContribution},
    intel::IntelClient,
    normalize::normalize_results,
    payloads::PayloadStore,
    registry::{SourceRegistry, SourceSnapshot},
};
use tokio::task::{Id, JoinSet};
use tracing::{debug, info, warn};

use crate::{
    blocks::MessageTemplate,
    chunking::ChunkLimits,
    messenger::{MessageTransport, Messenger},
    progress::{ProgressReporter, DEFAULT_BAR_WIDTH},
    render,
};

pub const EMPTY_QUERY_NOTICE: &str =
    "Please provide search text after the command, e.g., `/intel 8.8.8.8`";
pub const NO_SOURCES_NOTICE: &str = "No integrations are currently configured for the bot.";
pub const PARSING_LABEL: &str = "Parsing search text";
pub const NO_ENTITIES_NOTICE: &str = "No entities found in the provided text.";
pub const NO_RESULTS_NOTICE: &str = "No results found for the provided entities.";
pub const ALL_COMPLETED_NOTICE: &str = "All integration lookups completed – results above.";

#[derive(Clone, Debug)]
pub struct SearchSettings {
    pub command: String,
    pub progress_width: usize,
    /// `None` lets a lookup run as long as the transport allows.
    pub source_timeout: Option<Duration>,
    pub limits: ChunkLimits,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            command: "/intel".to_owned(),
            progress_width: DEFAULT_BAR_WIDTH,
            source_timeout: Some(Duration::from_secs(60)),
            limits: ChunkLimits::default(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SearchQuery {
    pub text: String,
    pub channel_id: String,
    pub user_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SearchOutcome {
    EmptyQuery,
    NoSources,
    ParseFailed,
    NoEntities,
    Streamed { messages: usize, failures: usize },
    Grouped { groups: usize, failures: usize },
}

const ABORTED_LOOKUP: &str = "lookup task aborted";

/// In-flight lookups, keyed by task id so a task that dies still maps back to
/// its source.
#[derive(Default)]
struct Lookups {
    tasks: JoinSet<SourceOutcome>,
    pending: HashMap<Id, (usize, Source)>,
}

impl Lookups {
    async fn next(&mut self, correlation_id: &str) -> Option<SourceOutcome> {
        loop {
            match self.tasks.join_next_with_id().await? {
                Ok((id, outcome)) => {
                    self.pending.remove(&id);
                    return Some(outcome);
                }
                Err(error) => {
                    warn!(event_name = "search.lookup.aborted", correlation_id, error = %error, "lookup task aborted");
                    let Some((rank, source)) = self.pending.remove(&error.id()) else {
                        continue;
                    };
                    return Some(SourceOutcome {
                        rank,
                        source,
                        result: Err(IntelError::Transport(ABORTED_LOOKUP.to_owned())),
                    });
                }
            }
        }
    }
}

struct SourceOutcome {
    rank: usize,
    source: Source,
    result: Result<LookupResponse, IntelError>,
}

pub struct SearchCoordinator {
    intel: Arc<dyn IntelClient>,
    registry: Arc<SourceRegistry>,
    payloads: Arc<PayloadStore>,
    transport: Arc<dyn MessageTransport>,
    settings: SearchSettings,
}

impl SearchCoordinator {
    pub fn new(
        intel: Arc<dyn IntelClient>,
        registry: Arc<SourceRegistry>,
        payloads: Arc<PayloadStore>,
        transport: Arc<dyn MessageTransport>,
        settings: SearchSettings,
    ) -> Self {
        Self { intel, registry, payloads, transport, settings }
    }

    pub fn command(&self) -> &str {
        &self.settings.command
    }

    pub async fn run(&self, query: SearchQuery, correlation_id: &str) -> SearchOutcome {
        if let Err(error) = self.transport.join_channel(&query.channel_id).await {
            debug!(
                event_name = "search.channel.join_skipped",
                correlation_id,
                channel = %query.channel_id,
                error = %error,
                "could not join channel; posting anyway"
            );
        }
        let messenger = Messenger::new(self.transport.clone(), query.channel_id.clone());

        let text = query.text.trim();
        if text.is_empty() {
            self.notify_user(&messenger, &query.user_id, EMPTY_QUERY_NOTICE, correlation_id).await;
            return SearchOutcome::EmptyQuery;
        }

        let snapshot = self.registry.snapshot();
        if snapshot.is_empty() {
            self.notify_user(&messenger, &query.user_id, NO_SOURCES_NOTICE, correlation_id).await;
            return SearchOutcome::NoSources;
        }

        info!(
            event_name = "search.query.started",
            correlation_id,
            channel = %query.channel_id,
            user = %query.user_id,
            source_count = snapshot.len(),
            "search query started"
        );

        let progress = match ProgressReporter::new(
            messenger.clone(),
            PARSING_LABEL,
            snapshot.len(),
            self.settings.progress_width,
        ) {
            Ok(progress) => progress,
            Err(error) => {
                warn!(event_name = "search.progress.unavailable", correlation_id, error = %error, "progress reporter unavailable");
                return self.search(&messenger, None, &snapshot, text, correlation_id).await;
            }
        };
        if let Err(error) = progress.update(0).await {
            warn!(event_name = "search.progress.render_failed", correlation_id, error = %error, "initial progress render failed");
        }

        let outcome = self.search(&messenger, Some(&progress), &snapshot, text, correlation_id).await;

        if let Err(error) = progress.destroy().await {
            debug!(event_name = "search.progress.teardown_failed", correlation_id, error = %error, "progress teardown failed");
        }
        info!(event_name = "search.query.finished", correlation_id, outcome = ?outcome, "search query finished");
        outcome
    }

    async fn search(
        &self,
        messenger: &Messenger,
        progress: Option<&ProgressReporter>,
        snapshot: &Arc<SourceSnapshot>,
        text: &str,
        correlation_id: &str,
    ) -> SearchOutcome {
        let entities = match self.intel.parse_entities(text).await {
            Ok(entities) => entities,
            Err(error) => {
                warn!(event_name = "search.parse.failed", correlation_id, error = %error, "entity parse failed");
                let notice = format!(":warning: Error: {}", error.user_message());
                self.post(messenger, MessageTemplate::text(notice), correlation_id).await;
                return SearchOutcome::ParseFailed;
            }
        };

        if let Some(progress) = progress {
            let label = format!("Searching {} integrations", snapshot.len());
            if let Err(error) = progress.set_label(label).await {
                warn!(event_name = "search.progress.render_failed", correlation_id, error = %error, "progress relabel failed");
            }
        }

        if entities.is_empty() {
            self.post(messenger, MessageTemplate::text(NO_ENTITIES_NOTICE), correlation_id).await;
            return SearchOutcome::NoEntities;
        }

        let distinct_values =
            entities.iter().map(|entity| entity.value.as_str()).collect::<HashSet<_>>().len();
        debug!(
            event_name = "search.parse.completed",
            correlation_id,
            entity_count = entities.len(),
            distinct_values,
            "entities parsed"
        );

        let grouped = distinct_values > 1;
        let entities = Arc::new(entities);
        let lookups = self.spawn_lookups(snapshot, entities.clone());
        if grouped {
            self.grouped(messenger, progress, lookups, &entities, correlation_id).await
        } else {
            self.streamed(messenger, progress, lookups, &entities, correlation_id).await
        }
    }

    fn spawn_lookups(
        &self,
        snapshot: &SourceSnapshot,
        entities: Arc<Vec<Entity>>,
    ) -> Lookups {
        let mut lookups = Lookups::default();
        for (rank, source) in snapshot.sources().iter().cloned().enumerate() {
            let intel = self.intel.clone();
            let entities = entities.clone();
            let deadline = self.settings.source_timeout;
            let pending = (rank, source.clone());
            let handle = lookups.tasks.spawn(async move {
                let lookup = intel.lookup(&entities, &source.id);
                let result = match deadline {
                    Some(limit) => match tokio::time::timeout(limit, lookup).await {
                        Ok(result) => result,
                        Err(_) => Err(IntelError::Timeout { seconds: limit.as_secs() }),
                    },
                    None => lookup.await,
                };
                SourceOutcome { rank, source, result }
            });
            lookups.pending.insert(handle.id(), pending);
        }
        lookups
    }

    async fn streamed(
        &self,
        messenger: &Messenger,
        progress: Option<&ProgressReporter>,
        mut lookups: Lookups,
        entities: &[Entity],
        correlation_id: &str,
    ) -> SearchOutcome {
        let mut completed = 0usize;
        let mut messages = 0usize;
        let mut failures = 0usize;

        while let Some(outcome) = lookups.next(correlation_id).await {
            completed += 1;
            match outcome {
                SourceOutcome { source, result: Ok(response), .. } => {
                    log_lookup(&source, &Ok(()), correlation_id);
                    let results = normalize_results(&source, response.results);
                    let groups = group_source_results(entities, &source, results);
                    let message = render::source_results_message(
                        &source,
                        &groups,
                        messages == 0,
                        &self.payloads,
                        &self.settings.limits,
                    );
                    if let Some(message) = message {
                        self.post(messenger, message, correlation_id).await;
                        messages += 1;
                    }
                }
                SourceOutcome { source, result: Err(error), .. } => {
                    log_lookup(&source, &Err(&error), correlation_id);
                    failures += 1;
                    let message = render::source_error_message(
                        &source,
                        &error,
                        &self.payloads,
                        &self.settings.limits,
                    );
                    self.post(messenger, message, correlation_id).await;
                }
            }
            advance(progress, completed, correlation_id).await;
        }

        self.post(messenger, MessageTemplate::text(ALL_COMPLETED_NOTICE), correlation_id).await;
        SearchOutcome::Streamed { messages, failures }
    }

    async fn grouped(
        &self,
        messenger: &Messenger,
        progress: Option<&ProgressReporter>,
        mut lookups: Lookups,
        entities: &[Entity],
        correlation_id: &str,
    ) -> SearchOutcome {
        let mut grouper = EntityGrouper::new(entities);
        let mut failures: Vec<(usize, Source, IntelError)> = Vec::new();
        let mut completed = 0usize;

        while let Some(outcome) = lookups.next(correlation_id).await {
            completed += 1;
            match outcome {
                SourceOutcome { rank, source, result: Ok(response) } => {
                    log_lookup(&source, &Ok(()), correlation_id);
                    let results = normalize_results(&source, response.results);
                    grouper.add(SourceContribution {
                        source,
                        source_rank: rank,
                        searched_entities: response.searched_entities,
                        results,
                    });
                }
                SourceOutcome { rank, source, result: Err(error) } => {
                    log_lookup(&source, &Err(&error), correlation_id);
                    failures.push((rank, source, error));
                }
            }
            advance(progress, completed, correlation_id).await;
        }

        failures.sort_by_key(|(rank, ..)| *rank);
        let failures: Vec<(Source, IntelError)> =
            failures.into_iter().map(|(_, source, error)| (source, error)).collect();
        let groups = grouper.finish();

        let message =
            render::grouped_message(&groups, &failures, &self.payloads, &self.settings.limits)
                .unwrap_or_else(|| MessageTemplate::text(NO_RESULTS_NOTICE));
        self.post(messenger, message, correlation_id).await;

        SearchOutcome::Grouped { groups: groups.len(), failures: failures.len() }
    }

    async fn post(&self, messenger: &Messenger, message: MessageTemplate, correlation_id: &str) {
        if let Err(error) = messenger.post(message).await {
            warn!(
                event_name = "search.message.delivery_failed",
                correlation_id,
                channel = messenger.channel(),
                error = %error,
                "failed to post search message"
            );
        }
    }

    async fn notify_user(
        &self,
        messenger: &Messenger,
        user_id: &str,
        notice: &str,
        correlation_id: &str,
    ) {
        if let Err(error) = messenger.ephemeral(user_id, MessageTemplate::text(notice)).await {
            warn!(
                event_name = "search.message.delivery_failed",
                correlation_id,
                channel = messenger.channel(),
                error = %error,
                "failed to post ephemeral notice"
            );
        }
    }
}

async fn advance(progress: Option<&ProgressReporter>, completed: usize, correlation_id: &str) {
    let Some(progress) = progress else {
        return;
    };
    if let Err(error) = progress.update(completed).await {
        warn!(event_name = "search.progress.render_failed", correlation_id, completed, error = %error, "progress update failed");
    }
}

fn log_lookup(source: &Source, result: &Result<(), &IntelError>, correlation_id: &str) {
    match result {
        Ok(()) => debug!(
            event_name = "search.lookup.completed",
            correlation_id,
            source_id = %source.id,
            "source lookup completed"
        ),
        Err(error) => warn!(
            event_name = "search.lookup.failed",
            correlation_id,
            source_id = %source.id,
            error = %error,
            "source lookup failed"
        ),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use intelbot_core::{
        domain::{
            entity::{Entity, EntityType},
            lookup::{LookupResponse, LookupResult},
            source::Source,
        },
        errors::IntelError,
        payloads::PayloadStore,
        registry::SourceRegistry,
    };
    use serde_json::{json, Map};

    use super::{
        SearchCoordinator, SearchOutcome, SearchQuery, SearchSettings, ALL_COMPLETED_NOTICE,
        EMPTY_QUERY_NOTICE, NO_ENTITIES_NOTICE, NO_RESULTS_NOTICE, NO_SOURCES_NOTICE,
    };
    use crate::{
        messenger::Delivery,
        testing::{header_texts, section_texts, RecordingTransport, ScriptedIntel},
    };

    fn ip(value: &str) -> Entity {
        Entity::new(value, EntityType::Ipv4)
    }

    fn found(entities: &[Entity]) -> Result<LookupResponse, IntelError> {
        Ok(LookupResponse {
            searched_entities: entities.to_vec(),
            results: entities
                .iter()
                .map(|entity| {
                    LookupResult::new(
                        entity.clone(),
                        Some(json!({ "summary": ["Malicious: 1"], "details": { "n": 1 } })),
                    )
                })
                .collect(),
        })
    }

    fn nothing(entities: &[Entity]) -> Result<LookupResponse, IntelError> {
        Ok(LookupResponse {
            searched_entities: entities.to_vec(),
            results: entities.iter().map(|entity| LookupResult::new(entity.clone(), None)).collect(),
        })
    }

    fn coordinator(
        intel: ScriptedIntel,
        sources: Vec<Source>,
        transport: &Arc<RecordingTransport>,
        settings: SearchSettings,
    ) -> SearchCoordinator {
        SearchCoordinator::new(
            intel.into_arc(),
            Arc::new(SourceRegistry::with_sources(sources)),
            Arc::new(PayloadStore::default()),
            transport.clone(),
            settings,
        )
    }

    fn query(text: &str) -> SearchQuery {
        SearchQuery { text: text.to_owned(), channel_id: "C1".to_owned(), user_id: "U1".to_owned() }
    }

    async fn posted_texts(transport: &RecordingTransport) -> Vec<String> {
        transport.posted().await.into_iter().map(|message| message.text).collect()
    }

    #[tokio::test]
    async fn single_value_streams_per_source_with_one_title() {
        let entities = vec![ip("8.8.8.8")];
        let intel = ScriptedIntel::parsing(entities.clone())
            .answer("x", found(&entities))
            .answer("y", nothing(&entities));
        let transport = Arc::new(RecordingTransport::default());
        let search = coordinator(
            intel,
            vec![Source::new("x", "Xray", "X"), Source::new("y", "Yankee", "Y")],
            &transport,
            SearchSettings::default(),
        );

        let outcome = search.run(query("8.8.8.8"), "corr-1").await;

        assert_eq!(outcome, SearchOutcome::Streamed { messages: 1, failures: 0 });
        assert_eq!(
            posted_texts(&transport).await,
            vec!["Parsing search text 0/2", "Intel results – Xray", ALL_COMPLETED_NOTICE]
        );
        let results = &transport.posted().await[1];
        assert_eq!(header_texts(&results.blocks), vec!["8.8.8.8 (IPv4)"]);
        assert_eq!(section_texts(&results.blocks), vec!["*Xray* (X)\n`Malicious: 1`"]);
    }

    #[tokio::test]
    async fn only_the_first_streamed_message_carries_a_title() {
        let entities = vec![ip("8.8.8.8")];
        let intel = ScriptedIntel::parsing(entities.clone())
            .answer("x", found(&entities))
            .answer("y", found(&entities));
        let transport = Arc::new(RecordingTransport::default());
        let search = coordinator(
            intel,
            vec![Source::new("x", "Xray", "X"), Source::new("y", "Yankee", "Y")],
            &transport,
            SearchSettings::default(),
        );

        search.run(query("8.8.8.8"), "corr-2").await;

        let posted = transport.posted().await;
        let titled: Vec<usize> = posted
            .iter()
            .filter(|message| message.text.starts_with("Intel results"))
            .map(|message| header_texts(&message.blocks).len())
            .collect();
        assert_eq!(titled, vec![1, 0]);
    }

    #[tokio::test]
    async fn failing_source_is_isolated_in_grouped_output() {
        let entities = vec![ip("1.1.1.1"), ip("2.2.2.2")];
        let mut meta = Map::new();
        meta.insert("status".to_owned(), json!("500"));
        let intel = ScriptedIntel::parsing(entities.clone())
            .answer("a", found(&entities))
            .answer("b", Err(IntelError::api("Internal Server Error", meta)))
            .answer("c", found(&entities));
        let transport = Arc::new(RecordingTransport::default());
        let search = coordinator(
            intel,
            vec![
                Source::new("a", "Alpha", "A"),
                Source::new("b", "Beta", "B"),
                Source::new("c", "Gamma", "C"),
            ],
            &transport,
            SearchSettings::default(),
        );

        let outcome = search.run(query("1.1.1.1 2.2.2.2"), "corr-3").await;

        assert_eq!(outcome, SearchOutcome::Grouped { groups: 2, failures: 1 });
        let posted = transport.posted().await;
        let consolidated = posted
            .iter()
            .find(|message| message.text == "Intel results")
            .expect("consolidated message");
        let sections = section_texts(&consolidated.blocks);
        assert_eq!(sections.iter().filter(|text| text.starts_with("*Alpha*")).count(), 2);
        assert_eq!(sections.iter().filter(|text| text.starts_with("*Gamma*")).count(), 2);
        assert_eq!(sections.iter().filter(|text| text.starts_with(":warning:")).count(), 1);
        assert!(sections.contains(&":warning: *Beta* – Internal Server Error".to_owned()));
        assert_eq!(header_texts(&consolidated.blocks), vec!["1.1.1.1 (IPv4)", "2.2.2.2 (IPv4)"]);
    }

    #[tokio::test]
    async fn progress_advances_once_per_source() {
        let entities = vec![ip("1.1.1.1"), ip("2.2.2.2")];
        let intel = ScriptedIntel::parsing(entities.clone())
            .answer("a", nothing(&entities))
            .answer("b", Err(IntelError::Transport("reset".to_owned())))
            .answer("c", nothing(&entities));
        let transport = Arc::new(RecordingTransport::default());
        let search = coordinator(
            intel,
            vec![Source::new("a", "A", ""), Source::new("b", "B", ""), Source::new("c", "C", "")],
            &transport,
            SearchSettings::default(),
        );

        search.run(query("1.1.1.1 2.2.2.2"), "corr-4").await;

        let edits: Vec<String> = transport
            .sent()
            .await
            .into_iter()
            .filter(|message| matches!(message.delivery, Delivery::Update { .. }))
            .map(|message| message.text)
            .collect();
        assert_eq!(
            edits,
            vec![
                "Searching 3 integrations 1/3",
                "Searching 3 integrations 2/3",
                "Searching 3 integrations 3/3",
                " ",
            ]
        );
    }

    #[tokio::test]
    async fn grouped_query_with_nothing_found_says_so() {
        let entities = vec![ip("1.1.1.1"), ip("2.2.2.2")];
        let intel = ScriptedIntel::parsing(entities.clone()).answer("a", nothing(&entities));
        let transport = Arc::new(RecordingTransport::default());
        let search =
            coordinator(intel, vec![Source::new("a", "A", "")], &transport, SearchSettings::default());

        let outcome = search.run(query("1.1.1.1 2.2.2.2"), "corr-5").await;

        assert_eq!(outcome, SearchOutcome::Grouped { groups: 0, failures: 0 });
        assert!(posted_texts(&transport).await.contains(&NO_RESULTS_NOTICE.to_owned()));
    }

    #[tokio::test]
    async fn blank_queries_and_empty_registries_get_ephemeral_notices() {
        let transport = Arc::new(RecordingTransport::default());
        let search = coordinator(
            ScriptedIntel::default(),
            vec![Source::new("a", "A", "")],
            &transport,
            SearchSettings::default(),
        );
        assert_eq!(search.run(query("   "), "corr-6").await, SearchOutcome::EmptyQuery);

        let empty = coordinator(ScriptedIntel::default(), Vec::new(), &transport, SearchSettings::default());
        assert_eq!(empty.run(query("8.8.8.8"), "corr-7").await, SearchOutcome::NoSources);

        let sent = transport.sent().await;
        assert_eq!(sent.len(), 2);
        assert!(sent.iter().all(|message| message.delivery == Delivery::Ephemeral { user_id: "U1".to_owned() }));
        assert_eq!(sent[0].text, EMPTY_QUERY_NOTICE);
        assert_eq!(sent[1].text, NO_SOURCES_NOTICE);
    }

    #[tokio::test]
    async fn parse_failures_abort_with_one_message_and_tear_down_progress() {
        let intel = ScriptedIntel::failing_parse(IntelError::api("Text too long", Map::new()));
        let transport = Arc::new(RecordingTransport::default());
        let search =
            coordinator(intel, vec![Source::new("a", "A", "")], &transport, SearchSettings::default());

        assert_eq!(search.run(query("x"), "corr-8").await, SearchOutcome::ParseFailed);

        let sent = transport.sent().await;
        assert_eq!(sent.last().map(|message| message.text.as_str()), Some(" "));
        assert!(posted_texts(&transport).await.contains(&":warning: Error: Text too long".to_owned()));
    }

    #[tokio::test]
    async fn text_without_entities_is_reported() {
        let intel = ScriptedIntel::parsing(Vec::new());
        let transport = Arc::new(RecordingTransport::default());
        let search =
            coordinator(intel, vec![Source::new("a", "A", "")], &transport, SearchSettings::default());

        assert_eq!(search.run(query("hello"), "corr-9").await, SearchOutcome::NoEntities);
        assert!(posted_texts(&transport).await.contains(&NO_ENTITIES_NOTICE.to_owned()));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_sources_time_out_into_an_attributed_error() {
        let entities = vec![ip("8.8.8.8")];
        let intel = ScriptedIntel::parsing(entities.clone())
            .answer("fast", found(&entities))
            .answer("slow", found(&entities))
            .delay("slow", Duration::from_secs(600));
        let transport = Arc::new(RecordingTransport::default());
        let settings =
            SearchSettings { source_timeout: Some(Duration::from_secs(60)), ..SearchSettings::default() };
        let search = coordinator(
            intel,
            vec![Source::new("fast", "Fast", ""), Source::new("slow", "Slow", "")],
            &transport,
            settings,
        );

        let outcome = search.run(query("8.8.8.8"), "corr-10").await;

        assert_eq!(outcome, SearchOutcome::Streamed { messages: 1, failures: 1 });
        assert!(posted_texts(&transport)
            .await
            .contains(&":warning: Slow lookup failed – no response within 60s".to_owned()));
    }

    #[tokio::test]
    async fn panicking_lookup_tasks_still_get_an_attributed_error() {
        let entities = vec![ip("1.1.1.1"), ip("2.2.2.2")];
        let intel = ScriptedIntel::parsing(entities.clone())
            .answer("a", found(&entities))
            .panicking("b")
            .answer("c", found(&entities));
        let transport = Arc::new(RecordingTransport::default());
        let search = coordinator(
            intel,
            vec![
                Source::new("a", "Alpha", "A"),
                Source::new("b", "Beta", "B"),
                Source::new("c", "Gamma", "C"),
            ],
            &transport,
            SearchSettings::default(),
        );

        let outcome = search.run(query("1.1.1.1 2.2.2.2"), "corr-11").await;

        assert_eq!(outcome, SearchOutcome::Grouped { groups: 2, failures: 1 });
        let posted = transport.posted().await;
        let consolidated = posted
            .iter()
            .find(|message| message.text == "Intel results")
            .expect("consolidated message");
        let beta: Vec<String> = section_texts(&consolidated.blocks)
            .into_iter()
            .filter(|text| text.contains("*Beta*"))
            .collect();
        assert_eq!(beta, vec![":warning: *Beta* lookup failed – the intelligence API could not be reached"]);
    }

    #[tokio::test]
    async fn panicking_lookup_is_reported_on_the_streamed_path() {
        let entities = vec![ip("8.8.8.8")];
        let intel = ScriptedIntel::parsing(entities.clone())
            .answer("a", found(&entities))
            .panicking("b");
        let transport = Arc::new(RecordingTransport::default());
        let search = coordinator(
            intel,
            vec![Source::new("a", "Alpha", "A"), Source::new("b", "Beta", "B")],
            &transport,
            SearchSettings::default(),
        );

        let outcome = search.run(query("8.8.8.8"), "corr-12").await;

        assert_eq!(outcome, SearchOutcome::Streamed { messages: 1, failures: 1 });
        let texts = posted_texts(&transport).await;
        assert!(texts.contains(&":warning: Beta lookup failed – the intelligence API could not be reached".to_owned()));
        assert_eq!(texts.last().map(String::as_str), Some(ALL_COMPLETED_NOTICE));
    }
}
