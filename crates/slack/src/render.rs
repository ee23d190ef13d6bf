//! Block Kit rendering of lookup results, lookup failures and detail modals.

use intelbot_core::{
    domain::source::Source,
    errors::IntelError,
    grouping::EntityGroup,
    normalize::{AttributedResult, ResultView},
    payloads::PayloadStore,
    reduce::reduce_value,
};
use serde_json::Value;

use crate::{
    action_value::{self, ActionValueError, DetailsRequest, EXPIRED_NOTICE},
    blocks::{Block, ButtonElement, MessageBuilder, MessageTemplate, TextObject, View},
    chunking::{chunk_text, fit_to_budget, split_chars, ChunkLimits, TRUNCATION_NOTICE},
};

pub const SHOW_DETAILS_ACTION: &str = "show_details";
pub const SHOW_ERROR_DETAILS_ACTION: &str = "show_error_details";
pub const DETAILS_TITLE: &str = "Integration Details";
pub const ERROR_DETAILS_TITLE: &str = "Error Details";
pub const FETCHING_DETAILS_TEXT: &str = "Fetching details…";
pub const FETCH_FAILED_TEXT: &str = ":warning: Failed to fetch details";
const NO_SUMMARY_TEXT: &str = "_No summary_";

/// Blocks for a set of entity groups: optional header per group, one section
/// per result with data, dividers between groups.
pub fn result_blocks(
    groups: &[EntityGroup],
    with_title: bool,
    store: &PayloadStore,
    limits: &ChunkLimits,
) -> Vec<Block> {
    let mut blocks = Vec::new();
    for (position, group) in groups.iter().enumerate() {
        if position > 0 {
            blocks.push(Block::Divider);
        }
        if with_title {
            blocks.push(Block::header(&format!(
                "{} ({})",
                group.entity.display(),
                group.entity.entity_type
            )));
        }
        for result in group.results_with_data() {
            blocks.extend(result_sections(result, store, limits));
        }
    }
    blocks
}

fn result_sections(
    result: &AttributedResult,
    store: &PayloadStore,
    limits: &ChunkLimits,
) -> Vec<Block> {
    let text = format!("{}\n{}", source_title(&result.source), summary_line(&result.view));
    let accessory = result.has_details.then(|| {
        let request = DetailsRequest::new(
            &result.source.id,
            &result.entity.value,
            &result.entity.entity_type,
        );
        let value = serde_json::to_value(&request).unwrap_or(Value::Null);
        ButtonElement::new(SHOW_DETAILS_ACTION, "Show Details")
            .value(action_value::encode(&value, store))
    });

    split_chars(&text, limits.fragment_chars)
        .into_iter()
        .enumerate()
        .map(|(position, slice)| Block::Section {
            block_id: None,
            text: TextObject::mrkdwn(slice),
            accessory: if position == 0 { accessory.clone() } else { None },
        })
        .collect()
}

fn source_title(source: &Source) -> String {
    if source.acronym.is_empty() {
        format!("*{}*", source.label())
    } else {
        format!("*{}* ({})", source.label(), source.acronym)
    }
}

fn summary_line(view: &ResultView) -> String {
    match view {
        ResultView::Summary(tags) if !tags.is_empty() => {
            tags.iter().map(|tag| format!("`{tag}`")).collect::<Vec<_>>().join(" ")
        }
        ResultView::Summary(_) | ResultView::NoData => NO_SUMMARY_TEXT.to_owned(),
    }
}

/// One failing source as message blocks. Long upstream messages are split so
/// no section exceeds the fragment ceiling.
pub fn error_blocks(
    source: &Source,
    error: &IntelError,
    store: &PayloadStore,
    limits: &ChunkLimits,
) -> Vec<Block> {
    let (text, actions) = match error {
        IntelError::Api { message, meta } => {
            let value = action_value::encode(&Value::Object(meta.clone()), store);
            let actions = Block::Actions {
                block_id: format!("error_actions:{}", source.id),
                elements: vec![ButtonElement::new(
                    SHOW_ERROR_DETAILS_ACTION,
                    ":warning: Show Error Details",
                )
                .value(value)],
            };
            (format!(":warning: *{}* – {message}", source.label()), Some(actions))
        }
        other => (
            format!(":warning: *{}* lookup failed – {}", source.label(), other.user_message()),
            None,
        ),
    };

    let mut blocks: Vec<Block> = split_chars(&text, limits.fragment_chars)
        .into_iter()
        .map(Block::mrkdwn_section)
        .collect();
    blocks.extend(actions);
    blocks
}

/// Notification text for a failing source, capped at one fragment.
pub fn error_fallback(source: &Source, error: &IntelError, limits: &ChunkLimits) -> String {
    let text = format!(":warning: {} lookup failed – {}", source.label(), error.user_message());
    let cut = text.char_indices().nth(limits.fragment_chars.max(1)).map(|(offset, _)| offset);
    match cut {
        Some(offset) => text[..offset].to_owned(),
        None => text,
    }
}

/// Caps a block list at the fragment and character ceilings with one trailing notice.
pub fn budget_blocks(blocks: Vec<Block>, limits: &ChunkLimits) -> Vec<Block> {
    fit_to_budget(blocks, limits, Block::text_len, Block::mrkdwn_section(TRUNCATION_NOTICE)).items
}

/// Message for one source on the single-entity path. `None` when nothing has data.
pub fn source_results_message(
    source: &Source,
    groups: &[EntityGroup],
    with_title: bool,
    store: &PayloadStore,
    limits: &ChunkLimits,
) -> Option<MessageTemplate> {
    let blocks = result_blocks(groups, with_title, store, limits);
    if blocks.is_empty() {
        return None;
    }

    Some(
        MessageBuilder::new(format!("Intel results – {}", source.label()))
            .blocks(budget_blocks(blocks, limits))
            .build(),
    )
}

pub fn source_error_message(
    source: &Source,
    error: &IntelError,
    store: &PayloadStore,
    limits: &ChunkLimits,
) -> MessageTemplate {
    MessageBuilder::new(error_fallback(source, error, limits))
        .blocks(budget_blocks(error_blocks(source, error, store, limits), limits))
        .build()
}

/// Consolidated message of the multi-entity path. `None` when there is nothing to show.
pub fn grouped_message(
    groups: &[EntityGroup],
    failures: &[(Source, IntelError)],
    store: &PayloadStore,
    limits: &ChunkLimits,
) -> Option<MessageTemplate> {
    let mut blocks = result_blocks(groups, true, store, limits);
    if !failures.is_empty() && !blocks.is_empty() {
        blocks.push(Block::Divider);
    }
    for (source, error) in failures {
        blocks.extend(error_blocks(source, error, store, limits));
    }
    if blocks.is_empty() {
        return None;
    }

    Some(MessageBuilder::new("Intel results").blocks(budget_blocks(blocks, limits)).build())
}

pub fn details_placeholder_view() -> View {
    View::modal(DETAILS_TITLE, vec![Block::plain_section(FETCHING_DETAILS_TEXT)])
}

/// Modal body: heading plus the chunked detail text.
pub fn details_view(source: Option<&Source>, content: &str, limits: &ChunkLimits) -> View {
    let heading = source.and_then(Source::heading).unwrap_or_else(|| DETAILS_TITLE.to_owned());
    let body_limits = ChunkLimits { max_fragments: limits.max_fragments.saturating_sub(1), ..*limits };

    let mut blocks = vec![Block::header(&heading)];
    blocks.extend(chunk_text(content, &body_limits).items.into_iter().map(Block::mrkdwn_section));
    View::modal(DETAILS_TITLE, blocks)
}

/// Details text for a re-run lookup: the reduced payload in a fence, or the empty notice.
pub fn details_content(details: Option<&Value>) -> String {
    let reduced = details.map(reduce_value);
    match reduced {
        Some(value) if !is_empty(&value) => {
            let pretty = serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string());
            format!("```{pretty}```")
        }
        _ => String::new(),
    }
}

/// Error modal for a decoded meta object, or the notice matching why the
/// button value could not be decoded.
pub fn error_details_view(meta: Result<&Value, &ActionValueError>, limits: &ChunkLimits) -> View {
    let blocks = match meta {
        Ok(meta) => {
            let pretty = serde_json::to_string_pretty(meta).unwrap_or_else(|_| meta.to_string());
            chunk_text(&format!("```{pretty}```"), limits)
                .items
                .into_iter()
                .map(Block::mrkdwn_section)
                .collect()
        }
        Err(ActionValueError::Expired) => vec![Block::mrkdwn_section(EXPIRED_NOTICE)],
        Err(ActionValueError::Malformed(_)) => vec![Block::mrkdwn_section(FETCH_FAILED_TEXT)],
    };
    View::modal(ERROR_DETAILS_TITLE, blocks)
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(fields) => fields.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::String(text) => text.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}
