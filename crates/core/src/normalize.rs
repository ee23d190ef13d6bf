//! Result normalizer.
//!
//! Lookup payloads are arbitrary per source. Chat rendering only needs the
//! summary tags and whether full details exist, so everything else is
//! dropped here and the result is tagged with the source that produced it.

use serde_json::Value;

use crate::domain::{entity::Entity, lookup::LookupResult, source::Source};

pub const UNAVAILABLE_TAG: &str = "Tag unavailable";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResultView {
    NoData,
    Summary(Vec<String>),
}

#[derive(Clone, Debug, PartialEq)]
pub struct AttributedResult {
    pub entity: Entity,
    pub source: Source,
    pub view: ResultView,
    pub has_details: bool,
}

impl AttributedResult {
    /// Marks an entity the source searched without finding anything.
    pub fn placeholder(entity: Entity, source: Source) -> Self {
        Self { entity, source, view: ResultView::NoData, has_details: false }
    }

    pub fn has_data(&self) -> bool {
        !matches!(self.view, ResultView::NoData)
    }
}

pub fn normalize_result(source: &Source, result: LookupResult) -> AttributedResult {
    let has_details = result.details().is_some_and(is_present);
    let view = match &result.data {
        None | Some(Value::Null) => ResultView::NoData,
        Some(data) => ResultView::Summary(summary_tags(data)),
    };

    AttributedResult { entity: result.entity, source: source.clone(), view, has_details }
}

pub fn normalize_results(source: &Source, results: Vec<LookupResult>) -> Vec<AttributedResult> {
    results.into_iter().map(|result| normalize_result(source, result)).collect()
}

fn summary_tags(data: &Value) -> Vec<String> {
    match data.get("summary") {
        Some(Value::Array(tags)) => tags.iter().map(summary_tag_text).collect(),
        _ => Vec::new(),
    }
}

/// Tags are either plain strings or objects with a `text` field.
pub fn summary_tag_text(tag: &Value) -> String {
    let text = match tag {
        Value::String(text) => text.as_str(),
        Value::Object(fields) => match fields.get("text") {
            Some(Value::String(text)) => text.as_str(),
            _ => return UNAVAILABLE_TAG.to_owned(),
        },
        _ => return UNAVAILABLE_TAG.to_owned(),
    };

    strip_inline_images(text).trim().to_owned()
}

/// Removes inline `<svg>...</svg>` and `<img>...</img>` markup. Matching is
/// greedy and line-local: everything from the first opening tag to the last
/// closing tag on the same line goes.
fn strip_inline_images(text: &str) -> String {
    text.split('\n')
        .map(|line| strip_span(&strip_span(line, "<svg", "</svg>"), "<img", "</img>"))
        .collect::<Vec<_>>()
        .join("\n")
}

fn strip_span(line: &str, open: &str, close: &str) -> String {
    let Some(start) = line.find(open) else {
        return line.to_owned();
    };
    match line.rfind(close) {
        Some(end) if end > start + open.len() => {
            format!("{}{}", &line[..start], &line[end + close.len()..])
        }
        _ => line.to_owned(),
    }
}

fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Object(fields) => !fields.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::String(text) => !text.is_empty(),
        Value::Bool(_) | Value::Number(_) => true,
    }
}
