//! Size-bounded fragmentation of rendered output.
//!
//! Slack caps a section at 3,000 characters, a message at a fixed number of
//! blocks and a payload at a total size. Everything the bot renders goes
//! through the budget here so oversized content is cut deterministically and
//! the cut is announced by exactly one trailing notice.

pub const FRAGMENT_CHAR_LIMIT: usize = 2_900;
pub const MAX_FRAGMENTS: usize = 100;
pub const MAX_TOTAL_CHARS: usize = 100_000;

pub const NO_DETAILS_TEXT: &str = "_No details found_";
pub const TRUNCATION_NOTICE: &str =
    "_Output truncated: the remaining content exceeds Slack's message size limits._";

const FENCE: &str = "```";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChunkLimits {
    pub fragment_chars: usize,
    pub max_fragments: usize,
    pub max_total_chars: usize,
}

impl Default for ChunkLimits {
    fn default() -> Self {
        Self {
            fragment_chars: FRAGMENT_CHAR_LIMIT,
            max_fragments: MAX_FRAGMENTS,
            max_total_chars: MAX_TOTAL_CHARS,
        }
    }
}

/// Output of a budgeted render. When `truncated` is set the last item is the notice.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Fragments<T> {
    pub items: Vec<T>,
    pub truncated: bool,
}

impl<T> Fragments<T> {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Keeps `items` whole when they fit both ceilings. Otherwise keeps the longest
/// prefix that still leaves room for `notice` and appends it.
pub fn fit_to_budget<T>(
    items: Vec<T>,
    limits: &ChunkLimits,
    measure: impl Fn(&T) -> usize,
    notice: T,
) -> Fragments<T> {
    let total: usize = items.iter().map(&measure).sum();
    if items.len() <= limits.max_fragments && total <= limits.max_total_chars {
        return Fragments { items, truncated: false };
    }

    let notice_len = measure(&notice);
    let slots = limits.max_fragments.saturating_sub(1);
    let char_budget = limits.max_total_chars.saturating_sub(notice_len);

    let mut kept = Vec::new();
    let mut used = 0usize;
    for item in items {
        let len = measure(&item);
        if kept.len() >= slots || used + len > char_budget {
            break;
        }
        used += len;
        kept.push(item);
    }
    kept.push(notice);

    Fragments { items: kept, truncated: true }
}

/// Splits text into fragments of at most `limits.fragment_chars` characters.
///
/// Text wrapped in a ``` fence is unwrapped, sliced, and every slice is
/// re-wrapped so each fragment renders as its own code block.
pub fn chunk_text(content: &str, limits: &ChunkLimits) -> Fragments<String> {
    let (body, fenced) = match unfence(content) {
        Some(inner) => (inner, true),
        None => (content, false),
    };

    if body.trim().is_empty() {
        return Fragments { items: vec![NO_DETAILS_TEXT.to_owned()], truncated: false };
    }

    let overhead = if fenced { FENCE.len() * 2 } else { 0 };
    let slice_chars = limits.fragment_chars.saturating_sub(overhead).max(1);

    let slices = split_chars(body, slice_chars)
        .into_iter()
        .map(|slice| if fenced { format!("{FENCE}{slice}{FENCE}") } else { slice.to_owned() })
        .collect();

    fit_to_budget(slices, limits, |fragment| fragment.chars().count(), TRUNCATION_NOTICE.to_owned())
}

/// Splits on character boundaries; never cuts a multi-byte character.
pub fn split_chars(text: &str, max_chars: usize) -> Vec<&str> {
    let max_chars = max_chars.max(1);
    let mut slices = Vec::new();
    let mut start = 0usize;
    let mut count = 0usize;

    for (offset, _) in text.char_indices() {
        if count == max_chars {
            slices.push(&text[start..offset]);
            start = offset;
            count = 0;
        }
        count += 1;
    }
    if start < text.len() {
        slices.push(&text[start..]);
    }

    slices
}

fn unfence(content: &str) -> Option<&str> {
    if content.len() >= FENCE.len() * 2 && content.starts_with(FENCE) && content.ends_with(FENCE) {
        Some(&content[FENCE.len()..content.len() - FENCE.len()])
    } else {
        None
    }
}
