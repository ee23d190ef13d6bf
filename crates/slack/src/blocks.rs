use serde::Serialize;

/// Slack rejects header text longer than this.
pub const HEADER_CHAR_LIMIT: usize = 150;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TextObject {
    #[serde(rename = "plain_text")]
    Plain { text: String },
    Mrkdwn { text: String },
}

impl TextObject {
    pub fn plain(text: impl Into<String>) -> Self {
        Self::Plain { text: text.into() }
    }

    pub fn mrkdwn(text: impl Into<String>) -> Self {
        Self::Mrkdwn { text: text.into() }
    }

    pub fn text(&self) -> &str {
        match self {
            Self::Plain { text } | Self::Mrkdwn { text } => text,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ButtonStyle {
    Primary,
    Danger,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename = "button")]
pub struct ButtonElement {
    pub action_id: String,
    pub text: TextObject,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style: Option<ButtonStyle>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl ButtonElement {
    pub fn new(action_id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            action_id: action_id.into(),
            text: TextObject::plain(label),
            style: None,
            value: None,
        }
    }

    pub fn style(mut self, style: ButtonStyle) -> Self {
        self.style = Some(style);
        self
    }

    pub fn value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    Header {
        text: TextObject,
    },
    Section {
        #[serde(skip_serializing_if = "Option::is_none")]
        block_id: Option<String>,
        text: TextObject,
        #[serde(skip_serializing_if = "Option::is_none")]
        accessory: Option<ButtonElement>,
    },
    Divider,
    Actions {
        block_id: String,
        elements: Vec<ButtonElement>,
    },
    Context {
        #[serde(skip_serializing_if = "Option::is_none")]
        block_id: Option<String>,
        elements: Vec<TextObject>,
    },
}

impl Block {
    pub fn header(text: &str) -> Self {
        Self::Header { text: TextObject::plain(truncate_chars(text, HEADER_CHAR_LIMIT)) }
    }

    pub fn mrkdwn_section(text: impl Into<String>) -> Self {
        Self::Section { block_id: None, text: TextObject::mrkdwn(text), accessory: None }
    }

    pub fn plain_section(text: impl Into<String>) -> Self {
        Self::Section { block_id: None, text: TextObject::plain(text), accessory: None }
    }

    /// Characters of visible text the block carries.
    pub fn text_len(&self) -> usize {
        match self {
            Self::Header { text } | Self::Section { text, .. } => text.text().chars().count(),
            Self::Context { elements, .. } => {
                elements.iter().map(|element| element.text().chars().count()).sum()
            }
            Self::Divider | Self::Actions { .. } => 0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MessageTemplate {
    pub fallback_text: String,
    pub blocks: Vec<Block>,
}

impl MessageTemplate {
    pub fn text(fallback_text: impl Into<String>) -> Self {
        Self { fallback_text: fallback_text.into(), blocks: Vec::new() }
    }
}

/// Modal and home-tab surfaces.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum View {
    Modal {
        title: TextObject,
        #[serde(skip_serializing_if = "Option::is_none")]
        close: Option<TextObject>,
        blocks: Vec<Block>,
    },
    Home {
        blocks: Vec<Block>,
    },
}

impl View {
    pub fn modal(title: &str, blocks: Vec<Block>) -> Self {
        Self::Modal {
            title: TextObject::plain(title),
            close: Some(TextObject::plain("Close")),
            blocks,
        }
    }

    pub fn home(blocks: Vec<Block>) -> Self {
        Self::Home { blocks }
    }

    pub fn blocks(&self) -> &[Block] {
        match self {
            Self::Modal { blocks, .. } | Self::Home { blocks } => blocks,
        }
    }
}

pub struct MessageBuilder {
    fallback_text: String,
    blocks: Vec<Block>,
}

impl MessageBuilder {
    pub fn new(fallback_text: impl Into<String>) -> Self {
        Self { fallback_text: fallback_text.into(), blocks: Vec::new() }
    }

    pub fn header(mut self, text: &str) -> Self {
        self.blocks.push(Block::header(text));
        self
    }

    pub fn section<F>(mut self, build: F) -> Self
    where
        F: FnOnce(&mut SectionBuilder),
    {
        let mut builder = SectionBuilder::default();
        build(&mut builder);
        self.blocks.push(builder.build());
        self
    }

    pub fn divider(mut self) -> Self {
        self.blocks.push(Block::Divider);
        self
    }

    pub fn actions<F>(mut self, block_id: impl Into<String>, build: F) -> Self
    where
        F: FnOnce(&mut ActionsBuilder),
    {
        let mut builder = ActionsBuilder::default();
        build(&mut builder);
        self.blocks.push(Block::Actions { block_id: block_id.into(), elements: builder.build() });
        self
    }

    pub fn context<F>(mut self, build: F) -> Self
    where
        F: FnOnce(&mut ContextBuilder),
    {
        let mut builder = ContextBuilder::default();
        build(&mut builder);
        self.blocks.push(Block::Context { block_id: None, elements: builder.build() });
        self
    }

    pub fn blocks(mut self, blocks: impl IntoIterator<Item = Block>) -> Self {
        self.blocks.extend(blocks);
        self
    }

    pub fn build(self) -> MessageTemplate {
        MessageTemplate { fallback_text: self.fallback_text, blocks: self.blocks }
    }
}

#[derive(Default)]
pub struct SectionBuilder {
    block_id: Option<String>,
    text: Option<TextObject>,
    accessory: Option<ButtonElement>,
}

impl SectionBuilder {
    pub fn block_id(&mut self, block_id: impl Into<String>) -> &mut Self {
        self.block_id = Some(block_id.into());
        self
    }

    pub fn plain(&mut self, text: impl Into<String>) -> &mut Self {
        self.text = Some(TextObject::plain(text));
        self
    }

    pub fn mrkdwn(&mut self, text: impl Into<String>) -> &mut Self {
        self.text = Some(TextObject::mrkdwn(text));
        self
    }

    pub fn accessory(&mut self, button: ButtonElement) -> &mut Self {
        self.accessory = Some(button);
        self
    }

    fn build(self) -> Block {
        Block::Section {
            block_id: self.block_id,
            text: self.text.unwrap_or_else(|| TextObject::plain(" ")),
            accessory: self.accessory,
        }
    }
}

#[derive(Default)]
pub struct ActionsBuilder {
    elements: Vec<ButtonElement>,
}

impl ActionsBuilder {
    pub fn button(&mut self, button: ButtonElement) -> &mut Self {
        self.elements.push(button);
        self
    }

    fn build(self) -> Vec<ButtonElement> {
        self.elements
    }
}

#[derive(Default)]
pub struct ContextBuilder {
    elements: Vec<TextObject>,
}

impl ContextBuilder {
    pub fn plain(&mut self, text: impl Into<String>) -> &mut Self {
        self.elements.push(TextObject::plain(text));
        self
    }

    pub fn mrkdwn(&mut self, text: impl Into<String>) -> &mut Self {
        self.elements.push(TextObject::mrkdwn(text));
        self
    }

    fn build(self) -> Vec<TextObject> {
        self.elements
    }
}

/// Cuts `text` to at most `limit` characters, ending with an ellipsis when cut.
pub fn truncate_chars(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_owned();
    }
    let mut cut: String = text.chars().take(limit.saturating_sub(1)).collect();
    cut.push('…');
    cut
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{
        truncate_chars, Block, ButtonElement, ButtonStyle, MessageBuilder, TextObject, View,
        HEADER_CHAR_LIMIT,
    };

    #[test]
    fn message_builder_creates_typed_block_structure() {
        let message = MessageBuilder::new("fallback")
            .header("8.8.8.8 (IPv4)")
            .section(|section| {
                section
                    .mrkdwn("*VirusTotal* (VT)\n`Malicious: 3`")
                    .accessory(ButtonElement::new("show_details", "Show Details").value("{}"));
            })
            .divider()
            .actions("refresh_block", |actions| {
                actions.button(ButtonElement::new("refresh_integrations", "Refresh Integrations"));
            })
            .build();

        assert_eq!(message.blocks.len(), 4);
        assert!(matches!(&message.blocks[0], Block::Header { text: TextObject::Plain { .. } }));
        assert!(matches!(
            &message.blocks[1],
            Block::Section { text: TextObject::Mrkdwn { .. }, accessory: Some(button), .. }
                if button.action_id == "show_details"
        ));
        assert_eq!(message.blocks[2], Block::Divider);
        assert!(matches!(
            &message.blocks[3],
            Block::Actions { block_id, elements } if block_id == "refresh_block" && elements.len() == 1
        ));
    }

    #[test]
    fn blocks_serialize_to_block_kit_json() {
        let section = MessageBuilder::new("fallback")
            .section(|section| {
                section.mrkdwn("*hello*").accessory(
                    ButtonElement::new("show_details", "Show Details")
                        .style(ButtonStyle::Primary)
                        .value("v"),
                );
            })
            .build();

        assert_eq!(
            serde_json::to_value(&section.blocks[0]).expect("serialize"),
            json!({
                "type": "section",
                "text": { "type": "mrkdwn", "text": "*hello*" },
                "accessory": {
                    "type": "button",
                    "action_id": "show_details",
                    "text": { "type": "plain_text", "text": "Show Details" },
                    "style": "primary",
                    "value": "v"
                }
            })
        );
        assert_eq!(serde_json::to_value(Block::Divider).expect("serialize"), json!({ "type": "divider" }));
    }

    #[test]
    fn views_serialize_with_surface_type() {
        let modal = View::modal("Error Details", vec![Block::plain_section("Fetching details…")]);
        let value = serde_json::to_value(&modal).expect("serialize");
        assert_eq!(value["type"], json!("modal"));
        assert_eq!(value["title"], json!({ "type": "plain_text", "text": "Error Details" }));
        assert_eq!(value["close"]["text"], json!("Close"));

        let home = serde_json::to_value(View::home(Vec::new())).expect("serialize");
        assert_eq!(home, json!({ "type": "home", "blocks": [] }));
    }

    #[test]
    fn header_text_is_capped() {
        let long = "x".repeat(400);
        let Block::Header { text } = Block::header(&long) else {
            panic!("expected header block");
        };
        assert_eq!(text.text().chars().count(), HEADER_CHAR_LIMIT);
        assert!(text.text().ends_with('…'));
        assert_eq!(truncate_chars("short", 10), "short");
    }

    #[test]
    fn text_len_counts_characters_not_bytes() {
        assert_eq!(Block::mrkdwn_section("█░").text_len(), 2);
        assert_eq!(Block::Divider.text_len(), 0);
    }
}
