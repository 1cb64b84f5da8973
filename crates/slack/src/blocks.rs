use serde::Serialize;
use serde_json::{json, Value};
use trout_core::{ShoutOut, ShoutOutSetting};

pub const RELEASE_PROMPT: &str = "Please enter the super secret password to continue.";
pub const RELEASE_RETRY_PROMPT: &str = "Good try, but WRONG!";
pub const RELEASE_WARNING: &str = "This will release *all* the baby shout trouts into the wild, starting right here IN THIS CHANNEL!\n\nAre you sure you want to do that, RIGHT NOW?";
pub const ACCESS_DENIED: &str =
    "Looks like you don't know the super secret password. ACCESS DENIED!";
pub const ACCESS_GRANTED: &str = "Access Granted!";
pub const PASSWORD_PLACEHOLDER: &str = "What's the super secret password?";

pub const VISIBILITY_ACTION_ID: &str = "shout_out.visibility";
pub const ANONYMITY_ACTION_ID: &str = "shout_out.anonymity";
pub const PASSWORD_ACTION_ID: &str = "shout_trout.password";

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
#[serde(tag = "type", rename = "plain_text_input")]
pub struct PlainTextInput {
    pub action_id: String,
    pub placeholder: TextObject,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    Header { block_id: String, text: TextObject },
    Section { block_id: String, text: TextObject },
    Actions { block_id: String, elements: Vec<ButtonElement> },
    Context { block_id: String, elements: Vec<TextObject> },
    Input { block_id: String, label: TextObject, element: PlainTextInput, dispatch_action: bool },
}

impl Block {
    pub fn block_id(&self) -> &str {
        match self {
            Self::Header { block_id, .. }
            | Self::Section { block_id, .. }
            | Self::Actions { block_id, .. }
            | Self::Context { block_id, .. }
            | Self::Input { block_id, .. } => block_id,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MessageTemplate {
    pub fallback_text: String,
    pub blocks: Vec<Block>,
}

impl MessageTemplate {
    /// Body accepted by `chat.*` methods, slash command acks and response urls.
    pub fn to_payload(&self) -> Value {
        json!({ "text": self.fallback_text, "blocks": self.blocks })
    }

    pub fn block(&self, block_id: &str) -> Option<&Block> {
        self.blocks.iter().find(|block| block.block_id() == block_id)
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

    pub fn header(mut self, block_id: impl Into<String>, text: impl Into<String>) -> Self {
        self.blocks.push(Block::Header { block_id: block_id.into(), text: TextObject::plain(text) });
        self
    }

    pub fn section<F>(mut self, block_id: impl Into<String>, build: F) -> Self
    where
        F: FnOnce(&mut SectionBuilder),
    {
        let mut builder = SectionBuilder::default();
        build(&mut builder);
        self.blocks.push(Block::Section { block_id: block_id.into(), text: builder.build() });
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

    pub fn context<F>(mut self, block_id: impl Into<String>, build: F) -> Self
    where
        F: FnOnce(&mut ContextBuilder),
    {
        let mut builder = ContextBuilder::default();
        build(&mut builder);
        self.blocks.push(Block::Context { block_id: block_id.into(), elements: builder.build() });
        self
    }

    /// Text input that dispatches a block action as soon as the user presses enter.
    pub fn dispatching_input(
        mut self,
        block_id: impl Into<String>,
        label: impl Into<String>,
        action_id: impl Into<String>,
        placeholder: impl Into<String>,
    ) -> Self {
        self.blocks.push(Block::Input {
            block_id: block_id.into(),
            label: TextObject::plain(label),
            element: PlainTextInput {
                action_id: action_id.into(),
                placeholder: TextObject::plain(placeholder),
            },
            dispatch_action: true,
        });
        self
    }

    pub fn build(self) -> MessageTemplate {
        MessageTemplate { fallback_text: self.fallback_text, blocks: self.blocks }
    }
}

#[derive(Default)]
pub struct SectionBuilder {
    text: Option<TextObject>,
}

impl SectionBuilder {
    pub fn plain(&mut self, text: impl Into<String>) -> &mut Self {
        self.text = Some(TextObject::plain(text));
        self
    }

    pub fn mrkdwn(&mut self, text: impl Into<String>) -> &mut Self {
        self.text = Some(TextObject::mrkdwn(text));
        self
    }

    fn build(self) -> TextObject {
        self.text.unwrap_or_else(|| TextObject::plain(""))
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

pub fn settings_block_id(shout_out: &ShoutOut) -> String {
    format!("kudo-{}", shout_out.id)
}

pub fn password_block_id(attempt: u32) -> String {
    format!("shouttrout-{attempt}")
}

/// Card shown after `/trout`: the stored message, a status line and the two
/// toggles. Each toggle offers the opposite of the current state.
pub fn settings_card(shout_out: &ShoutOut, status: &str) -> MessageTemplate {
    let visibility = if shout_out.is_public {
        ButtonElement::new(VISIBILITY_ACTION_ID, "Make Private")
            .value(ShoutOutSetting::Private.as_str())
    } else {
        ButtonElement::new(VISIBILITY_ACTION_ID, "Make Public")
            .value(ShoutOutSetting::Public.as_str())
    };
    let anonymity = if shout_out.is_anonymous {
        ButtonElement::new(ANONYMITY_ACTION_ID, "Remove Anonymity")
            .value(ShoutOutSetting::Named.as_str())
    } else {
        ButtonElement::new(ANONYMITY_ACTION_ID, "Make Anonymous")
            .value(ShoutOutSetting::Anonymous.as_str())
    };

    MessageBuilder::new(format!("Shout out: {}", shout_out.message))
        .section("shout_out.message", |section| {
            section.plain(format!("Shout out: {}", shout_out.message));
        })
        .section("shout_out.status", |section| {
            section.mrkdwn(status);
        })
        .actions(settings_block_id(shout_out), |actions| {
            actions.button(visibility).button(anonymity);
        })
        .build()
}

/// Release password prompt. Once `attempt` reaches `max_attempts` the input
/// is withdrawn.
pub fn password_prompt(attempt: u32, max_attempts: u32, label: &str) -> MessageTemplate {
    if attempt >= max_attempts {
        return MessageBuilder::new(ACCESS_DENIED)
            .header("shout_trout.header", ACCESS_DENIED)
            .build();
    }

    MessageBuilder::new(RELEASE_WARNING)
        .header("shout_trout.header", RELEASE_WARNING)
        .dispatching_input(
            password_block_id(attempt),
            label,
            PASSWORD_ACTION_ID,
            PASSWORD_PLACEHOLDER,
        )
        .build()
}

pub fn access_granted() -> MessageTemplate {
    MessageBuilder::new(ACCESS_GRANTED).header("shout_trout.header", ACCESS_GRANTED).build()
}

pub fn error_message(summary: &str, correlation_id: &str) -> MessageTemplate {
    MessageBuilder::new(summary.to_owned())
        .section("trout.error.summary", |section| {
            section.mrkdwn(format!(":warning: {summary}"));
        })
        .context("trout.error.context", |context| {
            context.plain(format!("Correlation ID: {correlation_id}"));
        })
        .build()
}

pub fn plain_message(text: &str) -> MessageTemplate {
    MessageBuilder::new(text.to_owned())
        .section("trout.notice", |section| {
            section.plain(text);
        })
        .build()
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use serde_json::json;
    use trout_core::{ShoutOut, ShoutOutDraft, ShoutOutId, UserId};

    use super::{
        access_granted, password_prompt, settings_card, Block, ButtonElement, ButtonStyle,
        MessageBuilder, ACCESS_DENIED, RELEASE_PROMPT,
    };

    fn shout_out(is_public: bool, is_anonymous: bool) -> ShoutOut {
        let draft = ShoutOutDraft {
            from_user: UserId("U1".to_owned()),
            to_user: UserId("U2".to_owned()),
            message: "Jo shipped the release".to_owned(),
            is_public,
            is_anonymous,
        };
        ShoutOut::from_draft(ShoutOutId(42), draft, Utc::now())
    }

    fn button_values(blocks: &[Block]) -> Vec<(String, Option<String>)> {
        blocks
            .iter()
            .filter_map(|block| match block {
                Block::Actions { elements, .. } => Some(elements),
                _ => None,
            })
            .flatten()
            .map(|button| {
                let label = match &button.text {
                    super::TextObject::Plain { text } | super::TextObject::Mrkdwn { text } => {
                        text.clone()
                    }
                };
                (label, button.value.clone())
            })
            .collect()
    }

    #[test]
    fn builder_preserves_block_order() {
        let message = MessageBuilder::new("fallback")
            .header("h", "Header")
            .section("s", |section| {
                section.mrkdwn("*bold*");
            })
            .actions("a", |actions| {
                actions.button(ButtonElement::new("go", "Go").style(ButtonStyle::Primary));
            })
            .build();

        let ids = message.blocks.iter().map(Block::block_id).collect::<Vec<_>>();
        assert_eq!(ids, vec!["h", "s", "a"]);
        assert_eq!(message.fallback_text, "fallback");
    }

    #[test]
    fn settings_card_offers_the_opposite_of_the_current_state() {
        let public_named = settings_card(&shout_out(true, false), "Thanks, got it!");
        assert!(public_named.block("kudo-42").is_some());
        assert_eq!(
            button_values(&public_named.blocks),
            vec![
                ("Make Private".to_owned(), Some("private".to_owned())),
                ("Make Anonymous".to_owned(), Some("anonymous".to_owned())),
            ]
        );

        let private_anonymous = settings_card(&shout_out(false, true), "done");
        assert_eq!(
            button_values(&private_anonymous.blocks),
            vec![
                ("Make Public".to_owned(), Some("public".to_owned())),
                ("Remove Anonymity".to_owned(), Some("named".to_owned())),
            ]
        );
    }

    #[test]
    fn password_prompt_carries_the_attempt_in_its_block_id() {
        let prompt = password_prompt(1, 3, RELEASE_PROMPT);

        assert!(prompt.block("shouttrout-1").is_some());
        assert!(matches!(
            prompt.block("shouttrout-1"),
            Some(Block::Input { dispatch_action: true, .. })
        ));
    }

    #[test]
    fn password_prompt_withdraws_input_at_the_attempt_limit() {
        let prompt = password_prompt(3, 3, "Good try, but WRONG!");

        assert_eq!(prompt.blocks.len(), 1);
        assert_eq!(prompt.fallback_text, ACCESS_DENIED);
        assert!(!prompt.blocks.iter().any(|block| matches!(block, Block::Input { .. })));
    }

    #[test]
    fn payload_uses_block_kit_type_names() {
        let payload = settings_card(&shout_out(true, false), "ok").to_payload();

        assert_eq!(payload["blocks"][0]["type"], json!("section"));
        assert_eq!(payload["blocks"][0]["text"]["type"], json!("plain_text"));
        assert_eq!(payload["blocks"][2]["type"], json!("actions"));
        assert_eq!(payload["blocks"][2]["elements"][0]["type"], json!("button"));

        let granted = access_granted().to_payload();
        assert_eq!(granted["text"], json!("Access Granted!"));
        assert_eq!(granted["blocks"][0]["type"], json!("header"));
    }

    #[test]
    fn input_block_serializes_its_element() {
        let payload = password_prompt(2, 3, "Good try, but WRONG!").to_payload();
        let input = &payload["blocks"][1];

        assert_eq!(input["type"], json!("input"));
        assert_eq!(input["dispatch_action"], json!(true));
        assert_eq!(input["element"]["type"], json!("plain_text_input"));
        assert_eq!(input["label"]["text"], json!("Good try, but WRONG!"));
    }
}
