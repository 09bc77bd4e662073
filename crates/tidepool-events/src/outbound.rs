use serde::{Deserialize, Serialize};

/// Visual style of a button
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ButtonStyle {
    #[default]
    Primary,
    Secondary,
    Success,
    Danger,
}

impl ButtonStyle {
    /// Parse the style names scripts use, case-insensitively
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "primary" => Some(ButtonStyle::Primary),
            "secondary" => Some(ButtonStyle::Secondary),
            "success" => Some(ButtonStyle::Success),
            "danger" => Some(ButtonStyle::Danger),
            _ => None,
        }
    }
}

/// One choice in a select menu
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectOption {
    pub label: String,
    pub value: String,
}

/// An interactive element attached to a message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Component {
    Button {
        label: String,
        custom_id: String,
        #[serde(default)]
        style: ButtonStyle,
    },
    Select {
        placeholder: String,
        custom_id: String,
        options: Vec<SelectOption>,
        #[serde(default)]
        disabled: bool,
    },
}

impl Component {
    pub fn custom_id(&self) -> &str {
        match self {
            Component::Button { custom_id, .. } | Component::Select { custom_id, .. } => custom_id,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbedFooter {
    pub text: String,
    #[serde(default)]
    pub icon_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbedAuthor {
    pub name: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub icon_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub inline: bool,
}

/// Rich embed. Every field is optional; an embed with nothing set is skipped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Embed {
    pub title: Option<String>,
    pub description: Option<String>,
    pub url: Option<String>,
    pub color: Option<u32>,
    pub image: Option<String>,
    pub thumbnail: Option<String>,
    pub footer: Option<EmbedFooter>,
    pub author: Option<EmbedAuthor>,
    pub fields: Vec<EmbedField>,
}

impl Embed {
    pub fn is_empty(&self) -> bool {
        *self == Embed::default()
    }
}

/// A channel message a script wants to send or edit
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingMessage {
    pub content: String,
    #[serde(default)]
    pub components: Vec<Component>,
    #[serde(default)]
    pub embed: Option<Embed>,
}

impl OutgoingMessage {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }
}

/// A direct response to an interaction
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractionReply {
    pub content: String,
    #[serde(default)]
    pub ephemeral: bool,
    #[serde(default)]
    pub components: Vec<Component>,
    #[serde(default)]
    pub embeds: Vec<Embed>,
}

impl InteractionReply {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }

    pub fn ephemeral(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ephemeral: true,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_button_style_parse() {
        assert_eq!(ButtonStyle::parse("Danger"), Some(ButtonStyle::Danger));
        assert_eq!(ButtonStyle::parse("link"), None);
    }

    #[test]
    fn test_component_tagging() {
        let button = Component::Button {
            label: "Yes".into(),
            custom_id: "confirm".into(),
            style: ButtonStyle::Success,
        };
        let json = serde_json::to_value(&button).unwrap();
        assert_eq!(json["type"], "button");
        assert_eq!(json["style"], "success");
        assert_eq!(button.custom_id(), "confirm");
    }

    #[test]
    fn test_empty_embed() {
        assert!(Embed::default().is_empty());
        let embed = Embed {
            title: Some("hi".into()),
            ..Default::default()
        };
        assert!(!embed.is_empty());
    }
}
