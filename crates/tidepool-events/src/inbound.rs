use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// Interaction identity
// ============================================================================

/// The user who triggered an interaction
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub global_name: Option<String>,
    #[serde(default)]
    pub discriminator: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
}

impl UserInfo {
    pub fn new(id: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            username: username.into(),
            ..Default::default()
        }
    }

    /// Mention markup for this user, e.g. `<@1234>`
    pub fn mention(&self) -> String {
        format!("<@{}>", self.id)
    }
}

/// Everything needed to answer a specific interaction
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractionRef {
    pub id: String,
    pub token: String,
    pub channel_id: String,
    pub user: UserInfo,
}

impl InteractionRef {
    pub fn new(id: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            token: token.into(),
            ..Default::default()
        }
    }

    pub fn with_channel(mut self, channel_id: impl Into<String>) -> Self {
        self.channel_id = channel_id.into();
        self
    }

    pub fn with_user(mut self, user: UserInfo) -> Self {
        self.user = user;
        self
    }
}

// ============================================================================
// Slash commands
// ============================================================================

/// A value supplied for a command option
///
/// Subcommand variants carry their own nested options. Snowflake-valued kinds
/// (user, channel, role, mentionable, attachment) carry the id as a string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum OptionValue {
    String(String),
    Integer(i64),
    Boolean(bool),
    Number(f64),
    SubCommand(Vec<CommandOption>),
    SubCommandGroup(Vec<CommandOption>),
    User(String),
    Channel(String),
    Role(String),
    Mentionable(String),
    Attachment(String),
}

impl OptionValue {
    /// Discord's numeric option type for this value
    pub fn kind_code(&self) -> u8 {
        match self {
            OptionValue::SubCommand(_) => 1,
            OptionValue::SubCommandGroup(_) => 2,
            OptionValue::String(_) => 3,
            OptionValue::Integer(_) => 4,
            OptionValue::Boolean(_) => 5,
            OptionValue::User(_) => 6,
            OptionValue::Channel(_) => 7,
            OptionValue::Role(_) => 8,
            OptionValue::Mentionable(_) => 9,
            OptionValue::Number(_) => 10,
            OptionValue::Attachment(_) => 11,
        }
    }

    /// Nested options for subcommand and group values
    pub fn children(&self) -> Option<&[CommandOption]> {
        match self {
            OptionValue::SubCommand(children) | OptionValue::SubCommandGroup(children) => {
                Some(children)
            }
            _ => None,
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.children().is_none()
    }
}

/// A named option inside a command invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandOption {
    pub name: String,
    pub value: OptionValue,
}

impl CommandOption {
    pub fn new(name: impl Into<String>, value: OptionValue) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

/// A slash command invocation delivered by the gateway
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandInvocation {
    pub interaction: InteractionRef,
    pub name: String,
    #[serde(default)]
    pub options: Vec<CommandOption>,
}

impl CommandInvocation {
    pub fn new(interaction: InteractionRef, name: impl Into<String>) -> Self {
        Self {
            interaction,
            name: name.into(),
            options: Vec::new(),
        }
    }

    pub fn with_option(mut self, option: CommandOption) -> Self {
        self.options.push(option);
        self
    }
}

// ============================================================================
// Message components and modals
// ============================================================================

/// A button press or select menu choice
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentInteraction {
    pub interaction: InteractionRef,
    pub custom_id: String,
    /// Selected values for select menus, empty for buttons
    #[serde(default)]
    pub values: Vec<String>,
}

/// A submitted modal form
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModalSubmit {
    pub interaction: InteractionRef,
    pub custom_id: String,
    /// Input custom id -> submitted text
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
}

/// Any inbound interaction the scripting host can route
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundEvent {
    Command(CommandInvocation),
    Component(ComponentInteraction),
    Modal(ModalSubmit),
}

impl InboundEvent {
    pub fn interaction(&self) -> &InteractionRef {
        match self {
            InboundEvent::Command(cmd) => &cmd.interaction,
            InboundEvent::Component(component) => &component.interaction,
            InboundEvent::Modal(modal) => &modal.interaction,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_codes_match_discord() {
        assert_eq!(OptionValue::SubCommand(vec![]).kind_code(), 1);
        assert_eq!(OptionValue::String("a".into()).kind_code(), 3);
        assert_eq!(OptionValue::Number(1.5).kind_code(), 10);
        assert_eq!(OptionValue::Attachment("9".into()).kind_code(), 11);
    }

    #[test]
    fn test_children_only_for_subcommands() {
        let sub = OptionValue::SubCommand(vec![CommandOption::new(
            "color",
            OptionValue::String("blue".into()),
        )]);
        assert_eq!(sub.children().map(|c| c.len()), Some(1));
        assert!(OptionValue::Boolean(true).is_leaf());
    }

    #[test]
    fn test_command_invocation_json_shape() {
        let inv = CommandInvocation::new(InteractionRef::new("1", "tok"), "settings").with_option(
            CommandOption::new(
                "theme",
                OptionValue::SubCommand(vec![CommandOption::new(
                    "dark",
                    OptionValue::Boolean(true),
                )]),
            ),
        );

        let json = serde_json::to_value(&inv).unwrap();
        assert_eq!(json["options"][0]["value"]["kind"], "sub_command");
        assert_eq!(json["options"][0]["value"]["value"][0]["name"], "dark");

        let back: CommandInvocation = serde_json::from_value(json).unwrap();
        assert_eq!(back, inv);
    }

    #[test]
    fn test_mention_format() {
        assert_eq!(UserInfo::new("42", "sam").mention(), "<@42>");
    }
}
