//! Mapping between serenity's gateway types and tidepool's own events and
//! payloads.

use serenity::all::{
    ActionRowComponent, ButtonStyle as DiscordButtonStyle, CommandDataOption,
    CommandDataOptionValue, CommandInteraction, CommandOptionType,
    ComponentInteraction as DiscordComponent, ComponentInteractionDataKind, CreateActionRow,
    CreateButton, CreateCommand, CreateCommandOption, CreateEmbed, CreateEmbedAuthor,
    CreateEmbedFooter, CreateInteractionResponse, CreateInteractionResponseMessage, CreateMessage,
    CreateSelectMenu, CreateSelectMenuKind, CreateSelectMenuOption, EditMessage, Interaction,
    ModalInteraction, User,
};
use tidepool_events::{
    ButtonStyle, CommandInvocation, CommandOption, Component, ComponentInteraction, Embed,
    InboundEvent, InteractionRef, InteractionReply, ModalSubmit, OptionValue, OutgoingMessage,
    UserInfo,
};
use tidepool_scripting_host::{CommandDescriptor, OptionDescriptor};

/// Discord allows at most this many buttons in one action row
const BUTTONS_PER_ROW: usize = 5;

// ============================================================================
// Inbound
// ============================================================================

/// `None` for interaction kinds scripts cannot handle (autocomplete, pings)
pub fn inbound_event(interaction: &Interaction) -> Option<InboundEvent> {
    match interaction {
        Interaction::Command(command) => Some(InboundEvent::Command(command_event(command))),
        Interaction::Component(component) => {
            Some(InboundEvent::Component(component_event(component)))
        }
        Interaction::Modal(modal) => Some(InboundEvent::Modal(modal_event(modal))),
        _ => None,
    }
}

pub fn user_info(user: &User) -> UserInfo {
    UserInfo {
        id: user.id.to_string(),
        username: user.name.clone(),
        global_name: user.global_name.clone(),
        discriminator: user.discriminator.map(|d| format!("{:04}", d)),
        avatar: user.avatar.map(|hash| hash.to_string()),
    }
}

fn command_event(command: &CommandInteraction) -> CommandInvocation {
    let interaction = InteractionRef::new(command.id.to_string(), command.token.clone())
        .with_channel(command.channel_id.to_string())
        .with_user(user_info(&command.user));

    let mut invocation = CommandInvocation::new(interaction, command.data.name.clone());
    invocation.options = command_options(&command.data.options);
    invocation
}

fn command_options(options: &[CommandDataOption]) -> Vec<CommandOption> {
    options
        .iter()
        .filter_map(|option| {
            option_value(&option.value).map(|value| CommandOption::new(option.name.clone(), value))
        })
        .collect()
}

/// Snowflake kinds become their id string. Autocomplete and unknown values
/// are dropped.
pub fn option_value(value: &CommandDataOptionValue) -> Option<OptionValue> {
    let value = match value {
        CommandDataOptionValue::String(s) => OptionValue::String(s.clone()),
        CommandDataOptionValue::Integer(n) => OptionValue::Integer(*n),
        CommandDataOptionValue::Boolean(b) => OptionValue::Boolean(*b),
        CommandDataOptionValue::Number(n) => OptionValue::Number(*n),
        CommandDataOptionValue::SubCommand(children) => {
            OptionValue::SubCommand(command_options(children))
        }
        CommandDataOptionValue::SubCommandGroup(children) => {
            OptionValue::SubCommandGroup(command_options(children))
        }
        CommandDataOptionValue::User(id) => OptionValue::User(id.to_string()),
        CommandDataOptionValue::Channel(id) => OptionValue::Channel(id.to_string()),
        CommandDataOptionValue::Role(id) => OptionValue::Role(id.to_string()),
        CommandDataOptionValue::Mentionable(id) => OptionValue::Mentionable(id.to_string()),
        CommandDataOptionValue::Attachment(id) => OptionValue::Attachment(id.to_string()),
        _ => return None,
    };
    Some(value)
}

fn component_event(component: &DiscordComponent) -> ComponentInteraction {
    let values = match &component.data.kind {
        ComponentInteractionDataKind::StringSelect { values } => values.clone(),
        ComponentInteractionDataKind::UserSelect { values } => ids(values),
        ComponentInteractionDataKind::RoleSelect { values } => ids(values),
        ComponentInteractionDataKind::MentionableSelect { values } => ids(values),
        ComponentInteractionDataKind::ChannelSelect { values } => ids(values),
        _ => Vec::new(),
    };

    ComponentInteraction {
        interaction: InteractionRef::new(component.id.to_string(), component.token.clone())
            .with_channel(component.channel_id.to_string())
            .with_user(user_info(&component.user)),
        custom_id: component.data.custom_id.clone(),
        values,
    }
}

fn ids<T: ToString>(values: &[T]) -> Vec<String> {
    values.iter().map(ToString::to_string).collect()
}

fn modal_event(modal: &ModalInteraction) -> ModalSubmit {
    let fields = modal
        .data
        .components
        .iter()
        .flat_map(|row| row.components.iter())
        .filter_map(|component| match component {
            ActionRowComponent::InputText(input) => Some((
                input.custom_id.clone(),
                input.value.clone().unwrap_or_default(),
            )),
            _ => None,
        })
        .collect();

    ModalSubmit {
        interaction: InteractionRef::new(modal.id.to_string(), modal.token.clone())
            .with_channel(modal.channel_id.to_string())
            .with_user(user_info(&modal.user)),
        custom_id: modal.data.custom_id.clone(),
        fields,
    }
}

// ============================================================================
// Outbound
// ============================================================================

/// Discord rejects empty descriptions, so the name stands in for a missing one
fn description_or_name<'a>(description: &'a str, name: &'a str) -> &'a str {
    if description.is_empty() {
        name
    } else {
        description
    }
}

pub fn create_command(descriptor: &CommandDescriptor) -> CreateCommand {
    descriptor.options.iter().fold(
        CreateCommand::new(&descriptor.name)
            .description(description_or_name(&descriptor.description, &descriptor.name)),
        |command, option| command.add_option(create_option(option)),
    )
}

fn create_option(option: &OptionDescriptor) -> CreateCommandOption {
    let built = CreateCommandOption::new(
        CommandOptionType::from(option.kind.code()),
        &option.name,
        description_or_name(&option.description, &option.name),
    )
    .required(option.required);

    option
        .children
        .iter()
        .fold(built, |built, child| built.add_sub_option(create_option(child)))
}

fn button_style(style: ButtonStyle) -> DiscordButtonStyle {
    match style {
        ButtonStyle::Primary => DiscordButtonStyle::Primary,
        ButtonStyle::Secondary => DiscordButtonStyle::Secondary,
        ButtonStyle::Success => DiscordButtonStyle::Success,
        ButtonStyle::Danger => DiscordButtonStyle::Danger,
    }
}

/// Consecutive buttons share rows of up to five; each select menu gets a
/// row of its own. Order is preserved.
pub fn action_rows(components: &[Component]) -> Vec<CreateActionRow> {
    let mut rows = Vec::new();
    let mut buttons = Vec::new();

    for component in components {
        match component {
            Component::Button {
                label,
                custom_id,
                style,
            } => {
                if buttons.len() == BUTTONS_PER_ROW {
                    rows.push(CreateActionRow::Buttons(std::mem::take(&mut buttons)));
                }
                buttons.push(
                    CreateButton::new(custom_id)
                        .label(label)
                        .style(button_style(*style)),
                );
            }
            Component::Select {
                placeholder,
                custom_id,
                options,
                disabled,
            } => {
                if !buttons.is_empty() {
                    rows.push(CreateActionRow::Buttons(std::mem::take(&mut buttons)));
                }
                let options = options
                    .iter()
                    .map(|o| CreateSelectMenuOption::new(&o.label, &o.value))
                    .collect();
                rows.push(CreateActionRow::SelectMenu(
                    CreateSelectMenu::new(custom_id, CreateSelectMenuKind::String { options })
                        .placeholder(placeholder)
                        .disabled(*disabled),
                ));
            }
        }
    }

    if !buttons.is_empty() {
        rows.push(CreateActionRow::Buttons(buttons));
    }
    rows
}

pub fn create_embed(embed: &Embed) -> CreateEmbed {
    let mut built = CreateEmbed::new();
    if let Some(title) = &embed.title {
        built = built.title(title);
    }
    if let Some(description) = &embed.description {
        built = built.description(description);
    }
    if let Some(url) = &embed.url {
        built = built.url(url);
    }
    if let Some(color) = embed.color {
        built = built.colour(color);
    }
    if let Some(image) = &embed.image {
        built = built.image(image);
    }
    if let Some(thumbnail) = &embed.thumbnail {
        built = built.thumbnail(thumbnail);
    }
    if let Some(footer) = &embed.footer {
        let mut create = CreateEmbedFooter::new(&footer.text);
        if let Some(icon) = &footer.icon_url {
            create = create.icon_url(icon);
        }
        built = built.footer(create);
    }
    if let Some(author) = &embed.author {
        let mut create = CreateEmbedAuthor::new(&author.name);
        if let Some(url) = &author.url {
            create = create.url(url);
        }
        if let Some(icon) = &author.icon_url {
            create = create.icon_url(icon);
        }
        built = built.author(create);
    }
    for field in &embed.fields {
        built = built.field(&field.name, &field.value, field.inline);
    }
    built
}

pub fn create_message(message: &OutgoingMessage) -> CreateMessage {
    let mut built = CreateMessage::new().content(&message.content);
    if !message.components.is_empty() {
        built = built.components(action_rows(&message.components));
    }
    if let Some(embed) = &message.embed {
        built = built.embed(create_embed(embed));
    }
    built
}

/// An edit replaces content, components and embed wholesale
pub fn edit_message(message: &OutgoingMessage) -> EditMessage {
    let embeds = message.embed.iter().map(create_embed).collect();
    EditMessage::new()
        .content(&message.content)
        .components(action_rows(&message.components))
        .embeds(embeds)
}

pub fn interaction_response(reply: &InteractionReply) -> CreateInteractionResponse {
    let mut data = CreateInteractionResponseMessage::new()
        .content(&reply.content)
        .ephemeral(reply.ephemeral);
    if !reply.components.is_empty() {
        data = data.components(action_rows(&reply.components));
    }
    if !reply.embeds.is_empty() {
        data = data.embeds(reply.embeds.iter().map(create_embed).collect());
    }
    CreateInteractionResponse::Message(data)
}

/// Short ephemeral notice for interactions nothing handled
pub fn fallback_response(content: &str) -> CreateInteractionResponse {
    CreateInteractionResponse::Message(
        CreateInteractionResponseMessage::new()
            .content(content)
            .ephemeral(true),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use serenity::all::{ChannelId, RoleId, UserId};
    use tidepool_events::{EmbedField, SelectOption};
    use tidepool_scripting_host::OptionKind;

    fn json(value: impl serde::Serialize) -> Value {
        serde_json::to_value(value).unwrap()
    }

    fn button(id: &str) -> Component {
        Component::Button {
            label: id.to_uppercase(),
            custom_id: id.to_string(),
            style: ButtonStyle::Danger,
        }
    }

    #[test]
    fn test_option_values() {
        assert_eq!(
            option_value(&CommandDataOptionValue::String("blue".into())),
            Some(OptionValue::String("blue".into()))
        );
        assert_eq!(
            option_value(&CommandDataOptionValue::Integer(6)),
            Some(OptionValue::Integer(6))
        );
        assert_eq!(
            option_value(&CommandDataOptionValue::User(UserId::new(42))),
            Some(OptionValue::User("42".into()))
        );
        assert_eq!(
            option_value(&CommandDataOptionValue::Channel(ChannelId::new(7))),
            Some(OptionValue::Channel("7".into()))
        );
        assert_eq!(
            option_value(&CommandDataOptionValue::Role(RoleId::new(9))),
            Some(OptionValue::Role("9".into()))
        );
        assert_eq!(
            option_value(&CommandDataOptionValue::SubCommand(Vec::new())),
            Some(OptionValue::SubCommand(Vec::new()))
        );
    }

    #[test]
    fn test_buttons_share_rows() {
        let mut components: Vec<Component> =
            (0..6).map(|i| button(&format!("b{}", i))).collect();
        components.push(Component::Select {
            placeholder: "Pick".into(),
            custom_id: "menu".into(),
            options: vec![SelectOption {
                label: "One".into(),
                value: "1".into(),
            }],
            disabled: false,
        });
        components.push(button("last"));

        let rows = json(action_rows(&components));
        let rows = rows.as_array().unwrap();
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[0]["components"].as_array().unwrap().len(), 5);
        assert_eq!(rows[1]["components"].as_array().unwrap().len(), 1);
        assert_eq!(rows[2]["components"][0]["custom_id"], "menu");
        assert_eq!(rows[3]["components"][0]["custom_id"], "last");
        assert_eq!(rows[0]["components"][0]["style"], 4);
    }

    #[test]
    fn test_message_payload() {
        let message = OutgoingMessage {
            content: "hello".into(),
            components: vec![button("ack")],
            embed: Some(Embed {
                title: Some("News".into()),
                color: Some(255),
                fields: vec![EmbedField {
                    name: "When".into(),
                    value: "Now".into(),
                    inline: true,
                }],
                ..Default::default()
            }),
        };

        let payload = json(create_message(&message));
        assert_eq!(payload["content"], "hello");
        assert_eq!(payload["embeds"][0]["title"], "News");
        assert_eq!(payload["embeds"][0]["color"], 255);
        assert_eq!(payload["embeds"][0]["fields"][0]["inline"], true);
        assert_eq!(payload["components"][0]["components"][0]["custom_id"], "ack");
    }

    #[test]
    fn test_command_payload() {
        let descriptor = CommandDescriptor::new("settings", "")
            .with_option(
                OptionDescriptor::new("theme", "Pick a theme", OptionKind::SubCommand).with_child(
                    OptionDescriptor::new("color", "Color", OptionKind::String).required(true),
                ),
            );

        let payload = json(create_command(&descriptor));
        assert_eq!(payload["name"], "settings");
        assert_eq!(payload["description"], "settings");
        assert_eq!(payload["options"][0]["type"], 1);
        assert_eq!(payload["options"][0]["options"][0]["name"], "color");
        assert_eq!(payload["options"][0]["options"][0]["type"], 3);
        assert_eq!(payload["options"][0]["options"][0]["required"], true);
    }

    #[test]
    fn test_ephemeral_reply() {
        let payload = json(interaction_response(&InteractionReply::ephemeral("hi")));
        assert_eq!(payload["type"], 4);
        assert_eq!(payload["data"]["content"], "hi");
        assert_eq!(payload["data"]["flags"], 64);
    }
}
