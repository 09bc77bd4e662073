/// Event and payload types shared between the scripting host and the Discord runner
///
/// Inbound types describe what the gateway delivered to us. Outbound types describe
/// what scripts ask us to send back. Neither side depends on serenity so the
/// scripting host can be tested without a gateway connection.
pub mod inbound;
pub mod outbound;

pub use inbound::{
    CommandInvocation, CommandOption, ComponentInteraction, InboundEvent, InteractionRef,
    ModalSubmit, OptionValue, UserInfo,
};
pub use outbound::{
    ButtonStyle, Component, Embed, EmbedAuthor, EmbedField, EmbedFooter, InteractionReply,
    OutgoingMessage, SelectOption,
};
