//! Chat gateway integration
//!
//! Seams the bridge needs on the chat side:
//! - **Events** (`events`) - inbound message model and handler dispatch
//! - **Gateway** (`gateway`) - transport pump with reconnection logic
//! - **Discord** (`discord`) - serenity-backed gateway transport
//! - **Outbound** (`outbound`) - "send text to channel", with a Discord REST sender
//! - **Delivery** (`delivery`) - fan a generated reply out as ordered messages
//!
//! # Architecture
//!
//! ```text
//! DiscordGatewayTransport → GatewayRunner → EventDispatcher → MessageCreateHandler → MessageService (command pipeline)
//!
//! ConsumerLoop → DeliveryDispatcher → ChatSender → channel
//! ```

pub mod delivery;
pub mod discord;
pub mod events;
pub mod gateway;
pub mod outbound;

pub use delivery::{DeliveryDispatcher, DeliveryReport};
pub use discord::DiscordGatewayTransport;
pub use outbound::{ChatSender, DiscordRestSender, SendError};
