pub use self::api::{DiscordApi, DiscordApiError};
pub use self::client::DiscordClient;
pub use self::embed::DiscordEmbed;
pub use self::gateway::GatewayHandler;

pub mod api;
pub mod client;
pub mod embed;
pub mod events;
pub mod gateway;
