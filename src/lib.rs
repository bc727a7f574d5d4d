pub mod config;
pub mod gateway;
pub mod models;
pub mod store;
pub mod sync;

pub use config::Settings;
pub use gateway::{build_gateway, ChatGateway, GatewayError};
pub use models::{Conversation, Message, Role};
pub use store::{ConversationStore, StoreState};
pub use sync::{SyncController, SyncError};
