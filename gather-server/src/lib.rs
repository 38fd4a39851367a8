//! Gather chat server library
//!
//! Chat rooms, message history and the real-time gateway. Exposed as a
//! library so the binary and the integration tests share one wiring.

pub mod app;
pub mod config;
mod connection;
pub mod db;
pub mod error;
pub mod identity;
pub mod ids;
mod messages;
pub mod models;
pub mod notifications;
pub mod posts;
pub mod routes;
pub mod services;
mod state;
pub mod store;
pub mod users;

pub use app::AppContext;
pub use config::ServerConfig;
pub use connection::{handle_connection, Gateway};
pub use error::{ChatError, ChatResult};
pub use messages::WsEvent;
pub use routes::ChatRoutes;
pub use state::{chat_room, user_room, ConnectionId, RoomRegistry};
