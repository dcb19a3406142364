//! # echo-mock-core
//!
//! In-memory mock of a broadcasting client for exercising application code
//! that subscribes to channels, without a server or a network connection.
//!
//! This crate provides the building blocks:
//!
//! - **Channel** - Named event registry fed by a stand-in broadcaster
//! - **PrivateChannel** - Adds client whispers and a notification callback
//! - **PresenceChannel** - Adds a member roster with join/leave lifecycle
//! - **Registry** - Resolves channel names and lazily creates the right variant
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌──────────────────┐
//! │  Test code  │────▶│  Registry   │────▶│  ChannelHandle   │
//! └─────────────┘     └─────────────┘     └──────────────────┘
//!                                           │      │       │
//!                                           ▼      ▼       ▼
//!                                      Channel  Private  Presence
//!                                       events  +whisper +roster
//! ```
//!
//! Every operation runs the registered handler synchronously before
//! returning. Rejected calls are reported through a [`Diagnostics`]
//! collaborator and returned as a [`ChannelError`]; they never mutate state.
//!
//! ## Example
//!
//! ```rust
//! use echo_mock_core::{Broadcasting, Registry};
//! use serde_json::json;
//!
//! let echo = Registry::new();
//! let room = echo.join("room");
//! room.joining(|user| println!("joined: {user}"))
//!     .leaving(|user| println!("left: {user}"));
//!
//! let id = room.user_join(json!({"id": 5})).unwrap();
//! room.user_leave(id).unwrap();
//! assert!(room.is_empty());
//!
//! echo.channel("orders").listen("OrderShipped", |event| println!("{event}"));
//! echo.channel("orders").broadcast("OrderShipped", json!({"id": 1})).unwrap();
//! ```

pub mod channel;
pub mod config;
pub mod diagnostics;
pub mod event;
pub mod member;
pub mod metrics;
pub mod presence;
pub mod private;
pub mod registry;

pub use channel::{Broadcasting, Channel, ChannelError, ChannelId, ChannelKind};
pub use config::{ConfigError, IdStrategy, RegistryConfig, SubscriptionIdConfig};
pub use diagnostics::{CapturedDiagnostics, Diagnostics, TracingDiagnostics};
pub use event::{EventName, EventRegistry, Handler, HandlerSlot};
pub use member::{Member, SubscriptionId, SubscriptionIds, SUBSCRIPTION_ID_FIELD};
pub use presence::PresenceChannel;
pub use private::{PrivateChannel, Whispering};
pub use registry::{ChannelHandle, Registry, RegistryStats};
