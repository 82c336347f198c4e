//! # ripple-core
//!
//! Session tracking, room broadcast, and message delivery for the Ripple
//! chat engine.
//!
//! This crate provides the realtime building blocks:
//!
//! - **SessionRegistry** - Which user owns which live connection
//! - **RoomIndex** - Which connections subscribe to which chat room
//! - **PresenceTracker** - Online/offline transitions, announced globally
//! - **DeliveryPipeline** - Persist-then-broadcast message flow
//! - **Hub** - Connection lifecycle orchestration over all of the above
//! - **ChatStore** - The boundary to durable storage, with an in-memory
//!   reference implementation
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐     ┌───────────┐     ┌───────────────┐
//! │ Connection │────▶│    Hub    │────▶│   RoomIndex   │
//! └────────────┘     └───────────┘     └───────────────┘
//!                       │      │
//!            ┌──────────┘      └──────────┐
//!            ▼                            ▼
//!     ┌─────────────┐            ┌──────────────────┐
//!     │  Presence   │            │ DeliveryPipeline │──▶ ChatStore
//!     └─────────────┘            └──────────────────┘
//! ```

pub mod connection;
pub mod delivery;
pub mod hub;
pub mod memory;
pub mod presence;
pub mod room;
pub mod session;
pub mod store;

pub use connection::{ConnectionId, Connections, EventReceiver, EventSender};
pub use delivery::{DeliveryConfig, DeliveryError, DeliveryPipeline};
pub use hub::{Hub, HubConfig, HubStats};
pub use memory::MemoryStore;
pub use presence::PresenceTracker;
pub use room::{RoomError, RoomIndex};
pub use session::SessionRegistry;
pub use store::{ChatStore, NewMessage, StoreError};
