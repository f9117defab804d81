//! Outbound dispatch and inbound request routing.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        Messaging                             │
//! │                                                              │
//! │  VirtualDevice ──┐                                           │
//! │  AlertHandle   ──┼─▶ DispatchQueue ─▶ lanes ─▶ worker ─┐     │
//! │  DataHandle    ──┘         ▲                           │     │
//! │                            │                           ▼     │
//! │                     RequestRouter              ┌───────────┐ │
//! │                       │      ▲                 │ Transport │ │
//! │                       ▼      └──── poll ───────│  (trait)  │ │
//! │               HandlerRegistry                  └───────────┘ │
//! └──────────────────────────────────────────────────────────────┘
//! ```

pub mod dispatcher;
pub mod lanes;
pub mod message;
pub mod registry;
pub mod router;
pub mod transport;
