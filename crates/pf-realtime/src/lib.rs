//! Session-scoped realtime event fan-out.
//!
//! The broadcaster is a plain registry of live connections keyed by session;
//! it holds no game state. Lifecycle components publish [`PartyEvent`]s and
//! the server layer bridges them onto WebSocket sessions.
mod broadcaster;
mod event;

pub use broadcaster::*;
pub use event::*;
