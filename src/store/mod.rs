//! In-memory stores backing the HTTP surface.
//!
//! Each subsystem owns one store with its own lock; invariants hold per
//! store, and cross-store sequences are eventually consistent.

pub mod board;
pub mod clips;
pub mod commentary;
pub mod events;
pub mod live;
pub mod moderation;
