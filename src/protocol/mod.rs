//! Messaging-channel wire types.

pub mod messages;
