//! Slack interface for intelbot
//!
//! - **Search** (`search`) - `/intel` fan-out across integrations with a live progress bar
//! - **Actions** (`actions`) - Show Details / Show Error Details modals
//! - **Home** (`home`) - App Home tab listing running integrations
//! - **Events** (`events`, `wire`, `runner`) - HTTP payloads to envelopes to handlers
//! - **Block Kit** (`blocks`, `render`, `chunking`) - Message builders within Slack limits
//!
//! # Architecture
//!
//! ```text
//! HTTP ingress → wire → EnvelopeSender → EventRunner → EventDispatcher → Handlers
//!                                                                 ↓
//!                                       MessageTransport ← Block Kit rendering
//! ```

pub mod action_value;
pub mod actions;
pub mod blocks;
pub mod chunking;
pub mod events;
pub mod home;
pub mod messenger;
pub mod progress;
pub mod render;
pub mod runner;
pub mod search;
pub mod wire;

#[cfg(test)]
mod testing;
