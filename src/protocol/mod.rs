//! Cross-boundary protocol.
//!
//! This module defines the message vocabulary exchanged between the main
//! context (which owns the connections) and the worker context (which owns
//! delivery toward the transport).
//!
//! # Protocol Overview
//!
//! | Conversation | Request | Response |
//! |--------------|---------|----------|
//! | Initial config | `requestInitialConfig` (worker) | `onRequestInitialConfig` (main) |
//! | Access token | `requestAccessToken` (worker) | `onRequestAccessToken` (main) |
//! | Raw stats | `requestRawStats` (worker) | `onRequestRawStats` (main) |
//! | Extension stats | none | `onExtensionStats` (main) |
//! | Local transport | none | `onLocalTransport` (worker) |
//!
//! Conversations carry no correlation id. A response is recognized by its
//! `what` tag alone and may arrive without a matching request.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `callback` | [`ClientCallback`] and [`WorkerCallback`] |
//! | `message` | [`ClientPayload`], [`WorkerPayload`], [`InitialConfig`] |
//! | `sample` | [`PeerConnectionSample`] |

// ============================================================================
// Submodules
// ============================================================================

/// Capability interfaces for each side.
pub mod callback;

/// Message enums and configuration types.
pub mod message;

/// Finished samples.
pub mod sample;

// ============================================================================
// Re-exports
// ============================================================================

pub use callback::{ClientCallback, WorkerCallback};
pub use message::{
    ClientPayload, ExtensionRecord, ExtensionStatsPayload, InitialConfig, TransportType,
    WorkerPayload,
};
pub use sample::PeerConnectionSample;
