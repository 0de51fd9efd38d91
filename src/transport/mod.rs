//! Boundary transport between the main and worker contexts.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐                        ┌──────────────────────┐
//! │  Main context        │      ClientPayload     │  Worker context      │
//! │                      │───────────────────────►│                      │
//! │  Observer            │                        │  Processor           │
//! │  → CollectorWorker   │◄───────────────────────│  → ProcessorWorker   │
//! │                      │      WorkerPayload     │                      │
//! └──────────────────────┘      (JSON text)       └──────────────────────┘
//! ```
//!
//! # Lifecycle
//!
//! 1. `boundary::channel` - Create a connected endpoint pair
//! 2. Main side spawns `collector_worker::spawn_listener`
//! 3. Worker side runs `processor_worker::listen`
//! 4. Dropping either sending half closes the other side's inbox
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `boundary` | Endpoint pair carrying encoded messages |
//! | `collector_worker` | Main-side sender and dispatcher |
//! | `processor_worker` | Worker-side sender and dispatcher |

// ============================================================================
// Submodules
// ============================================================================

/// Endpoint pair carrying encoded messages.
pub mod boundary;

/// Main-side sender and dispatcher.
pub mod collector_worker;

/// Worker-side sender and dispatcher.
pub mod processor_worker;

// ============================================================================
// Re-exports
// ============================================================================

pub use boundary::{BoundaryMessage, Endpoint, Inbox, MainEndpoint, Poster, WorkerEndpoint, channel};
pub use collector_worker::CollectorWorker;
pub use processor_worker::ProcessorWorker;
