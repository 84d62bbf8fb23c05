//! rootsync - Role-Tagged Directory Reconciliation
//!
//! Keeps the role tags of a workspace's directories (source root, resource
//! root, ...) in agreement with a plain-text listing file, and keeps them
//! consistent while directories are created, renamed and deleted.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌──────────────┐     ┌─────────────┐
//! │  Listing    │     │ Reconciler  │     │ Role Gateway │     │ State Store │
//! │ (declared)  │────▶│ (plan/diff) │────▶│ (add/remove) │     │  (managed)  │
//! └─────────────┘     └─────────────┘     └──────────────┘     └─────────────┘
//!                            ▲  │                                     ▲
//!        ┌─────────────┐     │  └──────────── persist declared ───────┘
//!        │   Router    │─────┘
//!        │ (fs events) │
//!        └─────────────┘
//! ```
//!
//! # Core Concepts
//!
//! - **Declared set**: descriptors read from the listing right now
//! - **Managed set**: descriptors this tool applied last time, persisted
//! - **Reconciliation**: tag everything declared, untag what is managed but
//!   no longer declared, then persist the declared set as managed

pub mod config;
pub mod engine;
pub mod error;
pub mod gateway;
pub mod listing;
pub mod paths;
pub mod router;
pub mod session;
pub mod state;
pub mod types;
pub mod watcher;
pub mod workspace;

// Re-exports for convenience
pub use config::RootsyncConfig;
pub use engine::{plan, ReconcilePlan, ReconcileReport, Reconciler, RenameOutcome, SharedReconciler};
pub use error::{Result, RootsyncError};
pub use gateway::{ContentRoot, ContentRootModel, RoleGateway};
pub use listing::{load_listing, parse_listing};
pub use paths::NormalizedPath;
pub use router::{ChangeEvent, ChangeRouter, RouterStats};
pub use session::Session;
pub use state::{JsonStateStore, MemoryStateStore, StateStore};
pub use types::{DeclaredSet, DescriptorSet, ManagedSet, RoleDescriptor, RoleKind};
pub use workspace::{FileHandle, FileSystem, LocalWorkspace};
