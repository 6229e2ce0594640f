//! # reelsync-sync
//!
//! Resilient bulk sync of production entities onto an [`EntityStore`].
//!
//! [`SyncClient`] is the entry point. Flat bulk calls go through the
//! [`BulkCoordinator`], which splits input into chunks and runs each chunk
//! under the [`RetryExecutor`] with an undo log, so a chunk that fails for
//! good leaves no trace. [`SyncClient::apply_hierarchy_template`] expands a
//! [`HierarchyTemplate`](reelsync_template::HierarchyTemplate) into entities
//! one node at a time.
//!
//! ```rust
//! use reelsync_sync::SyncClient;
//!
//! let mut client = SyncClient::new();
//! let demo = client.get_or_create_project("Demo").unwrap();
//! assert_eq!(demo.id, 1);
//! assert_eq!(client.get_or_create_project("Demo").unwrap(), demo);
//! ```
//!
//! [`EntityStore`]: reelsync_core::EntityStore

pub mod bulk;
pub mod client;
pub mod config;
pub mod error;
pub mod hierarchy;
pub mod playlists;
pub mod retry;
pub mod versions;

pub use bulk::{BulkCoordinator, UndoAction, UndoLog};
pub use client::SyncClient;
pub use config::{RetryPolicy, SyncConfig, DEFAULT_BATCH_SIZE};
pub use error::SyncError;
pub use hierarchy::{HierarchyEngine, HierarchyResult};
pub use retry::{RetryExecutor, Sleep, ThreadSleep};
pub use versions::{ApprovedVersion, APPROVED_STATUS};
