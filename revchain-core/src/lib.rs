//! Core library for revchain.
//!
//! This crate resolves a collection of revisions into a linear chain, plans
//! moves between applied-state markers, and executes those plans against a
//! schema store, independent of any front end (CLI, HTTP).
//!
//! # Usage
//!
//! ```no_run
//! use revchain_core::{plan, resolve_chain, source, Executor, SqliteStore, Target};
//! use revchain_core::store::SchemaStore;
//!
//! let revisions = source::load_dir("revisions".as_ref())?;
//! let chain = resolve_chain(revisions)?;
//!
//! let mut store = SqliteStore::open("app.db")?;
//! let marker = store.marker()?;
//! let plan = plan(marker.as_ref(), &Target::Head, &chain)?;
//!
//! let report = Executor::new(&mut store).run_plan(&plan);
//! assert!(report.is_success());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod chain;
pub mod error;
pub mod executor;
pub mod lock;
pub mod models;
pub mod source;
pub mod store;

// Re-export commonly used types at crate root
pub use chain::{plan, resolve_chain, Chain};
pub use error::{ChainError, LockError, OperationError, SourceError, StoreError};
pub use executor::Executor;
pub use lock::RunLock;
pub use models::*;
pub use store::{MemoryStore, SchemaStore, SqliteStore};
