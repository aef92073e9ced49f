//! strata — a content-addressed, history-DAG version controller for agent
//! workspaces.
//!
//! A repository stores immutable world states in a content-addressed
//! object store, links them with transitions recording why a change was
//! proposed and whether it was accepted, and organizes them into named
//! lanes. Workspaces materialize a state onto disk for an agent to work
//! in; `promote` moves a workspace's work into another lane using
//! path-level conflict detection, never a three-way content merge.
//!
//! The primary interface is the `strata` CLI binary (in the `strata-cli`
//! crate); this crate is the library it's built on.

pub mod error;
pub mod evaluator;
pub mod ids;
pub mod model;
pub mod repository;
pub mod serializable;
pub mod store;
pub mod template;
pub mod workspace;
pub mod worldstate;

pub use error::{Result, StrataError};
pub use repository::Repository;
