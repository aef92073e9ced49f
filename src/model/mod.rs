//! Domain types shared by the store, world-state, workspace, and repository
//! layers.

pub mod budget;
pub mod intent;
pub mod lane;
pub mod object;
pub mod transition;
pub mod tree;
pub mod workspace;

pub use budget::{check_budget, BudgetCheck, BudgetConfig, CostRecord};
pub use intent::{Agent, Intent};
pub use lane::Lane;
pub use object::{Location, ObjectKind, StoredObject};
pub use transition::{EvaluationResult, Transition, TransitionStatus};
pub use tree::{EntryKind, TreeEntry};
pub use workspace::{WorkspaceInfo, WorkspaceMode, WorkspaceStatus};
