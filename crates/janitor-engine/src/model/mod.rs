//! Domain model
//!
//! - [`resource`]: candidate resources and their scratch detail map
//! - [`marked`]: marked resources, summaries and notification info
//! - [`state`]: durable per-resource audit history
//! - [`work`]: work configurations and work items
//! - [`tracking`]: use tracking, task tracking and notification tasks

pub mod marked;
pub mod resource;
pub mod state;
pub mod tracking;
pub mod work;

pub use marked::{MarkedResource, NotificationInfo, Summary};
pub use resource::{Attachment, Details, Grouping, GroupingKind, Resource, ResourceSpec};
pub use state::{Lifecycle, OPT_OUT_CLEARED, ResourceState, Status};
pub use tracking::{LastSeenInfo, NotificationTask, TaskRecord, TaskStatus};
pub use work::{
    Account, NotificationSettings, RuleCombination, RuleDefinition, WorkConfiguration, WorkItem,
};
