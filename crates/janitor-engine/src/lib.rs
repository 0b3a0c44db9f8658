//! janitor-engine - cloud resource janitor
//!
//! Finds cloud resources that violate configured rules, marks them, tells
//! their owners, and deletes them once their retention window has passed.
//! Any number of worker processes may run against one shared store; locks
//! keep them from processing the same namespace at once.

pub mod agent;
pub mod collaborators;
pub mod config;
pub mod discovery;
pub mod error;
pub mod evaluator;
pub mod events;
pub mod exclusions;
pub mod handler;
pub mod inventory;
pub mod janitor;
pub mod lock;
pub mod metrics;
pub mod model;
pub mod notifications;
pub mod rules;
pub mod schedule;
pub mod store;
pub mod wait;
pub mod work;
