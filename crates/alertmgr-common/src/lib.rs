//! Shared data model for the alert-management core.
//!
//! Defines the [`types::Alert`] lifecycle entity, the [`types::AlertEvent`]
//! transition notification broadcast by the lifecycle handler, and the
//! [`types::SuppressionRule`] label predicate evaluated by the suppression
//! engine. All timestamps are UTC; scalar durations are `*_secs` fields.

pub mod types;

#[cfg(test)]
mod tests;
