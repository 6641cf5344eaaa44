/// Coastal hazard monitoring service.
///
/// Resolves weather observations for a requested location, builds a feature
/// record (with optional live enrichment and rolling history statistics),
/// runs it through a set of point models, and synthesizes hazard alerts
/// from the model outputs.

pub mod alert;
pub mod config;
pub mod features;
pub mod inference;
pub mod live;
pub mod logging;
pub mod model;
pub mod pipeline;
pub mod resolve;
pub mod sanitize;
pub mod store;
