//! Request path classification.

mod classifier;

pub use classifier::{RouteClassification, RouteClassifier, RouteConfig, Sensitivity};
