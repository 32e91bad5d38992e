//! Feature engineering for risk inference
//!
//! Turns loosely-typed gradebook/LMS rows into the fixed-width numeric
//! vectors a model expects, using a catalog of aliases, derivations and
//! defaults.

mod catalog;
mod engineer;

pub use catalog::{
    key_matches, FactorDomain, FeatureCatalog, FeatureKind, FeatureSource, FeatureSpec, Polarity,
    Reading,
};
pub use engineer::{DefaultReason, DefaultedFeature, FeatureEngineer, TransformReport};
