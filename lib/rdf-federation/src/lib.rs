#![doc = include_str!("../README.md")]
#![doc(test(attr(deny(warnings))))]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

pub mod planner;

pub use rdf_federation_common::{AgglutinationStrategy, OptimizationLevel, PlannerOptions};

pub mod model {
    pub use rdf_federation_model::*;
}

pub mod logical {
    pub use rdf_federation_logical::*;
}

pub mod engine {
    pub use rdf_federation_engine::*;
}
