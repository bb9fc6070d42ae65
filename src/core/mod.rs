pub mod compare;
pub mod compile;
pub mod domain;
pub mod errors;
pub mod evaluator;
pub mod fixtures;
pub mod judging;
pub mod normalize;
pub mod pipeline;
pub mod ranking;
pub mod sandbox;
pub mod scoring;
pub mod traits;
