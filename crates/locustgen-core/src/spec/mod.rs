//! The canonical load-test specification and the builder that produces it.

pub mod builder;
pub mod model;
pub mod validation;

pub use builder::SpecificationBuilder;
pub use model::{
    CapturedRequest, EndpointDescriptor, HttpMethod, LoadTestSpecification, ReplayTarget,
    RunDuration, ThinkTimeRange,
};
pub use validation::validate_specification;
