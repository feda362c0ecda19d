use crate::error::LocustgenError;
use crate::spec::model::{EndpointDescriptor, LoadTestSpecification};

/// Validate a [`LoadTestSpecification`] and return a list of validation errors.
///
/// An empty `Vec` means the specification is valid.
pub fn validate_specification(spec: &LoadTestSpecification) -> Vec<LocustgenError> {
    let mut errors = Vec::new();

    if spec.target_host.trim().is_empty() {
        errors.push(LocustgenError::Validation(
            "target host must not be empty".to_string(),
        ));
    }

    if spec.users == 0 {
        errors.push(LocustgenError::Validation(
            "users must be at least 1".to_string(),
        ));
    }

    if spec.spawn_rate == 0 {
        errors.push(LocustgenError::Validation(
            "spawnRate must be at least 1".to_string(),
        ));
    }

    let range = spec.think_time_range;
    if range.min > range.max {
        errors.push(LocustgenError::Validation(format!(
            "think time range is inverted: min {} > max {}",
            range.min, range.max
        )));
    }

    if spec.endpoints.is_empty() {
        errors.push(LocustgenError::Validation(
            "at least one endpoint is required".to_string(),
        ));
    }

    for (idx, endpoint) in spec.endpoints.iter().enumerate() {
        errors.extend(validate_endpoint(idx, endpoint));
    }

    errors
}

fn validate_endpoint(idx: usize, endpoint: &EndpointDescriptor) -> Vec<LocustgenError> {
    let mut errors = Vec::new();

    if !endpoint.path.starts_with('/') {
        errors.push(LocustgenError::Validation(format!(
            "endpoint {idx}: path must start with '/' (got: {})",
            endpoint.path
        )));
    }

    if endpoint.weight == 0 {
        errors.push(LocustgenError::Validation(format!(
            "endpoint {idx} ({} {}): weight must be at least 1",
            endpoint.method, endpoint.path
        )));
    }

    errors
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::model::{HttpMethod, ThinkTimeRange};

    #[test]
    fn default_specification_is_valid() {
        let errors = validate_specification(&LoadTestSpecification::default());
        assert!(errors.is_empty(), "Expected no errors, got: {:?}", errors);
    }

    #[test]
    fn zero_spawn_rate_produces_error() {
        let spec = LoadTestSpecification {
            spawn_rate: 0,
            ..Default::default()
        };
        let errors = validate_specification(&spec);
        assert!(errors.iter().any(|e| e.to_string().contains("spawnRate must be at least 1")));
    }

    #[test]
    fn inverted_think_time_produces_error() {
        let spec = LoadTestSpecification {
            think_time_range: ThinkTimeRange { min: 6, max: 2 },
            ..Default::default()
        };
        let errors = validate_specification(&spec);
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn every_bad_endpoint_is_reported() {
        let mut relative = EndpointDescriptor::new(HttpMethod::Get, "posts");
        relative.weight = 0;
        let spec = LoadTestSpecification {
            endpoints: vec![relative, EndpointDescriptor::root()],
            ..Default::default()
        };
        let errors = validate_specification(&spec);
        // Relative path and zero weight on the first endpoint.
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn missing_endpoints_produce_error() {
        let spec = LoadTestSpecification {
            endpoints: Vec::new(),
            ..Default::default()
        };
        let errors = validate_specification(&spec);
        assert!(errors.iter().any(|e| e.to_string().contains("at least one endpoint")));
    }
}
