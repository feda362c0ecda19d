use serde::Deserialize;
use serde_json::Value;

use crate::error::LocustgenError;
use crate::extract::{split_url, PromptExtraction};
use crate::spec::model::{
    CapturedRequest, EndpointDescriptor, LoadTestSpecification, ReplayTarget, RunDuration,
    ThinkTimeRange, DEFAULT_SPAWN_RATE, DEFAULT_TARGET_HOST, DEFAULT_USERS,
};
use crate::spec::validation::validate_specification;

// ---------------------------------------------------------------------------
// SpecParams
// ---------------------------------------------------------------------------

/// A directly supplied parameter map, as sent with `generate` or stored as a
/// test's config. Both the camelCase keys and the older snake_case keys are
/// accepted.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SpecParams {
    #[serde(alias = "targetUrl", alias = "targetHost", alias = "host")]
    target_url: Option<String>,
    endpoints: Option<Vec<EndpointDescriptor>>,
    users: Option<u32>,
    #[serde(alias = "spawnRate")]
    spawn_rate: Option<u32>,
    #[serde(alias = "runTime")]
    run_time: Option<RunDuration>,
    #[serde(alias = "thinkTime")]
    think_time: Option<u32>,
    #[serde(alias = "thinkTimeRange")]
    think_time_range: Option<ThinkTimeRange>,
    replay: Option<ReplayTarget>,
}

// ---------------------------------------------------------------------------
// SpecificationBuilder
// ---------------------------------------------------------------------------

/// Normalizes extractor output or a parameter map into one
/// [`LoadTestSpecification`], filling unset fields with defaults.
///
/// The builder only checks shape: a non-empty host, positive counts and a
/// sane think-time range. Whether the host is reachable is for the load
/// generator to find out.
#[derive(Debug, Clone, Default)]
pub struct SpecificationBuilder {
    target_url: Option<String>,
    endpoints: Vec<EndpointDescriptor>,
    users: Option<u32>,
    spawn_rate: Option<u32>,
    run_duration: Option<RunDuration>,
    think_time: Option<u32>,
    think_time_range: Option<ThinkTimeRange>,
    replay: Option<ReplayTarget>,
}

impl SpecificationBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn target_url(mut self, url: impl Into<String>) -> Self {
        self.target_url = Some(url.into());
        self
    }

    pub fn endpoint(mut self, endpoint: EndpointDescriptor) -> Self {
        self.endpoints.push(endpoint);
        self
    }

    pub fn endpoints(mut self, endpoints: Vec<EndpointDescriptor>) -> Self {
        self.endpoints = endpoints;
        self
    }

    pub fn users(mut self, users: u32) -> Self {
        self.users = Some(users);
        self
    }

    pub fn spawn_rate(mut self, spawn_rate: u32) -> Self {
        self.spawn_rate = Some(spawn_rate);
        self
    }

    pub fn run_duration(mut self, run_duration: RunDuration) -> Self {
        self.run_duration = Some(run_duration);
        self
    }

    /// A fixed pause of `seconds` between requests. Takes precedence over
    /// [`Self::think_time_range`].
    pub fn think_time(mut self, seconds: u32) -> Self {
        self.think_time = Some(seconds);
        self
    }

    pub fn think_time_range(mut self, range: ThinkTimeRange) -> Self {
        self.think_time_range = Some(range);
        self
    }

    pub fn replay(mut self, replay: ReplayTarget) -> Self {
        self.replay = Some(replay);
        self
    }

    /// Resolve defaults and validate.
    pub fn build(self) -> Result<LoadTestSpecification, LocustgenError> {
        let raw_target = self
            .target_url
            .unwrap_or_else(|| DEFAULT_TARGET_HOST.to_string());
        let raw_target = raw_target.trim();
        if raw_target.is_empty() {
            return Err(LocustgenError::Validation(
                "target URL must not be empty".to_string(),
            ));
        }

        // Only scheme+authority is kept as the host; a path on the URL only matters
        // when no endpoint says otherwise.
        let (target_host, url_path) = match split_url(raw_target) {
            Some(parts) => (parts.host, parts.path),
            None => split_unparsed(raw_target),
        };

        let mut endpoints: Vec<EndpointDescriptor> = self
            .endpoints
            .into_iter()
            .map(|mut ep| {
                ep.path = normalize_path(&ep.path);
                ep
            })
            .collect();
        if endpoints.is_empty() {
            endpoints.push(match &self.replay {
                Some(replay) => EndpointDescriptor {
                    method: replay.method,
                    path: replay.path.clone(),
                    body: None,
                    headers: replay.headers.clone(),
                    weight: 1,
                },
                None => EndpointDescriptor {
                    path: url_path,
                    ..EndpointDescriptor::root()
                },
            });
        }

        let think_time_range = match self.think_time {
            Some(seconds) => ThinkTimeRange::fixed(seconds),
            None => self.think_time_range.unwrap_or_default(),
        };

        let spec = LoadTestSpecification {
            target_host,
            endpoints,
            users: self.users.unwrap_or(DEFAULT_USERS),
            spawn_rate: self.spawn_rate.unwrap_or(DEFAULT_SPAWN_RATE),
            run_duration: self.run_duration.unwrap_or_default(),
            think_time: self.think_time,
            think_time_range,
            replay: self.replay.map(|mut replay| {
                replay.path = normalize_path(&replay.path);
                replay
            }),
        };

        let errors = validate_specification(&spec);
        match errors.into_iter().next() {
            Some(first) => Err(first),
            None => Ok(spec),
        }
    }

    // -----------------------------------------------------------------------
    // Sources
    // -----------------------------------------------------------------------

    /// Build from a prompt scan. Never fails: every extracted count is
    /// already positive, and a rejected build falls back to the defaults.
    pub fn from_prompt(extraction: PromptExtraction) -> LoadTestSpecification {
        let mut builder = Self::new().endpoints(extraction.endpoints);
        if let Some(url) = extraction.url {
            builder = builder.target_url(url);
        }
        if let Some(users) = extraction.users {
            builder = builder.users(users);
        }
        if let Some(spawn_rate) = extraction.spawn_rate {
            builder = builder.spawn_rate(spawn_rate);
        }
        if let Some(run_duration) = extraction.run_duration {
            builder = builder.run_duration(run_duration);
        }
        if let Some(think_time) = extraction.think_time {
            builder = builder.think_time(think_time);
        }
        builder.build().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "prompt extraction produced an invalid spec, using defaults");
            LoadTestSpecification::default()
        })
    }

    /// Build a single-capture specification that replays `captured`.
    pub fn from_captured(
        captured: CapturedRequest,
        spawn_rate: Option<u32>,
    ) -> Result<LoadTestSpecification, LocustgenError> {
        let mut builder = Self::new()
            .target_url(captured.host)
            .users(captured.users)
            .run_duration(captured.run_duration)
            .replay(ReplayTarget {
                method: captured.method,
                path: captured.path,
                query: captured.query,
                headers: captured.headers,
            });
        if let Some(spawn_rate) = spawn_rate {
            builder = builder.spawn_rate(spawn_rate);
        }
        builder.build()
    }

    /// Build from a JSON parameter map. `null` is treated as an empty map.
    pub fn from_params(params: &Value) -> Result<LoadTestSpecification, LocustgenError> {
        let params: SpecParams = match params {
            Value::Null => SpecParams::default(),
            other => serde_json::from_value(other.clone()).map_err(|e| {
                LocustgenError::Validation(format!("invalid specification parameters: {e}"))
            })?,
        };

        let mut builder = Self::new().endpoints(params.endpoints.unwrap_or_default());
        if let Some(url) = params.target_url {
            builder = builder.target_url(url);
        }
        if let Some(users) = params.users {
            builder = builder.users(users);
        }
        if let Some(spawn_rate) = params.spawn_rate {
            builder = builder.spawn_rate(spawn_rate);
        }
        if let Some(run_duration) = params.run_time {
            builder = builder.run_duration(run_duration);
        }
        if let Some(think_time) = params.think_time {
            builder = builder.think_time(think_time);
        }
        if let Some(range) = params.think_time_range {
            builder = builder.think_time_range(range);
        }
        if let Some(replay) = params.replay {
            builder = builder.replay(replay);
        }
        builder.build()
    }
}

/// Host and path of a target that is not a valid URL. Everything from the
/// first `/` after the scheme separator is path; query and fragment are dropped.
fn split_unparsed(raw: &str) -> (String, String) {
    let authority_start = raw.find("://").map_or(0, |i| i + 3);
    let Some(slash) = raw[authority_start..].find('/') else {
        return (raw.to_string(), "/".to_string());
    };
    let (host, rest) = raw.split_at(authority_start + slash);
    let path = rest.split(['?', '#']).next().unwrap_or("/");
    (host.to_string(), path.to_string())
}

fn normalize_path(path: &str) -> String {
    let path = path.trim();
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
