use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::LocustgenError;

pub const DEFAULT_TARGET_HOST: &str = "http://localhost:8000";
pub const DEFAULT_USERS: u32 = 10;
pub const DEFAULT_SPAWN_RATE: u32 = 1;

// ---------------------------------------------------------------------------
// HttpMethod
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HttpMethod {
    #[serde(alias = "get")]
    Get,
    #[serde(alias = "post")]
    Post,
    #[serde(alias = "put")]
    Put,
    #[serde(alias = "delete")]
    Delete,
    #[serde(alias = "patch")]
    Patch,
    #[serde(alias = "head")]
    Head,
    #[serde(alias = "options")]
    Options,
}

impl HttpMethod {
    /// The verbs the prompt extractor looks for, in scan order.
    pub const PROMPT_VERBS: [HttpMethod; 5] = [
        HttpMethod::Get,
        HttpMethod::Post,
        HttpMethod::Put,
        HttpMethod::Delete,
        HttpMethod::Patch,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Head => "HEAD",
            HttpMethod::Options => "OPTIONS",
        }
    }

    /// Lowercase form, as used for Locust client calls (`self.client.get`).
    pub fn client_call(&self) -> &'static str {
        match self {
            HttpMethod::Get => "get",
            HttpMethod::Post => "post",
            HttpMethod::Put => "put",
            HttpMethod::Delete => "delete",
            HttpMethod::Patch => "patch",
            HttpMethod::Head => "head",
            HttpMethod::Options => "options",
        }
    }

    /// Only these methods ever send a request body.
    pub fn carries_body(&self) -> bool {
        matches!(self, HttpMethod::Post | HttpMethod::Put | HttpMethod::Patch)
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = LocustgenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "POST" => Ok(HttpMethod::Post),
            "PUT" => Ok(HttpMethod::Put),
            "DELETE" => Ok(HttpMethod::Delete),
            "PATCH" => Ok(HttpMethod::Patch),
            "HEAD" => Ok(HttpMethod::Head),
            "OPTIONS" => Ok(HttpMethod::Options),
            other => Err(LocustgenError::Validation(format!(
                "unsupported HTTP method: {other}"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// RunDuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DurationUnit {
    Seconds,
    Minutes,
    Hours,
}

impl DurationUnit {
    fn suffix(&self) -> char {
        match self {
            DurationUnit::Seconds => 's',
            DurationUnit::Minutes => 'm',
            DurationUnit::Hours => 'h',
        }
    }
}

/// A Locust `--run-time` value: `<integer><s|m|h>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RunDuration {
    pub value: u64,
    pub unit: DurationUnit,
}

impl RunDuration {
    pub fn seconds(value: u64) -> Self {
        Self {
            value,
            unit: DurationUnit::Seconds,
        }
    }

    pub fn minutes(value: u64) -> Self {
        Self {
            value,
            unit: DurationUnit::Minutes,
        }
    }

    pub fn hours(value: u64) -> Self {
        Self {
            value,
            unit: DurationUnit::Hours,
        }
    }
}

impl Default for RunDuration {
    fn default() -> Self {
        Self::seconds(30)
    }
}

impl fmt::Display for RunDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.value, self.unit.suffix())
    }
}

impl FromStr for RunDuration {
    type Err = LocustgenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let invalid = || {
            LocustgenError::Validation(format!(
                "run duration must look like <integer><s|m|h>, got \"{s}\""
            ))
        };
        let unit = match s.chars().last() {
            Some('s') => DurationUnit::Seconds,
            Some('m') => DurationUnit::Minutes,
            Some('h') => DurationUnit::Hours,
            _ => return Err(invalid()),
        };
        let digits = &s[..s.len() - 1];
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        let value = digits.parse::<u64>().map_err(|_| invalid())?;
        Ok(Self { value, unit })
    }
}

impl TryFrom<String> for RunDuration {
    type Error = LocustgenError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RunDuration> for String {
    fn from(value: RunDuration) -> Self {
        value.to_string()
    }
}

// ---------------------------------------------------------------------------
// ThinkTimeRange
// ---------------------------------------------------------------------------

/// Bounds (in seconds) of the uniform pause a simulated user takes between
/// two requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThinkTimeRange {
    pub min: u32,
    pub max: u32,
}

impl ThinkTimeRange {
    /// A fixed think time `t` pauses for exactly `t` seconds.
    pub fn fixed(seconds: u32) -> Self {
        Self {
            min: seconds,
            max: seconds,
        }
    }
}

impl Default for ThinkTimeRange {
    fn default() -> Self {
        Self { min: 1, max: 5 }
    }
}

// ---------------------------------------------------------------------------
// EndpointDescriptor
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointDescriptor {
    pub method: HttpMethod,
    pub path: String,
    /// JSON payload; only rendered for POST, PUT and PATCH.
    #[serde(default, alias = "data", skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    #[serde(default = "default_weight")]
    pub weight: u32,
}

fn default_weight() -> u32 {
    1
}

impl EndpointDescriptor {
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            headers: BTreeMap::new(),
            weight: 1,
        }
    }

    /// The fallback endpoint used when nothing else was supplied.
    pub fn root() -> Self {
        Self::new(HttpMethod::Get, "/")
    }
}

// ---------------------------------------------------------------------------
// CapturedRequest / ReplayTarget
// ---------------------------------------------------------------------------

/// One HTTP request recovered from a shell-style `curl` capture, together
/// with the load parameters the replay should run with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapturedRequest {
    pub method: HttpMethod,
    /// Scheme and authority only, e.g. `https://api.example.com`.
    pub host: String,
    pub path: String,
    pub query: BTreeMap<String, String>,
    pub headers: BTreeMap<String, String>,
    pub users: u32,
    pub run_duration: RunDuration,
}

/// The request a single-capture script replays. Lives on the specification
/// because the path belongs to the capture, not to the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayTarget {
    pub method: HttpMethod,
    pub path: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub query: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
}

// ---------------------------------------------------------------------------
// LoadTestSpecification
// ---------------------------------------------------------------------------

/// Canonical description of one load test. Built once by
/// [`crate::spec::SpecificationBuilder`] and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadTestSpecification {
    pub target_host: String,
    pub endpoints: Vec<EndpointDescriptor>,
    pub users: u32,
    pub spawn_rate: u32,
    #[serde(rename = "runTime")]
    pub run_duration: RunDuration,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub think_time: Option<u32>,
    #[serde(default)]
    pub think_time_range: ThinkTimeRange,
    /// Present only for specifications built from a captured request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replay: Option<ReplayTarget>,
}

impl LoadTestSpecification {
    pub fn is_single_capture(&self) -> bool {
        self.replay.is_some()
    }
}

impl Default for LoadTestSpecification {
    fn default() -> Self {
        Self {
            target_host: DEFAULT_TARGET_HOST.to_string(),
            endpoints: vec![EndpointDescriptor::root()],
            users: DEFAULT_USERS,
            spawn_rate: DEFAULT_SPAWN_RATE,
            run_duration: RunDuration::default(),
            think_time: None,
            think_time_range: ThinkTimeRange::default(),
            replay: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
