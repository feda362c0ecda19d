//! Heuristic extraction of a load test from a natural-language prompt.
//!
//! Every field is resolved by an ordered list of independent rules, each a
//! pure `fn(&str) -> Option<T>`. The first rule that yields a value wins;
//! when none does, the field stays unset and the specification builder fills
//! in the documented default. Nothing here can fail.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::{json, Value};

use crate::extract::{first_absolute_url, without_urls};
use crate::spec::builder::SpecificationBuilder;
use crate::spec::model::{EndpointDescriptor, HttpMethod, LoadTestSpecification, RunDuration};

type Rule<T> = fn(&str) -> Option<T>;

const URL_RULES: &[Rule<String>] = &[url_token];
const USER_RULES: &[Rule<u32>] = &[count_before_users];
const DURATION_RULES: &[Rule<RunDuration>] = &[count_before_time_unit];
const SPAWN_RATE_RULES: &[Rule<u32>] = &[count_after_spawn];
const THINK_TIME_RULES: &[Rule<u32>] = &[seconds_before_think_time];

static USERS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(\d+)\s*users?\b").expect("valid users pattern"));

static DURATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(\d+)\s*(seconds?|s|minutes?|m|hours?|h)\b")
        .expect("valid duration pattern")
});

static THINK_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*(?:of\s+)?think").expect("valid think pattern"));

static SPAWN_RATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bspawn(?:ing)?\s*(?:rate|speed)?\s*(?:of)?\s*(\d+)")
        .expect("valid spawn rate pattern")
});

static THINK_TIME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(\d+)\s*(?:seconds?|s)\s+(?:of\s+)?think(?:ing)?\s*time")
        .expect("valid think time pattern")
});

static JSON_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bjson\b").expect("valid json pattern"));

/// One compiled pattern set per verb in [`HttpMethod::PROMPT_VERBS`].
static VERB_PATTERNS: LazyLock<Vec<VerbPatterns>> = LazyLock::new(|| {
    HttpMethod::PROMPT_VERBS
        .iter()
        .map(|method| VerbPatterns::new(*method))
        .collect()
});

struct VerbPatterns {
    method: HttpMethod,
    present: Regex,
    path: Regex,
    weight: Regex,
}

impl VerbPatterns {
    fn new(method: HttpMethod) -> Self {
        let verb = method.client_call();
        let compile = |pattern: String| Regex::new(&pattern).expect("valid verb pattern");
        Self {
            method,
            present: compile(format!(r"(?i)\b{verb}\b")),
            path: compile(format!(r"(?i)\b{verb}\s+(?:(?:from|to)\s+)?([/\w]+)")),
            weight: compile(format!(r"(?is)\b{verb}\b.*?\b(\d+)\s*times?\s+more")),
        }
    }
}

/// The placeholder payload attached to body-carrying verbs when the prompt
/// mentions JSON.
pub fn placeholder_body() -> Value {
    json!({ "title": "Test Data", "body": "This is test data" })
}

// ---------------------------------------------------------------------------
// PromptExtraction
// ---------------------------------------------------------------------------

/// Raw per-field results of a prompt scan. `None` means no rule matched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PromptExtraction {
    pub url: Option<String>,
    pub users: Option<u32>,
    pub run_duration: Option<RunDuration>,
    pub spawn_rate: Option<u32>,
    pub think_time: Option<u32>,
    /// One descriptor per verb mentioned, in GET, POST, PUT, DELETE, PATCH
    /// order. Empty when the prompt names no verb.
    pub endpoints: Vec<EndpointDescriptor>,
}

// ---------------------------------------------------------------------------
// PromptExtractor
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default)]
pub struct PromptExtractor;

impl PromptExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Scan `prompt` and report what each rule list found.
    pub fn extract(&self, prompt: &str) -> PromptExtraction {
        let prose = without_urls(prompt);
        PromptExtraction {
            url: first_match(URL_RULES, prompt),
            users: first_match(USER_RULES, &prose),
            run_duration: first_match(DURATION_RULES, &prose),
            spawn_rate: first_match(SPAWN_RATE_RULES, &prose),
            think_time: first_match(THINK_TIME_RULES, &prose),
            endpoints: endpoints(&prose),
        }
    }

    /// Scan `prompt` and build a complete specification, defaults included.
    pub fn parse(&self, prompt: &str) -> LoadTestSpecification {
        SpecificationBuilder::from_prompt(self.extract(prompt))
    }
}

fn first_match<T>(rules: &[Rule<T>], text: &str) -> Option<T> {
    rules.iter().find_map(|rule| rule(text))
}

fn positive(digits: &str) -> Option<u32> {
    digits.parse::<u32>().ok().filter(|n| *n > 0)
}

// ---------------------------------------------------------------------------
// Field rules
// ---------------------------------------------------------------------------

fn url_token(text: &str) -> Option<String> {
    first_absolute_url(text).map(str::to_string)
}

fn count_before_users(text: &str) -> Option<u32> {
    USERS
        .captures_iter(text)
        .find_map(|caps| positive(&caps[1]))
}

fn count_before_time_unit(text: &str) -> Option<RunDuration> {
    DURATION.captures_iter(text).find_map(|caps| {
        let whole = caps.get(0)?;
        // "2 second think time" describes the pause, not the run.
        if THINK_SUFFIX.is_match(&text[whole.end()..]) {
            return None;
        }
        let value = caps[1].parse::<u64>().ok().filter(|n| *n > 0)?;
        let unit = caps[2].to_ascii_lowercase();
        Some(if unit.starts_with('m') {
            RunDuration::minutes(value)
        } else if unit.starts_with('h') {
            RunDuration::hours(value)
        } else {
            RunDuration::seconds(value)
        })
    })
}

fn count_after_spawn(text: &str) -> Option<u32> {
    SPAWN_RATE
        .captures_iter(text)
        .find_map(|caps| positive(&caps[1]))
}

fn seconds_before_think_time(text: &str) -> Option<u32> {
    THINK_TIME
        .captures_iter(text)
        .find_map(|caps| caps[1].parse::<u32>().ok())
}

// ---------------------------------------------------------------------------
// Endpoint rules
// ---------------------------------------------------------------------------

fn endpoints(text: &str) -> Vec<EndpointDescriptor> {
    let wants_json = JSON_WORD.is_match(text);
    VERB_PATTERNS
        .iter()
        .filter(|verb| verb.present.is_match(text))
        .map(|verb| {
            let path = verb
                .path
                .captures(text)
                .map(|caps| normalize_path(&caps[1]))
                .unwrap_or_else(|| "/".to_string());
            let weight = verb
                .weight
                .captures(text)
                .and_then(|caps| positive(&caps[1]))
                .unwrap_or(1);
            let body = (verb.method.carries_body() && wants_json).then(placeholder_body);
            EndpointDescriptor {
                method: verb.method,
                path,
                body,
                headers: BTreeMap::new(),
                weight,
            }
        })
        .collect()
}

fn normalize_path(token: &str) -> String {
    if token.starts_with('/') {
        token.to_string()
    } else {
        format!("/{token}")
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::model::ThinkTimeRange;

    fn extract(prompt: &str) -> PromptExtraction {
        PromptExtractor::new().extract(prompt)
    }

    #[test]
    fn documented_scenario_with_think_time() {
        let spec = PromptExtractor::new().parse(
            "Test https://api.example.com with 5 users: GET /posts endpoint with 2 second think time",
        );
        assert_eq!(spec.target_host, "https://api.example.com");
        assert_eq!(spec.users, 5);
        assert_eq!(spec.endpoints.len(), 1);
        assert_eq!(spec.endpoints[0].method, HttpMethod::Get);
        assert_eq!(spec.endpoints[0].path, "/posts");
        assert_eq!(spec.endpoints[0].weight, 1);
        assert_eq!(spec.think_time, Some(2));
        assert_eq!(spec.think_time_range, ThinkTimeRange::fixed(2));
        // The think-time phrase is not a run duration.
        assert_eq!(spec.run_duration, RunDuration::seconds(30));
    }

    #[test]
    fn empty_prompt_resolves_to_defaults() {
        let spec = PromptExtractor::new().parse("");
        assert_eq!(spec, LoadTestSpecification::default());
    }

    #[test]
    fn arbitrary_text_never_fails_and_has_an_endpoint() {
        for prompt in [
            "lorem ipsum",
            "99999999999999999999 users",
            "0 users for 0 minutes spawn rate 0",
            "https://",
            "GET GET GET post put delete patch",
            "\u{1F680} 🚀 ünïcödé / \\ ' \"",
        ] {
            let spec = PromptExtractor::new().parse(prompt);
            assert!(!spec.endpoints.is_empty(), "no endpoint for {prompt:?}");
            assert!(spec.users > 0);
            assert!(spec.spawn_rate > 0);
        }
    }

    #[test]
    fn extracts_load_parameters() {
        let found = extract("Load test with 50 users for 2 minutes, spawn rate of 5");
        assert_eq!(found.users, Some(50));
        assert_eq!(found.run_duration, Some(RunDuration::minutes(2)));
        assert_eq!(found.spawn_rate, Some(5));
    }

    #[test]
    fn duration_maps_unit_words_to_suffix() {
        assert_eq!(extract("run 45 seconds").run_duration, Some(RunDuration::seconds(45)));
        assert_eq!(extract("run 3h").run_duration, Some(RunDuration::hours(3)));
        assert_eq!(extract("run 1 hour").run_duration, Some(RunDuration::hours(1)));
        assert_eq!(extract("run 10m").run_duration, Some(RunDuration::minutes(10)));
    }

    #[test]
    fn duration_ignores_words_that_merely_start_with_a_unit() {
        assert_eq!(extract("GET /a 3 times more than others").run_duration, None);
        assert_eq!(extract("10 more users").run_duration, None);
    }

    #[test]
    fn first_match_wins_per_field() {
        let found = extract("10 users now, later 20 users, for 1m then 5m");
        assert_eq!(found.users, Some(10));
        assert_eq!(found.run_duration, Some(RunDuration::minutes(1)));
    }

    #[test]
    fn users_only_counted_next_to_user_word() {
        assert_eq!(extract("simulate 40 concurrent clients").users, None);
        assert_eq!(extract("200 VUs").users, None);
        assert_eq!(PromptExtractor::new().parse("simulate 40 concurrent clients").users, 10);
    }

    #[test]
    fn abbreviated_unit_words_are_not_durations() {
        assert_eq!(extract("run 5 mins").run_duration, None);
        assert_eq!(extract("run 2 hrs").run_duration, None);
        assert_eq!(extract("run 30 secs").run_duration, None);
    }

    #[test]
    fn url_keeps_original_case_and_drops_punctuation() {
        let found = extract("Test https://API.example.com/Posts.");
        assert_eq!(found.url.as_deref(), Some("https://API.example.com/Posts"));
    }

    #[test]
    fn one_endpoint_per_verb_in_fixed_order() {
        let found = extract("patch /items, then GET /items and get /other, DELETE from /items");
        let methods: Vec<HttpMethod> = found.endpoints.iter().map(|e| e.method).collect();
        assert_eq!(
            methods,
            vec![HttpMethod::Get, HttpMethod::Delete, HttpMethod::Patch]
        );
        assert_eq!(found.endpoints[0].path, "/items");
        assert_eq!(found.endpoints[1].path, "/items");
    }

    #[test]
    fn path_follows_from_or_to_and_gets_leading_slash() {
        let found = extract("post to users with json");
        assert_eq!(found.endpoints[0].path, "/users");
    }

    #[test]
    fn verb_without_path_defaults_to_root() {
        let found = extract("delete");
        assert_eq!(found.endpoints, vec![EndpointDescriptor::new(HttpMethod::Delete, "/")]);
    }

    #[test]
    fn json_attaches_placeholder_only_to_body_verbs() {
        let found = extract("GET /posts and POST /posts and PUT /posts/1 and DELETE /posts/1 as json");
        let by_method: BTreeMap<&str, &EndpointDescriptor> = found
            .endpoints
            .iter()
            .map(|e| (e.method.as_str(), e))
            .collect();
        assert!(by_method["GET"].body.is_none());
        assert!(by_method["DELETE"].body.is_none());
        assert_eq!(by_method["POST"].body, Some(placeholder_body()));
        assert_eq!(by_method["PUT"].body, Some(placeholder_body()));
    }

    #[test]
    fn no_json_means_no_body() {
        let found = extract("POST /posts");
        assert!(found.endpoints[0].body.is_none());
    }

    #[test]
    fn weight_from_times_more_phrase() {
        let found = extract("GET /posts 3 times more than POST /posts");
        assert_eq!(found.endpoints[0].method, HttpMethod::Get);
        assert_eq!(found.endpoints[0].weight, 3);
        assert_eq!(found.endpoints[1].method, HttpMethod::Post);
        assert_eq!(found.endpoints[1].weight, 1);
    }

    #[test]
    fn verbs_inside_urls_and_words_are_ignored() {
        let found = extract("Test https://example.com/get with a target of 5 users");
        assert!(found.endpoints.is_empty());
    }
}
