use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::LocustgenError;
use crate::extract::{absolute_urls, split_url};
use crate::spec::model::{CapturedRequest, HttpMethod, RunDuration};

/// `-H 'Name: Value'` / `--header "Name: Value"` in either quoting style.
static HEADER_FLAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?:^|\s)(?:-H|--header)\s+(?:'([^']*)'|"([^"]*)")"#)
        .expect("valid header pattern")
});

// ---------------------------------------------------------------------------
// HeaderDenyList
// ---------------------------------------------------------------------------

/// Header names that are dropped from a captured request before replay.
///
/// Browser security headers and connection-management headers describe the
/// capturing client's transport, not the request, and a synthetic client
/// that replays them verbatim can break its own connection handling.
/// Matching is ASCII case-insensitive: a name is denied if it starts with one
/// of `prefixes` or equals one of `exact`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderDenyList {
    prefixes: Vec<&'static str>,
    exact: Vec<&'static str>,
}

impl HeaderDenyList {
    pub fn new(prefixes: Vec<&'static str>, exact: Vec<&'static str>) -> Self {
        Self { prefixes, exact }
    }

    pub fn denies(&self, name: &str) -> bool {
        let name = name.trim().to_ascii_lowercase();
        self.prefixes.iter().any(|p| name.starts_with(p))
            || self.exact.iter().any(|e| name == *e)
    }
}

impl Default for HeaderDenyList {
    fn default() -> Self {
        Self::new(
            vec!["sec-"],
            vec!["accept-encoding", "connection", "keep-alive"],
        )
    }
}

// ---------------------------------------------------------------------------
// CurlCommandParser
// ---------------------------------------------------------------------------

/// Extracts a [`CapturedRequest`] from a shell-style `curl` command.
///
/// Only the URL and `-H` headers are read. The method is always GET;
/// `-X`/`--request` and body flags are not interpreted.
#[derive(Debug, Clone, Default)]
pub struct CurlCommandParser {
    deny_list: HeaderDenyList,
}

impl CurlCommandParser {
    pub fn new(deny_list: HeaderDenyList) -> Self {
        Self { deny_list }
    }

    /// Parse `command` into a captured request that will be replayed by
    /// `users` simulated users for `run_duration`.
    ///
    /// The first absolute URL that parses is used; earlier tokens that only
    /// look like URLs are skipped. Fails with [`LocustgenError::MalformedInput`]
    /// when the text holds no absolute `http(s)://` URL with a host.
    pub fn parse(
        &self,
        command: &str,
        users: u32,
        run_duration: RunDuration,
    ) -> Result<CapturedRequest, LocustgenError> {
        let parts = absolute_urls(command).find_map(split_url).ok_or_else(|| {
            LocustgenError::MalformedInput("no absolute http(s) URL found in command".to_string())
        })?;

        let mut query = BTreeMap::new();
        for (key, value) in parts.query {
            if value.is_empty() {
                continue;
            }
            query.entry(key).or_insert(value);
        }

        Ok(CapturedRequest {
            method: HttpMethod::Get,
            host: parts.host,
            path: parts.path,
            query,
            headers: self.headers(command),
            users,
            run_duration,
        })
    }

    fn headers(&self, command: &str) -> BTreeMap<String, String> {
        let mut headers = BTreeMap::new();
        for caps in HEADER_FLAG.captures_iter(command) {
            let Some(raw) = caps.get(1).or_else(|| caps.get(2)) else {
                continue;
            };
            let Some((name, value)) = raw.as_str().split_once(':') else {
                continue;
            };
            let name = name.trim();
            if name.is_empty() {
                continue;
            }
            if self.deny_list.denies(name) {
                tracing::debug!(header = name, "dropping denied header from capture");
                continue;
            }
            headers.insert(name.to_string(), value.trim().to_string());
        }
        headers
    }
}
