//! Text extractors that turn loosely structured input into typed values.
//!
//! [`curl::CurlCommandParser`] reads a captured `curl` command line;
//! [`prompt::PromptExtractor`] reads a free-text description of a load test.
//! Neither touches the network or the filesystem.

pub mod curl;
pub mod prompt;

pub use curl::{CurlCommandParser, HeaderDenyList};
pub use prompt::{PromptExtraction, PromptExtractor};

use std::sync::LazyLock;

use regex::Regex;
use url::Url;

/// An absolute `http(s)://` token. Quotes and angle brackets end the token so
/// that quoted shell arguments are captured without their delimiters.
static ABSOLUTE_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)https?://[^\s'"<>]+"#).expect("valid URL pattern"));

/// Sentence punctuation that commonly trails a URL written in prose.
const TRAILING_PUNCTUATION: &[char] = &['.', ',', ';', ':', '!', '?', ')', ']'];

/// Every absolute URL in `text` in order, with trailing punctuation removed.
pub(crate) fn absolute_urls(text: &str) -> impl Iterator<Item = &str> {
    ABSOLUTE_URL
        .find_iter(text)
        .map(|m| m.as_str().trim_end_matches(TRAILING_PUNCTUATION))
        .filter(|candidate| !candidate.is_empty())
}

/// The first absolute URL in `text`, with trailing punctuation removed.
pub(crate) fn first_absolute_url(text: &str) -> Option<&str> {
    absolute_urls(text).next()
}

/// `text` with every absolute URL blanked out, so that words inside a URL
/// (`/get`, `/users`) are not mistaken for prose.
pub(crate) fn without_urls(text: &str) -> String {
    ABSOLUTE_URL.replace_all(text, " ").into_owned()
}

/// The pieces of an absolute URL the rest of the crate cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct UrlParts {
    /// Scheme and authority, e.g. `https://api.example.com:8443`.
    pub host: String,
    /// Always starts with `/`.
    pub path: String,
    /// Decoded query pairs in the order they appear.
    pub query: Vec<(String, String)>,
}

/// Split an `http`/`https` URL into host, path and query. Anything else
/// (other schemes, relative references, garbage) yields `None`.
pub(crate) fn split_url(raw: &str) -> Option<UrlParts> {
    let url = Url::parse(raw.trim()).ok()?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return None;
    }
    let query = url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    Some(UrlParts {
        host: url.origin().ascii_serialization(),
        path: url.path().to_string(),
        query,
    })
}
