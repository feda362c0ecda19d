//! Locust script rendering.
//!
//! [`ScriptRenderer::render`] is a pure function of the specification: the
//! same specification always produces byte-identical script text.

pub mod python;

use crate::spec::model::{EndpointDescriptor, LoadTestSpecification, ReplayTarget};
use python::{py_literal, py_str, py_str_dict};

const INDENT: &str = "    ";

/// Renders a [`LoadTestSpecification`] into a Locust `HttpUser` script.
#[derive(Debug, Clone)]
pub struct ScriptRenderer {
    class_name: String,
}

impl Default for ScriptRenderer {
    fn default() -> Self {
        Self {
            class_name: "PerformanceTest".to_string(),
        }
    }
}

impl ScriptRenderer {
    pub fn new(class_name: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
        }
    }

    /// Render `spec`. Specifications carrying a replay target render in
    /// single-capture mode, everything else as one task per endpoint.
    pub fn render(&self, spec: &LoadTestSpecification) -> String {
        let mut out = self.header(spec);
        match &spec.replay {
            Some(replay) => render_replay(&mut out, replay),
            None => {
                for (idx, endpoint) in spec.endpoints.iter().enumerate() {
                    render_task(&mut out, idx + 1, endpoint);
                }
            }
        }
        out
    }

    fn header(&self, spec: &LoadTestSpecification) -> String {
        let mut out = String::new();
        out.push_str("from locust import HttpUser, task, between\n");
        out.push_str("\n\n");
        out.push_str(&format!("class {}(HttpUser):\n", self.class_name));
        out.push_str(&format!("{INDENT}host = {}\n", py_str(&spec.target_host)));
        out.push_str(&format!(
            "{INDENT}wait_time = between({}, {})\n",
            spec.think_time_range.min, spec.think_time_range.max
        ));
        out
    }
}

fn render_task(out: &mut String, index: usize, endpoint: &EndpointDescriptor) {
    let mut args = vec![py_str(&endpoint.path)];
    if !endpoint.headers.is_empty() {
        args.push(format!("headers={}", py_str_dict(&endpoint.headers)));
    }
    if endpoint.method.carries_body() {
        if let Some(body) = &endpoint.body {
            args.push(format!("json={}", py_literal(body)));
        }
    }

    let call = endpoint.method.client_call();
    out.push('\n');
    out.push_str(&format!("{INDENT}@task({})\n", endpoint.weight));
    out.push_str(&format!("{INDENT}def test_{call}_{index}(self):\n"));
    out.push_str(&format!(
        "{INDENT}{INDENT}self.client.{call}({})\n",
        args.join(", ")
    ));
}

fn render_replay(out: &mut String, replay: &ReplayTarget) {
    out.push('\n');
    out.push_str(&format!("{INDENT}def on_start(self):\n"));
    if replay.headers.is_empty() {
        out.push_str(&format!("{INDENT}{INDENT}self.headers = {{}}\n"));
    } else {
        out.push_str(&format!("{INDENT}{INDENT}self.headers = {{\n"));
        for (name, value) in &replay.headers {
            out.push_str(&format!(
                "{INDENT}{INDENT}{INDENT}{}: {},\n",
                py_str(name),
                py_str(value)
            ));
        }
        out.push_str(&format!("{INDENT}{INDENT}}}\n"));
    }

    let mut args = vec![py_str(&replay.path)];
    if !replay.query.is_empty() {
        args.push(format!("params={}", py_str_dict(&replay.query)));
    }
    args.push("headers=self.headers".to_string());

    let call = replay.method.client_call();
    out.push('\n');
    out.push_str(&format!("{INDENT}@task(1)\n"));
    out.push_str(&format!("{INDENT}def test_{call}_1(self):\n"));
    out.push_str(&format!(
        "{INDENT}{INDENT}self.client.{call}({})\n",
        args.join(", ")
    ));
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
