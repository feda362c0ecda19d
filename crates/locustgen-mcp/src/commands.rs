use std::sync::Arc;

use serde_json::{json, Value};

use locustgen_core::archive::TestArchive;
use locustgen_core::extract::{CurlCommandParser, PromptExtractor};
use locustgen_core::render::ScriptRenderer;
use locustgen_core::runner::RunOrchestrator;
use locustgen_core::spec::{LoadTestSpecification, RunDuration, SpecificationBuilder};
use locustgen_core::LocustgenError;

use crate::protocol::InitializeResult;

/// Load parameters for a captured-request replay when the caller gives none.
const CAPTURE_DEFAULT_USERS: u32 = 1;
const CAPTURE_DEFAULT_RUN_SECS: u64 = 1;

// ---------------------------------------------------------------------------
// State passed into every command handler
// ---------------------------------------------------------------------------

pub struct CommandState {
    pub archive: Arc<dyn TestArchive>,
    pub orchestrator: Arc<RunOrchestrator>,
    pub renderer: ScriptRenderer,
    pub prompt_extractor: PromptExtractor,
    pub curl_parser: CurlCommandParser,
}

impl CommandState {
    pub fn new(archive: Arc<dyn TestArchive>, orchestrator: Arc<RunOrchestrator>) -> Self {
        Self {
            archive,
            orchestrator,
            renderer: ScriptRenderer::default(),
            prompt_extractor: PromptExtractor::default(),
            curl_parser: CurlCommandParser::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

pub async fn dispatch_command(
    command: &str,
    params: Value,
    state: &CommandState,
) -> Result<Value, LocustgenError> {
    match command {
        "initialize" => Ok(serde_json::to_value(InitializeResult::default())?),
        "generate" => handle_generate(params, state).await,
        "run" => handle_run(params, state).await,
        "list" => handle_list(state).await,
        "stop" => handle_stop(state).await,
        unknown => Err(LocustgenError::UnknownCommand(unknown.to_string())),
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// First of `keys` present in `params`, as a string.
fn optional_str<'a>(params: &'a Value, keys: &[&str]) -> Result<Option<&'a str>, LocustgenError> {
    match keys.iter().find_map(|k| params.get(*k)) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.as_str())),
        Some(_) => Err(LocustgenError::Validation(format!("{} must be a string", keys[0]))),
    }
}

fn optional_u32(params: &Value, keys: &[&str]) -> Result<Option<u32>, LocustgenError> {
    match keys.iter().find_map(|k| params.get(*k)) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .map(Some)
            .ok_or_else(|| {
                LocustgenError::Validation(format!("{} must be a non-negative integer", keys[0]))
            }),
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn handle_generate(params: Value, state: &CommandState) -> Result<Value, LocustgenError> {
    let (spec, default_description) = if let Some(prompt) = optional_str(&params, &["prompt"])? {
        (state.prompt_extractor.parse(prompt), prompt.to_string())
    } else if let Some(curl) = optional_str(&params, &["curl"])? {
        (capture_spec(curl, &params, state)?, "Captured request replay".to_string())
    } else {
        (SpecificationBuilder::from_params(&params)?, "Generated test".to_string())
    };
    let description = optional_str(&params, &["description"])?
        .map(str::to_string)
        .unwrap_or(default_description);

    let script = state.renderer.render(&spec);
    let archived = state.archive.save(&script, &spec, &description).await?;

    tracing::info!(
        test_id = %archived.test.id,
        endpoints = spec.endpoints.len(),
        single_capture = spec.is_single_capture(),
        "test generated"
    );

    Ok(json!({
        "test_id": archived.test.id,
        "script": script,
        "config": serde_json::to_value(&spec)?,
        "script_path": archived.script_path.display().to_string(),
        "config_path": archived.config_path.display().to_string(),
    }))
}

fn capture_spec(
    curl: &str,
    params: &Value,
    state: &CommandState,
) -> Result<LoadTestSpecification, LocustgenError> {
    let users = optional_u32(params, &["users"])?.unwrap_or(CAPTURE_DEFAULT_USERS);
    let run_duration = match optional_str(params, &["runTime", "run_time"])? {
        Some(raw) => raw.parse()?,
        None => RunDuration::seconds(CAPTURE_DEFAULT_RUN_SECS),
    };
    let spawn_rate = optional_u32(params, &["spawnRate", "spawn_rate"])?;

    let captured = state.curl_parser.parse(curl, users, run_duration)?;
    SpecificationBuilder::from_captured(captured, spawn_rate)
}

async fn handle_run(params: Value, state: &CommandState) -> Result<Value, LocustgenError> {
    let (script, spec) = match optional_str(&params, &["test_id", "testId"])? {
        Some(id) => {
            let archived = state.archive.get(id).await?;
            (archived.test.script, archived.test.specification)
        }
        None => {
            let script = optional_str(&params, &["script"])?.unwrap_or_default().to_string();
            let config = params.get("config").cloned().unwrap_or(Value::Null);
            (script, SpecificationBuilder::from_params(&config)?)
        }
    };

    let result = state.orchestrator.run(&script, &spec).await;
    Ok(serde_json::to_value(result)?)
}

async fn handle_list(state: &CommandState) -> Result<Value, LocustgenError> {
    let tests = state.archive.list().await?;
    Ok(json!({ "tests": tests }))
}

async fn handle_stop(state: &CommandState) -> Result<Value, LocustgenError> {
    Ok(serde_json::to_value(state.orchestrator.stop().await)?)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use locustgen_core::archive::FileArchive;

    async fn make_state(dir: &std::path::Path) -> CommandState {
        let archive = FileArchive::open(dir.join("archive"))
            .await
            .expect("open should succeed");
        CommandState::new(
            Arc::new(archive),
            Arc::new(RunOrchestrator::new(dir.join("no-such-locust").display().to_string(), 2)),
        )
    }

    #[tokio::test]
    async fn generate_from_prompt_saves_and_returns_paths() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let state = make_state(dir.path()).await;

        let result = dispatch_command(
            "generate",
            json!({"prompt": "Test https://api.example.com with 5 users: GET /posts endpoint"}),
            &state,
        )
        .await
        .expect("generate should succeed");

        let test_id = result["test_id"].as_str().expect("test_id");
        assert!(result["script"].as_str().expect("script").contains("self.client.get(\"/posts\")"));
        assert_eq!(result["config"]["users"], 5);
        assert_eq!(result["config"]["targetHost"], "https://api.example.com");
        let script_path = result["script_path"].as_str().expect("script_path");
        assert!(script_path.ends_with(&format!("locust_test_{test_id}.py")));
        assert!(std::path::Path::new(script_path).exists());

        let history = state.archive.list().await.expect("list");
        assert_eq!(history[0].description, "Test https://api.example.com with 5 users: GET /posts endpoint");
    }

    #[tokio::test]
    async fn generate_from_map_uses_defaults_for_missing_fields() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let state = make_state(dir.path()).await;

        let result = dispatch_command(
            "generate",
            json!({"targetUrl": "https://api.example.com", "endpoints": [{"method": "POST", "path": "/items", "data": {"a": 1}}]}),
            &state,
        )
        .await
        .expect("generate should succeed");

        assert_eq!(result["config"]["users"], 10);
        assert_eq!(result["config"]["runTime"], "30s");
        assert!(result["script"]
            .as_str()
            .expect("script")
            .contains("self.client.post(\"/items\", json={\"a\": 1})"));
    }

    #[tokio::test]
    async fn generate_from_curl_renders_replay() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let state = make_state(dir.path()).await;

        let result = dispatch_command(
            "generate",
            json!({"curl": "curl 'https://api.example.com/v2/x?group=a' -H 'sec-fetch-mode: cors'"}),
            &state,
        )
        .await
        .expect("generate should succeed");

        assert_eq!(result["config"]["users"], 1);
        assert_eq!(result["config"]["runTime"], "1s");
        let script = result["script"].as_str().expect("script");
        assert!(script.contains("def on_start(self):"));
        assert!(!script.contains("sec-fetch-mode"));
    }

    #[tokio::test]
    async fn generate_from_curl_without_url_is_malformed() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let state = make_state(dir.path()).await;

        let err = dispatch_command("generate", json!({"curl": "curl -H 'a: b'"}), &state)
            .await
            .unwrap_err();
        assert!(matches!(err, LocustgenError::MalformedInput(_)));
        assert!(state.archive.list().await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn generate_rejects_bad_map_values() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let state = make_state(dir.path()).await;

        for params in [json!({"users": 0}), json!({"runTime": "soon"}), json!({"prompt": 5})] {
            let err = dispatch_command("generate", params.clone(), &state).await.unwrap_err();
            assert!(matches!(err, LocustgenError::Validation(_)), "{params}");
        }
    }

    #[tokio::test]
    async fn run_inline_script_reports_launch_failure_in_result() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let state = make_state(dir.path()).await;

        let result = dispatch_command(
            "run",
            json!({"script": "print('x')", "config": {"host": "https://api.example.com"}}),
            &state,
        )
        .await
        .expect("run returns a result");
        assert_eq!(result["success"], false);
        assert!(result["error"].as_str().expect("error").contains("failed to launch"));
    }

    #[tokio::test]
    async fn run_without_script_reports_missing_script() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let state = make_state(dir.path()).await;

        let result = dispatch_command("run", json!({}), &state).await.expect("run result");
        assert_eq!(result["success"], false);
        assert_eq!(result["error"], "No test script provided");
    }

    #[tokio::test]
    async fn stop_always_succeeds() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let state = make_state(dir.path()).await;

        let result = dispatch_command("stop", Value::Null, &state).await.expect("stop");
        assert_eq!(result["success"], true);
    }

    #[tokio::test]
    async fn unknown_command_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let state = make_state(dir.path()).await;

        let err = dispatch_command("explode", Value::Null, &state).await.unwrap_err();
        assert_eq!(err.to_string(), "Unknown command: explode");
    }
}
