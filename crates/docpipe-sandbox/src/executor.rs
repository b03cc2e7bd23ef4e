//! Executes one pipeline script run: writes the wrapped harness and the
//! job's input snapshot to an isolated temp directory, invokes the
//! interpreter via the argv-only `CommandSpec`/`process::run` discipline
//! (`xchecker-runner`'s subprocess pattern, generalized to async), and
//! reads back the `{success, output_data, error_message}` result file —
//! ported from `pipeline_service.py`'s `PipelineExecutor.execute`.

use crate::harness;
use docpipe_types::pipeline::{Pipeline, PipelineExecution, PipelineExecutionStatus};
use docpipe_utils::process::{run, CommandSpec};
use docpipe_utils::{DocpipeError, Result};
use std::time::{Duration, Instant};

/// Input bound into the harness script's globals (spec §4.5).
pub struct SandboxInput {
    pub job_id: String,
    pub extracted_data: serde_json::Value,
    pub ocr_text: String,
    pub meta_info: serde_json::Value,
}

#[derive(serde::Deserialize)]
struct HarnessOutput {
    success: bool,
    output_data: Option<serde_json::Value>,
    error_message: Option<String>,
}

/// Run `pipeline`'s user script against `input` using `interpreter`
/// (e.g. `python3`), enforcing `pipeline.timeout`. `retry_count` is
/// copied through onto the returned [`PipelineExecution`] for the
/// caller's bookkeeping; this function does not retry itself.
pub async fn execute(
    pipeline: &Pipeline,
    input: SandboxInput,
    interpreter: &str,
    retry_count: u32,
) -> Result<PipelineExecution> {
    let exec_dir = tempfile::Builder::new()
        .prefix("docpipe-exec-")
        .tempdir()
        .map_err(DocpipeError::Io)?;

    let script_path = exec_dir.path().join("pipeline_script.py");
    let input_path = exec_dir.path().join("input.json");
    let output_path = exec_dir.path().join("output.json");

    let input_snapshot = serde_json::json!({
        "task_id": input.job_id,
        "extracted_data": input.extracted_data,
        "ocr_text": input.ocr_text,
        "meta_info": input.meta_info,
    });

    std::fs::write(&script_path, harness::wrap(&pipeline.script_body)).map_err(DocpipeError::Io)?;
    std::fs::write(
        &input_path,
        serde_json::to_vec(&input_snapshot).expect("json serialization cannot fail"),
    )
    .map_err(DocpipeError::Io)?;

    let mut cmd = CommandSpec::new(interpreter)
        .arg(script_path.clone())
        .arg(input_path.clone())
        .arg(output_path.clone())
        .cwd(exec_dir.path().to_path_buf())
        .env("PYTHONIOENCODING", "utf-8")
        .env("PYTHONUTF8", "1");
    for (key, value) in &pipeline.env {
        cmd = cmd.env(key.as_str(), value.as_str());
    }

    let started = Instant::now();
    let output = run(&cmd, pipeline.timeout).await.map_err(DocpipeError::Io)?;
    let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

    if output.timed_out {
        return Ok(PipelineExecution {
            job_id: input.job_id,
            rule_id: pipeline.rule_id.clone(),
            input_snapshot,
            output_snapshot: None,
            stdout: output.stdout_string(),
            stderr: output.stderr_string(),
            duration_ms,
            status: PipelineExecutionStatus::Timeout,
            error_message: Some(format!(
                "pipeline execution timed out after {:?}",
                pipeline.timeout
            )),
            retry_count,
            executed_at: chrono::Utc::now(),
        });
    }

    let harness_result = std::fs::read(&output_path)
        .ok()
        .and_then(|bytes| serde_json::from_slice::<HarnessOutput>(&bytes).ok());

    let (status, output_snapshot, error_message) = match harness_result {
        Some(result) if result.success => {
            (PipelineExecutionStatus::Success, result.output_data, None)
        }
        Some(result) => (
            PipelineExecutionStatus::Failed,
            None,
            result
                .error_message
                .or_else(|| Some("pipeline script reported failure".to_string())),
        ),
        None => (
            PipelineExecutionStatus::Failed,
            None,
            Some(if output.success() {
                "pipeline script did not produce an output file".to_string()
            } else {
                format!(
                    "pipeline script exited with status {:?}",
                    output.exit_code
                )
            }),
        ),
    };

    Ok(PipelineExecution {
        job_id: input.job_id,
        rule_id: pipeline.rule_id.clone(),
        input_snapshot,
        output_snapshot,
        stdout: output.stdout_string(),
        stderr: output.stderr_string(),
        duration_ms,
        status,
        error_message,
        retry_count,
        executed_at: chrono::Utc::now(),
    })
}

/// Unused directly, but keeps the crate's timeout constant discoverable
/// for callers constructing a `Pipeline` without going through config.
#[must_use]
pub fn default_timeout() -> Duration {
    Pipeline::default_timeout()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn pipeline_with_script(script: &str) -> Pipeline {
        Pipeline {
            rule_id: "rule-1".to_string(),
            script_body: script.to_string(),
            dependencies: Vec::new(),
            cache_key: "rule-1-v1".to_string(),
            timeout: Duration::from_secs(5),
            memory_limit_mb: 256,
            max_retries: 1,
            env: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn executes_simple_script_and_captures_output() {
        let pipeline = pipeline_with_script("output_data = {\"doubled\": extracted_data[\"n\"] * 2}");
        let input = SandboxInput {
            job_id: "job-1".to_string(),
            extracted_data: serde_json::json!({"n": 21}),
            ocr_text: String::new(),
            meta_info: serde_json::json!({}),
        };
        let result = execute(&pipeline, input, "python3", 0).await.unwrap();
        assert_eq!(result.status, PipelineExecutionStatus::Success);
        assert_eq!(
            result.output_snapshot.unwrap(),
            serde_json::json!({"doubled": 42})
        );
    }

    #[tokio::test]
    async fn script_exception_is_reported_as_failure() {
        let pipeline = pipeline_with_script("raise ValueError(\"boom\")");
        let input = SandboxInput {
            job_id: "job-2".to_string(),
            extracted_data: serde_json::json!({}),
            ocr_text: String::new(),
            meta_info: serde_json::json!({}),
        };
        let result = execute(&pipeline, input, "python3", 0).await.unwrap();
        assert_eq!(result.status, PipelineExecutionStatus::Failed);
        assert!(result.error_message.unwrap().contains("boom"));
    }

    #[tokio::test]
    async fn runaway_script_is_killed_on_timeout() {
        let mut pipeline = pipeline_with_script("import time\ntime.sleep(5)");
        pipeline.timeout = Duration::from_millis(100);
        let input = SandboxInput {
            job_id: "job-3".to_string(),
            extracted_data: serde_json::json!({}),
            ocr_text: String::new(),
            meta_info: serde_json::json!({}),
        };
        let result = execute(&pipeline, input, "python3", 0).await.unwrap();
        assert_eq!(result.status, PipelineExecutionStatus::Timeout);
    }
}
