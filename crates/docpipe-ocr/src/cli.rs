//! CLI wrapper backend: shells out to an image-to-text command line
//! tool, argv-only (`docpipe_utils::process::CommandSpec`), the same
//! subprocess discipline `xchecker-runner` uses for invoking the Claude
//! CLI.

use crate::backend::{OcrBackend, PageImage};
use async_trait::async_trait;
use docpipe_types::OcrPage;
use docpipe_utils::process::{self, CommandSpec};
use docpipe_utils::{DocpipeError, Result};
use std::path::PathBuf;
use std::time::Duration;

pub struct CliOcrBackend {
    executable: PathBuf,
    timeout: Duration,
}

impl CliOcrBackend {
    #[must_use]
    pub fn new(executable: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            executable: executable.into(),
            timeout,
        }
    }
}

#[async_trait]
impl OcrBackend for CliOcrBackend {
    async fn recognize(&self, page: &PageImage) -> Result<OcrPage> {
        let tmp = tempfile::Builder::new()
            .suffix(".img")
            .tempfile()
            .map_err(DocpipeError::Io)?;
        std::fs::write(tmp.path(), &page.bytes).map_err(DocpipeError::Io)?;

        let cmd = CommandSpec::new(&self.executable)
            .arg("--input")
            .arg(tmp.path())
            .arg("--format")
            .arg("json");

        let output = process::run(&cmd, self.timeout)
            .await
            .map_err(DocpipeError::Io)?;

        if output.timed_out {
            return Err(DocpipeError::Ocr(format!(
                "OCR CLI timed out after {:?}",
                self.timeout
            )));
        }
        if !output.success() {
            return Err(DocpipeError::Ocr(format!(
                "OCR CLI exited with {:?}: {}",
                output.exit_code,
                output.stderr_string()
            )));
        }

        let parsed: CliOutput = serde_json::from_str(&output.stdout_string())
            .map_err(|e| DocpipeError::Ocr(format!("malformed OCR CLI output: {e}")))?;

        let boxes: Vec<_> = parsed.boxes.into_iter().map(Into::into).collect();
        let text = boxes
            .iter()
            .map(|b: &docpipe_types::job::OcrTextBox| b.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        let average_confidence = if boxes.is_empty() {
            0.0
        } else {
            boxes.iter().map(|b| b.confidence).sum::<f32>() / boxes.len() as f32
        };

        Ok(OcrPage {
            page_number: page.page_number,
            text,
            boxes,
            average_confidence,
        })
    }

    fn name(&self) -> &'static str {
        "cli"
    }
}

#[derive(serde::Deserialize)]
struct CliOutput {
    boxes: Vec<CliBox>,
}

#[derive(serde::Deserialize)]
struct CliBox {
    text: String,
    confidence: f32,
    x: u32,
    y: u32,
    width: u32,
    height: u32,
}

impl From<CliBox> for docpipe_types::job::OcrTextBox {
    fn from(b: CliBox) -> Self {
        Self {
            text: b.text,
            confidence: b.confidence,
            bbox: (b.x, b.y, b.width, b.height),
        }
    }
}
