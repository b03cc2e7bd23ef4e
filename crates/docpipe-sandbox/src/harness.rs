//! The fixed wrapper script every pipeline's user body is embedded
//! into, ported from `pipeline_service.py`'s `SCRIPT_TEMPLATE`: it reads
//! the input JSON file from `argv[1]`, binds `task_id`/`extracted_data`/
//! `ocr_text`/`meta_info` from it, runs the user's script body with
//! those names in scope, and writes `{success, output_data,
//! error_message}` to the output JSON file at `argv[2]`.

const TEMPLATE_HEAD: &str = r#"
import sys
import json
import traceback

input_file = sys.argv[1]
output_file = sys.argv[2]

with open(input_file, "r", encoding="utf-8") as f:
    input_data = json.load(f)

task_id = input_data.get("task_id")
extracted_data = input_data.get("extracted_data", {})
ocr_text = input_data.get("ocr_text", "")
meta_info = input_data.get("meta_info", {})

output_data = None
error_message = None

try:
"#;

const TEMPLATE_TAIL: &str = r#"
except Exception as e:
    error_message = str(e)
    traceback.print_exc()

result = {
    "success": error_message is None,
    "output_data": output_data,
    "error_message": error_message,
}

with open(output_file, "w", encoding="utf-8") as f:
    json.dump(result, f, ensure_ascii=False, indent=2)
"#;

/// Wrap `user_script` (the operator-authored pipeline body, expected to
/// assign to `output_data`) in the fixed harness, indenting it under the
/// harness's `try:` block the same way the source does.
#[must_use]
pub fn wrap(user_script: &str) -> String {
    let indented: String = user_script
        .lines()
        .map(|line| {
            if line.trim().is_empty() {
                line.to_string()
            } else {
                format!("    {line}")
            }
        })
        .collect::<Vec<_>>()
        .join("\n");

    format!("{TEMPLATE_HEAD}{indented}\n{TEMPLATE_TAIL}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indents_every_non_blank_line() {
        let wrapped = wrap("output_data = {\"total\": extracted_data[\"total\"]}");
        assert!(wrapped.contains("    output_data = {\"total\": extracted_data[\"total\"]}"));
    }

    #[test]
    fn preserves_blank_lines_unindented() {
        let wrapped = wrap("a = 1\n\nb = 2");
        assert!(wrapped.contains("\n\n"));
    }
}
