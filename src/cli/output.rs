use crate::cli::args::OutputFormat;
use owo_colors::OwoColorize;
use serde_json::Value;
use std::fmt::Write;
use std::path::{Path, PathBuf};
use tsbridge::Event;

pub struct OutputFormatter {
    format: OutputFormat,
    color: bool,
    cwd: PathBuf,
}

/// `line:offset` of a tsserver `{ "line": .., "offset": .. }` location.
fn position(location: &Value) -> String {
    let line = location.get("line").and_then(Value::as_u64).unwrap_or(0);
    let offset = location.get("offset").and_then(Value::as_u64).unwrap_or(0);
    format!("{line}:{offset}")
}

impl OutputFormatter {
    pub fn new(format: OutputFormat) -> Self {
        let color = supports_color::on(supports_color::Stream::Stdout).is_some();
        Self::with_color(format, color)
    }

    pub fn with_color(format: OutputFormat, color: bool) -> Self {
        Self { format, color, cwd: std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/")) }
    }

    fn json(body: &Value) -> String {
        serde_json::to_string_pretty(body).unwrap_or_else(|_| "null".to_string())
    }

    fn display_path(&self, file: &str) -> String {
        match Path::new(file).strip_prefix(&self.cwd) {
            Ok(rel) => rel.display().to_string(),
            Err(_) => file.to_string(),
        }
    }

    fn span(&self, span: &Value) -> String {
        let file = span.get("file").and_then(Value::as_str).unwrap_or("<unknown>");
        let start = span.get("start").map(position).unwrap_or_else(|| "?".to_string());
        format!("{}:{start}", self.display_path(file))
    }

    pub fn format_quickinfo(&self, body: &Value, query_info: &str) -> String {
        if let OutputFormat::Json = self.format {
            return Self::json(body);
        }
        let Some(display) = body.get("displayString").and_then(Value::as_str) else {
            return format!("No type information for: {query_info}");
        };

        let mut output = display.to_string();
        if let Some(docs) = body.get("documentation").and_then(Value::as_str) {
            if !docs.is_empty() {
                let _ = write!(output, "\n\n{docs}");
            }
        }
        output
    }

    pub fn format_definitions(&self, body: &Value, query_info: &str) -> String {
        if let OutputFormat::Json = self.format {
            return Self::json(body);
        }
        let spans = body.as_array().map(Vec::as_slice).unwrap_or_default();
        if spans.is_empty() {
            return format!("No definitions found for: {query_info}");
        }

        let mut output = format!("Found {} definition(s) for: {query_info}\n\n", spans.len());
        for (i, span) in spans.iter().enumerate() {
            let _ = writeln!(output, "{}. {}", i + 1, self.span(span));
        }
        output.trim_end().to_string()
    }

    pub fn format_references(&self, body: &Value, query_info: &str) -> String {
        if let OutputFormat::Json = self.format {
            return Self::json(body);
        }
        let refs =
            body.get("refs").and_then(Value::as_array).map(Vec::as_slice).unwrap_or_default();
        if refs.is_empty() {
            return format!("No references found for: {query_info}");
        }

        let mut output = format!("Found {} reference(s) for: {query_info}\n\n", refs.len());
        for reference in refs {
            let _ = writeln!(output, "{}", self.span(reference));
            if let Some(text) = reference.get("lineText").and_then(Value::as_str) {
                let _ = writeln!(output, "   {}", text.trim());
            }
        }
        output.trim_end().to_string()
    }

    pub fn format_diagnostics(&self, events: &[Event]) -> String {
        if let OutputFormat::Json = self.format {
            let bodies: Vec<Value> = events
                .iter()
                .map(|event| {
                    serde_json::json!({
                        "kind": event.name,
                        "file": event.body.as_ref().and_then(|b| b.get("file")),
                        "diagnostics": event.body.as_ref().and_then(|b| b.get("diagnostics")),
                    })
                })
                .collect();
            return Self::json(&Value::Array(bodies));
        }

        let mut output = String::new();
        let mut total = 0;
        for event in events {
            let Some(body) = &event.body else { continue };
            let file = body.get("file").and_then(Value::as_str).unwrap_or("<unknown>");
            let diagnostics = body
                .get("diagnostics")
                .and_then(Value::as_array)
                .map(Vec::as_slice)
                .unwrap_or_default();

            for diagnostic in diagnostics {
                total += 1;
                let start = diagnostic.get("start").map(position).unwrap_or_default();
                let category =
                    diagnostic.get("category").and_then(Value::as_str).unwrap_or("error");
                let code = diagnostic.get("code").and_then(Value::as_u64);
                let text = diagnostic.get("text").and_then(Value::as_str).unwrap_or_default();

                let label = match code {
                    Some(code) => format!("{category} TS{code}"),
                    None => category.to_string(),
                };
                let label = if !self.color {
                    label
                } else if category == "error" {
                    label.red().bold().to_string()
                } else {
                    label.yellow().to_string()
                };
                let _ = writeln!(output, "{}:{start} {label}: {text}", self.display_path(file));
            }
        }

        if total == 0 {
            return "No diagnostics.".to_string();
        }
        output.trim_end().to_string()
    }

    pub fn format_raw(&self, body: &Value) -> String {
        Self::json(body)
    }
}
