//! Rendered diagnostics: severity, message, source location, and the
//! offending line quoted with a caret underline.

use rill_core::location::{snippet, CodeRange, SourceModule};

/// Severity level for diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
    Note,
}

/// A rendered diagnostic with source context
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    pub file: Option<String>,
    pub line: Option<u32>,
    pub col: Option<u32>,
    pub source_line: Option<String>,
    pub underline: Option<String>,
}

impl Diagnostic {
    /// Attach the module name and quoted source line for `range`.
    pub fn error(message: impl Into<String>, module: &SourceModule, range: CodeRange) -> Self {
        let mut d = Diagnostic {
            severity: Severity::Error,
            message: message.into(),
            file: Some(module.name.clone()),
            line: None,
            col: None,
            source_line: None,
            underline: None,
        };
        if !range.is_dummy() {
            d.line = Some(range.start.line);
            d.col = Some(range.start.column);
            if let Some((line, underline)) = snippet(module, range) {
                d.source_line = Some(line);
                d.underline = Some(underline);
            }
        }
        d
    }

    /// Render without colors (for tests and piped output).
    pub fn render_plain(&self) -> String {
        let mut out = String::new();
        let label = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Note => "note",
        };
        out.push_str(&format!("{}: {}", label, self.message));
        out.push('\n');
        if let (Some(file), Some(line), Some(col)) = (&self.file, self.line, self.col) {
            out.push_str(&format!("  --> {}:{}:{}\n", file, line, col));
        }
        if let (Some(line_text), Some(underline)) = (&self.source_line, &self.underline) {
            let line_str = self.line.map(|l| l.to_string()).unwrap_or_default();
            out.push_str(&format!("  {} | {}\n", line_str, line_text));
            let spaces = " ".repeat(line_str.len());
            out.push_str(&format!("  {} | {}\n", spaces, underline));
        }
        out
    }

    /// Render with ANSI colors for the terminal.
    pub fn render_ansi(&self) -> String {
        let mut out = String::new();
        let (label, color) = match self.severity {
            Severity::Error => ("error", "\x1b[1;31m"),
            Severity::Warning => ("warning", "\x1b[1;33m"),
            Severity::Note => ("note", "\x1b[1;36m"),
        };
        out.push_str(&format!("{}{}\x1b[0m: {}\n", color, label, self.message));
        if let (Some(file), Some(line), Some(col)) = (&self.file, self.line, self.col) {
            out.push_str(&format!("  \x1b[90m-->\x1b[0m {}:{}:{}\n", file, line, col));
        }
        if let (Some(line_text), Some(underline)) = (&self.source_line, &self.underline) {
            let line_str = self.line.map(|l| l.to_string()).unwrap_or_default();
            out.push_str(&format!("  \x1b[90m{} |\x1b[0m {}\n", line_str, line_text));
            let spaces = " ".repeat(line_str.len());
            out.push_str(&format!("  {} \x1b[90m|\x1b[0m \x1b[31m{}\x1b[0m\n", spaces, underline));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rill_core::location::{CodePoint, SourceModule};

    #[test]
    fn test_render_plain_with_caret() {
        let module = SourceModule::new("demo", "f = [t: g[t]];\n");
        let range = CodeRange::new(CodePoint::new(1, 9), CodePoint::new(1, 9));
        let d = Diagnostic::error("undefined symbol 'g'", &module, range);
        let text = d.render_plain();
        assert!(text.contains("error: undefined symbol 'g'"));
        assert!(text.contains("demo:1:9"));
        assert!(text.contains("f = [t: g[t]];"));
        assert!(text.contains("        ^"));
    }
}
