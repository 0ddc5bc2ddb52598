//! Source modules and code locations.
//!
//! A location is `module × (line,col)–(line,col)`; error reporting quotes
//! the offending line with a caret underline.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A single loaded source module.
#[derive(Debug, Clone)]
pub struct SourceModule {
    /// Module name (usually the file stem).
    pub name: String,
    /// Path the module was loaded from, if any.
    pub path: Option<String>,
    /// Full UTF-8 source text.
    pub text: String,
}

impl SourceModule {
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: None,
            text: text.into(),
        }
    }

    /// The 1-based `line`, without its terminator.
    pub fn line(&self, line: u32) -> Option<&str> {
        self.text.lines().nth(line.saturating_sub(1) as usize)
    }
}

/// A point in a source module, 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CodePoint {
    pub line: u32,
    pub column: u32,
}

impl CodePoint {
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for CodePoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// A half-open range of source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CodeRange {
    pub start: CodePoint,
    pub end: CodePoint,
}

impl CodeRange {
    pub fn new(start: CodePoint, end: CodePoint) -> Self {
        Self { start, end }
    }

    pub fn point(line: u32, column: u32) -> Self {
        let p = CodePoint::new(line, column);
        Self { start: p, end: p }
    }

    pub fn is_dummy(&self) -> bool {
        self.start.line == 0
    }

    pub fn merge(self, other: CodeRange) -> CodeRange {
        let start = if (other.start.line, other.start.column) < (self.start.line, self.start.column)
        {
            other.start
        } else {
            self.start
        };
        let end = if (other.end.line, other.end.column) > (self.end.line, self.end.column) {
            other.end
        } else {
            self.end
        };
        CodeRange { start, end }
    }
}

impl fmt::Display for CodeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}-{}", self.start, self.end)
        }
    }
}

/// The quoted source line and caret underline for `range`, when the range
/// falls inside the module.
pub fn snippet(module: &SourceModule, range: CodeRange) -> Option<(String, String)> {
    let line = module.line(range.start.line)?;
    let start_col = range.start.column.max(1) as usize;
    let end_col = if range.end.line == range.start.line && range.end.column >= range.start.column {
        range.end.column as usize
    } else {
        line.chars().count().max(start_col)
    };
    let mut underline = String::new();
    for _ in 1..start_col {
        underline.push(' ');
    }
    for _ in start_col..=end_col.max(start_col) {
        underline.push('^');
    }
    Some((line.to_string(), underline))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snippet_underline() {
        let m = SourceModule::new("m", "x = y + 1;\n");
        let range = CodeRange::new(CodePoint::new(1, 5), CodePoint::new(1, 5));
        let (line, caret) = snippet(&m, range).unwrap();
        assert_eq!(line, "x = y + 1;");
        assert_eq!(caret, "    ^");
    }

    #[test]
    fn test_merge() {
        let a = CodeRange::new(CodePoint::new(1, 4), CodePoint::new(1, 6));
        let b = CodeRange::new(CodePoint::new(1, 2), CodePoint::new(1, 5));
        let m = a.merge(b);
        assert_eq!(m.start.column, 2);
        assert_eq!(m.end.column, 6);
    }
}
