use std::cmp::Ordering;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosticLocation {
    pub file: PathBuf,
    /// Byte offset into the file.
    pub start: usize,
    pub length: usize,
    /// 1-based.
    pub line: usize,
    /// 1-based.
    pub column: usize,
}

impl DiagnosticLocation {
    /// Build a location from a byte span, computing line and column from the source text.
    pub fn from_span(file: impl Into<PathBuf>, source: &str, start: usize, length: usize) -> Self {
        let (line, column) = line_column(source, start);
        Self {
            file: file.into(),
            start,
            length,
            line,
            column,
        }
    }
}

/// A message with optional nested detail, flattened for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageChain {
    pub text: String,
    pub next: Vec<MessageChain>,
}

impl MessageChain {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            next: Vec::new(),
        }
    }

    pub fn with_next(mut self, next: MessageChain) -> Self {
        self.next.push(next);
        self
    }

    pub fn flatten(&self, separator: &str) -> String {
        let mut out = String::new();
        self.flatten_into(separator, 0, &mut out);
        out
    }

    fn flatten_into(&self, separator: &str, depth: usize, out: &mut String) {
        if depth > 0 {
            out.push_str(separator);
            out.push_str(&"  ".repeat(depth));
        }
        out.push_str(&self.text);
        for next in &self.next {
            next.flatten_into(separator, depth + 1, out);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub location: Option<DiagnosticLocation>,
    pub message: MessageChain,
    pub code: u32,
}

impl Diagnostic {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            location: None,
            message: MessageChain::new(message),
            code: 0,
        }
    }

    pub fn at(mut self, location: DiagnosticLocation) -> Self {
        self.location = Some(location);
        self
    }

    pub fn with_code(mut self, code: u32) -> Self {
        self.code = code;
        self
    }

    pub fn message_text(&self) -> String {
        self.message.flatten("\n")
    }

    /// `"<checker>: <file> (<line>,<col>): <message>"`, or `"<checker>: <message>"` without a location.
    pub fn format(&self, checker: &str) -> String {
        match &self.location {
            Some(location) => format!(
                "{}: {} ({},{}): {}",
                checker,
                location.file.display(),
                location.line,
                location.column,
                self.message_text()
            ),
            None => format!("{}: {}", checker, self.message_text()),
        }
    }

    fn compare(&self, other: &Self) -> Ordering {
        let file = |d: &Self| d.location.as_ref().map(|l| l.file.clone());
        let start = |d: &Self| d.location.as_ref().map(|l| l.start);
        let length = |d: &Self| d.location.as_ref().map(|l| l.length);
        file(self)
            .cmp(&file(other))
            .then_with(|| start(self).cmp(&start(other)))
            .then_with(|| length(self).cmp(&length(other)))
            .then_with(|| self.code.cmp(&other.code))
            .then_with(|| self.message_text().cmp(&other.message_text()))
    }
}

/// Sort by file, position, length, code and message, then drop exact duplicates.
pub fn sort_and_deduplicate(mut diagnostics: Vec<Diagnostic>) -> Vec<Diagnostic> {
    diagnostics.sort_by(|a, b| a.compare(b));
    diagnostics.dedup_by(|a, b| a.compare(b) == Ordering::Equal);
    diagnostics
}

/// 1-based line and column of a byte offset. Columns count characters.
pub fn line_column(source: &str, offset: usize) -> (usize, usize) {
    let offset = offset.min(source.len());
    let before = source.get(..offset).unwrap_or(source);
    let line = before.matches('\n').count() + 1;
    let line_start = before.rfind('\n').map(|i| i + 1).unwrap_or(0);
    let column = before[line_start..].chars().count() + 1;
    (line, column)
}
