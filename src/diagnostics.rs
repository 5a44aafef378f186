use miette::{Diagnostic, NamedSource, Report, SourceSpan};
use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Record {
    pub severity: Severity,
    pub message: String,
    /// 1-based script line, when the report came from a running statement.
    pub line: Option<usize>,
}

#[derive(Debug, Error, Diagnostic)]
#[error("{message}")]
struct ScriptError {
    #[source_code]
    src: Option<NamedSource<String>>,
    #[label("raised here")]
    span: Option<SourceSpan>,
    message: String,
}

#[derive(Debug, Error, Diagnostic)]
#[error("{message}")]
#[diagnostic(severity(Warning))]
struct ScriptWarning {
    #[source_code]
    src: Option<NamedSource<String>>,
    #[label("raised here")]
    span: Option<SourceSpan>,
    message: String,
}

/// Collects every error and warning a script produces, echoing them to
/// stderr as miette reports when asked to.
#[derive(Debug, Default)]
pub struct Diagnostics {
    records: Vec<Record>,
    echo: bool,
    script: Option<(String, String)>,
}

impl Diagnostics {
    pub fn new(echo: bool) -> Self {
        Self {
            echo,
            ..Self::default()
        }
    }

    /// Script text used to label reports with the offending line.
    pub fn set_script(&mut self, name: impl Into<String>, text: impl Into<String>) {
        self.script = Some((name.into(), text.into()));
    }

    pub fn set_echo(&mut self, echo: bool) {
        self.echo = echo;
    }

    pub fn error(&mut self, message: impl Into<String>, line: Option<usize>) {
        self.push(Severity::Error, message.into(), line);
    }

    pub fn warning(&mut self, message: impl Into<String>, line: Option<usize>) {
        self.push(Severity::Warning, message.into(), line);
    }

    fn push(&mut self, severity: Severity, message: String, line: Option<usize>) {
        let record = Record {
            severity,
            message,
            line,
        };
        if self.echo {
            self.render(&record);
        }
        self.records.push(record);
    }

    fn render(&self, record: &Record) {
        let (src, span) = match (&self.script, record.line) {
            (Some((name, text)), Some(line)) => (
                Some(NamedSource::new(name.clone(), text.clone())),
                line_span(text, line),
            ),
            _ => (None, None),
        };
        let message = record.message.clone();
        let report = match record.severity {
            Severity::Error => Report::new(ScriptError { src, span, message }),
            Severity::Warning => Report::new(ScriptWarning { src, span, message }),
        };
        eprintln!("{report:?}");
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn errors(&self) -> impl Iterator<Item = &Record> {
        self.records
            .iter()
            .filter(|record| record.severity == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Record> {
        self.records
            .iter()
            .filter(|record| record.severity == Severity::Warning)
    }

    pub fn has_errors(&self) -> bool {
        self.errors().next().is_some()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }
}

/// Byte span of the trimmed text on 1-based `line`.
fn line_span(text: &str, line: usize) -> Option<SourceSpan> {
    let mut offset = 0;
    for (idx, raw) in text.split_inclusive('\n').enumerate() {
        if idx + 1 == line {
            let content = raw.trim_end_matches(['\r', '\n']);
            let lead = content.len() - content.trim_start().len();
            let width = content.trim().len();
            return Some(SourceSpan::from((offset + lead, width)));
        }
        offset += raw.len();
    }
    None
}
