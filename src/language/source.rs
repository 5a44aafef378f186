use crate::language::blocks::BlockTable;
use crate::language::statement::{self, Statement};
use crate::language::tokenizer::QuoteAware;

/// One normalised statement line and the 1-based script line it came from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Line {
    pub number: usize,
    pub text: String,
}

impl AsRef<str> for Line {
    fn as_ref(&self) -> &str {
        &self.text
    }
}

/// A loaded script (or function body): normalised lines, their parsed
/// statements, and the block-span table, all computed once.
#[derive(Debug, Default)]
pub struct Source {
    lines: Vec<Line>,
    statements: Vec<Result<Statement, String>>,
    blocks: BlockTable,
}

impl Source {
    pub fn parse(text: &str) -> Self {
        let mut lines = Vec::new();
        for (idx, raw) in text.lines().enumerate() {
            for piece in normalize_line(raw) {
                lines.push(Line {
                    number: idx + 1,
                    text: piece,
                });
            }
        }
        Self::from_lines(lines)
    }

    /// Builds from lines that are already normalised.
    pub fn from_lines(lines: Vec<Line>) -> Self {
        let statements = lines
            .iter()
            .map(|line| statement::classify(&line.text))
            .collect();
        let blocks = BlockTable::build(&lines);
        Self {
            lines,
            statements,
            blocks,
        }
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn lines(&self) -> &[Line] {
        &self.lines
    }

    pub fn line(&self, idx: usize) -> Option<&Line> {
        self.lines.get(idx)
    }

    pub fn statement(&self, idx: usize) -> Option<&Result<Statement, String>> {
        self.statements.get(idx)
    }

    pub fn blocks(&self) -> &BlockTable {
        &self.blocks
    }

    /// Whether the script opts into dynamic mode with a `dynamic = true` line.
    pub fn declares_dynamic(&self) -> bool {
        self.lines.iter().any(|line| {
            let compact: String = line.text.split_whitespace().collect();
            compact == "dynamic=true"
        })
    }
}

/// Drops a trailing comment and splits the line so that every `{` ends a
/// line and every `}` starts one. `} else …` stays together.
pub fn normalize_line(raw: &str) -> Vec<String> {
    let text = strip_comment(raw);
    let mut pieces = Vec::new();
    let mut current = String::new();
    for (idx, ch, quoted) in QuoteAware::new(text) {
        if quoted {
            current.push(ch);
            continue;
        }
        match ch {
            '{' => {
                current.push('{');
                push_piece(&mut pieces, &mut current);
            }
            '}' => {
                push_piece(&mut pieces, &mut current);
                current.push('}');
                if !starts_with_else(text[idx + 1..].trim_start()) {
                    push_piece(&mut pieces, &mut current);
                }
            }
            _ => current.push(ch),
        }
    }
    push_piece(&mut pieces, &mut current);
    pieces
}

fn push_piece(pieces: &mut Vec<String>, current: &mut String) {
    let piece = current.trim();
    if !piece.is_empty() {
        pieces.push(piece.to_string());
    }
    current.clear();
}

fn starts_with_else(text: &str) -> bool {
    text.strip_prefix("else")
        .is_some_and(|rest| rest.is_empty() || rest.starts_with([' ', '{', '(', '\t']))
}

pub fn strip_comment(line: &str) -> &str {
    for (idx, ch, quoted) in QuoteAware::new(line) {
        if ch == '#' && !quoted {
            return &line[..idx];
        }
    }
    line
}
