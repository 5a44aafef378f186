//! Splits one normalised source line into a command and its arguments.
//!
//! Scanning helpers here are shared by every component that looks for
//! structure in raw text: they skip double-quoted strings (honouring
//! backslash escapes) and, where asked, anything nested inside parentheses.

use std::str::CharIndices;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LineForm {
    /// `type.name = value`
    Assign,
    /// `command(arg, arg)`
    Call,
    /// `command arg arg`
    Words,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandLine {
    pub command: String,
    pub args: Vec<String>,
    pub form: LineForm,
    /// Raw text after the command word, for commands that take a whole
    /// expression (`video++ a + b`).
    pub rest: String,
}

/// Tokenizes a trimmed line. Never fails: malformed input produces a
/// best-effort command and leaves the complaint to whoever runs it.
pub fn tokenize(line: &str) -> CommandLine {
    let line = line.trim();

    if let Some(idx) = find_assignment(line) {
        let target = line[..idx].trim();
        let value = line[idx + 1..].trim();
        let command = if target.contains('.') {
            target.to_string()
        } else {
            format!("str.{target}")
        };
        return CommandLine {
            command,
            args: vec![value.to_string()],
            form: LineForm::Assign,
            rest: value.to_string(),
        };
    }

    if let Some(open) = find_top_level(line, "(") {
        let command = line[..open].trim();
        if !command.is_empty() && !command.contains(char::is_whitespace) {
            let close = matching_paren(line, open).unwrap_or(line.len());
            let inner = &line[open + 1..close];
            return CommandLine {
                command: command.to_string(),
                args: split_top_level(inner, ','),
                form: LineForm::Call,
                rest: inner.trim().to_string(),
            };
        }
    }

    let mut words = split_words(line).into_iter();
    let command = words.next().unwrap_or_default();
    let rest = line[command.len().min(line.len())..].trim().to_string();
    CommandLine {
        command,
        args: words.collect(),
        form: LineForm::Words,
        rest,
    }
}

/// A `=` outside strings and parentheses that is not part of a comparison
/// or compound-assignment operator.
pub fn find_assignment(line: &str) -> Option<usize> {
    let bytes = line.as_bytes();
    TopLevel::new(line)
        .filter(|(_, ch)| *ch == '=')
        .map(|(idx, _)| idx)
        .find(|&idx| {
            let before = idx.checked_sub(1).map(|i| bytes[i]);
            let after = bytes.get(idx + 1).copied();
            !matches!(before, Some(b'=' | b'!' | b'<' | b'>' | b'+' | b'-'))
                && after != Some(b'=')
        })
}

/// Byte offset of the first occurrence of `needle` outside string literals
/// and outside any parentheses.
pub fn find_top_level(text: &str, needle: &str) -> Option<usize> {
    TopLevel::new(text)
        .map(|(idx, _)| idx)
        .find(|&idx| text[idx..].starts_with(needle))
}

/// Byte offset of the `)` closing the `(` at `open`.
pub fn matching_paren(text: &str, open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (idx, ch, quoted) in QuoteAware::new(&text[open..]) {
        if quoted {
            continue;
        }
        match ch {
            '(' => depth += 1,
            ')' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(open + idx);
                }
            }
            _ => {}
        }
    }
    None
}

/// Splits on `separator` where it appears outside strings and parentheses.
/// Pieces are trimmed; blank input yields no pieces.
pub fn split_top_level(text: &str, separator: char) -> Vec<String> {
    if text.trim().is_empty() {
        return Vec::new();
    }
    let mut pieces = Vec::new();
    let mut start = 0;
    for (idx, ch) in TopLevel::new(text) {
        if ch == separator {
            pieces.push(text[start..idx].trim().to_string());
            start = idx + ch.len_utf8();
        }
    }
    pieces.push(text[start..].trim().to_string());
    pieces
}

/// Whitespace split that keeps quoted strings in one word.
pub fn split_words(text: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    for (_, ch, quoted) in QuoteAware::new(text) {
        if ch.is_whitespace() && !quoted {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
        } else {
            current.push(ch);
        }
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}

pub fn unquote(text: &str) -> &str {
    crate::runtime::value::strip_quotes(text.trim())
}

/// Characters of `text`, each flagged with whether it belongs to a string
/// literal. The delimiting quotes themselves count as quoted.
pub struct QuoteAware<'a> {
    chars: CharIndices<'a>,
    in_string: bool,
    escaped: bool,
}

impl<'a> QuoteAware<'a> {
    pub fn new(text: &'a str) -> Self {
        Self {
            chars: text.char_indices(),
            in_string: false,
            escaped: false,
        }
    }
}

impl Iterator for QuoteAware<'_> {
    type Item = (usize, char, bool);

    fn next(&mut self) -> Option<Self::Item> {
        let (idx, ch) = self.chars.next()?;
        if self.in_string {
            if self.escaped {
                self.escaped = false;
            } else if ch == '\\' {
                self.escaped = true;
            } else if ch == '"' {
                self.in_string = false;
            }
            return Some((idx, ch, true));
        }
        if ch == '"' {
            self.in_string = true;
            return Some((idx, ch, true));
        }
        Some((idx, ch, false))
    }
}

/// Characters outside string literals at parenthesis depth zero. An opening
/// `(` at depth zero is yielded, as is the `)` that brings depth back to zero.
struct TopLevel<'a> {
    inner: QuoteAware<'a>,
    depth: usize,
}

impl<'a> TopLevel<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            inner: QuoteAware::new(text),
            depth: 0,
        }
    }
}

impl Iterator for TopLevel<'_> {
    type Item = (usize, char);

    fn next(&mut self) -> Option<Self::Item> {
        for (idx, ch, quoted) in self.inner.by_ref() {
            if quoted {
                continue;
            }
            match ch {
                '(' => {
                    self.depth += 1;
                    if self.depth == 1 {
                        return Some((idx, ch));
                    }
                }
                ')' => {
                    self.depth = self.depth.saturating_sub(1);
                    if self.depth == 0 {
                        return Some((idx, ch));
                    }
                }
                _ if self.depth == 0 => return Some((idx, ch)),
                _ => {}
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn typed_declaration() {
        let line = tokenize("int.count = a + 1");
        assert_eq!(line.form, LineForm::Assign);
        assert_eq!(line.command, "int.count");
        assert_eq!(line.args, vec!["a + 1".to_string()]);
    }

    #[test]
    fn untyped_declaration_defaults_to_string() {
        let line = tokenize("name = \"flare\"");
        assert_eq!(line.command, "str.name");
        assert_eq!(line.args, vec!["\"flare\"".to_string()]);
    }

    #[test]
    fn comparison_is_not_assignment() {
        assert_eq!(find_assignment("a == b"), None);
        assert_eq!(find_assignment("a != b"), None);
        assert_eq!(find_assignment("a <= b"), None);
        assert_eq!(find_assignment("i += 2"), None);
        assert_eq!(find_assignment("video++ \"x = y\""), None);
        assert_eq!(find_assignment("str.flag = a == b"), Some(9));
    }

    #[test]
    fn call_arguments_split_on_top_level_commas() {
        let line = tokenize("libcall(math, add, f(1, 2), \"a, b\")");
        assert_eq!(line.form, LineForm::Call);
        assert_eq!(line.command, "libcall");
        assert_eq!(
            line.args,
            vec![
                "math".to_string(),
                "add".to_string(),
                "f(1, 2)".to_string(),
                "\"a, b\"".to_string(),
            ]
        );
    }

    #[test]
    fn empty_call_has_no_arguments() {
        let line = tokenize("arch()");
        assert_eq!(line.command, "arch");
        assert!(line.args.is_empty());
    }

    #[test]
    fn space_separated_words_keep_quotes_together() {
        let line = tokenize("video++ \"hello world\" now");
        assert_eq!(line.form, LineForm::Words);
        assert_eq!(line.command, "video++");
        assert_eq!(
            line.args,
            vec!["\"hello world\"".to_string(), "now".to_string()]
        );
        assert_eq!(line.rest, "\"hello world\" now");
    }

    #[test]
    fn whitespace_before_paren_means_words() {
        let line = tokenize("video++ total(3)");
        assert_eq!(line.form, LineForm::Words);
        assert_eq!(line.rest, "total(3)");
    }

    #[test]
    fn paren_matching_skips_strings() {
        let text = "f(\")\", g(x))";
        assert_eq!(matching_paren(text, 1), Some(text.len() - 1));
        assert_eq!(find_top_level("a(b + c) + d", "+"), Some(9));
    }

    #[test]
    fn escaped_quote_stays_inside_string() {
        let words = split_words(r#""say \"hi\"" next"#);
        assert_eq!(words, vec![r#""say \"hi\"""#.to_string(), "next".to_string()]);
    }
}
