use std::collections::HashMap;

/// Finds the end of a brace block whose body starts at `body_start` (the
/// line after the opening `{`). Returns the index one past the line holding
/// the matching `}`, or `None` when the block never closes.
///
/// Braces inside string literals and after a `#` comment marker are ignored.
pub fn find_block_end<S: AsRef<str>>(lines: &[S], body_start: usize) -> Option<usize> {
    let mut depth = 1usize;
    for (idx, line) in lines.iter().enumerate().skip(body_start) {
        for brace in braces(line.as_ref()) {
            match brace {
                Brace::Open => depth += 1,
                Brace::Close => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(idx + 1);
                    }
                }
            }
        }
    }
    None
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Brace {
    Open,
    Close,
}

fn braces(line: &str) -> Vec<Brace> {
    let mut found = Vec::new();
    let mut in_string = false;
    let mut escaped = false;
    for ch in line.chars() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '#' => break,
            '"' => in_string = true,
            '{' => found.push(Brace::Open),
            '}' => found.push(Brace::Close),
            _ => {}
        }
    }
    found
}

/// Opener line → closing line for every balanced block, computed in one
/// pass. A line such as `} else {` closes one block and opens the next.
#[derive(Clone, Debug, Default)]
pub struct BlockTable {
    closes: HashMap<usize, usize>,
    unclosed: Vec<usize>,
}

impl BlockTable {
    pub fn build<S: AsRef<str>>(lines: &[S]) -> Self {
        let mut table = Self::default();
        let mut open: Vec<usize> = Vec::new();
        for (idx, line) in lines.iter().enumerate() {
            for brace in braces(line.as_ref()) {
                match brace {
                    Brace::Open => open.push(idx),
                    Brace::Close => {
                        if let Some(opener) = open.pop() {
                            table.closes.insert(opener, idx);
                        }
                    }
                }
            }
        }
        table.unclosed = open;
        table
    }

    /// Index of the line closing the block opened on `opener`.
    pub fn close_of(&self, opener: usize) -> Option<usize> {
        self.closes.get(&opener).copied()
    }

    pub fn unclosed(&self) -> &[usize] {
        &self.unclosed
    }

    pub fn len(&self) -> usize {
        self.closes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.closes.is_empty()
    }
}
