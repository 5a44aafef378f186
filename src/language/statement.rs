use crate::language::tokenizer::{self, CommandLine, matching_paren, split_top_level};
use nom::{
    IResult, Parser as NomParser,
    branch::alt,
    bytes::complete::{tag, take_while},
    character::complete::{char, multispace0, multispace1, satisfy},
    combinator::{all_consuming, map, recognize, rest, verify},
    multi::separated_list0,
    sequence::{delimited, pair, preceded, tuple},
};

/// What a single normalised line means to the executor.
#[derive(Clone, Debug, PartialEq)]
pub enum Statement {
    Blank,
    /// A line starting with `}`; carries a trailing `else` clause if present.
    Close(Option<ElseClause>),
    Else(ElseClause),
    If {
        condition: String,
    },
    For {
        init: String,
        condition: String,
        increment: String,
    },
    While {
        condition: String,
    },
    Function {
        name: String,
        params: Vec<String>,
    },
    Return(Option<String>),
    Update(Update),
    Command(CommandLine),
}

/// `else { … }` (no condition) or `else if (cond) { … }`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ElseClause {
    pub condition: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Update {
    Increment(String),
    Decrement(String),
    AddAssign(String, String),
    SubAssign(String, String),
}

impl Update {
    pub fn target(&self) -> &str {
        match self {
            Update::Increment(name)
            | Update::Decrement(name)
            | Update::AddAssign(name, _)
            | Update::SubAssign(name, _) => name,
        }
    }
}

/// Classifies one line. Errors are syntax messages for block headers that
/// cannot be parsed.
pub fn classify(line: &str) -> Result<Statement, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(Statement::Blank);
    }
    if let Some(tail) = line.strip_prefix('}') {
        let tail = tail.trim();
        if tail.is_empty() {
            return Ok(Statement::Close(None));
        }
        return parse_else(tail).map(|clause| Statement::Close(Some(clause)));
    }
    if is_keyword(line, "else") {
        return parse_else(line).map(Statement::Else);
    }
    if is_keyword(line, "if") {
        let condition = block_header(line, "if")?;
        return Ok(Statement::If { condition });
    }
    if is_keyword(line, "while") {
        let condition = block_header(line, "while")?;
        return Ok(Statement::While { condition });
    }
    if is_keyword(line, "for") {
        let clauses = block_header(line, "for")?;
        let parts = split_top_level(&clauses, ';');
        let [init, condition, increment] = <[String; 3]>::try_from(parts).map_err(|_| {
            "for loop needs `init; condition; increment` clauses".to_string()
        })?;
        return Ok(Statement::For {
            init,
            condition,
            increment,
        });
    }
    if is_keyword(line, "function") {
        return function_header(line)
            .map(|(_, (name, params))| Statement::Function { name, params })
            .map_err(|_| format!("malformed function definition `{line}`"));
    }
    if is_keyword(line, "return") {
        let value = line["return".len()..].trim();
        return Ok(Statement::Return(
            (!value.is_empty()).then(|| value.to_string()),
        ));
    }
    if let Some(update) = parse_update(line) {
        return Ok(Statement::Update(update));
    }
    Ok(Statement::Command(tokenizer::tokenize(line)))
}

/// `line` is `word` alone or `word` followed by a space or `(`.
pub fn is_keyword(line: &str, word: &str) -> bool {
    line.strip_prefix(word)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with([' ', '\t', '(', '{']))
}

/// The text between the parentheses of `keyword (…) {`.
fn block_header(line: &str, keyword: &str) -> Result<String, String> {
    let after = line[keyword.len()..].trim_start();
    if !after.starts_with('(') {
        return Err(format!("expected `(` after `{keyword}`"));
    }
    let offset = line.len() - after.len();
    let close = matching_paren(line, offset)
        .ok_or_else(|| format!("unclosed `(` in `{keyword}` header"))?;
    if line[close + 1..].trim() != "{" {
        return Err(format!("expected `{{` after `{keyword}` header"));
    }
    Ok(line[offset + 1..close].trim().to_string())
}

fn parse_else(text: &str) -> Result<ElseClause, String> {
    if !is_keyword(text, "else") {
        return Err(format!("unexpected `{text}` after `}}`"));
    }
    let after = text["else".len()..].trim();
    if after == "{" {
        return Ok(ElseClause { condition: None });
    }
    if is_keyword(after, "if") {
        let condition = block_header(after, "if")?;
        return Ok(ElseClause {
            condition: Some(condition),
        });
    }
    Err("expected `{` or `if` after `else`".to_string())
}

fn identifier(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        satisfy(|ch| ch.is_ascii_alphabetic() || ch == '_'),
        take_while(|ch: char| ch.is_ascii_alphanumeric() || ch == '_'),
    ))
    .parse(input)
}

fn function_header(input: &str) -> IResult<&str, (String, Vec<String>)> {
    let params = separated_list0(
        delimited(multispace0, char(','), multispace0),
        map(identifier, str::to_string),
    );
    all_consuming(map(
        tuple((
            preceded(pair(tag("function"), multispace1), identifier),
            delimited(
                pair(multispace0, char('(')),
                delimited(multispace0, params, multispace0),
                char(')'),
            ),
            preceded(multispace0, char('{')),
        )),
        |(name, params, _)| (name.to_string(), params),
    ))
    .parse(input)
}

/// `name++`, `name--`, `name += expr` or `name -= expr`.
pub fn parse_update(line: &str) -> Option<Update> {
    let postfix = map(
        all_consuming(pair(
            identifier,
            preceded(multispace0, alt((tag("++"), tag("--")))),
        )),
        |(name, op)| match op {
            "++" => Update::Increment(name.to_string()),
            _ => Update::Decrement(name.to_string()),
        },
    );
    let compound = map(
        tuple((
            identifier,
            delimited(multispace0, alt((tag("+="), tag("-="))), multispace0),
            verify(rest, |value: &str| !value.trim().is_empty()),
        )),
        |(name, op, value): (&str, &str, &str)| match op {
            "+=" => Update::AddAssign(name.to_string(), value.trim().to_string()),
            _ => Update::SubAssign(name.to_string(), value.trim().to_string()),
        },
    );
    let (_, update) = alt((postfix, compound)).parse(line.trim()).ok()?;
    // `video++` alone is an output command, not an update.
    (update.target() != "video").then_some(update)
}
