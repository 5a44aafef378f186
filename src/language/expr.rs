use nom::{
    IResult, Parser as NomParser,
    branch::alt,
    bytes::complete::take_while,
    character::complete::{char, digit1, multispace0, one_of, satisfy},
    combinator::{all_consuming, map, opt, recognize},
    error::{Error, ErrorKind},
    multi::{fold_many0, separated_list0},
    sequence::{delimited, pair, preceded},
};

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Numeric literal text; typed when evaluated.
    Number(String),
    /// String literal contents, escapes left as written.
    Str(String),
    Identifier(String),
    Neg(Box<Expr>),
    Binary {
        left: Box<Expr>,
        op: BinaryOp,
        right: Box<Expr>,
    },
    Call {
        name: String,
        args: Vec<Expr>,
    },
    MethodCall {
        object: String,
        method: String,
        args: Vec<Expr>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl BinaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
        }
    }

    fn from_char(ch: char) -> Self {
        match ch {
            '+' => BinaryOp::Add,
            '-' => BinaryOp::Sub,
            '*' => BinaryOp::Mul,
            _ => BinaryOp::Div,
        }
    }
}

impl Expr {
    fn binary(left: Expr, op: char, right: Expr) -> Self {
        Expr::Binary {
            left: Box::new(left),
            op: BinaryOp::from_char(op),
            right: Box::new(right),
        }
    }

    /// Bare names and string literals both name things (libraries,
    /// containers, keys).
    pub fn as_name(&self) -> Option<&str> {
        match self {
            Expr::Identifier(name) | Expr::Str(name) => Some(name.as_str()),
            _ => None,
        }
    }

    pub fn as_source(&self) -> String {
        match self {
            Expr::Number(text) => text.clone(),
            Expr::Str(text) => format!("\"{text}\""),
            Expr::Identifier(name) => name.clone(),
            Expr::Neg(inner) => format!("-{}", inner.as_source()),
            Expr::Binary { left, op, right } => {
                format!("{} {} {}", left.as_source(), op.symbol(), right.as_source())
            }
            Expr::Call { name, args } => format!("{name}({})", join_sources(args)),
            Expr::MethodCall {
                object,
                method,
                args,
            } => format!("{object}.{method}({})", join_sources(args)),
        }
    }
}

fn join_sources(args: &[Expr]) -> String {
    args.iter()
        .map(Expr::as_source)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Parses a whole expression. `None` when the text is not an expression at
/// all, which callers treat as a plain string.
pub fn parse_expression(text: &str) -> Option<Expr> {
    all_consuming(ws(sum))
        .parse(text)
        .ok()
        .map(|(_, expr)| expr)
}

fn ws<'a, O, F>(inner: F) -> impl FnMut(&'a str) -> IResult<&'a str, O>
where
    F: FnMut(&'a str) -> IResult<&'a str, O>,
{
    delimited(multispace0, inner, multispace0)
}

fn sum(input: &str) -> IResult<&str, Expr> {
    let (input, first) = product(input)?;
    fold_many0(
        pair(ws(one_of("+-")), product),
        move || first.clone(),
        |left, (op, right)| Expr::binary(left, op, right),
    )(input)
}

fn product(input: &str) -> IResult<&str, Expr> {
    let (input, first) = unary(input)?;
    fold_many0(
        pair(ws(one_of("*/")), unary),
        move || first.clone(),
        |left, (op, right)| Expr::binary(left, op, right),
    )(input)
}

fn unary(input: &str) -> IResult<&str, Expr> {
    alt((
        map(preceded(ws(char('-')), unary), |inner| {
            Expr::Neg(Box::new(inner))
        }),
        primary,
    ))
    .parse(input)
}

fn primary(input: &str) -> IResult<&str, Expr> {
    ws(alt((
        number,
        string_literal,
        delimited(char('('), ws(sum), char(')')),
        reference,
    )))(input)
}

fn number(input: &str) -> IResult<&str, Expr> {
    map(recognize(pair(digit1, opt(pair(char('.'), digit1)))), |text: &str| {
        Expr::Number(text.to_string())
    })
    .parse(input)
}

fn string_literal(input: &str) -> IResult<&str, Expr> {
    let (body, _) = char('"')(input)?;
    let mut escaped = false;
    for (idx, ch) in body.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' => escaped = true,
            '"' => return Ok((&body[idx + 1..], Expr::Str(body[..idx].to_string()))),
            _ => {}
        }
    }
    Err(nom::Err::Error(Error::new(input, ErrorKind::Char)))
}

fn identifier(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        satisfy(|ch| ch.is_ascii_alphabetic() || ch == '_'),
        take_while(|ch: char| ch.is_ascii_alphanumeric() || ch == '_'),
    ))
    .parse(input)
}

fn call_args(input: &str) -> IResult<&str, Vec<Expr>> {
    delimited(
        char('('),
        separated_list0(char(','), ws(sum)),
        preceded(multispace0, char(')')),
    )(input)
}

/// `name`, `name(args)` or `object.method(args)`.
fn reference(input: &str) -> IResult<&str, Expr> {
    let (input, first) = identifier(input)?;
    let (input, member) = opt(preceded(char('.'), identifier))(input)?;
    let (input, args) = opt(call_args)(input)?;
    let expr = match (member, args) {
        (None, None) => Expr::Identifier(first.to_string()),
        (None, Some(args)) => Expr::Call {
            name: first.to_string(),
            args,
        },
        (Some(method), Some(args)) => Expr::MethodCall {
            object: first.to_string(),
            method: method.to_string(),
            args,
        },
        (Some(_), None) => return Err(nom::Err::Error(Error::new(input, ErrorKind::Tag))),
    };
    Ok((input, expr))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn ident(name: &str) -> Expr {
        Expr::Identifier(name.into())
    }

    fn num(text: &str) -> Expr {
        Expr::Number(text.into())
    }

    #[test]
    fn subtraction_is_left_associative() {
        let expr = parse_expression("a - b - 1").expect("parses");
        assert_eq!(expr.as_source(), "a - b - 1");
        assert_eq!(
            expr,
            Expr::Binary {
                left: Box::new(Expr::Binary {
                    left: Box::new(ident("a")),
                    op: BinaryOp::Sub,
                    right: Box::new(ident("b")),
                }),
                op: BinaryOp::Sub,
                right: Box::new(num("1")),
            }
        );
    }

    #[test]
    fn multiplication_binds_tighter() {
        let expr = parse_expression("n * factorial(n - 1) + 2").expect("parses");
        match expr {
            Expr::Binary {
                op: BinaryOp::Add,
                left,
                ..
            } => match *left {
                Expr::Binary {
                    op: BinaryOp::Mul,
                    right,
                    ..
                } => assert_eq!(
                    *right,
                    Expr::Call {
                        name: "factorial".into(),
                        args: vec![Expr::Binary {
                            left: Box::new(ident("n")),
                            op: BinaryOp::Sub,
                            right: Box::new(num("1")),
                        }],
                    }
                ),
                other => panic!("unexpected left operand {other:?}"),
            },
            other => panic!("unexpected tree {other:?}"),
        }
    }

    #[test]
    fn negative_literals_and_parentheses() {
        assert_eq!(
            parse_expression("-5"),
            Some(Expr::Neg(Box::new(num("5"))))
        );
        assert!(matches!(
            parse_expression("(1 + 2) * 3"),
            Some(Expr::Binary { op: BinaryOp::Mul, left, .. })
                if matches!(*left, Expr::Binary { op: BinaryOp::Add, .. })
        ));
        assert_eq!(parse_expression("2.5"), Some(num("2.5")));
    }

    #[test]
    fn method_calls_and_strings() {
        assert_eq!(
            parse_expression("name.contains(\"la\")"),
            Some(Expr::MethodCall {
                object: "name".into(),
                method: "contains".into(),
                args: vec![Expr::Str("la".into())],
            })
        );
        assert_eq!(
            parse_expression("\"a + b\" + c"),
            Some(Expr::Binary {
                left: Box::new(Expr::Str("a + b".into())),
                op: BinaryOp::Add,
                right: Box::new(ident("c")),
            })
        );
        assert_eq!(
            parse_expression("flver()"),
            Some(Expr::Call {
                name: "flver".into(),
                args: Vec::new(),
            })
        );
    }

    #[test]
    fn non_expressions_are_rejected() {
        assert_eq!(parse_expression("hello world"), None);
        assert_eq!(parse_expression("a +"), None);
        assert_eq!(parse_expression("\"unterminated"), None);
        assert_eq!(parse_expression("obj.field"), None);
    }
}
