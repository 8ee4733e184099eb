//! Text front end: a nom-based lexer and a recursive-descent parser.
//!
//! Source text is first split into [`Token`]s, then the token stream is turned into
//! [`Value`] trees. `true` and `false` become booleans, every other name stays an
//! identifier for the evaluator to resolve.

use nom::{
    IResult, Parser,
    bytes::complete::take_while1,
    character::complete::{char, digit0, digit1, multispace0},
    combinator::opt,
    sequence::pair,
};

use crate::ast::{FloatType, IntegerType, Value};
use crate::{Error, LexError, LexErrorKind, MAX_PARSE_DEPTH, ParseError, ParseErrorKind};

/// Characters besides alphanumerics that may appear in an identifier
const IDENTIFIER_SPECIAL_CHARS: &str = "+-*/<>=!?_$";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    OpenParen,
    CloseParen,
    Integer,
    Float,
    String,
    Identifier,
}

/// A lexed token. For strings, `text` is the unescaped content without quotes.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    /// Byte offset of the token's first character in the source
    pub offset: usize,
}

impl Token {
    pub fn new(kind: TokenKind, text: impl Into<String>, offset: usize) -> Self {
        Token {
            kind,
            text: text.into(),
            offset,
        }
    }
}

fn is_identifier_char(c: char) -> bool {
    c.is_alphanumeric() || IDENTIFIER_SPECIAL_CHARS.contains(c)
}

fn is_delimiter(c: char) -> bool {
    c.is_ascii_whitespace() || c == '(' || c == ')'
}

fn skip_whitespace(input: &str) -> &str {
    multispace0::<&str, nom::error::Error<&str>>
        .parse(input)
        .map_or(input, |(rest, _)| rest)
}

/// Optional minus, digits, then an optional `.` with optional digits
///
/// The token text is the consumed prefix of `input`, so the fraction is kept
/// when the number ends the source.
fn lex_number(input: &str) -> IResult<&str, &str> {
    let parsed: IResult<&str, _> =
        (opt(char('-')), digit1, opt(pair(char('.'), digit0))).parse(input);
    let (rest, _) = parsed?;
    Ok((rest, &input[..input.len() - rest.len()]))
}

fn lex_identifier(input: &str) -> IResult<&str, &str> {
    take_while1(is_identifier_char).parse(input)
}

/// Lex a string literal starting at the opening quote of `input`
fn lex_string<'a>(source: &str, input: &'a str) -> Result<(&'a str, String), Error> {
    let start = source.len() - input.len();
    let mut content = String::new();
    let mut chars = input.char_indices().skip(1);

    while let Some((index, ch)) = chars.next() {
        match ch {
            '"' => return Ok((&input[index + 1..], content)),
            '\\' => match chars.next() {
                Some((_, 'n')) => content.push('\n'),
                Some((_, 't')) => content.push('\t'),
                Some((_, 'r')) => content.push('\r'),
                Some((_, '\\')) => content.push('\\'),
                Some((_, '"')) => content.push('"'),
                Some((_, other)) => {
                    return Err(LexError::with_context(
                        LexErrorKind::InvalidEscape(other),
                        source,
                        start + index,
                    )
                    .into());
                }
                None => break,
            },
            other => content.push(other),
        }
    }

    Err(LexError::with_context(LexErrorKind::UnterminatedString, source, start).into())
}

/// Classify a lexed number, rejecting trailing junk and out-of-range integers
fn number_kind(source: &str, number: &str, rest: &str, offset: usize) -> Result<TokenKind, Error> {
    let malformed = |text: &str| -> Error {
        LexError::with_context(
            LexErrorKind::MalformedNumber(text.to_owned()),
            source,
            offset,
        )
        .into()
    };

    if rest.chars().next().is_some_and(|next| !is_delimiter(next)) {
        let junk = rest.find(is_delimiter).unwrap_or(rest.len());
        return Err(malformed(&source[offset..offset + number.len() + junk]));
    }

    if number.contains('.') {
        number
            .parse::<FloatType>()
            .map_err(|_| malformed(number))?;
        Ok(TokenKind::Float)
    } else {
        number
            .parse::<IntegerType>()
            .map_err(|_| malformed(number))?;
        Ok(TokenKind::Integer)
    }
}

/// Split source text into tokens
pub fn lex(source: &str) -> Result<Vec<Token>, Error> {
    let mut tokens = Vec::new();
    let mut remaining = skip_whitespace(source);

    while let Some(first) = remaining.chars().next() {
        let offset = source.len() - remaining.len();

        let (rest, token) = match first {
            '(' => (&remaining[1..], Token::new(TokenKind::OpenParen, "(", offset)),
            ')' => (&remaining[1..], Token::new(TokenKind::CloseParen, ")", offset)),
            '"' => {
                let (rest, content) = lex_string(source, remaining)?;
                (rest, Token::new(TokenKind::String, content, offset))
            }
            _ => {
                if let Ok((rest, number)) = lex_number(remaining) {
                    let kind = number_kind(source, number, rest, offset)?;
                    (rest, Token::new(kind, number, offset))
                } else if let Ok((rest, name)) = lex_identifier(remaining) {
                    (rest, Token::new(TokenKind::Identifier, name, offset))
                } else {
                    return Err(LexError::with_context(
                        LexErrorKind::UnexpectedChar(first),
                        source,
                        offset,
                    )
                    .into());
                }
            }
        };

        tokens.push(token);
        remaining = skip_whitespace(rest);
    }

    Ok(tokens)
}

/// Parser settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseConfig {
    /// Deepest list nesting accepted
    pub max_depth: usize,
}

impl Default for ParseConfig {
    fn default() -> Self {
        ParseConfig {
            max_depth: MAX_PARSE_DEPTH,
        }
    }
}

struct TokenReader<'a> {
    tokens: &'a [Token],
    position: usize,
    config: ParseConfig,
}

impl<'a> TokenReader<'a> {
    fn new(tokens: &'a [Token], config: ParseConfig) -> Self {
        TokenReader {
            tokens,
            position: 0,
            config,
        }
    }

    fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.position)
    }

    fn at_end(&self) -> bool {
        self.position >= self.tokens.len()
    }

    fn parse_expr(&mut self, depth: usize) -> Result<Value, Error> {
        let Some(token) = self.peek() else {
            return Err(ParseError::new(ParseErrorKind::Empty, "Empty input", None, None).into());
        };
        if depth >= self.config.max_depth {
            return Err(ParseError::new(
                ParseErrorKind::TooDeeplyNested,
                format!(
                    "Expression too deeply nested (max depth: {})",
                    self.config.max_depth
                ),
                Some(token.offset),
                Some(token.text.clone()),
            )
            .into());
        }
        self.position += 1;

        match token.kind {
            TokenKind::OpenParen => self.parse_list(token, depth),
            TokenKind::CloseParen => Err(ParseError::new(
                ParseErrorKind::UnexpectedClose,
                "Unexpected ')'",
                Some(token.offset),
                Some(token.text.clone()),
            )
            .into()),
            TokenKind::Integer => token
                .text
                .parse()
                .map(Value::Integer)
                .map_err(|_| malformed_number(token)),
            TokenKind::Float => token
                .text
                .parse()
                .map(Value::Float)
                .map_err(|_| malformed_number(token)),
            TokenKind::String => Ok(Value::String(token.text.clone())),
            TokenKind::Identifier => Ok(match token.text.as_str() {
                "true" => Value::Bool(true),
                "false" => Value::Bool(false),
                name => Value::Identifier(name.to_owned()),
            }),
        }
    }

    /// Parse list elements up to the `)` matching `open`
    fn parse_list(&mut self, open: &Token, depth: usize) -> Result<Value, Error> {
        let mut elements = Vec::new();
        loop {
            match self.peek() {
                None => {
                    return Err(ParseError::new(
                        ParseErrorKind::Unclosed,
                        "Unclosed list",
                        Some(open.offset),
                        Some(open.text.clone()),
                    )
                    .into());
                }
                Some(token) if token.kind == TokenKind::CloseParen => {
                    self.position += 1;
                    return Ok(Value::List(elements));
                }
                Some(_) => elements.push(self.parse_expr(depth + 1)?),
            }
        }
    }
}

fn malformed_number(token: &Token) -> Error {
    LexError::new(
        LexErrorKind::MalformedNumber(token.text.clone()),
        token.offset,
    )
    .into()
}

/// Parse exactly one expression from `tokens`
pub fn parse(tokens: &[Token]) -> Result<Value, Error> {
    parse_with_config(tokens, ParseConfig::default())
}

pub fn parse_with_config(tokens: &[Token], config: ParseConfig) -> Result<Value, Error> {
    let mut reader = TokenReader::new(tokens, config);
    let value = reader.parse_expr(0)?;

    if let Some(extra) = reader.peek() {
        return Err(ParseError::new(
            ParseErrorKind::TrailingContent,
            "Unexpected remaining input",
            Some(extra.offset),
            Some(extra.text.clone()),
        )
        .into());
    }
    Ok(value)
}

/// Parse every top-level expression in order; no tokens is an empty program
pub fn parse_program(tokens: &[Token]) -> Result<Vec<Value>, Error> {
    let mut reader = TokenReader::new(tokens, ParseConfig::default());
    let mut forms = Vec::new();
    while !reader.at_end() {
        forms.push(reader.parse_expr(0)?);
    }
    Ok(forms)
}

/// Lex and parse exactly one expression
pub fn parse_source(source: &str) -> Result<Value, Error> {
    parse(&lex(source)?)
}

/// Lex and parse a whole program
pub fn parse_program_source(source: &str) -> Result<Vec<Value>, Error> {
    parse_program(&lex(source)?)
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;
    use crate::ast::{ident, nil, val};
    use pretty_assertions::assert_eq;

    fn kinds_and_texts(source: &str) -> Vec<(TokenKind, String)> {
        lex(source)
            .unwrap()
            .into_iter()
            .map(|token| (token.kind, token.text))
            .collect()
    }

    #[test]
    fn test_lex_tokens_and_offsets() {
        use TokenKind::*;

        let tokens = lex("(+ 1 2.5 \"hi\" x)").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::new(OpenParen, "(", 0),
                Token::new(Identifier, "+", 1),
                Token::new(Integer, "1", 3),
                Token::new(Float, "2.5", 5),
                Token::new(String, "hi", 9),
                Token::new(Identifier, "x", 14),
                Token::new(CloseParen, ")", 15),
            ]
        );

        assert!(lex("").unwrap().is_empty());
        assert!(lex(" \t\r\n ").unwrap().is_empty());
        assert_eq!(lex("\n  42").unwrap(), vec![Token::new(Integer, "42", 3)]);
    }

    #[test]
    fn test_lex_token_kinds() {
        use TokenKind::*;

        let test_cases: Vec<(&str, Vec<(TokenKind, &str)>)> = vec![
            ("42", vec![(Integer, "42")]),
            ("-5", vec![(Integer, "-5")]),
            ("-5.5", vec![(Float, "-5.5")]),
            ("3.", vec![(Float, "3.")]),
            ("0.25", vec![(Float, "0.25")]),
            ("-", vec![(Identifier, "-")]),
            ("-x", vec![(Identifier, "-x")]),
            ("+5", vec![(Identifier, "+5")]),
            ("add2", vec![(Identifier, "add2")]),
            ("is_even?", vec![(Identifier, "is_even?")]),
            ("<", vec![(Identifier, "<")]),
            ("true", vec![(Identifier, "true")]),
            ("\"a\\n\\t\\\"b\\\\\"", vec![(String, "a\n\t\"b\\")]),
            ("\"\"", vec![(String, "")]),
            ("\"(not a list)\"", vec![(String, "(not a list)")]),
            (
                "(-5)",
                vec![(OpenParen, "("), (Integer, "-5"), (CloseParen, ")")],
            ),
            (
                "(f(g))",
                vec![
                    (OpenParen, "("),
                    (Identifier, "f"),
                    (OpenParen, "("),
                    (Identifier, "g"),
                    (CloseParen, ")"),
                    (CloseParen, ")"),
                ],
            ),
            (
                "(- 10 4)",
                vec![
                    (OpenParen, "("),
                    (Identifier, "-"),
                    (Integer, "10"),
                    (Integer, "4"),
                    (CloseParen, ")"),
                ],
            ),
        ];

        for (source, expected) in test_cases {
            let expected: Vec<(TokenKind, std::string::String)> = expected
                .into_iter()
                .map(|(kind, text)| (kind, text.to_owned()))
                .collect();
            assert_eq!(kinds_and_texts(source), expected, "lexing {source:?}");
        }
    }

    #[test]
    fn test_float_at_end_of_input_keeps_fraction() {
        use TokenKind::*;

        assert_eq!(lex("2.5").unwrap(), vec![Token::new(Float, "2.5", 0)]);
        assert_eq!(lex("-5.5").unwrap(), vec![Token::new(Float, "-5.5", 0)]);
        assert_eq!(
            lex("(+ 1 2) 0.125").unwrap().last(),
            Some(&Token::new(Float, "0.125", 8))
        );

        assert_eq!(parse_source("2.5").unwrap(), val(2.5));
        assert_eq!(parse_source("-5.5").unwrap(), val(-5.5));
        let forms = parse_program_source("(var a 1)\n2.75").unwrap();
        assert_eq!(forms.last(), Some(&val(2.75)));
    }

    #[test]
    fn test_lex_errors() {
        let test_cases = vec![
            ("\"abc", LexErrorKind::UnterminatedString, 0),
            ("(f \"abc\\", LexErrorKind::UnterminatedString, 3),
            ("\"a\\qb\"", LexErrorKind::InvalidEscape('q'), 2),
            ("12abc", LexErrorKind::MalformedNumber("12abc".into()), 0),
            ("(1.2.3)", LexErrorKind::MalformedNumber("1.2.3".into()), 1),
            ("(+ 1 2x)", LexErrorKind::MalformedNumber("2x".into()), 5),
            (
                "99999999999999999999",
                LexErrorKind::MalformedNumber("99999999999999999999".into()),
                0,
            ),
            ("[1]", LexErrorKind::UnexpectedChar('['), 0),
            ("(a #b)", LexErrorKind::UnexpectedChar('#'), 3),
            ("a.b", LexErrorKind::UnexpectedChar('.'), 1),
        ];

        for (source, expected_kind, expected_offset) in test_cases {
            match lex(source) {
                Err(Error::Lex(err)) => {
                    assert_eq!(err.kind, expected_kind, "lexing {source:?}");
                    assert_eq!(err.offset, expected_offset, "lexing {source:?}");
                    assert!(err.context.is_some());
                }
                other => panic!("expected lex error for {source:?}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_parse_data_driven() {
        let test_cases: Vec<(&str, Result<Value, ParseErrorKind>)> = vec![
            // Literals
            ("42", Ok(val(42))),
            ("-7", Ok(val(-7))),
            ("2.5", Ok(val(2.5))),
            ("true", Ok(val(true))),
            ("false", Ok(val(false))),
            ("\"a\\nb\"", Ok(val("a\nb"))),
            ("x", Ok(ident("x"))),
            ("  x  ", Ok(ident("x"))),
            // Lists
            ("()", Ok(nil())),
            ("(+ 1 2)", Ok(val(vec![ident("+"), val(1), val(2)]))),
            (
                "(if true 1 2.0)",
                Ok(val(vec![ident("if"), val(true), val(1), val(2.0)])),
            ),
            (
                "(func add2 (a b) (+ a b))",
                Ok(val(vec![
                    ident("func"),
                    ident("add2"),
                    val([ident("a"), ident("b")]),
                    val([ident("+"), ident("a"), ident("b")]),
                ])),
            ),
            (
                "(a (b (c)) ())",
                Ok(val(vec![
                    ident("a"),
                    val(vec![ident("b"), val([ident("c")])]),
                    nil(),
                ])),
            ),
            // Errors
            ("", Err(ParseErrorKind::Empty)),
            ("   ", Err(ParseErrorKind::Empty)),
            ("(", Err(ParseErrorKind::Unclosed)),
            ("(+ 1 (2)", Err(ParseErrorKind::Unclosed)),
            (")", Err(ParseErrorKind::UnexpectedClose)),
            ("1 2", Err(ParseErrorKind::TrailingContent)),
            ("(a))", Err(ParseErrorKind::TrailingContent)),
            ("(a) (b)", Err(ParseErrorKind::TrailingContent)),
        ];

        for (i, (source, expected)) in test_cases.into_iter().enumerate() {
            let result = parse_source(source).map_err(|err| match err {
                Error::Parse(parse_err) => parse_err.kind,
                other => panic!("Test case {}: expected parse error, got {other:?}", i + 1),
            });
            assert_eq!(result, expected, "Test case {} failed: {source:?}", i + 1);
        }
    }

    #[test]
    fn test_parse_error_details() {
        let Err(Error::Parse(err)) = parse_source("(+ 1 2") else {
            panic!("expected parse error");
        };
        assert_eq!(err.offset, Some(0));
        assert_eq!(format!("{err}"), "Unclosed list at offset 0\nFound: (");

        let Err(Error::Parse(err)) = parse_source("(a) b") else {
            panic!("expected parse error");
        };
        assert_eq!(err.kind, ParseErrorKind::TrailingContent);
        assert_eq!(err.offset, Some(4));
        assert_eq!(err.found.as_deref(), Some("b"));

        // Lex errors surface through parse_source unchanged
        assert!(matches!(parse_source("(a @)"), Err(Error::Lex(_))));
    }

    #[test]
    fn test_parse_depth_limit() {
        let nested = |depth: usize| format!("{}x{}", "(".repeat(depth), ")".repeat(depth));

        parse_source(&nested(10)).unwrap();
        parse_source(&nested(MAX_PARSE_DEPTH - 1)).unwrap();

        let Err(Error::Parse(err)) = parse_source(&nested(MAX_PARSE_DEPTH)) else {
            panic!("expected depth error");
        };
        assert_eq!(err.kind, ParseErrorKind::TooDeeplyNested);
        let Err(Error::Parse(err)) = parse_source(&nested(1000)) else {
            panic!("expected depth error");
        };
        assert_eq!(err.kind, ParseErrorKind::TooDeeplyNested);

        let shallow = ParseConfig { max_depth: 3 };
        parse_with_config(&lex("((x))").unwrap(), shallow).unwrap();
        let result = parse_with_config(&lex("(((x)))").unwrap(), shallow);
        assert!(matches!(
            result,
            Err(Error::Parse(ParseError {
                kind: ParseErrorKind::TooDeeplyNested,
                ..
            }))
        ));
    }

    #[test]
    fn test_parse_program() {
        let forms = parse_program_source("(var a 1) (var b 2)\n(+ a b)\n42").unwrap();
        assert_eq!(
            forms,
            vec![
                val(vec![ident("var"), ident("a"), val(1)]),
                val(vec![ident("var"), ident("b"), val(2)]),
                val(vec![ident("+"), ident("a"), ident("b")]),
                val(42),
            ]
        );

        assert!(parse_program_source("").unwrap().is_empty());
        assert!(parse_program_source(" \n ").unwrap().is_empty());

        let result = parse_program_source("(a) )");
        assert!(matches!(
            result,
            Err(Error::Parse(ParseError {
                kind: ParseErrorKind::UnexpectedClose,
                offset: Some(4),
                ..
            }))
        ));
    }

    #[test]
    fn test_parse_hand_built_tokens() {
        // Tokens need not come from the lexer
        let tokens = vec![
            Token::new(TokenKind::OpenParen, "(", 0),
            Token::new(TokenKind::Identifier, "abs", 1),
            Token::new(TokenKind::Integer, "-3", 5),
            Token::new(TokenKind::CloseParen, ")", 7),
        ];
        assert_eq!(
            parse(&tokens).unwrap(),
            val(vec![ident("abs"), val(-3)])
        );

        let bad = vec![Token::new(TokenKind::Integer, "twelve", 0)];
        assert!(matches!(
            parse(&bad),
            Err(Error::Lex(LexError {
                kind: LexErrorKind::MalformedNumber(_),
                ..
            }))
        ));
    }
}
