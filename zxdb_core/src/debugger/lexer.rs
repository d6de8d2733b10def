use crate::debugger::expression::BinaryOperator;
use crate::machine::{Register, Word};
use nom::branch::alt;
use nom::bytes::complete::{tag, tag_no_case, take_while, take_while1};
use nom::character::complete::{char, digit1, hex_digit1, satisfy};
use nom::combinator::{map, opt, recognize, value};
use nom::sequence::{pair, preceded};
use nom::IResult;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    Base,
    Break,
    Tbreak,
    Clear,
    Condition,
    Continue,
    Delete,
    Disassemble,
    Finish,
    If,
    Ignore,
    Next,
    Out,
    Page,
    Port,
    Print,
    Read,
    Set,
    Step,
    Time,
    Write,
}

const KEYWORDS: &[(&str, Keyword)] = &[
    ("base", Keyword::Base),
    ("break", Keyword::Break),
    ("tbreak", Keyword::Tbreak),
    ("clear", Keyword::Clear),
    ("condition", Keyword::Condition),
    ("continue", Keyword::Continue),
    ("delete", Keyword::Delete),
    ("disassemble", Keyword::Disassemble),
    ("finish", Keyword::Finish),
    ("if", Keyword::If),
    ("ignore", Keyword::Ignore),
    ("next", Keyword::Next),
    ("out", Keyword::Out),
    ("page", Keyword::Page),
    ("port", Keyword::Port),
    ("print", Keyword::Print),
    ("read", Keyword::Read),
    ("set", Keyword::Set),
    ("step", Keyword::Step),
    ("time", Keyword::Time),
    ("write", Keyword::Write),
];

impl Keyword {
    pub fn from_name(name: &str) -> Option<Keyword> {
        KEYWORDS
            .iter()
            .find(|(keyword_name, _)| keyword_name.eq_ignore_ascii_case(name))
            .map(|&(_, keyword)| keyword)
    }

    pub fn name(self) -> &'static str {
        KEYWORDS
            .iter()
            .find(|&&(_, keyword)| keyword == self)
            .map(|&(name, _)| name)
            .unwrap_or("?")
    }
}

/// Terminals of the command language. Operator tokens are grouped by the
/// precedence class they belong to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Number(Word),
    Register(Register),
    Keyword(Keyword),
    LogicalOr,
    LogicalAnd,
    Comparison(BinaryOperator),
    Equality(BinaryOperator),
    Negate,
    TimesDivide(BinaryOperator),
    Plus,
    Minus,
    LeftParen,
    RightParen,
    LeftBracket,
    RightBracket,
    Comma,
    Colon,
    // Input that is not part of the language, kept so the parser can point at it
    Error(String),
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Token::Number(value) => write!(f, "number {}", value),
            Token::Register(register) => write!(f, "register {}", register),
            Token::Keyword(keyword) => write!(f, "'{}'", keyword.name()),
            Token::LogicalOr => f.write_str("'||'"),
            Token::LogicalAnd => f.write_str("'&&'"),
            Token::Comparison(operator)
            | Token::Equality(operator)
            | Token::TimesDivide(operator) => write!(f, "'{}'", operator.symbol()),
            Token::Negate => f.write_str("'!'"),
            Token::Plus => f.write_str("'+'"),
            Token::Minus => f.write_str("'-'"),
            Token::LeftParen => f.write_str("'('"),
            Token::RightParen => f.write_str("')'"),
            Token::LeftBracket => f.write_str("'['"),
            Token::RightBracket => f.write_str("']'"),
            Token::Comma => f.write_str("','"),
            Token::Colon => f.write_str("':'"),
            Token::Error(text) => write!(f, "'{}'", text),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lexeme {
    pub token: Token,
    // byte offset into the command text
    pub position: usize,
}

/// Splits command text into tokens. Never fails: anything unrecognised comes
/// out as a `Token::Error` at the offset where it was found.
pub fn tokenize(input: &str) -> Vec<Lexeme> {
    let mut lexemes = Vec::new();
    let mut rest = input;

    loop {
        rest = rest.trim_start();
        if rest.is_empty() {
            break;
        }

        let position = input.len() - rest.len();
        match parse_token(rest) {
            Ok((remaining, token)) => {
                lexemes.push(Lexeme { token, position });
                rest = remaining;
            }
            Err(_) => {
                let unknown = rest.chars().next().unwrap_or_default();
                lexemes.push(Lexeme {
                    token: Token::Error(unknown.to_string()),
                    position,
                });
                rest = &rest[unknown.len_utf8()..];
            }
        }
    }

    lexemes
}

fn parse_token(input: &str) -> IResult<&str, Token> {
    alt((parse_number, parse_word, parse_operator, parse_punctuation))(input)
}

fn parse_radix_literal(input: &str) -> IResult<&str, (u32, &str)> {
    alt((
        map(
            preceded(alt((tag_no_case("0x"), tag("$"))), hex_digit1),
            |digits| (16, digits),
        ),
        map(
            preceded(
                alt((tag_no_case("0b"), tag("%"))),
                take_while1(|c: char| c == '0' || c == '1'),
            ),
            |digits| (2, digits),
        ),
        map(digit1, |digits| (10, digits)),
    ))(input)
}

fn parse_number(input: &str) -> IResult<&str, Token> {
    let (rest, (radix, digits)) = parse_radix_literal(input)?;

    let token = match Word::from_str_radix(digits, radix) {
        Ok(value) => Token::Number(value),
        Err(_) => Token::Error(input[..input.len() - rest.len()].to_string()),
    };

    Ok((rest, token))
}

fn parse_word(input: &str) -> IResult<&str, Token> {
    map(
        recognize(pair(
            pair(
                satisfy(|c| c.is_ascii_alphabetic() || c == '_'),
                take_while(|c: char| c.is_ascii_alphanumeric() || c == '_'),
            ),
            opt(char('\'')),
        )),
        classify_word,
    )(input)
}

fn classify_word(word: &str) -> Token {
    if let Some(keyword) = Keyword::from_name(word) {
        Token::Keyword(keyword)
    } else if let Some(register) = Register::from_name(word) {
        Token::Register(register)
    } else {
        Token::Error(word.to_string())
    }
}

fn parse_operator(input: &str) -> IResult<&str, Token> {
    use crate::debugger::expression::BinaryOperator::*;

    // Two-character operators first so "<=" does not lex as "<" "="
    alt((
        value(Token::LogicalOr, tag("||")),
        value(Token::LogicalAnd, tag("&&")),
        value(Token::Comparison(LessEqual), tag("<=")),
        value(Token::Comparison(GreaterEqual), tag(">=")),
        value(Token::Equality(Equal), tag("==")),
        value(Token::Equality(NotEqual), tag("!=")),
        value(Token::Comparison(Less), tag("<")),
        value(Token::Comparison(Greater), tag(">")),
        value(Token::Negate, tag("!")),
        value(Token::TimesDivide(Multiply), tag("*")),
        value(Token::TimesDivide(Divide), tag("/")),
        value(Token::Plus, tag("+")),
        value(Token::Minus, tag("-")),
    ))(input)
}

fn parse_punctuation(input: &str) -> IResult<&str, Token> {
    alt((
        value(Token::LeftParen, char('(')),
        value(Token::RightParen, char(')')),
        value(Token::LeftBracket, char('[')),
        value(Token::RightBracket, char(']')),
        value(Token::Comma, char(',')),
        value(Token::Colon, char(':')),
    ))(input)
}
