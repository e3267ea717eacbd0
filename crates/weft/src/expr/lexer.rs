//! Lexer for the expression language.

use chumsky::prelude::*;
use std::fmt;

pub type Span = SimpleSpan;
pub type LexError<'src> = Rich<'src, char, Span>;

#[derive(Debug, Clone)]
pub struct Spanned<T> {
    pub span: Span,
    pub node: T,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Token<'src> {
    Number(f64),
    /// Raw string contents (escapes still backslashed).
    Str(&'src str),
    Ident(&'src str),
    /// `$name`, sigil included.
    DollarIdent(&'src str),
    /// `@Name`, sigil stripped.
    AtIdent(&'src str),
    True,
    False,
    Null,
    ParenOpen,
    ParenClose,
    BracketOpen,
    BracketClose,
    BraceOpen,
    BraceClose,
    Comma,
    Colon,
    Semicolon,
    Dot,
    Question,
    Not,
    EqEq,
    NotEq,
    LtEq,
    GtEq,
    Lt,
    Gt,
    AndAnd,
    OrOr,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Assign,
}

impl fmt::Display for Token<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Str(s) => write!(f, "'{s}'"),
            Self::Ident(name) => write!(f, "{name}"),
            Self::DollarIdent(name) => write!(f, "{name}"),
            Self::AtIdent(name) => write!(f, "@{name}"),
            Self::True => write!(f, "true"),
            Self::False => write!(f, "false"),
            Self::Null => write!(f, "null"),
            Self::ParenOpen => write!(f, "("),
            Self::ParenClose => write!(f, ")"),
            Self::BracketOpen => write!(f, "["),
            Self::BracketClose => write!(f, "]"),
            Self::BraceOpen => write!(f, "{{"),
            Self::BraceClose => write!(f, "}}"),
            Self::Comma => write!(f, ","),
            Self::Colon => write!(f, ":"),
            Self::Semicolon => write!(f, ";"),
            Self::Dot => write!(f, "."),
            Self::Question => write!(f, "?"),
            Self::Not => write!(f, "!"),
            Self::EqEq => write!(f, "=="),
            Self::NotEq => write!(f, "!="),
            Self::LtEq => write!(f, "<="),
            Self::GtEq => write!(f, ">="),
            Self::Lt => write!(f, "<"),
            Self::Gt => write!(f, ">"),
            Self::AndAnd => write!(f, "&&"),
            Self::OrOr => write!(f, "||"),
            Self::Plus => write!(f, "+"),
            Self::Minus => write!(f, "-"),
            Self::Star => write!(f, "*"),
            Self::Slash => write!(f, "/"),
            Self::Percent => write!(f, "%"),
            Self::Assign => write!(f, "="),
        }
    }
}

pub fn lexer<'src>()
-> impl Parser<'src, &'src str, Vec<Spanned<Token<'src>>>, extra::Err<LexError<'src>>> {
    let number = text::int(10)
        .then(just('.').then(text::digits(10)).or_not())
        .to_slice()
        .from_str()
        .unwrapped()
        .map(Token::Number);

    // Raw contents between quotes; backslash escapes are resolved later.
    let single_quoted = just('\'')
        .ignore_then(
            choice((just('\\').then(any()).ignored(), none_of("\\'").ignored()))
                .repeated()
                .to_slice(),
        )
        .then_ignore(just('\''))
        .map(Token::Str);

    let double_quoted = just('"')
        .ignore_then(
            choice((just('\\').then(any()).ignored(), none_of("\\\"").ignored()))
                .repeated()
                .to_slice(),
        )
        .then_ignore(just('"'))
        .map(Token::Str);

    let raw_identifier = any()
        .filter(|character: &char| character.is_ascii_alphabetic() || *character == '_')
        .then(
            any()
                .filter(|character: &char| {
                    character.is_ascii_alphanumeric() || *character == '_'
                })
                .repeated(),
        )
        .to_slice();

    let identifier = raw_identifier.clone().map(|name: &str| match name {
        "true" => Token::True,
        "false" => Token::False,
        "null" => Token::Null,
        other => Token::Ident(other),
    });

    let dollar_identifier = just('$')
        .then(raw_identifier.clone())
        .to_slice()
        .map(Token::DollarIdent);

    let at_identifier = just('@').ignore_then(raw_identifier).map(Token::AtIdent);

    let operator = choice((
        just("==").to(Token::EqEq),
        just("!=").to(Token::NotEq),
        just("<=").to(Token::LtEq),
        just(">=").to(Token::GtEq),
        just("&&").to(Token::AndAnd),
        just("||").to(Token::OrOr),
        just('<').to(Token::Lt),
        just('>').to(Token::Gt),
        just('!').to(Token::Not),
        just('=').to(Token::Assign),
        just('+').to(Token::Plus),
        just('-').to(Token::Minus),
        just('*').to(Token::Star),
        just('/').to(Token::Slash),
        just('%').to(Token::Percent),
    ));

    let punctuation = choice((
        just('(').to(Token::ParenOpen),
        just(')').to(Token::ParenClose),
        just('[').to(Token::BracketOpen),
        just(']').to(Token::BracketClose),
        just('{').to(Token::BraceOpen),
        just('}').to(Token::BraceClose),
        just(',').to(Token::Comma),
        just(':').to(Token::Colon),
        just(';').to(Token::Semicolon),
        just('.').to(Token::Dot),
        just('?').to(Token::Question),
    ));

    let token = choice((
        number,
        single_quoted,
        double_quoted,
        dollar_identifier,
        at_identifier,
        identifier,
        operator,
        punctuation,
    ));

    token
        .map_with(|token, extra| Spanned {
            node: token,
            span: extra.span(),
        })
        .padded()
        .repeated()
        .collect()
}
