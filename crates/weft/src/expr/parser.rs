//! Parser for the expression language: a pratt-style grammar over the lexer's
//! token stream, producing owned `Expr` trees.

use super::lexer::{lexer, Span, Spanned, Token};
use super::{BinaryOp, Expr, UnaryOp};
use crate::error::WeftError;
use chumsky::{input::ValueInput, pratt::*, prelude::*};

pub type ParseError<'src, T> = Rich<'src, T, Span>;

/// Lexes and parses one expression body (the text between braces).
pub fn parse_expression(text: &str) -> Result<Expr, WeftError> {
    let tokens = lexer()
        .parse(text)
        .into_result()
        .map_err(|errors| parse_error(text, &errors))?;
    let input = tokens.map(
        Span::new((), text.len()..text.len()),
        |Spanned { node, span }| (node, span),
    );
    let result = parser()
        .parse(input)
        .into_result()
        .map_err(|errors| parse_error(text, &errors));
    result
}

fn parse_error<T: std::fmt::Debug>(text: &str, errors: &[Rich<'_, T, Span>]) -> WeftError {
    WeftError::ExprParse {
        text: text.to_string(),
        message: errors
            .iter()
            .map(|error| format!("{error:?}"))
            .collect::<Vec<_>>()
            .join("; "),
    }
}

enum Postfix {
    Member(String),
    Index(Expr),
    Call(Vec<Expr>),
}

pub fn parser<'src, I>()
-> impl Parser<'src, I, Expr, extra::Err<ParseError<'src, Token<'src>>>>
where
    I: ValueInput<'src, Token = Token<'src>, Span = Span>,
{
    let expression = recursive(|expression| {
        let literal = select! {
            Token::Number(number) => Expr::Number(number),
            Token::True => Expr::Bool(true),
            Token::False => Expr::Bool(false),
            Token::Null => Expr::Null,
            Token::Str(raw) => Expr::Text(unescape(raw)),
        };

        let identifier = select! {
            Token::Ident(name) => Expr::Ident(name.to_string()),
            Token::DollarIdent(name) => Expr::Ident(name.to_string()),
        };

        let handle_reference =
            select! { Token::AtIdent(name) => Expr::HandleRef(name.to_string()) };

        let list = expression
            .clone()
            .separated_by(just(Token::Comma))
            .allow_trailing()
            .collect()
            .delimited_by(just(Token::BracketOpen), just(Token::BracketClose))
            .map(Expr::List);

        let object_key = select! {
            Token::Ident(name) => name.to_string(),
            Token::Str(raw) => unescape(raw),
        };

        let object = object_key
            .then_ignore(just(Token::Colon))
            .then(expression.clone())
            .separated_by(just(Token::Comma))
            .allow_trailing()
            .collect()
            .delimited_by(just(Token::BraceOpen), just(Token::BraceClose))
            .map(Expr::ObjectLit);

        let parenthesized = expression
            .clone()
            .delimited_by(just(Token::ParenOpen), just(Token::ParenClose));

        let atom = choice((
            literal,
            list,
            object,
            handle_reference,
            identifier,
            parenthesized,
        ));

        let member = just(Token::Dot)
            .ignore_then(select! { Token::Ident(name) => name.to_string() })
            .map(Postfix::Member);

        let index = expression
            .clone()
            .delimited_by(just(Token::BracketOpen), just(Token::BracketClose))
            .map(Postfix::Index);

        let call = expression
            .clone()
            .separated_by(just(Token::Comma))
            .allow_trailing()
            .collect()
            .delimited_by(just(Token::ParenOpen), just(Token::ParenClose))
            .map(Postfix::Call);

        let postfixed = atom
            .then(choice((member, index, call)).repeated().collect::<Vec<_>>())
            .map(|(base, chain)| {
                chain.into_iter().fold(base, |acc, postfix| match postfix {
                    Postfix::Member(name) => Expr::Member(Box::new(acc), name),
                    Postfix::Index(index) => Expr::Index(Box::new(acc), Box::new(index)),
                    Postfix::Call(args) => Expr::Call(Box::new(acc), args),
                })
            });

        let unary_operator = choice((
            just(Token::Not).to(UnaryOp::Not),
            just(Token::Minus).to(UnaryOp::Neg),
        ));

        let unary = unary_operator
            .repeated()
            .collect::<Vec<_>>()
            .then(postfixed)
            .map(|(operators, operand)| {
                operators
                    .into_iter()
                    .rev()
                    .fold(operand, |acc, op| Expr::Unary(op, Box::new(acc)))
            });

        let binary = unary.pratt((
            infix(left(1), just(Token::OrOr), |l, _, r, _| {
                Expr::Binary(BinaryOp::Or, Box::new(l), Box::new(r))
            }),
            infix(left(2), just(Token::AndAnd), |l, _, r, _| {
                Expr::Binary(BinaryOp::And, Box::new(l), Box::new(r))
            }),
            infix(left(3), just(Token::EqEq), |l, _, r, _| {
                Expr::Binary(BinaryOp::Eq, Box::new(l), Box::new(r))
            }),
            infix(left(3), just(Token::NotEq), |l, _, r, _| {
                Expr::Binary(BinaryOp::NotEq, Box::new(l), Box::new(r))
            }),
            infix(left(4), just(Token::Lt), |l, _, r, _| {
                Expr::Binary(BinaryOp::Lt, Box::new(l), Box::new(r))
            }),
            infix(left(4), just(Token::LtEq), |l, _, r, _| {
                Expr::Binary(BinaryOp::LtEq, Box::new(l), Box::new(r))
            }),
            infix(left(4), just(Token::Gt), |l, _, r, _| {
                Expr::Binary(BinaryOp::Gt, Box::new(l), Box::new(r))
            }),
            infix(left(4), just(Token::GtEq), |l, _, r, _| {
                Expr::Binary(BinaryOp::GtEq, Box::new(l), Box::new(r))
            }),
            infix(left(5), just(Token::Plus), |l, _, r, _| {
                Expr::Binary(BinaryOp::Add, Box::new(l), Box::new(r))
            }),
            infix(left(5), just(Token::Minus), |l, _, r, _| {
                Expr::Binary(BinaryOp::Sub, Box::new(l), Box::new(r))
            }),
            infix(left(6), just(Token::Star), |l, _, r, _| {
                Expr::Binary(BinaryOp::Mul, Box::new(l), Box::new(r))
            }),
            infix(left(6), just(Token::Slash), |l, _, r, _| {
                Expr::Binary(BinaryOp::Div, Box::new(l), Box::new(r))
            }),
            infix(left(6), just(Token::Percent), |l, _, r, _| {
                Expr::Binary(BinaryOp::Rem, Box::new(l), Box::new(r))
            }),
        ));

        let ternary = binary
            .then(
                group((
                    just(Token::Question).ignored(),
                    expression.clone(),
                    just(Token::Colon).ignored(),
                    expression.clone(),
                ))
                .or_not(),
            )
            .map(|(condition, branches)| match branches {
                Some((_, then, _, otherwise)) => Expr::Ternary(
                    Box::new(condition),
                    Box::new(then),
                    Box::new(otherwise),
                ),
                None => condition,
            });

        ternary
            .then(just(Token::Assign).ignore_then(expression).or_not())
            .map(|(target, assigned)| match assigned {
                Some(value) => Expr::Assign(Box::new(target), Box::new(value)),
                None => target,
            })
    });

    expression
        .separated_by(just(Token::Semicolon))
        .allow_trailing()
        .at_least(1)
        .collect::<Vec<_>>()
        .map(|mut expressions| {
            if expressions.len() == 1 {
                expressions.pop().expect("at_least(1) guarantees one")
            } else {
                Expr::Seq(expressions)
            }
        })
        .then_ignore(end())
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some('r') => out.push('\r'),
                Some(other) => out.push(other),
                None => out.push('\\'),
            }
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assignment_parses_right_associative() {
        let expr = parse_expression("@Counter.open = !@Counter.open").unwrap();
        let Expr::Assign(target, value) = expr else {
            panic!("expected assignment, got {expr:?}");
        };
        assert_eq!(
            *target,
            Expr::Member(Box::new(Expr::HandleRef("Counter".into())), "open".into())
        );
        assert!(matches!(*value, Expr::Unary(UnaryOp::Not, _)));
    }

    #[test]
    fn object_literal_with_nested_braces() {
        let expr = parse_expression("{ open: false, nested: { n: 1 } }").unwrap();
        let Expr::ObjectLit(fields) = expr else {
            panic!("expected object literal");
        };
        assert_eq!(fields.len(), 2);
        assert_eq!(fields[0].0, "open");
    }

    #[test]
    fn ternary_binds_looser_than_comparison() {
        let expr = parse_expression("$n > 1 ? 'many' : 'one'").unwrap();
        assert!(matches!(expr, Expr::Ternary(..)));
    }

    #[test]
    fn postfix_chains_fold_left() {
        let expr = parse_expression("$rows[0].name").unwrap();
        let Expr::Member(base, name) = expr else {
            panic!();
        };
        assert_eq!(name, "name");
        assert!(matches!(*base, Expr::Index(..)));
    }

    #[test]
    fn sequences_join_with_semicolons() {
        let expr = parse_expression("@G.a = 1; @G.b = 2").unwrap();
        let Expr::Seq(parts) = expr else {
            panic!("expected sequence");
        };
        assert_eq!(parts.len(), 2);
    }

    #[test]
    fn trailing_garbage_is_rejected() {
        assert!(parse_expression("1 + ").is_err());
        assert!(parse_expression("a b").is_err());
    }

    #[test]
    fn string_escapes_resolve() {
        let expr = parse_expression(r"'a\'b\n'").unwrap();
        assert_eq!(expr, Expr::Text("a'b\n".to_string()));
    }
}
