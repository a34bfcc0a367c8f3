//! A small boolean expression language: `(`, `)`, `AND`, `OR`, `NOT`, and
//! atom strings, with `NOT > AND > OR` precedence and left associativity.
//!
//! Unlike a query-builder expression tree that bakes in SQL generation, this
//! one only ever answers "does this atom set satisfy the tree", via a
//! caller-supplied `match(atom) -> bool` closure evaluated lazily so `AND`/
//! `OR` short-circuit. The search engine uses the same tree shape for two
//! different matchers: tag-name-set containment and filename substring
//! search.

use nom::{
    Parser,
    branch::alt,
    bytes::complete::{tag as lit, take_while1},
    character::complete::{char, multispace0},
    combinator::opt,
    multi::many0,
    sequence::{delimited, preceded},
};

#[derive(Debug, Clone, PartialEq)]
pub enum ExpressionTree {
    Atom(String),
    And(Box<ExpressionTree>, Box<ExpressionTree>),
    Or(Box<ExpressionTree>, Box<ExpressionTree>),
    Not(Box<ExpressionTree>),
}

#[derive(Debug, PartialEq)]
pub struct ParseErrorDetail {
    pub location: String,
}

impl<'a> nom::error::ParseError<&'a str> for ParseErrorDetail {
    fn from_error_kind(input: &'a str, _kind: nom::error::ErrorKind) -> Self {
        ParseErrorDetail { location: input.to_string() }
    }

    fn append(_input: &'a str, _kind: nom::error::ErrorKind, other: Self) -> Self {
        other
    }
}

#[derive(Debug, PartialEq)]
pub struct NoTokens;

impl ExpressionTree {
    /// Parses `input` into a tree, or `Err(NoTokens)` if `input` contains no
    /// meaningful atoms (the caller should then treat the filter as absent).
    pub fn parse(input: &str) -> Result<ExpressionTree, NoTokens> {
        if input.trim().is_empty() {
            return Err(NoTokens);
        }
        match or_expr(input) {
            Ok((rest, tree)) if rest.trim().is_empty() => Ok(tree),
            _ => Err(NoTokens),
        }
    }

    /// Lowercases every atom in place, used by the filename matcher which
    /// matches case-insensitively.
    pub fn map_atoms(&mut self, f: impl Fn(&str) -> String + Copy) {
        match self {
            ExpressionTree::Atom(a) => *a = f(a),
            ExpressionTree::Not(inner) => inner.map_atoms(f),
            ExpressionTree::And(l, r) | ExpressionTree::Or(l, r) => {
                l.map_atoms(f);
                r.map_atoms(f);
            }
        }
    }

    /// Evaluates the tree against `matcher`, short-circuiting `AND`/`OR`.
    pub fn evaluate(&self, matcher: &impl Fn(&str) -> bool) -> bool {
        match self {
            ExpressionTree::Atom(atom) => matcher(atom),
            ExpressionTree::Not(inner) => !inner.evaluate(matcher),
            ExpressionTree::And(l, r) => l.evaluate(matcher) && r.evaluate(matcher),
            ExpressionTree::Or(l, r) => l.evaluate(matcher) || r.evaluate(matcher),
        }
    }
}

type PResult<'a, T> = nom::IResult<&'a str, T, ParseErrorDetail>;

fn ws<'a, F>(inner: F) -> impl Parser<&'a str, Output = F::Output, Error = F::Error>
where
    F: Parser<&'a str>,
{
    delimited(multispace0, inner, multispace0)
}

fn or_expr(input: &str) -> PResult<'_, ExpressionTree> {
    let (input, init) = and_expr(input)?;
    many0(preceded(ws(lit("OR")), and_expr))
        .parse(input)
        .map(|(input, rest)| {
            let tree = rest
                .into_iter()
                .fold(init, |acc, e| ExpressionTree::Or(Box::new(acc), Box::new(e)));
            (input, tree)
        })
}

fn and_expr(input: &str) -> PResult<'_, ExpressionTree> {
    let (input, init) = not_expr(input)?;
    many0(preceded(ws(lit("AND")), not_expr))
        .parse(input)
        .map(|(input, rest)| {
            let tree = rest
                .into_iter()
                .fold(init, |acc, e| ExpressionTree::And(Box::new(acc), Box::new(e)));
            (input, tree)
        })
}

fn not_expr(input: &str) -> PResult<'_, ExpressionTree> {
    let (input, not_opt) = opt(preceded(ws(lit("NOT")), primary)).parse(input)?;
    match not_opt {
        Some(expr) => Ok((input, ExpressionTree::Not(Box::new(expr)))),
        None => primary(input),
    }
}

fn primary(input: &str) -> PResult<'_, ExpressionTree> {
    alt((paren_expr, quoted_atom, atom)).parse(input)
}

fn paren_expr(input: &str) -> PResult<'_, ExpressionTree> {
    delimited(ws(char('(')), or_expr, ws(char(')'))).parse(input)
}

fn quoted_atom(input: &str) -> PResult<'_, ExpressionTree> {
    ws(delimited(char('"'), take_while1(|c: char| c != '"'), char('"')))
        .parse(input)
        .map(|(i, s)| (i, ExpressionTree::Atom(s.to_string())))
}

fn atom(input: &str) -> PResult<'_, ExpressionTree> {
    ws(take_while1(|c: char| !c.is_whitespace() && c != '(' && c != ')'))
        .parse(input)
        .map(|(i, s)| (i, ExpressionTree::Atom(s.to_string())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_or_not_with_precedence() {
        let tree = ExpressionTree::parse("family AND (pets OR vacation)").unwrap();
        let matcher = |atom: &str| matches!(atom, "family" | "pets");
        assert!(tree.evaluate(&matcher));
    }

    #[test]
    fn not_binds_tighter_than_and() {
        let tree = ExpressionTree::parse("NOT dog AND cat").unwrap();
        let matcher = |atom: &str| atom == "cat";
        assert!(tree.evaluate(&matcher));
    }

    #[test]
    fn quoted_atoms_preserve_spaces() {
        let tree = ExpressionTree::parse("\"survival guide\" AND pdf").unwrap();
        let matcher = |atom: &str| matches!(atom, "survival guide" | "pdf");
        assert!(tree.evaluate(&matcher));
    }

    #[test]
    fn filename_scenario_matches_case_insensitively() {
        let mut tree = ExpressionTree::parse("\"survival guide\" AND pdf").unwrap();
        tree.map_atoms(|s| s.to_lowercase());
        let haystack = "cooking survival guide.pdf".to_string();
        let matcher = |atom: &str| haystack.contains(atom);
        assert!(tree.evaluate(&matcher));

        let other = "survival.txt".to_string();
        let matcher = |atom: &str| other.contains(atom);
        assert!(!tree.evaluate(&matcher));
    }

    #[test]
    fn empty_input_has_no_tokens() {
        assert_eq!(ExpressionTree::parse("   "), Err(NoTokens));
    }

    #[test]
    fn boolean_short_circuit_scenario() {
        let tree = ExpressionTree::parse("family AND (pets OR vacation)").unwrap();
        let p1: std::collections::HashSet<&str> = ["family", "pets"].into_iter().collect();
        let p2: std::collections::HashSet<&str> = ["family"].into_iter().collect();
        let p3: std::collections::HashSet<&str> = ["pets"].into_iter().collect();

        assert!(tree.evaluate(&|a| p1.contains(a)));
        assert!(!tree.evaluate(&|a| p2.contains(a)));
        assert!(!tree.evaluate(&|a| p3.contains(a)));
    }
}
