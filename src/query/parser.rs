//! Recursive-descent parser for the catalog query language.
//!
//! Hand-rolled over a byte-offset-tracked character cursor, in the style
//! of a small config/DSL parser rather than a generated grammar: each
//! level of the grammar in the specification (`or_expr`, `and_expr`,
//! `not_expr`, `term`, `field_pred`) gets one function, and every error
//! carries the byte offset where parsing gave up.

use super::ast::{Ast, Op, Path, Value};

/// Query language parse failure: byte offset plus a human message.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub position: usize,
    pub message: String,
}

impl ParseError {
    fn at(position: usize, message: impl Into<String>) -> Self {
        ParseError {
            position,
            message: message.into(),
        }
    }
}

type PResult<T> = Result<T, ParseError>;

struct Cursor<'a> {
    chars: Vec<char>,
    byte_offsets: Vec<usize>,
    pos: usize,
    _src: &'a str,
}

impl<'a> Cursor<'a> {
    fn new(src: &'a str) -> Self {
        let mut byte_offsets = Vec::new();
        let mut chars = Vec::new();
        for (byte_idx, ch) in src.char_indices() {
            byte_offsets.push(byte_idx);
            chars.push(ch);
        }
        byte_offsets.push(src.len());
        Cursor {
            chars,
            byte_offsets,
            pos: 0,
            _src: src,
        }
    }

    fn byte_pos(&self) -> usize {
        self.byte_offsets
            .get(self.pos)
            .copied()
            .unwrap_or(self.byte_offsets[self.byte_offsets.len() - 1])
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek();
        if c.is_some() {
            self.pos += 1;
        }
        c
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.pos += 1;
        }
    }

    fn eof(&self) -> bool {
        self.pos >= self.chars.len()
    }

    fn starts_with_keyword(&self, kw: &str) -> bool {
        let kw_chars: Vec<char> = kw.chars().collect();
        if self.pos + kw_chars.len() > self.chars.len() {
            return false;
        }
        for (i, kc) in kw_chars.iter().enumerate() {
            if self.chars[self.pos + i].to_ascii_uppercase() != kc.to_ascii_uppercase() {
                return false;
            }
        }
        // keyword must be followed by a word boundary
        let next = self.chars.get(self.pos + kw_chars.len());
        next.is_none_or(|c| !c.is_alphanumeric() && *c != '_')
    }
}

/// Parse a full query string into an [`Ast`].
pub fn parse(src: &str) -> PResult<Ast> {
    let mut cur = Cursor::new(src);
    cur.skip_ws();
    if cur.eof() {
        // An empty query is valid: it means "no text filter".
        return Ok(Ast::Word(String::new()));
    }
    let ast = parse_or(&mut cur)?;
    cur.skip_ws();
    if !cur.eof() {
        return Err(ParseError::at(
            cur.byte_pos(),
            format!("unexpected trailing input starting with '{}'", cur.peek().unwrap()),
        ));
    }
    Ok(ast)
}

fn parse_or(cur: &mut Cursor) -> PResult<Ast> {
    let mut lhs = parse_and(cur)?;
    loop {
        cur.skip_ws();
        if cur.starts_with_keyword("OR") {
            cur.pos += 2;
        } else if cur.peek() == Some('|') {
            cur.advance();
        } else {
            break;
        }
        cur.skip_ws();
        let rhs = parse_and(cur)?;
        lhs = Ast::Or(Box::new(lhs), Box::new(rhs));
    }
    Ok(lhs)
}

fn parse_and(cur: &mut Cursor) -> PResult<Ast> {
    let mut lhs = parse_not(cur)?;
    loop {
        let save = cur.pos;
        cur.skip_ws();
        if cur.starts_with_keyword("AND") {
            cur.pos += 3;
            cur.skip_ws();
        } else if cur.peek() == Some('&') {
            cur.advance();
            cur.skip_ws();
        } else if cur.eof() || cur.starts_with_keyword("OR") || cur.peek() == Some('|') || cur.peek() == Some(')') {
            cur.pos = save;
            break;
        } else {
            // Implicit AND via whitespace between terms.
        }
        if cur.eof() || cur.starts_with_keyword("OR") || cur.peek() == Some('|') || cur.peek() == Some(')') {
            cur.pos = save;
            break;
        }
        let rhs = parse_not(cur)?;
        lhs = Ast::And(Box::new(lhs), Box::new(rhs));
    }
    Ok(lhs)
}

fn parse_not(cur: &mut Cursor) -> PResult<Ast> {
    cur.skip_ws();
    if cur.starts_with_keyword("NOT") {
        cur.pos += 3;
        cur.skip_ws();
        let inner = parse_term(cur)?;
        return Ok(Ast::Not(Box::new(inner)));
    }
    if cur.peek() == Some('-') && cur.peek_at(1).is_some_and(|c| !c.is_whitespace()) {
        cur.advance();
        let inner = parse_term(cur)?;
        return Ok(Ast::Not(Box::new(inner)));
    }
    parse_term(cur)
}

fn parse_term(cur: &mut Cursor) -> PResult<Ast> {
    cur.skip_ws();
    match cur.peek() {
        None => Err(ParseError::at(cur.byte_pos(), "expected a term, found end of input")),
        Some('(') => {
            cur.advance();
            cur.skip_ws();
            let inner = parse_or(cur)?;
            cur.skip_ws();
            if cur.peek() != Some(')') {
                return Err(ParseError::at(cur.byte_pos(), "expected closing ')'"));
            }
            cur.advance();
            Ok(inner)
        }
        Some('@') => parse_field_pred(cur),
        Some('"') => Ok(Ast::Phrase(parse_phrase(cur)?)),
        _ => {
            let word = parse_word(cur)?;
            Ok(Ast::Word(word))
        }
    }
}

fn parse_field_pred(cur: &mut Cursor) -> PResult<Ast> {
    let start = cur.byte_pos();
    cur.advance(); // '@'
    let path = parse_path(cur)?;
    let op = parse_op(cur).ok_or_else(|| {
        ParseError::at(
            cur.byte_pos(),
            "expected an operator (:, =, !=, >, >=, <, <=, ~, !~) after field path",
        )
    })?;
    let value = parse_value(cur)?;
    let _ = start;
    Ok(Ast::FieldPred { path, op, value })
}

fn parse_path(cur: &mut Cursor) -> PResult<Path> {
    let mut segs = Vec::new();
    segs.push(parse_ident(cur)?);
    while cur.peek() == Some('.') {
        cur.advance();
        segs.push(parse_ident(cur)?);
    }
    Ok(Path(segs))
}

fn parse_ident(cur: &mut Cursor) -> PResult<String> {
    let mut s = String::new();
    while matches!(cur.peek(), Some(c) if c.is_alphanumeric() || c == '_') {
        s.push(cur.advance().unwrap());
    }
    if s.is_empty() {
        return Err(ParseError::at(cur.byte_pos(), "expected an identifier"));
    }
    Ok(s)
}

fn parse_op(cur: &mut Cursor) -> Option<Op> {
    let two = (cur.peek(), cur.peek_at(1));
    let op = match two {
        (Some('!'), Some('=')) => Some((2, Op::Ne)),
        (Some('!'), Some('~')) => Some((2, Op::NotRegex)),
        (Some('>'), Some('=')) => Some((2, Op::Gte)),
        (Some('<'), Some('=')) => Some((2, Op::Lte)),
        (Some(':'), _) => Some((1, Op::Match)),
        (Some('='), _) => Some((1, Op::Eq)),
        (Some('>'), _) => Some((1, Op::Gt)),
        (Some('<'), _) => Some((1, Op::Lt)),
        (Some('~'), _) => Some((1, Op::Regex)),
        _ => None,
    };
    if let Some((n, op)) = op {
        cur.pos += n;
        Some(op)
    } else {
        None
    }
}

fn parse_value(cur: &mut Cursor) -> PResult<Value> {
    cur.skip_ws();
    match cur.peek() {
        None => Err(ParseError::at(cur.byte_pos(), "expected a value, found end of input")),
        Some('"') => Ok(Value::Phrase(parse_phrase(cur)?)),
        Some(c) if c.is_ascii_digit() || (c == '-' && cur.peek_at(1).is_some_and(|d| d.is_ascii_digit())) => {
            parse_number(cur)
        }
        _ => {
            let word = parse_word(cur)?;
            match word.as_str() {
                "true" => Ok(Value::Bool(true)),
                "false" => Ok(Value::Bool(false)),
                _ => Ok(Value::Word(word)),
            }
        }
    }
}

fn parse_number(cur: &mut Cursor) -> PResult<Value> {
    let mut s = String::new();
    if cur.peek() == Some('-') {
        s.push(cur.advance().unwrap());
    }
    while matches!(cur.peek(), Some(c) if c.is_ascii_digit() || c == '.') {
        s.push(cur.advance().unwrap());
    }
    s.parse::<f64>()
        .map(Value::Number)
        .map_err(|_| ParseError::at(cur.byte_pos(), format!("invalid number literal '{s}'")))
}

fn parse_phrase(cur: &mut Cursor) -> PResult<String> {
    let start = cur.byte_pos();
    cur.advance(); // opening quote
    let mut s = String::new();
    loop {
        match cur.advance() {
            Some('"') => return Ok(s),
            Some(c) => s.push(c),
            None => {
                return Err(ParseError::at(start, "unterminated string literal"));
            }
        }
    }
}

fn parse_word(cur: &mut Cursor) -> PResult<String> {
    let mut s = String::new();
    while matches!(cur.peek(), Some(c) if !c.is_whitespace() && c != '(' && c != ')') {
        s.push(cur.advance().unwrap());
    }
    if s.is_empty() {
        return Err(ParseError::at(cur.byte_pos(), "expected a word"));
    }
    Ok(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_word() {
        assert_eq!(parse("table").unwrap(), Ast::Word("table".into()));
    }

    #[test]
    fn parses_field_predicate() {
        let ast = parse("@type:\"Table\"").unwrap();
        match ast {
            Ast::FieldPred { path, op, value } => {
                assert_eq!(path, Path(vec!["type".into()]));
                assert_eq!(op, Op::Match);
                assert_eq!(value, Value::Phrase("Table".into()));
            }
            other => panic!("unexpected ast: {other:?}"),
        }
    }

    #[test]
    fn parses_dotted_path() {
        let ast = parse("@metadata.owner=\"data-team\"").unwrap();
        match ast {
            Ast::FieldPred { path, .. } => assert_eq!(path, Path(vec!["metadata".into(), "owner".into()])),
            other => panic!("unexpected ast: {other:?}"),
        }
    }

    #[test]
    fn parses_and_not_conjunction() {
        // @type:"Table" AND @metadata.env = "prod" NOT archive
        let ast = parse("@type:\"Table\" AND @metadata.env = \"prod\" NOT archive").unwrap();
        match ast {
            Ast::And(l, r) => {
                assert!(matches!(*l, Ast::FieldPred { .. }));
                match *r {
                    Ast::And(l2, r2) => {
                        assert!(matches!(*l2, Ast::FieldPred { .. }));
                        assert!(matches!(*r2, Ast::Not(_)));
                    }
                    other => panic!("expected nested AND, got {other:?}"),
                }
            }
            other => panic!("expected AND, got {other:?}"),
        }
    }

    #[test]
    fn unterminated_phrase_is_parse_error_with_position() {
        let err = parse("@type:\"Table").unwrap_err();
        assert_eq!(err.position, 6);
    }

    #[test]
    fn unparse_reparse_is_stable() {
        let original = parse("@type:\"Table\" AND @metadata.env = \"prod\" NOT archive").unwrap();
        let rendered = original.to_string();
        let reparsed = parse(&rendered).unwrap();
        assert_eq!(original, reparsed);
    }

    #[test]
    fn empty_query_is_word_none() {
        assert_eq!(parse("").unwrap(), Ast::Word(String::new()));
        assert_eq!(parse("   ").unwrap(), Ast::Word(String::new()));
    }

    #[test]
    fn or_and_bare_bar() {
        let a = parse("foo OR bar").unwrap();
        let b = parse("foo | bar").unwrap();
        assert!(matches!(a, Ast::Or(_, _)));
        assert!(matches!(b, Ast::Or(_, _)));
    }

    #[test]
    fn dash_negation() {
        let ast = parse("-archive").unwrap();
        assert_eq!(ast, Ast::Not(Box::new(Ast::Word("archive".into()))));
    }
}
