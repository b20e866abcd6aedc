//! Constraint assembly (spec §4.D): a small hand-rolled recursive-descent
//! parser for the user-supplied expression language, plus compile-time
//! resolution of enum symbol references. The grammar:
//!
//! ```text
//! expr        := implication
//! implication := or ( "=>" or )?
//! or          := and ( "||" and )*
//! and         := cmp ( "&&" cmp )*
//! cmp         := sum ( ("==" | "!=" | "<" | "<=" | ">" | ">=") sum )?
//! sum         := term ( ("+" | "-") term )*
//! term        := unary ( ("*" | "/") unary )*
//! unary       := "!" unary | primary
//! primary     := INT | "self." path | IDENT | "(" expr ")"
//! path        := IDENT ( "." IDENT | "[" INT "]" )*
//! ```

use crate::enums::EnumIndex;
use crate::error::{GenError, Result};
use crate::tree::{NodeId, Tree};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone)]
pub enum Expr {
    Int(i64),
    /// An unresolved bare identifier; only valid before `compile` resolves
    /// it to an enum constant.
    Ident(String),
    /// A dotted/bracketed path rooted at the frame (spec §4.D), in the same
    /// syntax `tree::Tree::field` understands.
    Path(String),
    Not(Box<Expr>),
    Cmp(CmpOp, Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Implies(Box<Expr>, Box<Expr>),
    Add(Box<Expr>, Box<Expr>),
    Sub(Box<Expr>, Box<Expr>),
    Mul(Box<Expr>, Box<Expr>),
    Div(Box<Expr>, Box<Expr>),
}

impl Expr {
    /// Evaluate against a frame tree. Booleans are represented as 0/1, the
    /// same convention the original's plain `eval()` relied on.
    pub fn eval(&self, tree: &Tree, root: NodeId) -> Result<i64> {
        Ok(match self {
            Expr::Int(n) => *n,
            Expr::Ident(name) => {
                return Err(GenError::ConstraintCompileError {
                    expr: name.clone(),
                    reason: "identifier was never resolved".to_string(),
                })
            }
            Expr::Path(path) => {
                let node = tree.field(root, path)?;
                tree.get_val(node).to_u128().unwrap_or(0) as i64
            }
            Expr::Not(e) => (e.eval(tree, root)? == 0) as i64,
            Expr::Cmp(op, l, r) => {
                let (lv, rv) = (l.eval(tree, root)?, r.eval(tree, root)?);
                (match op {
                    CmpOp::Eq => lv == rv,
                    CmpOp::Ne => lv != rv,
                    CmpOp::Lt => lv < rv,
                    CmpOp::Le => lv <= rv,
                    CmpOp::Gt => lv > rv,
                    CmpOp::Ge => lv >= rv,
                }) as i64
            }
            Expr::And(l, r) => ((l.eval(tree, root)? != 0) && (r.eval(tree, root)? != 0)) as i64,
            Expr::Or(l, r) => ((l.eval(tree, root)? != 0) || (r.eval(tree, root)? != 0)) as i64,
            Expr::Implies(l, r) => ((l.eval(tree, root)? == 0) || (r.eval(tree, root)? != 0)) as i64,
            Expr::Add(l, r) => l.eval(tree, root)? + r.eval(tree, root)?,
            Expr::Sub(l, r) => l.eval(tree, root)? - r.eval(tree, root)?,
            Expr::Mul(l, r) => l.eval(tree, root)? * r.eval(tree, root)?,
            Expr::Div(l, r) => l.eval(tree, root)? / r.eval(tree, root)?,
        })
    }

    pub fn eval_bool(&self, tree: &Tree, root: NodeId) -> Result<bool> {
        Ok(self.eval(tree, root)? != 0)
    }

    /// True if evaluating this expression touches a path that does not
    /// exist on `root` — used to let built-in soft constraints opt out of
    /// frame layouts that lack the field they reference.
    pub fn references_missing_path(&self, tree: &Tree, root: NodeId) -> bool {
        match self {
            Expr::Path(path) => tree.field(root, path).is_err(),
            Expr::Not(e) => e.references_missing_path(tree, root),
            Expr::Cmp(_, l, r)
            | Expr::And(l, r)
            | Expr::Or(l, r)
            | Expr::Implies(l, r)
            | Expr::Add(l, r)
            | Expr::Sub(l, r)
            | Expr::Mul(l, r)
            | Expr::Div(l, r) => l.references_missing_path(tree, root) || r.references_missing_path(tree, root),
            Expr::Int(_) | Expr::Ident(_) => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Int(i64),
    Ident(String),
    Dot,
    LBracket,
    RBracket,
    LParen,
    RParen,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    AndAnd,
    OrOr,
    FatArrow,
    Plus,
    Minus,
    Star,
    Slash,
    Bang,
    Eof,
}

fn lex(src: &str) -> Result<Vec<Token>> {
    let fail = |msg: &str| GenError::ConstraintCompileError { expr: src.to_string(), reason: msg.to_string() };
    let chars: Vec<char> = src.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        match c {
            '.' => {
                tokens.push(Token::Dot);
                i += 1;
            }
            '[' => {
                tokens.push(Token::LBracket);
                i += 1;
            }
            ']' => {
                tokens.push(Token::RBracket);
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '+' => {
                tokens.push(Token::Plus);
                i += 1;
            }
            '-' => {
                tokens.push(Token::Minus);
                i += 1;
            }
            '*' => {
                tokens.push(Token::Star);
                i += 1;
            }
            '/' => {
                tokens.push(Token::Slash);
                i += 1;
            }
            '=' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Eq);
                i += 2;
            }
            '=' if chars.get(i + 1) == Some(&'>') => {
                tokens.push(Token::FatArrow);
                i += 2;
            }
            '!' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Ne);
                i += 2;
            }
            '!' => {
                tokens.push(Token::Bang);
                i += 1;
            }
            '<' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Le);
                i += 2;
            }
            '<' => {
                tokens.push(Token::Lt);
                i += 1;
            }
            '>' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Ge);
                i += 2;
            }
            '>' => {
                tokens.push(Token::Gt);
                i += 1;
            }
            '&' if chars.get(i + 1) == Some(&'&') => {
                tokens.push(Token::AndAnd);
                i += 2;
            }
            '|' if chars.get(i + 1) == Some(&'|') => {
                tokens.push(Token::OrOr);
                i += 2;
            }
            c if c.is_ascii_digit() => {
                let start = i;
                while i < chars.len() && chars[i].is_ascii_digit() {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let n: i64 = text.parse().map_err(|_| fail("malformed integer literal"))?;
                tokens.push(Token::Int(n));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                tokens.push(Token::Ident(text));
            }
            other => return Err(fail(&format!("unexpected character '{other}'"))),
        }
    }
    tokens.push(Token::Eof);
    Ok(tokens)
}

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    src: &'a str,
}

impl<'a> Parser<'a> {
    fn fail(&self, msg: &str) -> GenError {
        GenError::ConstraintCompileError { expr: self.src.to_string(), reason: msg.to_string() }
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn advance(&mut self) -> Token {
        let tok = self.tokens[self.pos].clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn expect(&mut self, expected: Token) -> Result<()> {
        if *self.peek() == expected {
            self.advance();
            Ok(())
        } else {
            Err(self.fail(&format!("expected {expected:?}, found {:?}", self.peek())))
        }
    }

    fn parse_expr(&mut self) -> Result<Expr> {
        self.parse_implication()
    }

    fn parse_implication(&mut self) -> Result<Expr> {
        let lhs = self.parse_or()?;
        if *self.peek() == Token::FatArrow {
            self.advance();
            let rhs = self.parse_or()?;
            return Ok(Expr::Implies(Box::new(lhs), Box::new(rhs)));
        }
        Ok(lhs)
    }

    fn parse_or(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_and()?;
        while *self.peek() == Token::OrOr {
            self.advance();
            let rhs = self.parse_and()?;
            lhs = Expr::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_cmp()?;
        while *self.peek() == Token::AndAnd {
            self.advance();
            let rhs = self.parse_cmp()?;
            lhs = Expr::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_cmp(&mut self) -> Result<Expr> {
        let lhs = self.parse_sum()?;
        let op = match self.peek() {
            Token::Eq => CmpOp::Eq,
            Token::Ne => CmpOp::Ne,
            Token::Lt => CmpOp::Lt,
            Token::Le => CmpOp::Le,
            Token::Gt => CmpOp::Gt,
            Token::Ge => CmpOp::Ge,
            _ => return Ok(lhs),
        };
        self.advance();
        let rhs = self.parse_sum()?;
        Ok(Expr::Cmp(op, Box::new(lhs), Box::new(rhs)))
    }

    fn parse_sum(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_term()?;
        loop {
            match self.peek() {
                Token::Plus => {
                    self.advance();
                    lhs = Expr::Add(Box::new(lhs), Box::new(self.parse_term()?));
                }
                Token::Minus => {
                    self.advance();
                    lhs = Expr::Sub(Box::new(lhs), Box::new(self.parse_term()?));
                }
                _ => break,
            }
        }
        Ok(lhs)
    }

    fn parse_term(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_unary()?;
        loop {
            match self.peek() {
                Token::Star => {
                    self.advance();
                    lhs = Expr::Mul(Box::new(lhs), Box::new(self.parse_unary()?));
                }
                Token::Slash => {
                    self.advance();
                    lhs = Expr::Div(Box::new(lhs), Box::new(self.parse_unary()?));
                }
                _ => break,
            }
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        if *self.peek() == Token::Bang {
            self.advance();
            return Ok(Expr::Not(Box::new(self.parse_unary()?)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        match self.advance() {
            Token::Int(n) => Ok(Expr::Int(n)),
            Token::Ident(name) if name == "self" || name == "frame" => {
                self.expect(Token::Dot)?;
                let path = self.parse_path()?;
                Ok(Expr::Path(path))
            }
            Token::Ident(name) => Ok(Expr::Ident(name)),
            Token::LParen => {
                let e = self.parse_expr()?;
                self.expect(Token::RParen)?;
                Ok(e)
            }
            other => Err(self.fail(&format!("unexpected token {other:?}"))),
        }
    }

    fn parse_path(&mut self) -> Result<String> {
        let mut out = String::new();
        match self.advance() {
            Token::Ident(name) => out.push_str(&name),
            other => return Err(self.fail(&format!("expected field name, found {other:?}"))),
        }
        loop {
            match self.peek() {
                Token::Dot => {
                    self.advance();
                    out.push('.');
                    match self.advance() {
                        Token::Ident(name) => out.push_str(&name),
                        other => return Err(self.fail(&format!("expected field name, found {other:?}"))),
                    }
                }
                Token::LBracket => {
                    self.advance();
                    match self.advance() {
                        Token::Int(n) => out.push_str(&format!("[{n}]")),
                        other => return Err(self.fail(&format!("expected array index, found {other:?}"))),
                    }
                    self.expect(Token::RBracket)?;
                }
                _ => break,
            }
        }
        Ok(out)
    }
}

fn resolve_idents(expr: Expr, enums: &EnumIndex, src: &str) -> Result<Expr> {
    let go = |e: Expr, enums: &EnumIndex| resolve_idents(e, enums, src);
    Ok(match expr {
        Expr::Ident(name) => {
            let value = enums.resolve(&name).ok_or_else(|| GenError::ConstraintCompileError {
                expr: src.to_string(),
                reason: format!("unknown identifier '{name}'"),
            })?;
            Expr::Int(value)
        }
        Expr::Int(n) => Expr::Int(n),
        Expr::Path(p) => Expr::Path(p),
        Expr::Not(e) => Expr::Not(Box::new(go(*e, enums)?)),
        Expr::Cmp(op, l, r) => Expr::Cmp(op, Box::new(go(*l, enums)?), Box::new(go(*r, enums)?)),
        Expr::And(l, r) => Expr::And(Box::new(go(*l, enums)?), Box::new(go(*r, enums)?)),
        Expr::Or(l, r) => Expr::Or(Box::new(go(*l, enums)?), Box::new(go(*r, enums)?)),
        Expr::Implies(l, r) => Expr::Implies(Box::new(go(*l, enums)?), Box::new(go(*r, enums)?)),
        Expr::Add(l, r) => Expr::Add(Box::new(go(*l, enums)?), Box::new(go(*r, enums)?)),
        Expr::Sub(l, r) => Expr::Sub(Box::new(go(*l, enums)?), Box::new(go(*r, enums)?)),
        Expr::Mul(l, r) => Expr::Mul(Box::new(go(*l, enums)?), Box::new(go(*r, enums)?)),
        Expr::Div(l, r) => Expr::Div(Box::new(go(*l, enums)?), Box::new(go(*r, enums)?)),
    })
}

/// Compile one user constraint expression: lex, parse, then resolve bare
/// identifiers to enum constants (spec §4.D / Design Notes).
pub fn compile(text: &str, enums: &EnumIndex) -> Result<Expr> {
    let tokens = lex(text)?;
    let mut parser = Parser { tokens, pos: 0, src: text };
    let ast = parser.parse_expr()?;
    if *parser.peek() != Token::Eof {
        return Err(GenError::ConstraintCompileError {
            expr: text.to_string(),
            reason: "trailing tokens after expression".to_string(),
        });
    }
    resolve_idents(ast, enums, text)
}

/// One constraint, named for diagnostics, flagged soft/hard (spec §4.D).
#[derive(Debug, Clone)]
pub struct Constraint {
    pub name: String,
    pub expr: Expr,
    pub soft: bool,
}

/// The base constraint set applied to every frame before user constraints
/// (spec §4.D). Soft constraints whose path does not exist on this frame
/// layout are dropped rather than failing the whole frame.
pub fn builtin_constraints(enums: &EnumIndex) -> Vec<Constraint> {
    let path = |p: &str| Expr::Path(p.to_string());
    let gt_zero = |p: &str| Expr::Cmp(CmpOp::Gt, Box::new(path(p)), Box::new(Expr::Int(0)));
    let mut constraints = vec![
        Constraint { name: "count_positive".to_string(), expr: gt_zero("fields.count"), soft: true },
        Constraint { name: "width_positive".to_string(), expr: gt_zero("fields.width"), soft: true },
        Constraint { name: "height_positive".to_string(), expr: gt_zero("fields.height"), soft: true },
        Constraint { name: "depth_positive".to_string(), expr: gt_zero("fields.depth"), soft: true },
    ];
    if let Some(frame_single) = enums.resolve("FRAME_SINGLE") {
        constraints.push(Constraint {
            name: "frame_single_implies_count_one".to_string(),
            expr: Expr::Implies(
                Box::new(Expr::Cmp(
                    CmpOp::Eq,
                    Box::new(path("fields.type")),
                    Box::new(Expr::Int(frame_single)),
                )),
                Box::new(Expr::Cmp(CmpOp::Eq, Box::new(path("fields.count")), Box::new(Expr::Int(1)))),
            ),
            soft: true,
        });
    }
    constraints
}

#[cfg(test)]
mod test {
    use super::*;
    use std::collections::HashMap;

    fn empty_enums() -> EnumIndex {
        EnumIndex::new(HashMap::new())
    }

    #[test]
    fn parses_comparison_with_self_path() {
        let expr = compile("self.fields.count == 5", &empty_enums()).unwrap();
        assert!(matches!(expr, Expr::Cmp(CmpOp::Eq, _, _)));
    }

    #[test]
    fn frame_prefix_is_accepted_as_self_alias() {
        let expr = compile("frame.fields.count == 5", &empty_enums()).unwrap();
        assert!(matches!(expr, Expr::Cmp(CmpOp::Eq, _, _)));
    }

    #[test]
    fn unresolved_identifier_is_compile_error() {
        let err = compile("self.fields.type == FRAME_SINGLE", &empty_enums()).unwrap_err();
        assert!(matches!(err, GenError::ConstraintCompileError { .. }));
    }

    #[test]
    fn operator_precedence_respects_grammar() {
        // 2 + 3 * 4 == 14, not 20
        let expr = compile("2 + 3 * 4 == 14", &empty_enums()).unwrap();
        let tree = crate::tree::Tree::instantiate(&crate::types::TypeDescriptor::BaseInt(
            crate::types::BaseIntWidth::W8,
        ))
        .unwrap();
        assert_eq!(expr.eval(&tree, tree.root()).unwrap(), 1);
    }

    #[test]
    fn implication_short_circuits_on_false_antecedent() {
        let expr = compile("1 == 2 => 1 == 2", &empty_enums()).unwrap();
        let tree = crate::tree::Tree::instantiate(&crate::types::TypeDescriptor::BaseInt(
            crate::types::BaseIntWidth::W8,
        ))
        .unwrap();
        assert_eq!(expr.eval(&tree, tree.root()).unwrap(), 1);
    }
}
