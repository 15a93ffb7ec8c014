//! Parser for the conditions of `.if` and `.elif` directives.
//!
//! ```text
//! or      := and ("||" and)*
//! and     := atom ("&&" atom)*
//! atom    := "!" atom | "(" or ")" | "defined(" name ")" | "empty(" name modifiers ")"
//!          | ("commands" | "exists" | "make" | "target") "(" arg ")"
//!          | expr [cmp-op (number | string | expr)] | number
//! ```
//!
//! An expression without comparison, as in `.if ${VAR}`, means
//! `!empty(VAR)`.

use std::fmt;

use thiserror::Error;

use super::expr::{self, Cursor, VarRef};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Lt,
    Le,
    Eq,
    Ne,
    Ge,
    Gt,
}

impl CmpOp {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Ge => ">=",
            Self::Gt => ">",
        }
    }

    fn parse(cur: &mut Cursor<'_>) -> Option<Self> {
        const OPS: [(&str, CmpOp); 6] = [
            ("<=", CmpOp::Le),
            ("==", CmpOp::Eq),
            ("!=", CmpOp::Ne),
            (">=", CmpOp::Ge),
            ("<", CmpOp::Lt),
            (">", CmpOp::Gt),
        ];
        OPS.iter().find(|(text, _)| cur.eat_str(text)).map(|&(_, op)| op)
    }
}

impl fmt::Display for CmpOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cond {
    Or(Vec<Cond>),
    And(Vec<Cond>),
    Not(Box<Cond>),
    /// `defined(VAR)`
    Defined(String),
    /// `empty(VAR:M*)`
    Empty(VarRef),
    /// `${VAR} >= 2`
    CompareNum { lhs: VarRef, op: CmpOp, num: String },
    /// `${VAR} == "string"` or `${VAR} == word`
    CompareStr { lhs: VarRef, op: CmpOp, value: String },
    /// `${A} == ${B}`
    CompareExpr { lhs: VarRef, op: CmpOp, rhs: VarRef },
    /// `exists(file)`, `make(target)` etc.
    Call { func: String, arg: String },
    Number(String),
}

/// Callbacks for [`Cond::walk`]. All methods default to doing nothing.
pub trait CondVisitor {
    fn defined(&mut self, _varname: &str) {}
    fn empty(&mut self, _varref: &VarRef) {}
    fn compare_num(&mut self, _lhs: &VarRef, _op: CmpOp, _num: &str) {}
    fn compare_str(&mut self, _lhs: &VarRef, _op: CmpOp, _value: &str) {}
    fn compare_expr(&mut self, _lhs: &VarRef, _op: CmpOp, _rhs: &VarRef) {}
    fn call(&mut self, _func: &str, _arg: &str) {}
    /// Every reference whose value the condition evaluates, including
    /// those in function arguments. `defined(...)` does not evaluate.
    fn reference(&mut self, _varref: &VarRef) {}
}

impl Cond {
    /// Visit every leaf, left to right.
    pub fn walk<V: CondVisitor + ?Sized>(&self, v: &mut V) {
        match self {
            Self::Or(conds) | Self::And(conds) => {
                for cond in conds {
                    cond.walk(v);
                }
            }
            Self::Not(cond) => cond.walk(v),
            Self::Defined(name) => v.defined(name),
            Self::Empty(r) => {
                v.empty(r);
                visit_references(v, &r.text);
            }
            Self::CompareNum { lhs, op, num } => {
                v.compare_num(lhs, *op, num);
                visit_references(v, &lhs.text);
            }
            Self::CompareStr { lhs, op, value } => {
                v.compare_str(lhs, *op, value);
                visit_references(v, &lhs.text);
            }
            Self::CompareExpr { lhs, op, rhs } => {
                v.compare_expr(lhs, *op, rhs);
                visit_references(v, &lhs.text);
                visit_references(v, &rhs.text);
            }
            Self::Call { func, arg } => {
                v.call(func, arg);
                visit_references(v, arg);
            }
            Self::Number(_) => {}
        }
    }
}

/// The references in `text` and those nested in their names and modifiers.
fn visit_references<V: CondVisitor + ?Sized>(v: &mut V, text: &str) {
    for r in expr::references(text) {
        v.reference(&r);
    }
}

/// The condition could not be parsed completely.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid condition, unrecognized part: {rest:?}")]
pub struct CondSyntaxError {
    pub rest: String,
}

/// Parse a complete condition.
pub fn parse_condition(text: &str) -> Result<Cond, CondSyntaxError> {
    let mut cur = Cursor::new(text);
    let cond = or(&mut cur);
    cur.skip_hspace();
    match cond {
        Some(cond) if cur.is_eof() => Ok(cond),
        _ => {
            log::trace!("condition {text:?} not parsed beyond {:?}", cur.rest());
            Err(CondSyntaxError {
                rest: cur.rest().to_string(),
            })
        }
    }
}

fn or(cur: &mut Cursor<'_>) -> Option<Cond> {
    let first = and(cur)?;
    let mut conds = vec![first];
    loop {
        let mark = *cur;
        cur.skip_hspace();
        let next = if cur.eat_str("||") { and(cur) } else { None };
        match next {
            Some(cond) => conds.push(cond),
            None => {
                *cur = mark;
                break;
            }
        }
    }
    Some(flatten(conds, Cond::Or))
}

fn and(cur: &mut Cursor<'_>) -> Option<Cond> {
    let first = atom(cur)?;
    let mut conds = vec![first];
    loop {
        let mark = *cur;
        cur.skip_hspace();
        let next = if cur.eat_str("&&") { atom(cur) } else { None };
        match next {
            Some(cond) => conds.push(cond),
            None => {
                *cur = mark;
                break;
            }
        }
    }
    Some(flatten(conds, Cond::And))
}

fn flatten(mut conds: Vec<Cond>, wrap: fn(Vec<Cond>) -> Cond) -> Cond {
    if conds.len() == 1 {
        conds.remove(0)
    } else {
        wrap(conds)
    }
}

/// `name(`, allowing whitespace before the parenthesis.
fn function_start(cur: &mut Cursor<'_>, name: &str) -> bool {
    let mut c = *cur;
    if !c.eat_str(name) {
        return false;
    }
    c.skip_hspace();
    if c.eat(b'(') {
        *cur = c;
        true
    } else {
        false
    }
}

fn atom(cur: &mut Cursor<'_>) -> Option<Cond> {
    let start = *cur;
    cur.skip_hspace();
    let result = if cur.eat(b'!') {
        atom(cur).map(|cond| Cond::Not(Box::new(cond)))
    } else if cur.eat(b'(') {
        or(cur).filter(|_| {
            cur.skip_hspace();
            cur.eat(b')')
        })
    } else if function_start(cur, "defined") {
        let name = expr::parse_varname(cur).to_string();
        (!name.is_empty() && cur.eat(b')')).then_some(Cond::Defined(name))
    } else if function_start(cur, "empty") {
        empty(cur)
    } else if let Some(func) = ["commands", "exists", "make", "target"]
        .into_iter()
        .find(|f| function_start(cur, f))
    {
        let mark = cur.pos();
        skip_call_argument(cur);
        let arg = cur.since(mark).to_string();
        cur.eat(b')').then(|| Cond::Call {
            func: func.to_string(),
            arg,
        })
    } else {
        comparison(cur)
    };

    if result.is_none() {
        *cur = start;
    }
    result
}

fn empty(cur: &mut Cursor<'_>) -> Option<Cond> {
    let name = expr::parse_varname(cur).to_string();
    if name.is_empty() {
        return None;
    }
    let (modifiers, malformed) = expr::parse_modifiers(cur, b')');
    if malformed || !cur.eat(b')') {
        return None;
    }
    Some(Cond::Empty(VarRef::new(&name, modifiers)))
}

fn skip_call_argument(cur: &mut Cursor<'_>) {
    loop {
        if cur.peek() == Some(b'$') {
            let mut c = *cur;
            if expr::reference(&mut c).is_some_and(|r| !r.malformed) {
                *cur = c;
                continue;
            }
        }
        match cur.peek() {
            Some(b) if b != b')' => cur.bump_char(),
            _ => break,
        }
    }
}

/// A well-formed reference, optionally enclosed in double quotes.
fn operand_reference(cur: &mut Cursor<'_>) -> Option<VarRef> {
    let mut c = *cur;
    let quoted = c.eat(b'"');
    let r = expr::reference(&mut c).filter(|r| !r.malformed)?;
    if quoted && !c.eat(b'"') {
        return None;
    }
    *cur = c;
    Some(r)
}

fn number(cur: &mut Cursor<'_>) -> Option<String> {
    let mark = cur.pos();
    let digits = |cur: &mut Cursor<'_>| {
        let m = cur.pos();
        while cur.peek().is_some_and(|b| b.is_ascii_digit()) {
            cur.bump(1);
        }
        cur.pos() > m
    };
    if !digits(cur) {
        return None;
    }
    let mut c = *cur;
    if c.eat(b'.') && digits(&mut c) {
        *cur = c;
    }
    Some(cur.since(mark).to_string())
}

fn comparison(cur: &mut Cursor<'_>) -> Option<Cond> {
    let Some(lhs) = operand_reference(cur) else {
        return number(cur).map(Cond::Number);
    };

    let mark = *cur;
    cur.skip_hspace();
    let Some(op) = CmpOp::parse(cur) else {
        *cur = mark;
        return Some(Cond::Not(Box::new(Cond::Empty(lhs))));
    };
    cur.skip_hspace();

    if let Some(num) = number(cur) {
        return Some(Cond::CompareNum { lhs, op, num });
    }
    if matches!(op, CmpOp::Eq | CmpOp::Ne) && cur.peek() == Some(b'"') {
        let mut c = *cur;
        c.bump(1);
        let m = c.pos();
        while c.peek().is_some_and(|b| !matches!(b, b'"' | b'$' | b'\\')) {
            c.bump_char();
        }
        let value = c.since(m).to_string();
        if c.eat(b'"') {
            *cur = c;
            return Some(Cond::CompareStr { lhs, op, value });
        }
    }
    let m = cur.pos();
    while cur.peek().is_some_and(|b| b.is_ascii_alphanumeric() || b == b'_') {
        cur.bump(1);
    }
    if cur.pos() > m {
        let value = cur.since(m).to_string();
        return Some(Cond::CompareStr { lhs, op, value });
    }
    operand_reference(cur).map(|rhs| Cond::CompareExpr { lhs, op, rhs })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Cond {
        parse_condition(text).unwrap_or_else(|e| panic!("{text:?}: {e}"))
    }

    fn var(name: &str) -> VarRef {
        VarRef::new(name, Vec::new())
    }

    #[test]
    fn bare_expression_means_not_empty() {
        assert_eq!(
            parse("${VAR}"),
            Cond::Not(Box::new(Cond::Empty(var("VAR"))))
        );
    }

    #[test]
    fn string_comparison() {
        assert_eq!(
            parse("${OPSYS} == \"NetBSD\""),
            Cond::CompareStr {
                lhs: var("OPSYS"),
                op: CmpOp::Eq,
                value: "NetBSD".into()
            }
        );
        assert_eq!(
            parse("${OPSYS}!=Linux"),
            Cond::CompareStr {
                lhs: var("OPSYS"),
                op: CmpOp::Ne,
                value: "Linux".into()
            }
        );
    }

    #[test]
    fn numeric_comparison() {
        assert_eq!(
            parse("${VERSION} >= 2.5"),
            Cond::CompareNum {
                lhs: var("VERSION"),
                op: CmpOp::Ge,
                num: "2.5".into()
            }
        );
        assert!(matches!(
            parse("${N} <= 3"),
            Cond::CompareNum { op: CmpOp::Le, .. }
        ));
    }

    #[test]
    fn expression_comparison() {
        assert!(matches!(parse("${A} == ${B}"), Cond::CompareExpr { .. }));
        assert!(matches!(parse("\"${A}\" == \"${B}\""), Cond::CompareExpr { .. }));
    }

    #[test]
    fn functions() {
        assert_eq!(parse("defined(VAR)"), Cond::Defined("VAR".into()));
        assert_eq!(parse("defined (VAR)"), Cond::Defined("VAR".into()));
        match parse("empty(VAR:M*.c)") {
            Cond::Empty(r) => {
                assert_eq!(r.name, "VAR");
                assert_eq!(r.modifiers[0].text(), "M*.c");
            }
            other => panic!("{other:?}"),
        }
        assert_eq!(
            parse("exists(${PREFIX}/bin/tool)"),
            Cond::Call {
                func: "exists".into(),
                arg: "${PREFIX}/bin/tool".into()
            }
        );
    }

    #[test]
    fn precedence() {
        let cond = parse("defined(A) || defined(B) && !defined(C)");
        assert_eq!(
            cond,
            Cond::Or(vec![
                Cond::Defined("A".into()),
                Cond::And(vec![
                    Cond::Defined("B".into()),
                    Cond::Not(Box::new(Cond::Defined("C".into()))),
                ]),
            ])
        );
    }

    #[test]
    fn parentheses() {
        let cond = parse("(defined(A) || defined(B)) && defined(C)");
        assert!(matches!(cond, Cond::And(ref conds) if matches!(conds[0], Cond::Or(_))));
    }

    #[test]
    fn number_literal() {
        assert_eq!(parse("0"), Cond::Number("0".into()));
    }

    #[test]
    fn unrecognized_rest() {
        let err = parse_condition("defined(A) junk").unwrap_err();
        assert_eq!(err.rest, "junk");
        assert!(parse_condition("${A} ==").is_err());
        assert!(parse_condition("").is_err());
    }

    #[derive(Default)]
    struct Collect {
        refs: Vec<String>,
        strings: Vec<String>,
    }

    impl CondVisitor for Collect {
        fn compare_str(&mut self, _lhs: &VarRef, _op: CmpOp, value: &str) {
            self.strings.push(value.to_string());
        }
        fn reference(&mut self, varref: &VarRef) {
            self.refs.push(varref.name.clone());
        }
    }

    #[test]
    fn walker_visits_all_leaves() {
        let cond = parse("defined(A) && ${B:M*} == x || exists(${C}/f) || !empty(D)");
        let mut v = Collect::default();
        cond.walk(&mut v);
        assert_eq!(v.refs, vec!["B", "C", "D"]);
        assert_eq!(v.strings, vec!["x"]);
    }

    #[test]
    fn walker_visits_nested_references() {
        let cond = parse("${A.${B}:M${C}} == ${D:S,x,${E},} && ${F} > 2");
        let mut v = Collect::default();
        cond.walk(&mut v);
        assert_eq!(v.refs, vec!["A.${B}", "B", "C", "D", "E", "F"]);
    }
}
