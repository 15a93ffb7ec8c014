//! Lexer for Makefile text with variable references.
//!
//! The lexer splits text into literal runs and references like `${VAR}`,
//! `$(VAR)`, `${VAR:M*:Q}`, `$@` or `$x`. Names may contain nested
//! references (`${PREFIX.${PKGBASE}}`), and so may modifier arguments.
//! Malformed references never stop the lexer: the reference is returned
//! with [`VarRef::malformed`] set and lexing continues after it.

use super::modifier::{Modifier, ModifierKind};

/// How a reference is delimited in the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delimiter {
    /// `${VAR}`
    Curly,
    /// `$(VAR)`
    Paren,
    /// `$@`, `$x`
    None,
}

/// A variable reference together with its modifier chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VarRef {
    /// The complete source text, including `$` and the delimiters.
    pub text: String,
    /// The variable name, possibly containing nested references, or the
    /// expression itself for forms like `${:Uvalue}`.
    pub name: String,
    pub modifiers: Vec<Modifier>,
    pub delim: Delimiter,
    /// The reference is unterminated or contains unparseable modifiers.
    pub malformed: bool,
    /// A bare `$name` such as `$x`, which make reads as `${x}` but the
    /// author may have meant for the shell.
    pub ambiguous: bool,
}

impl VarRef {
    /// A well-formed `${name:modifiers}` reference.
    pub fn new(name: &str, modifiers: Vec<Modifier>) -> Self {
        let mut r = Self {
            text: String::new(),
            name: name.to_string(),
            modifiers,
            delim: Delimiter::Curly,
            malformed: false,
            ambiguous: false,
        };
        r.text = r.with_curly_braces();
        r
    }

    /// The last modifier is `:Q`.
    pub fn is_q(&self) -> bool {
        self.modifiers.last().is_some_and(Modifier::is_q)
    }

    /// The modifier chain as written, e.g. `:M*:Q`.
    pub fn modifier_text(&self) -> String {
        self.modifiers.iter().map(|m| format!(":{m}")).collect()
    }

    /// The name contains a nested reference, such as in `${PREFIX.${PKG}}`.
    pub fn is_indirect(&self) -> bool {
        self.name.contains('$')
    }

    /// The reference as it would be written with curly braces.
    pub fn with_curly_braces(&self) -> String {
        format!("${{{}{}}}", self.name, self.modifier_text())
    }
}

/// A piece of lexed text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expression {
    /// Text without references; `$$` stays as written.
    Literal(String),
    Reference(VarRef),
}

impl Expression {
    pub fn text(&self) -> &str {
        match self {
            Self::Literal(text) => text,
            Self::Reference(r) => &r.text,
        }
    }

    pub fn as_reference(&self) -> Option<&VarRef> {
        match self {
            Self::Reference(r) => Some(r),
            Self::Literal(_) => None,
        }
    }
}

/// Deepest nesting of `${...}` inside names and modifiers that is parsed.
/// A reference nested deeper makes all enclosing ones malformed.
const MAX_NESTING: usize = 32;

/// Position in the source text. Parsing functions take `&mut Cursor` and
/// copy it to backtrack.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Cursor<'a> {
    src: &'a str,
    pos: usize,
    /// Number of enclosing references.
    depth: usize,
    /// End of a nested reference that turned out malformed. Once set, the
    /// skipping functions stop and the enclosing reference ends there.
    failed_at: Option<usize>,
}

impl<'a> Cursor<'a> {
    pub(crate) fn new(src: &'a str) -> Self {
        Self::at(src, 0)
    }

    pub(crate) fn at(src: &'a str, pos: usize) -> Self {
        Self {
            src,
            pos,
            depth: 0,
            failed_at: None,
        }
    }

    pub(crate) fn pos(&self) -> usize {
        self.pos
    }

    pub(crate) fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    pub(crate) fn is_eof(&self) -> bool {
        self.pos >= self.src.len()
    }

    pub(crate) fn peek(&self) -> Option<u8> {
        self.src.as_bytes().get(self.pos).copied()
    }

    pub(crate) fn peek_at(&self, offset: usize) -> Option<u8> {
        self.src.as_bytes().get(self.pos + offset).copied()
    }

    /// Advance by `n` bytes; callers only skip ASCII.
    pub(crate) fn bump(&mut self, n: usize) {
        self.pos = (self.pos + n).min(self.src.len());
    }

    /// Advance over one complete character.
    pub(crate) fn bump_char(&mut self) {
        if let Some(c) = self.rest().chars().next() {
            self.pos += c.len_utf8();
        }
    }

    pub(crate) fn eat(&mut self, b: u8) -> bool {
        if self.peek() == Some(b) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    pub(crate) fn eat_str(&mut self, s: &str) -> bool {
        if self.rest().starts_with(s) {
            self.pos += s.len();
            true
        } else {
            false
        }
    }

    pub(crate) fn skip_hspace(&mut self) {
        while matches!(self.peek(), Some(b' ' | b'\t')) {
            self.pos += 1;
        }
    }

    pub(crate) fn since(&self, mark: usize) -> &'a str {
        &self.src[mark..self.pos]
    }

    /// Try a nested reference at the cursor; on failure the cursor stays.
    ///
    /// A malformed nested reference is not retried by the caller: it is
    /// recorded in `failed_at` and every later skip stops immediately.
    fn nested_reference(&mut self) -> bool {
        if self.failed_at.is_some() || self.peek() != Some(b'$') {
            return false;
        }
        if self.depth >= MAX_NESTING && matches!(self.peek_at(1), Some(b'{' | b'(')) {
            self.failed_at = Some(self.pos);
            return false;
        }
        let mut c = Cursor {
            depth: self.depth + 1,
            failed_at: None,
            ..*self
        };
        match reference(&mut c) {
            Some(r) if !r.malformed => {
                self.pos = c.pos;
                true
            }
            Some(_) => {
                self.failed_at = Some(c.pos);
                false
            }
            None => false,
        }
    }

    /// Skip nested references and characters for which `plain` holds,
    /// treating `$$` as a single plain character.
    fn skip_text(&mut self, plain: impl Fn(u8) -> bool) {
        while self.failed_at.is_none() {
            if self.nested_reference() || self.eat_str("$$") {
                continue;
            }
            match self.peek() {
                Some(b) if b != b'$' && plain(b) => self.bump_char(),
                _ => break,
            }
        }
    }

    /// Like [`skip_text`](Self::skip_text), additionally skipping `\x`
    /// escapes.
    fn skip_escaped_text(&mut self, plain: impl Fn(u8) -> bool) {
        while self.failed_at.is_none() {
            if self.peek() == Some(b'\\') && self.peek_at(1).is_some() {
                self.bump(1);
                self.bump_char();
                continue;
            }
            let before = self.pos;
            self.skip_text(|b| b != b'\\' && plain(b));
            if self.pos == before {
                break;
            }
        }
    }
}

/// Lazy sequence of [`Expression`]s over one piece of text.
#[derive(Debug, Clone)]
pub struct ExprLexer<'a> {
    cursor: Cursor<'a>,
}

impl<'a> ExprLexer<'a> {
    pub fn new(text: &'a str) -> Self {
        Self {
            cursor: Cursor::new(text),
        }
    }

    /// The text not yet lexed.
    pub fn rest(&self) -> &'a str {
        self.cursor.rest()
    }
}

impl Iterator for ExprLexer<'_> {
    type Item = Expression;

    fn next(&mut self) -> Option<Expression> {
        let cur = &mut self.cursor;
        if cur.is_eof() {
            return None;
        }

        if cur.peek() == Some(b'$') && cur.peek_at(1) != Some(b'$') {
            let mut c = *cur;
            if let Some(r) = reference(&mut c) {
                *cur = c;
                return Some(Expression::Reference(r));
            }
        }

        let mark = cur.pos;
        while let Some(b) = cur.peek() {
            if b != b'$' {
                cur.bump_char();
            } else if cur.peek_at(1) == Some(b'$') {
                cur.bump(2);
            } else {
                let mut probe = *cur;
                if cur.pos > mark && reference(&mut probe).is_some() {
                    break;
                }
                cur.bump(1);
            }
        }
        Some(Expression::Literal(cur.since(mark).to_string()))
    }
}

/// Split text into literal runs and variable references.
pub fn tokenize(text: &str) -> ExprLexer<'_> {
    ExprLexer::new(text)
}

/// Parse the reference starting at byte `pos` of `text`, if any.
pub fn reference_at(text: &str, pos: usize) -> Option<VarRef> {
    reference(&mut Cursor::at(text, pos))
}

/// All references in the text, including those nested in names and
/// modifier arguments, outermost first.
pub fn references(text: &str) -> Vec<VarRef> {
    let mut result = Vec::new();
    collect_references(text, &mut result);
    result
}

fn collect_references(text: &str, out: &mut Vec<VarRef>) {
    for expr in tokenize(text) {
        if let Expression::Reference(r) = expr {
            let inner: Vec<String> = std::iter::once(r.name.clone())
                .chain(r.modifiers.iter().map(|m| m.text().to_string()))
                .filter(|s| s.contains('$'))
                .collect();
            out.push(r);
            for text in inner {
                collect_references(&text, out);
            }
        }
    }
}

/// Variable names of bmake's local variables that have one-character names.
const IMMEDIATE: &[u8] = b"@<*?>%!";

/// Parse one reference at the cursor, which must point at `$`.
///
/// Returns `None` if the `$` does not start a reference (`$$`, `$` at the
/// end, `$ `). Otherwise the cursor is advanced past the reference, or up
/// to the point where parsing failed for a malformed one.
pub(crate) fn reference(cur: &mut Cursor<'_>) -> Option<VarRef> {
    cur.failed_at = None;
    let start = cur.pos;
    if !cur.eat(b'$') {
        return None;
    }

    let (delim, closing) = match cur.peek() {
        Some(b'{') => (Delimiter::Curly, b'}'),
        Some(b'(') => (Delimiter::Paren, b')'),
        Some(b) if IMMEDIATE.contains(&b) => {
            cur.bump(1);
            return Some(simple_reference(cur, start, 1, false));
        }
        Some(b) if b.is_ascii_alphanumeric() || b == b'_' => {
            let mark = cur.pos;
            while cur.peek().is_some_and(|b| b.is_ascii_alphanumeric() || b == b'_') {
                cur.bump(1);
            }
            let len = cur.pos - mark;
            return Some(simple_reference(cur, start, len, true));
        }
        _ => {
            cur.pos = start;
            return None;
        }
    };
    cur.bump(1);
    let name_mark = cur.pos;

    let name = parse_varname(cur).to_string();
    if let Some(end) = cur.failed_at {
        return Some(abandoned(cur, start, end, name, Vec::new(), delim));
    }
    if !name.is_empty() {
        let mut c = *cur;
        let (modifiers, malformed) = parse_modifiers(&mut c, closing);
        if let Some(end) = c.failed_at {
            return Some(abandoned(cur, start, end, name, modifiers, delim));
        }
        if c.eat(closing) {
            *cur = c;
            return Some(VarRef {
                text: cur.since(start).to_string(),
                name,
                modifiers,
                delim,
                malformed,
                ambiguous: false,
            });
        }
    }

    // The expression itself as the name, as in ${:Uvalue} or ${cond:?yes:no}.
    let mut c = *cur;
    c.skip_text(|b| b != b':' && b != closing);
    if let Some(end) = c.failed_at {
        return Some(abandoned(cur, start, end, name, Vec::new(), delim));
    }
    if [":L", ":?", ":U", ":D"].iter().any(|p| c.rest().starts_with(p)) {
        let expr_name = c.since(name_mark).to_string();
        let (modifiers, malformed) = parse_modifiers(&mut c, closing);
        if let Some(end) = c.failed_at {
            return Some(abandoned(cur, start, end, expr_name, modifiers, delim));
        }
        if c.eat(closing) {
            *cur = c;
            return Some(VarRef {
                text: cur.since(start).to_string(),
                name: expr_name,
                modifiers,
                delim,
                malformed,
                ambiguous: false,
            });
        }
    }

    // Malformed: keep what could be parsed. If the reference is closed
    // later on, the part in between becomes an unparsed modifier.
    let mut c = *cur;
    let (mut modifiers, _) = parse_modifiers(&mut c, closing);
    let junk_mark = c.pos;
    let closed = skip_to_closing(&mut c, closing);
    if let Some(end) = c.failed_at {
        return Some(abandoned(cur, start, end, name, modifiers, delim));
    }
    if closed {
        let junk = &c.src[junk_mark..c.pos - 1];
        if !junk.is_empty() {
            modifiers.push(Modifier::new(junk, ModifierKind::Unparsed));
        }
        *cur = c;
    } else {
        cur.pos = junk_mark;
    }
    log::trace!("malformed reference {:?}", cur.since(start));
    Some(VarRef {
        text: cur.since(start).to_string(),
        name,
        modifiers,
        delim,
        malformed: true,
        ambiguous: false,
    })
}

/// A reference that contains a malformed nested reference. It ends where
/// the nested one ends, without looking for its own closing delimiter.
fn abandoned(
    cur: &mut Cursor<'_>,
    start: usize,
    end: usize,
    name: String,
    modifiers: Vec<Modifier>,
    delim: Delimiter,
) -> VarRef {
    cur.pos = end;
    cur.failed_at = None;
    log::trace!("malformed nested reference in {:?}", cur.since(start));
    VarRef {
        text: cur.since(start).to_string(),
        name,
        modifiers,
        delim,
        malformed: true,
        ambiguous: false,
    }
}

fn simple_reference(cur: &Cursor<'_>, start: usize, len: usize, ambiguous: bool) -> VarRef {
    let text = cur.since(start);
    VarRef {
        text: text.to_string(),
        name: text[1..1 + len].to_string(),
        modifiers: Vec::new(),
        delim: Delimiter::None,
        malformed: false,
        ambiguous,
    }
}

/// Skip up to and including the closing delimiter, honoring nested
/// references and escapes. Returns false if the text ends first.
fn skip_to_closing(cur: &mut Cursor<'_>, closing: u8) -> bool {
    while cur.failed_at.is_none() {
        if cur.nested_reference() || cur.eat_str("$$") {
            continue;
        }
        match cur.peek() {
            None => return false,
            Some(b) if b == closing => {
                cur.bump(1);
                return true;
            }
            Some(b'\\') => {
                cur.bump(1);
                cur.bump_char();
            }
            Some(_) => cur.bump_char(),
        }
    }
    false
}

/// A variable name, optionally starting with a dot, possibly containing
/// nested references.
pub(crate) fn parse_varname<'a>(cur: &mut Cursor<'a>) -> &'a str {
    let mark = cur.pos;
    cur.eat(b'.');
    loop {
        if cur.nested_reference() {
            continue;
        }
        match cur.peek() {
            Some(b) if b.is_ascii_alphanumeric() || matches!(b, b'_' | b'+' | b'-' | b'.' | b'*') => {
                cur.bump(1)
            }
            _ => break,
        }
    }
    cur.since(mark)
}

const SIMPLE_MODIFIERS: &[&str] = &[
    "localtime", "gmtime", "range", "hash", "sh", "tA", "tW", "tl", "tu", "tw", "Ox", "E", "H",
    "L", "O", "P", "Q", "R", "T", "u",
];

/// Parse a chain of `:modifier`s up to (not including) the closing
/// delimiter. Returns the modifiers and whether any of them is malformed.
pub(crate) fn parse_modifiers(cur: &mut Cursor<'_>, closing: u8) -> (Vec<Modifier>, bool) {
    let mut result = Vec::new();
    let mut malformed = false;
    let mut may_omit_colon = false;

    while cur.failed_at.is_none() && (cur.eat(b':') || may_omit_colon) {
        may_omit_colon = false;
        let mark = cur.pos;

        if let Some(kind) = modifier(cur, closing) {
            result.push(Modifier::new(cur.since(mark), kind));
            malformed |= kind == ModifierKind::Opaque;
            may_omit_colon = kind == ModifierKind::Subst;
            continue;
        }
        cur.pos = mark;

        if matches!(cur.peek(), Some(b'S' | b'C')) {
            // Broken substitution: the rest is unparseable.
            let mut c = *cur;
            if skip_to_closing(&mut c, closing) {
                c.pos -= 1;
            }
            *cur = c;
            result.push(Modifier::new(cur.since(mark), ModifierKind::Unparsed));
            malformed = true;
            break;
        }

        cur.skip_text(|b| b != b':' && b != closing);
        let text = cur.since(mark);
        if text.contains('=') {
            result.push(Modifier::new(text, ModifierKind::SuffixSubst));
        } else if !text.is_empty() {
            log::trace!("unknown modifier {text:?}");
            result.push(Modifier::new(text, ModifierKind::Opaque));
            malformed = true;
        }
    }
    (result, malformed)
}

/// Parse a single modifier after its colon. On failure the cursor position
/// is unspecified; the caller resets it.
fn modifier(cur: &mut Cursor<'_>, closing: u8) -> Option<ModifierKind> {
    let terminates = |c: &Cursor<'_>| matches!(c.peek(), None | Some(b':')) || c.peek() == Some(closing);

    match cur.peek()? {
        b'=' => {
            cur.bump(1);
            cur.skip_escaped_text(|b| b != b':' && b != closing);
            Some(ModifierKind::SuffixSubst)
        }
        b'D' | b'M' | b'N' | b'U' => {
            let kind = if matches!(cur.peek(), Some(b'M' | b'N')) {
                ModifierKind::Match
            } else {
                ModifierKind::Defined
            };
            cur.bump(1);
            cur.skip_escaped_text(|b| b != b':' && b != closing);
            Some(kind)
        }
        b'S' | b'C' => {
            let sep = cur.peek_at(1)?;
            if !b"%,/:;@^|!#~".contains(&sep) {
                return None;
            }
            cur.bump(2);
            cur.eat(b'^');
            let field = |b: u8| b != sep && b != closing;
            cur.skip_escaped_text(field);
            cur.eat(b'$');
            if !cur.eat(sep) {
                return None;
            }
            cur.skip_escaped_text(field);
            if !cur.eat(sep) {
                return None;
            }
            while matches!(cur.peek(), Some(b'1' | b'g' | b'W')) {
                cur.bump(1);
            }
            Some(ModifierKind::Subst)
        }
        b'@' => {
            cur.bump(1);
            let var_mark = cur.pos;
            while cur.peek().is_some_and(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'.') {
                cur.bump(1);
            }
            if cur.pos == var_mark || !cur.eat(b'@') {
                return None;
            }
            cur.skip_escaped_text(|b| b != b':' && b != b'@' && b != closing);
            if !cur.eat(b'@') {
                log::trace!("loop modifier is missing the final \"@\"");
                return Some(ModifierKind::Opaque);
            }
            Some(ModifierKind::Loop)
        }
        b'[' => {
            cur.bump(1);
            if !cur.eat(b'#') {
                let mark = cur.pos;
                while cur.peek().is_some_and(|b| b.is_ascii_digit() || b == b'-' || b == b'.') {
                    cur.bump(1);
                }
                if cur.pos == mark {
                    return None;
                }
            }
            cur.eat(b']').then_some(ModifierKind::Index)
        }
        b'?' => {
            cur.bump(1);
            cur.skip_text(|b| b != b':' && b != closing);
            if !cur.eat(b':') {
                return None;
            }
            cur.skip_text(|b| b != b':' && b != closing);
            Some(ModifierKind::Conditional)
        }
        b't' if cur.rest().starts_with("ts") => {
            cur.bump(2);
            match (cur.peek(), cur.peek_at(1)) {
                (Some(b'\\'), Some(d)) if d.is_ascii_digit() || d == b'n' || d == b't' => {
                    cur.bump(2);
                    while cur.peek().is_some_and(|b| b.is_ascii_digit()) {
                        cur.bump(1);
                    }
                }
                (Some(_), Some(next)) if next == b':' || next == closing => cur.bump(1),
                (Some(b), _) if b == b':' || b == closing => {}
                _ => return None,
            }
            terminates(cur).then_some(ModifierKind::Separator)
        }
        _ => {
            let word = SIMPLE_MODIFIERS.iter().find(|w| {
                let mut c = *cur;
                c.eat_str(w) && terminates(&c)
            })?;
            cur.bump(word.len());
            Some(if *word == "Q" {
                ModifierKind::Quote
            } else {
                ModifierKind::Simple
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn lex(text: &str) -> Vec<Expression> {
        tokenize(text).collect()
    }

    fn single(text: &str) -> VarRef {
        match lex(text).as_slice() {
            [Expression::Reference(r)] => r.clone(),
            other => panic!("expected one reference for {text:?}, got {other:?}"),
        }
    }

    fn mods(r: &VarRef) -> Vec<&str> {
        r.modifiers.iter().map(Modifier::text).collect()
    }

    #[test]
    fn literal_only() {
        assert_eq!(lex("hello world"), vec![Expression::Literal("hello world".into())]);
        assert!(lex("").is_empty());
    }

    #[test]
    fn double_dollar_is_literal() {
        assert_eq!(lex("a$$b"), vec![Expression::Literal("a$$b".into())]);
    }

    #[test]
    fn literal_and_reference() {
        let tokens = lex("prefix ${VAR} suffix");
        assert_eq!(tokens.len(), 3);
        assert_eq!(tokens[0].text(), "prefix ");
        assert_eq!(tokens[1].as_reference().unwrap().name, "VAR");
        assert_eq!(tokens[2].text(), " suffix");
    }

    #[test]
    fn curly_and_round() {
        assert_eq!(single("${VAR}").delim, Delimiter::Curly);
        let r = single("$(VAR)");
        assert_eq!(r.delim, Delimiter::Paren);
        assert_eq!(r.with_curly_braces(), "${VAR}");
    }

    #[test]
    fn immediate_forms() {
        for text in ["$@", "$<", "$*", "$?", "$>"] {
            let r = single(text);
            assert_eq!(r.name, &text[1..]);
            assert!(!r.ambiguous);
        }
    }

    #[test]
    fn bare_name_is_ambiguous() {
        let tokens = lex("$x/bin");
        let r = tokens[0].as_reference().unwrap();
        assert_eq!(r.name, "x");
        assert!(r.ambiguous);
        assert_eq!(tokens[1].text(), "/bin");
    }

    #[test]
    fn modifier_chain_order() {
        let r = single("${VAR:M*.c:S,.c,.o,g:Q}");
        assert_eq!(mods(&r), vec!["M*.c", "S,.c,.o,g", "Q"]);
        assert!(r.is_q());
        assert!(!r.malformed);
        assert_eq!(r.modifier_text(), ":M*.c:S,.c,.o,g:Q");
    }

    #[test]
    fn nested_name() {
        let r = single("${A.${B}}");
        assert_eq!(r.name, "A.${B}");
        assert!(r.is_indirect());
    }

    #[test]
    fn nested_reference_in_modifier() {
        let r = single("${VAR:S/${FROM}/${TO:Q}/}");
        assert_eq!(mods(&r), vec!["S/${FROM}/${TO:Q}/"]);
        assert_eq!(r.modifiers[0].kind(), ModifierKind::Subst);
    }

    #[test]
    fn subst_with_colon_separator() {
        let r = single("${VAR:S:a:b:}");
        assert_eq!(mods(&r), vec!["S:a:b:"]);
    }

    #[test]
    fn subst_may_omit_colon() {
        let r = single("${VAR:S,a,b,gQ}");
        assert_eq!(mods(&r), vec!["S,a,b,g", "Q"]);
    }

    #[test]
    fn index_modifiers() {
        assert_eq!(mods(&single("${VAR:[1]}")), vec!["[1]"]);
        assert_eq!(mods(&single("${VAR:[#]}")), vec!["[#]"]);
        assert_eq!(mods(&single("${VAR:[-1]}")), vec!["[-1]"]);
        assert_eq!(mods(&single("${VAR:[1..2]}")), vec!["[1..2]"]);
    }

    #[test]
    fn loop_modifier() {
        let r = single("${VAR:@v@${v}.c@}");
        assert_eq!(mods(&r), vec!["@v@${v}.c@"]);
        assert_eq!(r.modifiers[0].kind(), ModifierKind::Loop);
        assert!(!r.malformed);
    }

    #[test]
    fn loop_modifier_without_final_at() {
        let r = single("${VAR:@v@${v}}");
        assert!(r.malformed);
    }

    #[test]
    fn conditional_modifier() {
        let r = single("${VAR:?yes:no}");
        assert_eq!(mods(&r), vec!["?yes:no"]);
        assert_eq!(r.modifiers[0].kind(), ModifierKind::Conditional);
    }

    #[test]
    fn suffix_substitution() {
        let r = single("${SRCS:.c=.o}");
        assert_eq!(mods(&r), vec![".c=.o"]);
        assert_eq!(r.modifiers[0].kind(), ModifierKind::SuffixSubst);
    }

    #[test]
    fn separator_modifier() {
        assert_eq!(mods(&single("${VAR:ts,}")), vec!["ts,"]);
        assert_eq!(mods(&single("${VAR:ts::Q}")), vec!["ts:", "Q"]);
        assert_eq!(mods(&single("${VAR:ts\\n}")), vec!["ts\\n"]);
    }

    #[test]
    fn match_with_escaped_colon() {
        let r = single("${VAR:Ma\\:b}");
        assert_eq!(mods(&r), vec!["Ma\\:b"]);
        assert_eq!(r.modifiers[0].match_pattern().unwrap().pattern, "a:b");
    }

    #[test]
    fn expression_as_name() {
        let r = single("${:Uvalue}");
        assert_eq!(r.name, "");
        assert_eq!(mods(&r), vec!["Uvalue"]);

        let r = single("${a b:L}");
        assert_eq!(r.name, "a b");
        assert!(!r.malformed);
    }

    #[test]
    fn empty_modifier_is_fine() {
        let r = single("${VAR:}");
        assert!(r.modifiers.is_empty());
        assert!(!r.malformed);
    }

    #[test]
    fn unknown_modifier_is_malformed() {
        let r = single("${VAR:Z}");
        assert!(r.malformed);
        assert_eq!(r.modifiers[0].kind(), ModifierKind::Opaque);
    }

    #[test]
    fn broken_subst_is_unparsed() {
        let r = single("${VAR:S,a,b}");
        assert!(r.malformed);
        assert_eq!(r.modifiers.last().unwrap().kind(), ModifierKind::Unparsed);
        assert_eq!(r.text, "${VAR:S,a,b}");
    }

    #[test]
    fn unterminated_reference_continues_after_failure() {
        let tokens = lex("${VAR text");
        let r = tokens[0].as_reference().unwrap();
        assert!(r.malformed);
        assert_eq!(r.text, "${VAR");
        assert_eq!(tokens[1].text(), " text");
        let joined: String = tokens.iter().map(Expression::text).collect();
        assert_eq!(joined, "${VAR text");
    }

    #[test]
    fn junk_before_closing_brace() {
        let r = single("${VAR junk}");
        assert!(r.malformed);
        assert_eq!(r.name, "VAR");
        assert_eq!(mods(&r), vec![" junk"]);
    }

    #[test]
    fn lone_dollar_is_literal() {
        assert_eq!(lex("cost: 5$"), vec![Expression::Literal("cost: 5$".into())]);
        assert_eq!(lex("$ x"), vec![Expression::Literal("$ x".into())]);
    }

    #[test]
    fn collects_nested_references() {
        let names: Vec<String> = references("${A.${B}:M${C}} $D")
            .into_iter()
            .map(|r| r.name)
            .collect();
        assert_eq!(names, vec!["A.${B}", "B", "C", "D"]);
    }

    #[test]
    fn nested_unterminated_references_lex_quickly() {
        let text = "${".repeat(64);
        let started = std::time::Instant::now();
        let tokens = lex(&text);
        assert!(started.elapsed() < std::time::Duration::from_secs(2));
        assert!(tokens.iter().all(|t| t.as_reference().is_some_and(|r| r.malformed)));
        let joined: String = tokens.iter().map(Expression::text).collect();
        assert_eq!(joined, text);
    }

    #[test]
    fn malformed_nested_reference_ends_the_outer_one() {
        let tokens = lex("${A.${B:S,x} rest}");
        let r = tokens[0].as_reference().unwrap();
        assert!(r.malformed);
        assert_eq!(r.name, "A.");
        assert_eq!(r.text, "${A.${B:S,x}");
        assert_eq!(tokens[1].text(), " rest}");
    }

    #[test]
    fn nesting_beyond_the_limit_is_malformed() {
        let depth = 20_000;
        let text = format!("{}A{}", "${A.".repeat(depth), "}".repeat(depth));
        let tokens = lex(&text);
        let first = tokens[0].as_reference().unwrap();
        assert!(first.malformed);
        assert!(!first.name.contains('$'));
        let joined: String = tokens.iter().map(Expression::text).collect();
        assert_eq!(joined, text);
        assert!(references(&text).iter().any(|r| r.malformed));
    }

    #[test]
    fn nesting_within_the_limit_is_fine() {
        let depth = 8;
        let text = format!("{}A{}", "${A.".repeat(depth), "}".repeat(depth));
        let r = single(&text);
        assert!(!r.malformed);
        assert_eq!(references(&text).len(), depth);
    }

    proptest! {
        #[test]
        fn text_without_dollar_is_one_literal(s in "[^$]+") {
            let tokens = lex(&s);
            prop_assert_eq!(tokens, vec![Expression::Literal(s.clone())]);
        }

        #[test]
        fn tokens_reproduce_the_input(s in "[a-zA-Z${}():@ .*=,/\\\\]{0,30}") {
            let joined: String = tokenize(&s).map(|t| t.text().to_string()).collect();
            prop_assert_eq!(joined, s);
        }
    }
}
