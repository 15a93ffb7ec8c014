//! Quoting-aware lexer for shell commands embedded in Makefiles.
//!
//! The lexer tracks which quotes are open around each atom, up to two
//! levels of nesting as they occur in practice (`"`...`'...'`...`"`).
//! References to make variables are single atoms in every quoting state,
//! since make expands them before the shell sees the text.

use std::fmt;

use super::expr::{self, VarRef};

/// The shell quotes that are open at a point in the text, outermost first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum QuotingState {
    #[default]
    Plain,
    Squot,
    Dquot,
    Backt,
    DquotBackt,
    DquotBacktSquot,
    DquotBacktDquot,
    BacktSquot,
    BacktDquot,
    BacktDquotSquot,
}

/// The innermost open quote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Innermost {
    None,
    Single,
    Double,
    Backtick,
}

impl QuotingState {
    pub const ALL: [QuotingState; 10] = [
        Self::Plain,
        Self::Squot,
        Self::Dquot,
        Self::Backt,
        Self::DquotBackt,
        Self::DquotBacktSquot,
        Self::DquotBacktDquot,
        Self::BacktSquot,
        Self::BacktDquot,
        Self::BacktDquotSquot,
    ];

    /// The state after the quote character `quote`, or `None` if the
    /// character opens a quote that would nest too deeply.
    ///
    /// Characters that have no special meaning in this state (like `'`
    /// inside double quotes) also yield `None`; see
    /// [`is_special`](Self::is_special).
    pub fn transition(self, quote: u8) -> Option<Self> {
        use QuotingState::*;
        let next = match (self, quote) {
            (Plain, b'\'') => Squot,
            (Plain, b'"') => Dquot,
            (Plain, b'`') => Backt,
            (Squot, b'\'') => Plain,
            (Dquot, b'"') => Plain,
            (Dquot, b'`') => DquotBackt,
            (Backt, b'`') => Plain,
            (Backt, b'\'') => BacktSquot,
            (Backt, b'"') => BacktDquot,
            (DquotBackt, b'`') => Dquot,
            (DquotBackt, b'\'') => DquotBacktSquot,
            (DquotBackt, b'"') => DquotBacktDquot,
            (DquotBacktSquot, b'\'') => DquotBackt,
            (DquotBacktDquot, b'"') => DquotBackt,
            (BacktSquot, b'\'') => Backt,
            (BacktDquot, b'"') => Backt,
            (BacktDquot, b'\'') => BacktDquotSquot,
            (BacktDquotSquot, b'\'') => BacktDquot,
            _ => return None,
        };
        Some(next)
    }

    /// Whether the quote character `quote` opens or closes anything here.
    pub fn is_special(self, quote: u8) -> bool {
        match self.innermost() {
            Innermost::Single => quote == b'\'',
            Innermost::Double if self == Self::BacktDquot => matches!(quote, b'"' | b'`' | b'\''),
            Innermost::Double => matches!(quote, b'"' | b'`'),
            Innermost::None | Innermost::Backtick => matches!(quote, b'"' | b'`' | b'\''),
        }
    }

    pub fn innermost(self) -> Innermost {
        use QuotingState::*;
        match self {
            Plain => Innermost::None,
            Squot | DquotBacktSquot | BacktSquot | BacktDquotSquot => Innermost::Single,
            Dquot | DquotBacktDquot | BacktDquot => Innermost::Double,
            Backt | DquotBackt => Innermost::Backtick,
        }
    }

    /// Whether words, operators and comments are separated here, that is,
    /// at the top level or directly inside backticks.
    pub fn is_command(self) -> bool {
        matches!(self, Self::Plain | Self::Backt | Self::DquotBackt)
    }

    /// Short name as used in debug output: `plain`, `d`, `db`, `dbs` etc.
    pub fn short_name(self) -> &'static str {
        use QuotingState::*;
        match self {
            Plain => "plain",
            Squot => "s",
            Dquot => "d",
            Backt => "b",
            DquotBackt => "db",
            DquotBacktSquot => "dbs",
            DquotBacktDquot => "dbd",
            BacktSquot => "bs",
            BacktDquot => "bd",
            BacktDquotSquot => "bds",
        }
    }
}

impl fmt::Display for QuotingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShOperator {
    /// `;;`
    CaseSeparator,
    /// `;`
    Semicolon,
    /// `||`
    Or,
    /// `|`
    Pipe,
    /// `&&`
    And,
    /// `&`
    Background,
    /// `(`
    ParenOpen,
    /// `)`
    ParenClose,
    /// `>`, `>>`, `<`, `>&`, `<&`, `<>`, `>|`
    Redirect,
}

const OPERATORS: &[(&str, ShOperator)] = &[
    (";;", ShOperator::CaseSeparator),
    ("||", ShOperator::Or),
    ("&&", ShOperator::And),
    (">>", ShOperator::Redirect),
    (">&", ShOperator::Redirect),
    ("<&", ShOperator::Redirect),
    ("<>", ShOperator::Redirect),
    (">|", ShOperator::Redirect),
    (";", ShOperator::Semicolon),
    ("|", ShOperator::Pipe),
    ("&", ShOperator::Background),
    ("(", ShOperator::ParenOpen),
    (")", ShOperator::ParenClose),
    (">", ShOperator::Redirect),
    ("<", ShOperator::Redirect),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShAtomKind {
    Word,
    Space,
    Operator(ShOperator),
    Comment,
    /// A quote character that changes the quoting state.
    QuoteDelimiter,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShAtom {
    pub kind: ShAtomKind,
    pub text: String,
    /// The quoting state after this atom.
    pub quoting: QuotingState,
    /// The make variable reference this atom consists of.
    pub expr: Option<VarRef>,
    /// A quote character that would nest too deeply; the quoting state is
    /// left unchanged.
    pub malformed: bool,
}

impl ShAtom {
    fn new(kind: ShAtomKind, text: &str, quoting: QuotingState) -> Self {
        Self {
            kind,
            text: text.to_string(),
            quoting,
            expr: None,
            malformed: false,
        }
    }

    /// Whether this atom ends a shell word.
    fn is_separator(&self) -> bool {
        self.quoting == QuotingState::Plain
            && matches!(
                self.kind,
                ShAtomKind::Space | ShAtomKind::Operator(_) | ShAtomKind::Comment
            )
    }
}

/// A shell word made up of atoms, like `"${PREFIX}/bin"` or `` `cat f` ``.
/// Operators and comments form tokens of their own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellToken {
    pub text: String,
    pub atoms: Vec<ShAtom>,
}

impl ShellToken {
    fn new(atoms: Vec<ShAtom>) -> Self {
        Self {
            text: atoms.iter().map(|a| a.text.as_str()).collect(),
            atoms,
        }
    }

    /// The reference makes up the whole word, apart from quotes.
    pub fn is_whole_word(&self, index: usize) -> bool {
        self.atoms[index].expr.is_some()
            && self
                .atoms
                .iter()
                .enumerate()
                .all(|(i, a)| i == index || a.kind == ShAtomKind::QuoteDelimiter)
    }
}

/// Lexer over one shell command fragment.
///
/// As an iterator, the lexer carries the quoting state from one atom to
/// the next. [`next_atom`](Self::next_atom) lexes with an explicit state
/// instead.
#[derive(Debug, Clone)]
pub struct ShellLexer<'a> {
    src: &'a str,
    pos: usize,
    state: QuotingState,
}

impl<'a> ShellLexer<'a> {
    pub fn new(src: &'a str) -> Self {
        Self {
            src,
            pos: 0,
            state: QuotingState::Plain,
        }
    }

    /// The quoting state after the last atom.
    pub fn state(&self) -> QuotingState {
        self.state
    }

    /// The text not yet lexed.
    pub fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    /// Lex the next atom, assuming the given quoting state.
    pub fn next_atom(&mut self, state: QuotingState) -> Option<ShAtom> {
        let bytes = self.src.as_bytes();
        let &b = bytes.get(self.pos)?;
        let start = self.pos;

        let atom = if b == b'$'
            && bytes.get(start + 1) != Some(&b'$')
            && let Some(r) = expr::reference_at(self.src, start)
        {
            self.pos += r.text.len();
            ShAtom {
                kind: ShAtomKind::Word,
                text: r.text.clone(),
                quoting: state,
                expr: Some(r),
                malformed: false,
            }
        } else if matches!(b, b'\'' | b'"' | b'`') && state.is_special(b) {
            self.pos += 1;
            match state.transition(b) {
                Some(next) => ShAtom::new(ShAtomKind::QuoteDelimiter, self.since(start), next),
                None => {
                    log::trace!("quote {:?} nests too deeply in state {state}", b as char);
                    let mut atom = ShAtom::new(ShAtomKind::Word, self.since(start), state);
                    atom.malformed = true;
                    atom
                }
            }
        } else if state.is_command() && b.is_ascii_whitespace() {
            while self.peek().is_some_and(|b| b.is_ascii_whitespace()) {
                self.pos += 1;
            }
            ShAtom::new(ShAtomKind::Space, self.since(start), state)
        } else if state.is_command()
            && let Some((text, op)) = OPERATORS.iter().find(|(text, _)| self.rest().starts_with(text))
        {
            self.pos += text.len();
            ShAtom::new(ShAtomKind::Operator(*op), text, state)
        } else if state.is_command() && b == b'#' && self.at_word_start() {
            let in_backticks = state != QuotingState::Plain;
            while let Some(c) = self.peek()
                && c != b'\n'
                && !(in_backticks && c == b'`')
            {
                self.pos += 1;
            }
            ShAtom::new(ShAtomKind::Comment, self.since(start), state)
        } else {
            self.pos = self.word_end(state).max(start + 1);
            while !self.src.is_char_boundary(self.pos) {
                self.pos += 1;
            }
            ShAtom::new(ShAtomKind::Word, self.since(start), state)
        };

        self.state = atom.quoting;
        Some(atom)
    }

    /// Group atoms into the next shell word, skipping unquoted whitespace.
    pub fn next_token(&mut self) -> Option<ShellToken> {
        let first = loop {
            let atom = self.next_atom(self.state)?;
            if !(atom.kind == ShAtomKind::Space && atom.quoting == QuotingState::Plain) {
                break atom;
            }
        };
        if first.is_separator() {
            return Some(ShellToken::new(vec![first]));
        }

        let mut atoms = vec![first];
        loop {
            let saved = (self.pos, self.state);
            match self.next_atom(self.state) {
                Some(atom) if !atom.is_separator() => atoms.push(atom),
                Some(_) => {
                    (self.pos, self.state) = saved;
                    break;
                }
                None => break,
            }
        }
        Some(ShellToken::new(atoms))
    }

    fn peek(&self) -> Option<u8> {
        self.src.as_bytes().get(self.pos).copied()
    }

    fn since(&self, start: usize) -> &'a str {
        &self.src[start..self.pos]
    }

    /// A `#` only starts a comment at the beginning of a word.
    fn at_word_start(&self) -> bool {
        match self.pos.checked_sub(1).map(|i| self.src.as_bytes()[i]) {
            None => true,
            Some(prev) => prev.is_ascii_whitespace() || b";|&()<>`".contains(&prev),
        }
    }

    /// End of the word starting at the current position.
    fn word_end(&self, state: QuotingState) -> usize {
        let bytes = self.src.as_bytes();
        let single = state.innermost() == Innermost::Single;
        let mut i = self.pos;

        while let Some(&b) = bytes.get(i) {
            if b == b'$' {
                if bytes.get(i + 1) == Some(&b'$') {
                    i += 2;
                    continue;
                }
                if i > self.pos && expr::reference_at(self.src, i).is_some() {
                    break;
                }
                i += 1;
                continue;
            }
            if single {
                if b == b'\'' {
                    break;
                }
                i += 1;
                continue;
            }
            if b == b'\\' {
                i += 1;
                if bytes[i..].starts_with(b"$$") {
                    i += 2;
                } else if i < bytes.len() && bytes[i] != b'$' {
                    i += 1;
                }
                continue;
            }
            if matches!(b, b'\'' | b'"' | b'`') && state.is_special(b) {
                break;
            }
            if state.is_command() && (b.is_ascii_whitespace() || b";|&()<>".contains(&b)) {
                break;
            }
            i += 1;
        }
        i
    }
}

impl Iterator for ShellLexer<'_> {
    type Item = ShAtom;

    fn next(&mut self) -> Option<ShAtom> {
        self.next_atom(self.state)
    }
}

/// Lex a shell command starting in the plain state.
pub fn atoms(text: &str) -> ShellLexer<'_> {
    ShellLexer::new(text)
}

/// Split a shell command into words, operators and comments.
pub fn tokens(text: &str) -> Vec<ShellToken> {
    let mut lexer = ShellLexer::new(text);
    std::iter::from_fn(|| lexer.next_token()).collect()
}
