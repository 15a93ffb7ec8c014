//! Modifiers of variable references, such as `:Q`, `:M*` or `:S,from,to,g`.

use std::borrow::Cow;
use std::fmt;

/// Classification of a modifier by its leading characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModifierKind {
    /// `:Q`
    Quote,
    /// Fixed words such as `:E`, `:T`, `:O`, `:tl`, `:sh`, `:u`.
    Simple,
    /// `:ts<c>`
    Separator,
    /// `:Mpattern`, `:Npattern`
    Match,
    /// `:Dvalue`, `:Uvalue`
    Defined,
    /// `:S,from,to,flags` and `:C,regex,to,flags`
    Subst,
    /// System V style `:from=to`, including `:=to`.
    SuffixSubst,
    /// `:@var@body@`
    Loop,
    /// `:[n]`, `:[#]`, `:[1..2]`
    Index,
    /// `:?then:else`
    Conditional,
    /// Text that does not start any known modifier.
    Opaque,
    /// The unparseable rest of a reference.
    Unparsed,
}

/// One modifier, kept as its raw source text without the leading colon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Modifier {
    text: String,
    kind: ModifierKind,
}

/// The pattern of a `:M` or `:N` modifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchPattern<'a> {
    /// `:M` keeps matching words, `:N` removes them.
    pub positive: bool,
    /// The pattern, with `\:` unescaped.
    pub pattern: Cow<'a, str>,
    /// The pattern contains no wildcards and no expressions.
    pub exact: bool,
}

/// The parts of an `:S` or `:C` modifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subst {
    /// `:C` rather than `:S`.
    pub regex: bool,
    pub left_anchor: bool,
    pub from: String,
    pub right_anchor: bool,
    pub to: String,
    pub flags: String,
}

impl Modifier {
    pub fn new(text: impl Into<String>, kind: ModifierKind) -> Self {
        Self {
            text: text.into(),
            kind,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn kind(&self) -> ModifierKind {
        self.kind
    }

    pub fn is_q(&self) -> bool {
        self.kind == ModifierKind::Quote
    }

    pub fn match_pattern(&self) -> Option<MatchPattern<'_>> {
        if self.kind != ModifierKind::Match {
            return None;
        }
        let positive = self.text.starts_with('M');
        let raw = &self.text[1..];
        let pattern = if raw.contains("\\:") {
            Cow::Owned(raw.replace("\\:", ":"))
        } else {
            Cow::Borrowed(raw)
        };
        let exact = !raw.contains(['*', '?', '[', '\\', '$']);
        Some(MatchPattern {
            positive,
            pattern,
            exact,
        })
    }

    /// Split an `:S` or `:C` modifier into its fields.
    pub fn subst(&self) -> Option<Subst> {
        if self.kind != ModifierKind::Subst {
            return None;
        }
        let mut chars = self.text.chars();
        let regex = chars.next()? == 'C';
        let sep = chars.next()?;
        let fields = split_fields(chars.as_str(), sep)?;
        let [from, to, flags]: [String; 3] = fields.try_into().ok()?;

        let (left_anchor, from) = match from.strip_prefix('^') {
            Some(rest) => (true, rest.to_string()),
            None => (false, from),
        };
        let (right_anchor, from) = match from.strip_suffix('$') {
            Some(rest) if !rest.ends_with('\\') && !rest.ends_with('$') => (true, rest.to_string()),
            _ => (false, from),
        };
        Some(Subst {
            regex,
            left_anchor,
            from,
            right_anchor,
            to,
            flags,
        })
    }

    /// Evaluate an `:S` (or literal `:C`) modifier on a value.
    ///
    /// Returns `None` when the modifier is no substitution, contains
    /// expressions, or is a `:C` with real regular expression syntax.
    pub fn apply_subst(&self, value: &str) -> Option<String> {
        self.subst()?.apply(value)
    }
}

impl fmt::Display for Modifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl Subst {
    /// A `:C` whose pattern is a plain word behaves exactly like `:S`.
    pub fn is_literal(&self) -> bool {
        if !self.regex {
            return true;
        }
        !self.from.is_empty()
            && self
                .from
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
            && !self.to.contains(['&', '$', '\\'])
    }

    pub fn apply(&self, value: &str) -> Option<String> {
        let has_expr = |s: &str| s.contains("${") || s.contains("$(");
        if !self.is_literal() || has_expr(&self.from) || has_expr(&self.to) || self.to.contains('&') {
            return None;
        }
        let from = self.from.as_str();
        let to = self.to.as_str();
        let result = match (self.left_anchor, self.right_anchor) {
            (true, true) if value == from => to.to_string(),
            (true, true) => value.to_string(),
            (true, false) => match value.strip_prefix(from) {
                Some(rest) => format!("{to}{rest}"),
                None => value.to_string(),
            },
            (false, true) => match value.strip_suffix(from) {
                Some(rest) => format!("{rest}{to}"),
                None => value.to_string(),
            },
            (false, false) if self.flags.contains('g') => value.replace(from, to),
            (false, false) => value.replacen(from, to, 1),
        };
        Some(result)
    }
}

/// Split the body of an `:S`/`:C` modifier at unescaped separators outside
/// nested expressions. `\<sep>` is unescaped, other escapes are kept.
fn split_fields(body: &str, sep: char) -> Option<Vec<String>> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut closers: Vec<char> = Vec::new();
    let mut chars = body.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some(next) if next == sep => field.push(next),
                Some(next) => {
                    field.push('\\');
                    field.push(next);
                }
                None => field.push('\\'),
            },
            '$' if matches!(chars.peek(), Some('{' | '(')) => {
                let open = chars.next()?;
                closers.push(if open == '{' { '}' } else { ')' });
                field.push(c);
                field.push(open);
            }
            _ if closers.last() == Some(&c) => {
                closers.pop();
                field.push(c);
            }
            _ if c == sep && closers.is_empty() => fields.push(std::mem::take(&mut field)),
            _ => field.push(c),
        }
    }
    fields.push(field);
    Some(fields)
}
