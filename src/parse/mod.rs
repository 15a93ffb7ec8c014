pub mod cond;
pub mod expr;
pub mod modifier;
pub mod shell;

pub use cond::{CmpOp, Cond, CondSyntaxError, CondVisitor, parse_condition};
pub use expr::{Delimiter, ExprLexer, Expression, VarRef, reference_at, references, tokenize};
pub use modifier::{MatchPattern, Modifier, ModifierKind, Subst};
pub use shell::{
    Innermost, QuotingState, ShAtom, ShAtomKind, ShOperator, ShellLexer, ShellToken, atoms, tokens,
};
