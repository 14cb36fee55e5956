//! Instruction alphabet and program representation.
//!
//! A `Program` is an immutable, ordered sequence of `Token`s. Program identity
//! is structural: two programs with equal token sequences are interchangeable
//! everywhere, including deduplication and search tie-breaking.
//!
//! The canonical textual encoding is a space-separated list of mnemonics
//! (`PUSH 3 DUP MUL PRINT`) and round-trips losslessly through
//! `Display`/`FromStr`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Data-stack depth soft cap (S).
pub const STACK_CAP: usize = 6;

/// Call-depth soft cap (D), counting the top-level frame.
pub const CALL_CAP: usize = 6;

/// Maximum length of a sampled wildcard body.
pub const BODY_MAX_TOKENS: usize = 12;

/// Number of `Arg` tokens exposed in the search alphabet.
pub const MAX_ARGS: usize = 2;

/// Inclusive range of `Push` literals in the search alphabet.
pub const PUSH_MIN: i64 = -2;
pub const PUSH_MAX: i64 = 5;

/// One instruction of the stack machine.
///
/// The alphabet is deliberately minimal and fixed-size; see [`alphabet`] for
/// the enumeration order the synthesiser uses.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Token {
    /// Push a literal onto the data stack.
    Push(i64),
    /// Duplicate the top of stack.
    Dup,
    Add,
    Sub,
    Mul,
    /// Append the top of stack to the output sequence without popping it.
    Print,
    /// Pop `b`, `a`, `cond`; push `a` if `cond != 0` else `b`.
    Select,
    /// Pop two; push 1 if equal else 0.
    Eq,
    /// Push `inputs[i]`.
    Arg(usize),
    /// Invoke a named sub-program from the VM library.
    Call(String),
    /// The stochastic instruction, written `_`: lazily samples a bounded
    /// call-free body on first execution of this occurrence during a run.
    Wildcard,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Push(k) => write!(f, "PUSH {k}"),
            Token::Dup => f.write_str("DUP"),
            Token::Add => f.write_str("ADD"),
            Token::Sub => f.write_str("SUB"),
            Token::Mul => f.write_str("MUL"),
            Token::Print => f.write_str("PRINT"),
            Token::Select => f.write_str("SELECT"),
            Token::Eq => f.write_str("EQ"),
            Token::Arg(i) => write!(f, "ARG{i}"),
            Token::Call(name) => write!(f, "CALL {name}"),
            Token::Wildcard => f.write_str("_"),
        }
    }
}

/// The search alphabet in enumeration order.
///
/// This order is the tie-break between equal-length candidates: the
/// synthesiser expands children in exactly this sequence. `Wildcard` is
/// appended last and only when wildcards are allowed; `Call` is never
/// enumerated (libraries are caller-supplied, not searched over).
pub fn alphabet(allow_wildcards: bool) -> Vec<Token> {
    let mut tokens = vec![
        Token::Dup,
        Token::Add,
        Token::Sub,
        Token::Mul,
        Token::Print,
        Token::Select,
        Token::Eq,
    ];
    tokens.extend((PUSH_MIN..=PUSH_MAX).map(Token::Push));
    tokens.extend((0..MAX_ARGS).map(Token::Arg));
    if allow_wildcards {
        tokens.push(Token::Wildcard);
    }
    tokens
}

/// Tokens a sampled wildcard body may contain: the call-free alphabet.
pub fn body_alphabet() -> Vec<Token> {
    alphabet(false)
}

/// An immutable, finite token sequence.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Program(Vec<Token>);

impl Program {
    pub fn new(tokens: Vec<Token>) -> Self {
        Program(tokens)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn tokens(&self) -> &[Token] {
        &self.0
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Token> {
        self.0.iter()
    }

    /// A copy of this program with one more token appended. Search-node
    /// expansion goes through here so programs stay immutable values.
    pub fn extended(&self, token: Token) -> Program {
        let mut tokens = self.0.clone();
        tokens.push(token);
        Program(tokens)
    }
}

impl From<Vec<Token>> for Program {
    fn from(tokens: Vec<Token>) -> Self {
        Program(tokens)
    }
}

impl<'a> IntoIterator for &'a Program {
    type Item = &'a Token;
    type IntoIter = std::slice::Iter<'a, Token>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, token) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{token}")?;
        }
        Ok(())
    }
}

/// Errors from parsing the textual program encoding.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseProgramError {
    #[error("unknown opcode `{0}`")]
    UnknownOpcode(String),
    #[error("`PUSH` requires an integer literal")]
    MissingLiteral,
    #[error("invalid integer literal `{0}`")]
    BadLiteral(String),
    #[error("invalid argument index in `{0}`")]
    BadArgIndex(String),
    #[error("`CALL` requires a function name")]
    MissingCallName,
}

impl FromStr for Program {
    type Err = ParseProgramError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut words = s.split_whitespace();
        let mut tokens = Vec::new();
        while let Some(word) = words.next() {
            let token = match word {
                "DUP" => Token::Dup,
                "ADD" => Token::Add,
                "SUB" => Token::Sub,
                "MUL" => Token::Mul,
                "PRINT" => Token::Print,
                "SELECT" => Token::Select,
                "EQ" => Token::Eq,
                "_" => Token::Wildcard,
                "PUSH" => {
                    let lit = words.next().ok_or(ParseProgramError::MissingLiteral)?;
                    let k = lit
                        .parse::<i64>()
                        .map_err(|_| ParseProgramError::BadLiteral(lit.to_string()))?;
                    Token::Push(k)
                }
                "CALL" => {
                    let name = words.next().ok_or(ParseProgramError::MissingCallName)?;
                    // `CALL _` is the wildcard's historical spelling.
                    if name == "_" {
                        Token::Wildcard
                    } else {
                        Token::Call(name.to_string())
                    }
                }
                w if w.starts_with("ARG") => {
                    let idx = w[3..]
                        .parse::<usize>()
                        .map_err(|_| ParseProgramError::BadArgIndex(w.to_string()))?;
                    Token::Arg(idx)
                }
                w => return Err(ParseProgramError::UnknownOpcode(w.to_string())),
            };
            tokens.push(token);
        }
        Ok(Program(tokens))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_round_trips() {
        let text = "ARG0 DUP MUL PUSH 1 ADD PRINT";
        let program: Program = text.parse().unwrap();
        assert_eq!(program.len(), 6);
        assert_eq!(program.to_string(), text);
    }

    #[test]
    fn negative_literals_and_calls_round_trip() {
        let program = Program::new(vec![
            Token::Push(-2),
            Token::Call("square".to_string()),
            Token::Arg(1),
            Token::Wildcard,
        ]);
        let text = program.to_string();
        assert_eq!(text, "PUSH -2 CALL square ARG1 _");
        assert_eq!(text.parse::<Program>().unwrap(), program);
    }

    #[test]
    fn call_underscore_parses_as_wildcard() {
        let program: Program = "CALL _".parse().unwrap();
        assert_eq!(program.tokens(), &[Token::Wildcard]);
    }

    #[test]
    fn parse_errors() {
        assert_eq!(
            "NOP".parse::<Program>(),
            Err(ParseProgramError::UnknownOpcode("NOP".to_string()))
        );
        assert_eq!(
            "PUSH".parse::<Program>(),
            Err(ParseProgramError::MissingLiteral)
        );
        assert_eq!(
            "PUSH x".parse::<Program>(),
            Err(ParseProgramError::BadLiteral("x".to_string()))
        );
        assert_eq!(
            "ARGx".parse::<Program>(),
            Err(ParseProgramError::BadArgIndex("ARGx".to_string()))
        );
        assert_eq!(
            "CALL".parse::<Program>(),
            Err(ParseProgramError::MissingCallName)
        );
    }

    #[test]
    fn alphabet_order_is_fixed() {
        let tokens = alphabet(false);
        assert_eq!(tokens.len(), 7 + 8 + MAX_ARGS);
        assert_eq!(tokens[0], Token::Dup);
        assert_eq!(tokens[7], Token::Push(PUSH_MIN));
        assert_eq!(tokens[14], Token::Push(PUSH_MAX));
        assert_eq!(tokens[15], Token::Arg(0));
        assert!(!tokens.contains(&Token::Wildcard));

        let with_wildcards = alphabet(true);
        assert_eq!(with_wildcards.last(), Some(&Token::Wildcard));
        assert_eq!(with_wildcards.len(), tokens.len() + 1);
    }

    #[test]
    fn body_alphabet_is_call_free() {
        for token in body_alphabet() {
            assert!(!matches!(token, Token::Call(_) | Token::Wildcard));
        }
    }

    #[test]
    fn serde_round_trip() {
        let program: Program = "PUSH 3 DUP MUL PRINT".parse().unwrap();
        let json = serde_json::to_string(&program).unwrap();
        let back: Program = serde_json::from_str(&json).unwrap();
        assert_eq!(back, program);
    }
}
