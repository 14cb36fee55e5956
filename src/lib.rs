//! # stacksynth
//!
//! A program-synthesis playground: given input/output example pairs, search
//! a bounded space of small stack-machine programs for one that reproduces
//! every example exactly. Shorter programs are strictly preferred, which
//! approximates a resource-bounded Solomonoff prior combined with exact MAP
//! search.
//!
//! Two subsystems: a total, bounded execution engine whose only stochastic
//! instruction is the lazily-sampled wildcard (`vm`), and an enumerative
//! synthesiser with exhaustive and beam modes (`engine`).
//!
//! ```
//! use stacksynth::{synthesize, Example, SynthesisConfig};
//!
//! let examples = vec![Example::new(&[3], &[3]), Example::new(&[4], &[4])];
//! let config = SynthesisConfig { max_tokens: 3, ..SynthesisConfig::default() };
//! let program = synthesize(examples, &config).unwrap().expect("solvable");
//! assert_eq!(program.to_string(), "ARG0 PRINT");
//! ```

pub mod engine;
pub mod token;
pub mod vm;

// Re-export core types for easy access
pub use engine::{
    synthesize, Example, SearchStats, SynthesisConfig, Synthesizer, Task, TaskError,
};
pub use token::{
    alphabet, body_alphabet, ParseProgramError, Program, Token, BODY_MAX_TOKENS, CALL_CAP,
    MAX_ARGS, PUSH_MAX, PUSH_MIN, STACK_CAP,
};
pub use vm::{Evaluation, Status, Vm, VmState};

#[cfg(test)]
mod search_properties;
