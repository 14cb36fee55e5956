//! Bounded, deterministic stack-machine execution.
//!
//! The machine is total: every syntactically valid program terminates in a
//! bounded number of steps with a well-defined state. Resource-cap violations
//! (stack depth, call depth, argument index out of range, stack underflow)
//! are not errors; they transition the state into a terminal overflow
//! sentinel, after which every remaining instruction is a no-op. That keeps
//! the reachable state space finite, which the synthesiser's termination
//! guarantee depends on.
//!
//! The only randomness is the `Wildcard` instruction, fed from an explicitly
//! threaded `ChaCha8Rng`. For a fixed program, fixed inputs, and a fixed rng
//! state the produced output sequence is reproducible; without wildcards no
//! rng is needed at all.

use std::collections::HashMap;

use num_bigint::BigInt;
use num_traits::{One, Zero};
use rand::Rng;
use rand_chacha::ChaCha8Rng;

use crate::token::{body_alphabet, Program, Token, BODY_MAX_TOKENS, CALL_CAP, STACK_CAP};

/// Terminal status of a machine state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Status {
    /// Execution can continue.
    #[default]
    Valid,
    /// A soft resource cap was exceeded. Terminal: all further instructions
    /// are skipped and the output produced so far stands.
    Overflow,
}

/// Identifies the code object a frame executes. Wildcard bindings are keyed
/// by code location so each occurrence samples at most once per run.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum CodeId {
    /// The top-level program; offsets count tokens already stepped.
    Main,
    /// A named library body.
    Library(String),
    /// A sampled wildcard body, by index into the run's binding table.
    Binding(usize),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Site {
    code: CodeId,
    offset: usize,
}

#[derive(Debug)]
struct Frame {
    code: CodeId,
    ip: usize,
}

/// Mutable machine state for one run.
///
/// Invariants: `stack.len() <= STACK_CAP` whenever `status` is `Valid`, and
/// `output` is append-only. Wildcard bindings sampled during the run live
/// here and are discarded with the state when the run ends.
#[derive(Debug, Clone, Default)]
pub struct VmState {
    pub stack: Vec<BigInt>,
    pub output: Vec<BigInt>,
    pub status: Status,
    /// Index of the next top-level token; used to key top-level wildcard
    /// occurrences when the state is advanced token by token.
    cursor: usize,
    bindings: Vec<Program>,
    bound: HashMap<Site, usize>,
}

impl VmState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn overflowed(&self) -> bool {
        self.status == Status::Overflow
    }

    fn overflow(&mut self) {
        self.status = Status::Overflow;
    }

    fn push(&mut self, value: BigInt) {
        if self.stack.len() >= STACK_CAP {
            self.overflow();
        } else {
            self.stack.push(value);
        }
    }

    fn binary(&mut self, op: impl FnOnce(BigInt, BigInt) -> BigInt) {
        let (Some(b), Some(a)) = (self.stack.pop(), self.stack.pop()) else {
            self.overflow();
            return;
        };
        self.push(op(a, b));
    }
}

/// Result of one execution run: the external `(output, overflowed)` surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    pub output: Vec<BigInt>,
    pub overflowed: bool,
}

impl Evaluation {
    /// Exact match against an expected output sequence. Overflow does not
    /// disqualify a run; output equality is all that matters.
    pub fn matches(&self, expected: &[BigInt]) -> bool {
        self.output == expected
    }
}

impl From<VmState> for Evaluation {
    fn from(state: VmState) -> Self {
        Evaluation {
            overflowed: state.overflowed(),
            output: state.output,
        }
    }
}

/// The virtual machine: a library of named sub-programs plus the execution
/// rules. The library is immutable during a run, so all methods that execute
/// code take `&self` and thread the mutable state explicitly.
#[derive(Debug, Clone, Default)]
pub struct Vm {
    library: HashMap<String, Program>,
}

impl Vm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_library(library: HashMap<String, Program>) -> Self {
        Vm { library }
    }

    /// Define or replace a named sub-program.
    pub fn define(&mut self, name: impl Into<String>, body: Program) {
        self.library.insert(name.into(), body);
    }

    /// Run a whole program against one input vector.
    pub fn run(
        &self,
        program: &Program,
        inputs: &[i64],
        mut rng: Option<&mut ChaCha8Rng>,
    ) -> Evaluation {
        let mut state = VmState::new();
        for token in program {
            self.step(&mut state, token, inputs, rng.as_deref_mut());
            if state.overflowed() {
                break;
            }
        }
        state.into()
    }

    /// Advance a state by one top-level token, running any frames the token
    /// spawns (calls, wildcard bodies) to completion. `run` is a fold of
    /// `step` over the program, and the synthesiser uses `step` directly to
    /// extend cached per-example states one token at a time.
    pub fn step(
        &self,
        state: &mut VmState,
        token: &Token,
        inputs: &[i64],
        mut rng: Option<&mut ChaCha8Rng>,
    ) {
        if state.overflowed() {
            return;
        }
        let site = Site {
            code: CodeId::Main,
            offset: state.cursor,
        };
        state.cursor += 1;

        let mut frames: Vec<Frame> = Vec::new();
        self.exec(state, token, site, &mut frames, inputs, rng.as_deref_mut());

        while state.status == Status::Valid {
            let (code, ip) = match frames.last() {
                Some(frame) => (frame.code.clone(), frame.ip),
                None => break,
            };
            let token = match self.code(&code, &state.bindings).get(ip) {
                Some(token) => token.clone(),
                None => {
                    frames.pop();
                    continue;
                }
            };
            if let Some(frame) = frames.last_mut() {
                frame.ip += 1;
            }
            let site = Site { code, offset: ip };
            self.exec(state, &token, site, &mut frames, inputs, rng.as_deref_mut());
        }
    }

    fn code<'a>(&'a self, id: &CodeId, bindings: &'a [Program]) -> &'a [Token] {
        match id {
            CodeId::Main => &[],
            CodeId::Library(name) => self.library.get(name).map_or(&[], |p| p.tokens()),
            CodeId::Binding(i) => bindings.get(*i).map_or(&[], |p| p.tokens()),
        }
    }

    fn exec(
        &self,
        state: &mut VmState,
        token: &Token,
        site: Site,
        frames: &mut Vec<Frame>,
        inputs: &[i64],
        rng: Option<&mut ChaCha8Rng>,
    ) {
        match token {
            Token::Push(k) => state.push(BigInt::from(*k)),
            Token::Dup => match state.stack.last().cloned() {
                Some(top) => state.push(top),
                None => state.overflow(),
            },
            Token::Add => state.binary(|a, b| a + b),
            Token::Sub => state.binary(|a, b| a - b),
            Token::Mul => state.binary(|a, b| a * b),
            Token::Eq => state.binary(|a, b| {
                if a == b {
                    BigInt::one()
                } else {
                    BigInt::zero()
                }
            }),
            Token::Select => {
                let (Some(b), Some(a), Some(cond)) =
                    (state.stack.pop(), state.stack.pop(), state.stack.pop())
                else {
                    state.overflow();
                    return;
                };
                state.push(if cond.is_zero() { b } else { a });
            }
            Token::Print => match state.stack.last() {
                Some(top) => state.output.push(top.clone()),
                None => state.overflow(),
            },
            Token::Arg(i) => match inputs.get(*i) {
                Some(value) => state.push(BigInt::from(*value)),
                None => state.overflow(),
            },
            Token::Call(name) => {
                // The implicit top-level frame counts toward the cap.
                if self.library.contains_key(name) && frames.len() + 1 < CALL_CAP {
                    frames.push(Frame {
                        code: CodeId::Library(name.clone()),
                        ip: 0,
                    });
                } else {
                    state.overflow();
                }
            }
            Token::Wildcard => {
                let binding = match state.bound.get(&site) {
                    Some(&i) => Some(i),
                    None => match rng {
                        Some(rng) => {
                            state.bindings.push(sample_body(rng));
                            let i = state.bindings.len() - 1;
                            state.bound.insert(site, i);
                            Some(i)
                        }
                        // No randomness source: degrade to the sentinel.
                        None => None,
                    },
                };
                match binding {
                    Some(i) if frames.len() + 1 < CALL_CAP => frames.push(Frame {
                        code: CodeId::Binding(i),
                        ip: 0,
                    }),
                    _ => state.overflow(),
                }
            }
        }
    }
}

/// Sample a wildcard body: length uniform in `1..=BODY_MAX_TOKENS`, tokens
/// uniform over the call-free alphabet.
fn sample_body(rng: &mut ChaCha8Rng) -> Program {
    let alphabet = body_alphabet();
    let len = rng.gen_range(1..=BODY_MAX_TOKENS);
    let tokens = (0..len)
        .map(|_| alphabet[rng.gen_range(0..alphabet.len())].clone())
        .collect();
    Program::new(tokens)
}
