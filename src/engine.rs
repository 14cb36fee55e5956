//! Enumerative program synthesis against input/output examples.
//!
//! Candidates are generated in increasing-length order and, within a length,
//! in alphabet order — the length-based prior of a resource-bounded
//! Solomonoff/MAP objective, where program length stands in for negative
//! log-prior. Exhaustive mode returns the exact MAP solution (the first
//! accepting program in that order); beam mode trades optimality for speed
//! by keeping only the best-ranked partial programs per depth level.
//!
//! The frontier is an explicit vector of `SearchNode` values rather than
//! implicit call-stack state, so depth-first and beam traversal share the
//! same expansion, pruning, and acceptance code.

use std::cmp::Reverse;
use std::collections::HashMap;

use log::debug;
use num_bigint::BigInt;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::token::{alphabet, Program, Token, MAX_ARGS};
use crate::vm::{Vm, VmState};

/// One input/output example: run the program on `inputs`, require the output
/// sequence to equal `expected` exactly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Example {
    pub inputs: Vec<i64>,
    pub expected: Vec<BigInt>,
}

impl Example {
    pub fn new(inputs: &[i64], expected: &[i64]) -> Self {
        Example {
            inputs: inputs.to_vec(),
            expected: expected.iter().map(|&v| BigInt::from(v)).collect(),
        }
    }
}

/// Configuration errors, rejected before any search starts. Everything else
/// the search encounters (overflow, no solution) is a value, not an error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskError {
    #[error("a task needs at least one example")]
    NoExamples,
    #[error("examples disagree on input arity ({first} vs {other})")]
    ArityMismatch { first: usize, other: usize },
    #[error("input arity {arity} exceeds the maximum of {max}", max = MAX_ARGS)]
    TooManyArgs { arity: usize },
}

/// A validated, nonempty set of examples sharing one input arity.
#[derive(Debug, Clone)]
pub struct Task {
    examples: Vec<Example>,
}

impl Task {
    pub fn new(examples: Vec<Example>) -> Result<Self, TaskError> {
        let first = examples.first().ok_or(TaskError::NoExamples)?;
        let arity = first.inputs.len();
        for example in &examples {
            if example.inputs.len() != arity {
                return Err(TaskError::ArityMismatch {
                    first: arity,
                    other: example.inputs.len(),
                });
            }
        }
        if arity > MAX_ARGS {
            return Err(TaskError::TooManyArgs { arity });
        }
        Ok(Task { examples })
    }

    pub fn examples(&self) -> &[Example] {
        &self.examples
    }

    pub fn arity(&self) -> usize {
        self.examples[0].inputs.len()
    }
}

/// Search configuration.
#[derive(Debug, Clone)]
pub struct SynthesisConfig {
    /// Maximum candidate program length in tokens.
    pub max_tokens: usize,

    /// Retain at most this many partial programs per depth level. `None`
    /// means exhaustive search, which is exact; a width makes the search an
    /// approximation that may miss solutions exhaustive search finds.
    pub beam_width: Option<usize>,

    /// Include the `_` wildcard in the search alphabet. When false the
    /// search needs no randomness source and every result is deterministic.
    pub allow_wildcards: bool,

    /// Seed for wildcard sampling. `None` draws a fresh seed from OS
    /// entropy; a fixed seed makes results reproducible call to call.
    pub seed: Option<u64>,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            max_tokens: 12,
            beam_width: None,
            allow_wildcards: false,
            seed: None,
        }
    }
}

/// Counters from the most recent search.
#[derive(Debug, Clone, Default)]
pub struct SearchStats {
    /// Candidate programs whose outputs were checked against the examples.
    pub candidates_evaluated: u64,
    /// Frontier nodes expanded into children.
    pub nodes_expanded: u64,
    /// Nodes discarded without expansion (mismatch, overflow, or an
    /// equivalent machine state already seen at no greater length).
    pub nodes_pruned: u64,
}

/// One frontier entry: a partial program plus the per-example machine states
/// of running it as-is. States are independent copies; nothing is aliased
/// across examples or across sibling nodes.
#[derive(Debug, Clone)]
struct SearchNode {
    program: Program,
    states: Vec<VmState>,
    /// Wildcard seed for this candidate, shared by every example in it.
    seed: u64,
}

/// Per-example machine fingerprint used to skip re-exploring token sequences
/// that lead to a state some shorter-or-equal program already reached. Only
/// used without wildcards, where equal states have equal futures.
type Fingerprint = Vec<(Vec<BigInt>, Vec<BigInt>, bool)>;

pub struct Synthesizer {
    task: Task,
    config: SynthesisConfig,
    vm: Vm,
    stats: SearchStats,
    root_seed: u64,
}

impl Synthesizer {
    pub fn new(task: Task, config: SynthesisConfig) -> Self {
        let root_seed = config.seed.unwrap_or_else(rand::random);
        Synthesizer {
            task,
            config,
            vm: Vm::new(),
            stats: SearchStats::default(),
            root_seed,
        }
    }

    pub fn stats(&self) -> &SearchStats {
        &self.stats
    }

    /// Run the search. Returns the first accepting program in search order,
    /// or `None` once the space up to `max_tokens` is exhausted (or the beam
    /// frontier collapses).
    pub fn run(&mut self) -> Option<Program> {
        self.stats = SearchStats::default();
        match self.config.beam_width {
            Some(width) => self.beam_search(width),
            None => self.exhaustive_search(),
        }
    }

    /// Iterative-deepening depth-first search. Each pass explores the full
    /// tree up to one target length with an explicit node stack, accepting
    /// only candidates of exactly that length; shorter accepting programs
    /// were already found by an earlier pass, so the first hit is the MAP
    /// solution in length-then-alphabet order.
    fn exhaustive_search(&mut self) -> Option<Program> {
        let tokens = alphabet(self.config.allow_wildcards);
        for target in 0..=self.config.max_tokens {
            debug!("exhaustive pass, target length {target}");
            let mut stack = vec![self.root_node()];
            let mut seen: HashMap<Fingerprint, usize> = HashMap::new();
            while let Some(node) = stack.pop() {
                if node.program.len() == target {
                    if self.accepted(&node) {
                        debug!("accepted `{}` at length {target}", node.program);
                        return Some(node.program);
                    }
                    continue;
                }
                if !self.viable(&node) {
                    self.stats.nodes_pruned += 1;
                    continue;
                }
                if !self.config.allow_wildcards {
                    // Two programs reaching identical per-example states have
                    // identical completions; keep the shorter/earlier one.
                    let key = fingerprint(&node.states);
                    match seen.get(&key) {
                        Some(&len) if len <= node.program.len() => {
                            self.stats.nodes_pruned += 1;
                            continue;
                        }
                        _ => {
                            seen.insert(key, node.program.len());
                        }
                    }
                }
                self.stats.nodes_expanded += 1;
                // Children are pushed in reverse so the stack pops them in
                // alphabet order.
                for (ordinal, token) in tokens.iter().enumerate().rev() {
                    stack.push(self.child(&node, ordinal, token));
                }
            }
        }
        None
    }

    /// Level-synchronous beam search: expand every frontier node, rank all
    /// surviving children by the prefix-match heuristic, keep the best
    /// `width`, repeat. Deterministic for a fixed seed and config, but only
    /// an approximation of the exhaustive order.
    fn beam_search(&mut self, width: usize) -> Option<Program> {
        let tokens = alphabet(self.config.allow_wildcards);
        let root = self.root_node();
        if self.accepted(&root) {
            return Some(root.program);
        }
        let mut frontier = vec![root];
        for level in 1..=self.config.max_tokens {
            let mut next: Vec<SearchNode> = Vec::new();
            for node in &frontier {
                if !self.viable(node) {
                    self.stats.nodes_pruned += 1;
                    continue;
                }
                self.stats.nodes_expanded += 1;
                for (ordinal, token) in tokens.iter().enumerate() {
                    let child = self.child(node, ordinal, token);
                    if self.accepted(&child) {
                        debug!("accepted `{}` at level {level}", child.program);
                        return Some(child.program);
                    }
                    if self.viable(&child) {
                        next.push(child);
                    } else {
                        self.stats.nodes_pruned += 1;
                    }
                }
            }
            if next.is_empty() {
                debug!("beam collapsed at level {level}");
                return None;
            }
            next.sort_by_cached_key(|node| Reverse(self.score(node)));
            next.truncate(width);
            frontier = next;
        }
        None
    }

    fn root_node(&mut self) -> SearchNode {
        self.make_node(Program::default(), self.root_seed)
    }

    fn child(&mut self, parent: &SearchNode, ordinal: usize, token: &Token) -> SearchNode {
        let program = parent.program.extended(token.clone());
        let seed = mix_seed(parent.seed, ordinal as u64);
        if self.config.allow_wildcards {
            // Wildcard bodies are resampled per candidate, so cached parent
            // states cannot be extended; re-run the whole program under the
            // candidate's own seed.
            self.make_node(program, seed)
        } else {
            self.stats.candidates_evaluated += 1;
            let vm = &self.vm;
            let states = parent
                .states
                .iter()
                .zip(self.task.examples())
                .map(|(state, example)| {
                    let mut state = state.clone();
                    vm.step(&mut state, token, &example.inputs, None);
                    state
                })
                .collect();
            SearchNode {
                program,
                states,
                seed,
            }
        }
    }

    /// Evaluate a candidate from scratch, one run per example, every example
    /// seeded identically from the candidate seed.
    fn make_node(&mut self, program: Program, seed: u64) -> SearchNode {
        self.stats.candidates_evaluated += 1;
        let vm = &self.vm;
        let allow_wildcards = self.config.allow_wildcards;
        let states = self
            .task
            .examples()
            .iter()
            .map(|example| {
                let mut state = VmState::new();
                let mut rng = ChaCha8Rng::seed_from_u64(seed);
                let mut rng = allow_wildcards.then_some(&mut rng);
                for token in &program {
                    vm.step(&mut state, token, &example.inputs, rng.as_deref_mut());
                    if state.overflowed() {
                        break;
                    }
                }
                state
            })
            .collect();
        SearchNode {
            program,
            states,
            seed,
        }
    }

    fn accepted(&self, node: &SearchNode) -> bool {
        node.states
            .iter()
            .zip(self.task.examples())
            .all(|(state, example)| state.output == example.expected)
    }

    /// Whether extending this node can still succeed: every example's output
    /// so far must be a prefix of its expected output (output is
    /// append-only), and no run may have hit the terminal sentinel (after
    /// overflow, extensions are no-ops).
    fn viable(&self, node: &SearchNode) -> bool {
        node.states
            .iter()
            .zip(self.task.examples())
            .all(|(state, example)| {
                !state.overflowed()
                    && state.output.len() <= example.expected.len()
                    && state
                        .output
                        .iter()
                        .zip(&example.expected)
                        .all(|(o, e)| o == e)
            })
    }

    /// Beam ranking heuristic: one point per output element agreeing with
    /// the expected sequence, summed over examples. Ties keep generation
    /// order (the sort is stable), i.e. the alphabet order.
    fn score(&self, node: &SearchNode) -> usize {
        node.states
            .iter()
            .zip(self.task.examples())
            .map(|(state, example)| {
                state
                    .output
                    .iter()
                    .zip(&example.expected)
                    .take_while(|(o, e)| o == e)
                    .count()
            })
            .sum()
    }
}

fn fingerprint(states: &[VmState]) -> Fingerprint {
    states
        .iter()
        .map(|state| {
            (
                state.stack.clone(),
                state.output.clone(),
                state.overflowed(),
            )
        })
        .collect()
}

/// splitmix64-style mix of a parent candidate seed and a child ordinal;
/// deterministic regardless of exploration order, so beam pruning cannot
/// perturb the seeds of surviving candidates.
fn mix_seed(parent: u64, ordinal: u64) -> u64 {
    let mut z = parent
        .wrapping_add(0x9e37_79b9_7f4a_7c15)
        .wrapping_add(ordinal.wrapping_mul(0xd1b5_4a32_d192_ed03));
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

/// Validate the examples and search. The external entry point consumed by
/// the CLI layer: configuration problems are hard errors, "no solution" is a
/// normal `Ok(None)`.
pub fn synthesize(
    examples: Vec<Example>,
    config: &SynthesisConfig,
) -> Result<Option<Program>, TaskError> {
    let task = Task::new(examples)?;
    let mut synthesizer = Synthesizer::new(task, config.clone());
    Ok(synthesizer.run())
}
