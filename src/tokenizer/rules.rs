//! Declarative rule tables consumed by the tokenizer engine.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::{escape_char, ScanContext, StateId, TokenContext};

/// Transition predicate.
pub type Predicate = Arc<dyn Fn(&ScanContext<'_>) -> bool + Send + Sync>;
/// Rewrites one input character into the output buffer.
pub type CharProcessor = Arc<dyn Fn(char, &mut String) + Send + Sync>;
/// Renders a flushed token.
pub type TokenProcessor = Arc<dyn Fn(&TokenContext<'_>) -> String + Send + Sync>;
/// Computes how many extra characters a transition consumes.
pub type StepFn = Arc<dyn Fn(&ScanContext<'_>) -> usize + Send + Sync>;

/// Where a transition sends the scanner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// Flush the pending token but keep the current state.
    Stay,
    /// Return to the enclosing region, or the initial state if there is none.
    Pop,
    State(StateId),
}

/// Where the characters consumed by a transition end up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Inside the region being left, before its exit token.
    Closing,
    /// Inside the region being entered, after its entry token.
    Opening,
    /// Outside both regions.
    Between,
    /// At the start of the new region's pending token.
    Carry,
    Drop,
}

/// Which delimiter a newly entered region must be closed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairSource {
    None,
    /// The character that fired the transition.
    Trigger,
    Fixed(char),
}

/// One entry in a state's ordered transition list.
#[derive(Clone)]
pub struct Transition {
    pub(super) when: Predicate,
    pub(super) target: Target,
    pub(super) step: usize,
    pub(super) step_fn: Option<StepFn>,
    pub(super) zero_width: bool,
    pub(super) nest: bool,
    pub(super) pair: PairSource,
    pub(super) placement: Option<Placement>,
    pub(super) on_char: Option<CharProcessor>,
    pub(super) on_token: Option<TokenProcessor>,
}

impl Transition {
    fn new(target: Target) -> Self {
        Self {
            when: Arc::new(|_| false),
            target,
            step: 0,
            step_fn: None,
            zero_width: false,
            nest: false,
            pair: PairSource::None,
            placement: None,
            on_char: None,
            on_token: None,
        }
    }

    pub fn to(state: StateId) -> Self {
        Self::new(Target::State(state))
    }

    pub fn stay() -> Self {
        Self::new(Target::Stay)
    }

    pub fn pop() -> Self {
        Self::new(Target::Pop)
    }

    pub fn when<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&ScanContext<'_>) -> bool + Send + Sync + 'static,
    {
        self.when = Arc::new(predicate);
        self
    }

    /// Consume `extra` characters beyond the one that matched.
    pub fn step(mut self, extra: usize) -> Self {
        self.step = extra;
        self
    }

    /// Like [`Transition::step`], computed from the context when the
    /// transition fires.
    pub fn step_with<F>(mut self, extra: F) -> Self
    where
        F: Fn(&ScanContext<'_>) -> usize + Send + Sync + 'static,
    {
        self.step_fn = Some(Arc::new(extra));
        self
    }

    /// Change state without consuming the character; it is rescanned in the
    /// new state.
    pub fn zero_width(mut self) -> Self {
        self.zero_width = true;
        self
    }

    /// Push the new state on top of the current one instead of replacing it.
    pub fn nested(mut self) -> Self {
        self.nest = true;
        self
    }

    pub fn pair_trigger(mut self) -> Self {
        self.pair = PairSource::Trigger;
        self
    }

    pub fn pair_with(mut self, c: char) -> Self {
        self.pair = PairSource::Fixed(c);
        self
    }

    pub fn placement(mut self, placement: Placement) -> Self {
        self.placement = Some(placement);
        self
    }

    pub fn chars<F>(mut self, processor: F) -> Self
    where
        F: Fn(char, &mut String) + Send + Sync + 'static,
    {
        self.on_char = Some(Arc::new(processor));
        self
    }

    pub fn tokens<F>(mut self, processor: F) -> Self
    where
        F: Fn(&TokenContext<'_>) -> String + Send + Sync + 'static,
    {
        self.on_token = Some(Arc::new(processor));
        self
    }
}

impl fmt::Debug for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transition")
            .field("target", &self.target)
            .field("step", &self.step)
            .field("zero_width", &self.zero_width)
            .field("nest", &self.nest)
            .field("pair", &self.pair)
            .field("placement", &self.placement)
            .finish_non_exhaustive()
    }
}

/// Everything the engine knows about one state.
#[derive(Clone, Default)]
pub struct StateRules {
    pub(super) transitions: Vec<Transition>,
    pub(super) entry: Option<String>,
    pub(super) exit: Option<String>,
    pub(super) on_char: Option<CharProcessor>,
    pub(super) on_token: Option<TokenProcessor>,
}

impl StateRules {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(mut self, transition: Transition) -> Self {
        self.transitions.push(transition);
        self
    }

    pub fn extend<I>(mut self, transitions: I) -> Self
    where
        I: IntoIterator<Item = Transition>,
    {
        self.transitions.extend(transitions);
        self
    }

    pub fn entry(mut self, token: impl Into<String>) -> Self {
        self.entry = Some(token.into());
        self
    }

    pub fn exit(mut self, token: impl Into<String>) -> Self {
        self.exit = Some(token.into());
        self
    }

    /// Wrap the region in `<span class="{class}">…</span>`.
    pub fn span(self, class: &str) -> Self {
        self.entry(format!("<span class=\"{class}\">")).exit("</span>")
    }

    pub fn chars<F>(mut self, processor: F) -> Self
    where
        F: Fn(char, &mut String) + Send + Sync + 'static,
    {
        self.on_char = Some(Arc::new(processor));
        self
    }

    pub fn tokens<F>(mut self, processor: F) -> Self
    where
        F: Fn(&TokenContext<'_>) -> String + Send + Sync + 'static,
    {
        self.on_token = Some(Arc::new(processor));
        self
    }
}

/// A complete set of states plus the default character processor.
///
/// Tables are built once and never mutated; share them by reference.
#[derive(Clone)]
pub struct RuleTable {
    name: &'static str,
    initial: StateId,
    states: HashMap<StateId, StateRules>,
    pub(super) on_char: CharProcessor,
}

impl RuleTable {
    /// A table whose default character processor escapes HTML.
    pub fn new(name: &'static str, initial: StateId) -> Self {
        Self {
            name,
            initial,
            states: HashMap::new(),
            on_char: Arc::new(escape_char),
        }
    }

    pub fn state(mut self, id: StateId, rules: StateRules) -> Self {
        self.states.insert(id, rules);
        self
    }

    /// Replace the table-wide default character processor.
    pub fn chars<F>(mut self, processor: F) -> Self
    where
        F: Fn(char, &mut String) + Send + Sync + 'static,
    {
        self.on_char = Arc::new(processor);
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn initial(&self) -> StateId {
        self.initial
    }

    pub fn rules(&self, state: StateId) -> Option<&StateRules> {
        self.states.get(state)
    }

    pub fn state_count(&self) -> usize {
        self.states.len()
    }
}

impl fmt::Debug for RuleTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut states: Vec<_> = self.states.keys().collect();
        states.sort();
        f.debug_struct("RuleTable")
            .field("name", &self.name)
            .field("initial", &self.initial)
            .field("states", &states)
            .finish()
    }
}
