//! Table-driven character tokenizer.
//!
//! ## Responsibility
//! Walks an input string one character at a time, driven entirely by a
//! [`RuleTable`]. Each state owns an ordered list of [`Transition`]s; the first
//! one whose predicate matches the current [`ScanContext`] fires. Characters no
//! transition claims are appended to the pending token.
//!
//! ## Guarantees
//! - Never fails: unmatched input is literal text.
//! - Every region opened during the scan is closed at end of input, so
//!   truncated input (an open quote, an unterminated fence) still produces
//!   balanced markup.
//! - Nested regions live on an explicit frame stack, not the call stack.
//! - Tables are immutable; one table can drive any number of concurrent scans.
//!
//! ## NOT Responsible For
//! - Knowing anything about a particular language. All semantics arrive via
//!   rule tables (see `crate::highlight` and `crate::markdown`).

mod rules;

pub use rules::{
    CharProcessor, PairSource, Placement, Predicate, RuleTable, StateRules, StepFn, Target,
    TokenProcessor, Transition,
};

/// Name of a tokenizer state. Rule tables key their states by these.
pub type StateId = &'static str;

/// Conventional name for a table's initial state.
pub const NORMAL: StateId = "normal";

/// Consecutive zero-width hops allowed at one input position before the
/// character is taken literally.
const MAX_ZERO_WIDTH_HOPS: usize = 16;

// ---------------------------------------------------------------------------
// Scan context
// ---------------------------------------------------------------------------

/// What a transition predicate sees for the character under the cursor.
#[derive(Debug, Clone, Copy)]
pub struct ScanContext<'a> {
    pub ch: char,
    pub prev: Option<char>,
    pub next: Option<char>,
    /// Delimiter that opened the innermost region, if any.
    pub pair: Option<char>,
    /// Everything before the cursor.
    pub before: &'a [char],
    /// Everything after the cursor.
    pub after: &'a [char],
}

impl<'a> ScanContext<'a> {
    /// Character `n` positions past `next` (`peek(0) == next`).
    pub fn peek(&self, n: usize) -> Option<char> {
        self.after.get(n).copied()
    }

    /// True when the input at the cursor starts with `pat`.
    pub fn starts_with(&self, pat: &str) -> bool {
        let mut it = pat.chars();
        match it.next() {
            Some(first) if first == self.ch => {}
            Some(_) => return false,
            None => return true,
        }
        it.enumerate().all(|(i, c)| self.after.get(i) == Some(&c))
    }

    pub fn at_line_start(&self) -> bool {
        matches!(self.prev, None | Some('\n'))
    }

    /// The current line from the cursor to (not including) the next newline.
    pub fn rest_of_line(&self) -> String {
        if self.ch == '\n' {
            return String::new();
        }
        std::iter::once(self.ch)
            .chain(self.after.iter().copied().take_while(|c| *c != '\n'))
            .collect()
    }

    /// The line after the current one, if the input contains one.
    pub fn following_line(&self) -> Option<String> {
        let start = if self.ch == '\n' {
            0
        } else {
            self.after.iter().position(|c| *c == '\n')? + 1
        };
        Some(self.after[start..].iter().take_while(|c| **c != '\n').collect())
    }

    /// Characters between the last newline and the cursor.
    pub fn line_prefix(&self) -> &'a [char] {
        let start = self
            .before
            .iter()
            .rposition(|c| *c == '\n')
            .map(|p| p + 1)
            .unwrap_or(0);
        &self.before[start..]
    }
}

/// What a token processor sees when the pending token is flushed.
#[derive(Debug, Clone, Copy)]
pub struct TokenContext<'a> {
    /// The pending token, already run through the char processor.
    pub token: &'a str,
    pub from: StateId,
    pub to: StateId,
    /// Input character immediately before the token started.
    pub before: Option<char>,
    /// True while the current region has written nothing past its entry token.
    pub fresh: bool,
}

// ---------------------------------------------------------------------------
// Character processors shared by every table
// ---------------------------------------------------------------------------

/// Escape one character for inclusion in HTML text.
///
/// Only `&`, `<` and `>` are rewritten, checked in that order.
pub fn escape_char(c: char, out: &mut String) {
    match c {
        '&' => out.push_str("&amp;"),
        '<' => out.push_str("&lt;"),
        '>' => out.push_str("&gt;"),
        _ => out.push(c),
    }
}

/// Escape a whole string with [`escape_char`].
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + text.len() / 8);
    for c in text.chars() {
        escape_char(c, &mut out);
    }
    out
}

/// Pass a character through untouched.
pub fn verbatim(c: char, out: &mut String) {
    out.push(c);
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Tokenize `input` with `table`. Equivalent to [`RuleTable::run`].
pub fn run(input: &str, table: &RuleTable) -> String {
    table.run(input)
}

#[derive(Debug)]
struct Frame {
    state: StateId,
    pair: Option<char>,
    /// Output length right after the entry token was written.
    opened_at: usize,
    entry_len: usize,
}

struct Scan<'t> {
    table: &'t RuleTable,
    out: String,
    pending: String,
    token_before: Option<char>,
    frames: Vec<Frame>,
}

impl<'t> Scan<'t> {
    fn current(&self) -> StateId {
        self.frames.last().map(|f| f.state).unwrap_or(self.table.initial())
    }

    fn pair(&self) -> Option<char> {
        self.frames.last().and_then(|f| f.pair)
    }

    fn fresh(&self) -> bool {
        self.frames
            .last()
            .map(|f| self.out.len() == f.opened_at)
            .unwrap_or(true)
    }

    fn enter(&mut self, state: StateId, pair: Option<char>) {
        let entry = self.table.rules(state).and_then(|r| r.entry.as_deref()).unwrap_or("");
        self.out.push_str(entry);
        self.frames.push(Frame {
            state,
            pair,
            opened_at: self.out.len(),
            entry_len: entry.len(),
        });
    }

    fn leave(&mut self) {
        let Some(frame) = self.frames.pop() else {
            return;
        };
        if self.out.len() == frame.opened_at {
            // nothing was written inside; drop the wrapper
            self.out.truncate(frame.opened_at - frame.entry_len);
            return;
        }
        if let Some(exit) = self.table.rules(frame.state).and_then(|r| r.exit.as_deref()) {
            self.out.push_str(exit);
        }
    }

    fn process_chars(&self, text: &[char], state: StateId, custom: Option<&CharProcessor>) -> String {
        let table = self.table;
        let processor = custom
            .or_else(|| table.rules(state).and_then(|r| r.on_char.as_ref()))
            .unwrap_or(&table.on_char);
        let mut buf = String::with_capacity(text.len());
        for c in text {
            processor(*c, &mut buf);
        }
        buf
    }

    fn push_pending(&mut self, text: &str, at: usize, chars: &[char]) {
        if text.is_empty() {
            return;
        }
        if self.pending.is_empty() {
            self.token_before = at.checked_sub(1).map(|p| chars[p]);
        }
        self.pending.push_str(text);
    }

    fn flush(&mut self, from: StateId, to: StateId, custom: Option<&TokenProcessor>) {
        let token = std::mem::take(&mut self.pending);
        let before = self.token_before.take();
        let table = self.table;
        let processor = custom.or_else(|| table.rules(from).and_then(|r| r.on_token.as_ref()));
        match processor {
            Some(p) => {
                let ctx = TokenContext {
                    token: &token,
                    from,
                    to,
                    before,
                    fresh: self.fresh(),
                };
                let rendered = p(&ctx);
                self.out.push_str(&rendered);
            }
            None => self.out.push_str(&token),
        }
    }

    /// Fire `t` over `chars[at..at + len]`.
    fn apply(&mut self, t: &Transition, chars: &[char], at: usize, len: usize, trigger: char) {
        let from = self.current();
        let depth = self.frames.len();
        let to = match t.target {
            Target::Stay => from,
            Target::Pop if depth > 1 => self.frames[depth - 2].state,
            Target::Pop => self.table.initial(),
            Target::State(s) => s,
        };
        let placement = t.placement.unwrap_or(match t.target {
            Target::Stay => Placement::Between,
            Target::Pop => Placement::Closing,
            Target::State(_) => Placement::Opening,
        });
        let delim = if len == 0 || placement == Placement::Drop {
            String::new()
        } else {
            self.process_chars(&chars[at..at + len], from, t.on_char.as_ref())
        };

        self.flush(from, to, t.on_token.as_ref());
        if placement == Placement::Closing {
            self.out.push_str(&delim);
        }

        match t.target {
            Target::Stay => self.write_between(placement, &delim),
            Target::Pop => {
                self.leave();
                self.write_between(placement, &delim);
                if self.frames.is_empty() {
                    self.enter(self.table.initial(), None);
                }
            }
            Target::State(s) => {
                let pair = match t.pair {
                    PairSource::None => None,
                    PairSource::Trigger => Some(trigger),
                    PairSource::Fixed(c) => Some(c),
                };
                if !t.nest {
                    self.leave();
                }
                self.write_between(placement, &delim);
                self.enter(s, pair);
            }
        }

        match placement {
            Placement::Opening => self.out.push_str(&delim),
            Placement::Carry => self.push_pending(&delim, at, chars),
            _ => {}
        }
    }

    fn write_between(&mut self, placement: Placement, delim: &str) {
        if placement == Placement::Between {
            self.out.push_str(delim);
        }
    }

    fn finish(mut self) -> String {
        let from = self.current();
        self.flush(from, self.table.initial(), None);
        while !self.frames.is_empty() {
            self.leave();
        }
        self.out
    }
}

impl RuleTable {
    /// Tokenize `input`, returning the rendered markup.
    pub fn run(&self, input: &str) -> String {
        let chars: Vec<char> = input.chars().collect();
        let mut scan = Scan {
            table: self,
            out: String::with_capacity(input.len() + input.len() / 4),
            pending: String::new(),
            token_before: None,
            frames: Vec::new(),
        };
        scan.enter(self.initial(), None);

        let mut i = 0;
        let mut hops = 0;
        while i < chars.len() {
            let state = scan.current();
            let rules = self.rules(state);
            let ctx = ScanContext {
                ch: chars[i],
                prev: i.checked_sub(1).map(|p| chars[p]),
                next: chars.get(i + 1).copied(),
                pair: scan.pair(),
                before: &chars[..i],
                after: &chars[i + 1..],
            };
            let fired = rules.and_then(|r| r.transitions.iter().find(|t| (t.when)(&ctx)));

            if let Some(t) = fired {
                if t.zero_width {
                    let moves = !matches!(t.target, Target::Stay)
                        && !(matches!(t.target, Target::State(s) if s == state) && !t.nest);
                    if moves && hops < MAX_ZERO_WIDTH_HOPS {
                        scan.apply(t, &chars, i, 0, ctx.ch);
                        hops += 1;
                        continue;
                    }
                } else {
                    let extra = t.step_fn.as_ref().map_or(t.step, |f| f(&ctx));
                    let len = (extra + 1).min(chars.len() - i);
                    scan.apply(t, &chars, i, len, ctx.ch);
                    i += len;
                    hops = 0;
                    continue;
                }
            }

            let text = scan.process_chars(&chars[i..=i], state, None);
            scan.push_pending(&text, i, &chars);
            i += 1;
            hops = 0;
        }
        scan.finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
