//! Postfix → NFA.
//!
//! A Thompson construction over a stack of fragments. States live in one
//! arena and point at each other by index; a fragment is its start state plus
//! the list of dangling out-slots still to be patched. The patch list is an
//! explicit vector here — no pointer aliasing games are needed when the slots
//! are just `(state, which_out)` pairs.
//!
//! After construction a postprocess pass decides for every look-around
//! whether to evaluate it eagerly (`first`) or postpone it, and the
//! optimization hints (`reganch`, `regstart`, `match_text`) are extracted.
use crate::error::{EditorError, Result};

use super::parse::{Parsed, PostItem};
use super::{CompFlags, LookKind, NONE, NfaState, Op, Prog, StateIdx};

#[derive(Debug, Clone, Copy, PartialEq)]
enum Slot {
	Out,
	Out1,
}

type PatchList = Vec<(StateIdx, Slot)>;

#[derive(Debug)]
struct Frag {
	start: StateIdx,
	out: PatchList,
}

struct Builder {
	states: Vec<NfaState>,
}

impl Builder {
	fn add(&mut self, op: Op) -> StateIdx {
		self.states.push(NfaState { op, out: NONE, out1: NONE });
		(self.states.len() - 1) as StateIdx
	}

	fn patch(&mut self, list: &PatchList, target: StateIdx) {
		for &(idx, slot) in list {
			match slot {
				Slot::Out => self.states[idx as usize].out = target,
				Slot::Out1 => self.states[idx as usize].out1 = target,
			}
		}
	}
}

pub(crate) fn build(pattern: &str, flags: CompFlags, parsed: Parsed) -> Result<Prog> {
	let mut b = Builder { states: Vec::with_capacity(parsed.post.len() + 4) };
	let mut stack: Vec<Frag> = Vec::new();

	let compile_err =
		|| EditorError::RegexCompile(format!("invalid postfix program for \"{pattern}\""));

	for item in parsed.post {
		match item {
			PostItem::State(op) => {
				match op {
					Op::Backref(_) | Op::ZBackref(_) => {
						// a backref consumes an unknown number of bytes; the
						// SKIP state eats the remainder one list at a time
						let s = b.add(op);
						let s1 = b.add(Op::Skip);
						b.states[s as usize].out = s1;
						stack.push(Frag { start: s, out: vec![(s1, Slot::Out)] });
					}
					_ => {
						let s = b.add(op);
						stack.push(Frag { start: s, out: vec![(s, Slot::Out)] });
					}
				}
			}
			PostItem::Concat => {
				let e2 = stack.pop().ok_or_else(compile_err)?;
				let e1 = stack.pop().ok_or_else(compile_err)?;
				b.patch(&e1.out, e2.start);
				stack.push(Frag { start: e1.start, out: e2.out });
			}
			PostItem::Or => {
				let e2 = stack.pop().ok_or_else(compile_err)?;
				let e1 = stack.pop().ok_or_else(compile_err)?;
				let s = b.add(Op::Split);
				b.states[s as usize].out = e1.start;
				b.states[s as usize].out1 = e2.start;
				let mut out = e1.out;
				out.extend(e2.out);
				stack.push(Frag { start: s, out });
			}
			PostItem::Star { greedy } => {
				let e = stack.pop().ok_or_else(compile_err)?;
				let s = b.add(Op::Split);
				if greedy {
					b.states[s as usize].out = e.start;
					b.patch(&e.out, s);
					stack.push(Frag { start: s, out: vec![(s, Slot::Out1)] });
				} else {
					b.states[s as usize].out1 = e.start;
					b.patch(&e.out, s);
					stack.push(Frag { start: s, out: vec![(s, Slot::Out)] });
				}
			}
			PostItem::Quest { greedy } => {
				let e = stack.pop().ok_or_else(compile_err)?;
				let s = b.add(Op::Split);
				let mut out = e.out;
				if greedy {
					b.states[s as usize].out = e.start;
					out.push((s, Slot::Out1));
				} else {
					b.states[s as usize].out1 = e.start;
					out.push((s, Slot::Out));
				}
				stack.push(Frag { start: s, out });
			}
			PostItem::Group { open, close } => {
				let e = stack.pop().ok_or_else(compile_err)?;
				let composing = open == Op::Composing;
				let o = b.add(open);
				let c = b.add(close);
				b.states[o as usize].out = e.start;
				b.patch(&e.out, c);
				if composing {
					// the executor needs COMPOSING.out1 = END_COMPOSING
					b.states[o as usize].out1 = c;
				}
				stack.push(Frag { start: o, out: vec![(c, Slot::Out)] });
			}
			PostItem::Look { kind, off } => {
				let e = stack.pop().ok_or_else(compile_err)?;
				let end = b.add(Op::EndInvisible { neg: kind.is_neg() });
				let off = if kind.is_before() && off == 0 {
					// guessing the width avoids a lot of pointless tries
					max_width(&b.states, e.start).unwrap_or(0)
				} else {
					off
				};
				let start = b.add(Op::StartInvisible { kind, first: false, off });
				b.states[start as usize].out = e.start;
				b.states[start as usize].out1 = end;
				b.patch(&e.out, end);
				stack.push(Frag { start, out: vec![(end, Slot::Out)] });
			}
			PostItem::Pattern => {
				// NFA_ZEND -> NFA_END_PATTERN -> NFA_SKIP -> what follows
				let e = stack.pop().ok_or_else(compile_err)?;
				let end = b.add(Op::EndPattern);
				let start = b.add(Op::StartPattern);
				let skip = b.add(Op::Skip);
				let zend = b.add(Op::Zend);
				b.states[start as usize].out = e.start;
				b.states[start as usize].out1 = end;
				b.states[end as usize].out = skip;
				b.states[zend as usize].out = end;
				b.patch(&e.out, zend);
				stack.push(Frag { start, out: vec![(skip, Slot::Out)] });
			}
			PostItem::OptChars(n) => {
				let mut out: PatchList = Vec::new();
				let mut prev = NONE;
				let mut s = NONE;
				for i in 0..n {
					let e = stack.pop().ok_or_else(compile_err)?;
					s = b.add(Op::Split);
					b.states[s as usize].out = e.start;
					if i == 0 {
						// the deepest atom keeps its dangling outs
						out.extend(e.out);
					} else {
						b.patch(&e.out, prev);
					}
					out.push((s, Slot::Out1));
					prev = s;
				}
				stack.push(Frag { start: s, out });
			}
			PostItem::Empty => {
				let s = b.add(Op::Empty);
				stack.push(Frag { start: s, out: vec![(s, Slot::Out)] });
			}
		}
	}

	let e = stack.pop().ok_or_else(compile_err)?;
	if !stack.is_empty() {
		return Err(EditorError::RegexCompile(format!(
			"too many states left on stack for \"{pattern}\""
		)));
	}
	let matchstate = b.add(Op::Match);
	b.patch(&e.out, matchstate);
	let start = e.start;

	let mut prog = Prog {
		states: b.states,
		start,
		reganch: false,
		regstart: None,
		match_text: None,
		has_zend: parsed.has_zend,
		has_backref: parsed.has_backref,
		has_zsubexpr: parsed.has_zsubexpr,
		nsubexp: parsed.nsubexp,
		icase: flags.ignorecase,
		pattern: pattern.to_string(),
	};
	postprocess(&mut prog);
	prog.reganch = get_reganch(&prog.states, prog.start, 0);
	prog.regstart = get_regstart(&prog.states, prog.start, 0);
	if !prog.has_backref && prog.nsubexp == 1 && !prog.has_zend && !prog.has_zsubexpr {
		prog.match_text = get_match_text(&prog.states, prog.start);
	}
	Ok(prog)
}

/// Decide per look-around whether to run it eagerly. Postponing wins when
/// what follows is likely to fail first; unbounded look-behind is always
/// postponed unless the continuation can't fail.
fn postprocess(prog: &mut Prog) {
	for i in 0..prog.states.len() {
		let Op::StartInvisible { kind, first: false, off } = prog.states[i].op else {
			continue;
		};
		let follow = prog.states[prog.states[i].out1 as usize].out;
		let directly = if match_follows(&prog.states, follow, 0) {
			true
		} else {
			let ch_invisible = failure_chance(&prog.states, prog.states[i].out, 0);
			let ch_follows = failure_chance(&prog.states, follow, 0);
			if kind.is_before() {
				if off == 0 && ch_follows > 0 {
					false
				} else {
					ch_follows * 10 < ch_invisible
				}
			} else {
				ch_follows < ch_invisible
			}
		};
		if directly {
			prog.states[i].op = Op::StartInvisible { kind, first: true, off };
		}
	}
}

/// True when a match state is reachable without consuming input.
pub(crate) fn match_follows(states: &[NfaState], mut idx: StateIdx, depth: usize) -> bool {
	if depth > 10 {
		return false;
	}
	while idx != NONE {
		let state = &states[idx as usize];
		match &state.op {
			Op::Match | Op::EndInvisible { .. } | Op::EndPattern => return true,
			Op::Split => {
				return match_follows(states, state.out, depth + 1)
					|| match_follows(states, state.out1, depth + 1);
			}
			Op::Mopen(_) | Op::Mclose(_) | Op::Zopen(_) | Op::Zclose(_) | Op::Nopen
			| Op::Nclose | Op::Zstart | Op::Zend | Op::Empty => idx = state.out,
			_ => return false,
		}
	}
	false
}

/// Estimate the chance of `state` failing to match: 0 = always matches,
/// 99 = a specific character.
fn failure_chance(states: &[NfaState], idx: StateIdx, depth: usize) -> usize {
	if depth > 4 || idx == NONE {
		return 1;
	}
	let state = &states[idx as usize];
	match &state.op {
		Op::Split => {
			let l = &states[state.out as usize].op;
			let r = &states[state.out1 as usize].op;
			if *l == Op::Split || *r == Op::Split {
				return 1;
			}
			failure_chance(states, state.out, depth + 1)
				.min(failure_chance(states, state.out1, depth + 1))
		}
		Op::Class { kind: super::ClassKind::Any, neg: false, .. } => 1,
		Op::Match | Op::Mclose(_) | Op::AnyComposing => 0,
		Op::StartInvisible { .. } | Op::StartPattern => 5,
		Op::Bol | Op::Eol | Op::Bof | Op::Eof | Op::Newl => 99,
		Op::Bow | Op::Eow => 90,
		Op::Mopen(_) | Op::Zopen(_) | Op::Zclose(_) | Op::Nopen | Op::Nclose | Op::Zstart
		| Op::Zend | Op::Empty => failure_chance(states, state.out, depth + 1),
		Op::Char(_) => 99,
		Op::Class { .. } | Op::StartColl { .. } => 50,
		_ => 50,
	}
}

/// True when every path into the NFA begins with a begin-of-line/file check.
fn get_reganch(states: &[NfaState], mut idx: StateIdx, depth: usize) -> bool {
	if depth > 4 {
		return false;
	}
	while idx != NONE {
		let state = &states[idx as usize];
		match &state.op {
			Op::Bol | Op::Bof => return true,
			Op::Mopen(_) | Op::Mclose(_) | Op::Zopen(_) | Op::Zclose(_) | Op::Nopen
			| Op::Nclose | Op::Zstart | Op::Zend | Op::Empty
			| Op::Lnum(..) | Op::Col(..) | Op::Vcol(..) | Op::Mark(..)
			| Op::Cursor | Op::Visual => idx = state.out,
			Op::Split => {
				return get_reganch(states, state.out, depth + 1)
					&& get_reganch(states, state.out1, depth + 1);
			}
			_ => return false,
		}
	}
	false
}

/// The single codepoint every match must start with, when there is one.
fn get_regstart(states: &[NfaState], mut idx: StateIdx, depth: usize) -> Option<char> {
	if depth > 4 {
		return None;
	}
	while idx != NONE {
		let state = &states[idx as usize];
		match &state.op {
			Op::Char(c) => return Some(*c),
			Op::Mopen(_) | Op::Mclose(_) | Op::Zopen(_) | Op::Zclose(_) | Op::Nopen
			| Op::Nclose | Op::Zstart | Op::Zend | Op::Empty | Op::Bol | Op::Bof
			| Op::Lnum(..) | Op::Col(..) | Op::Vcol(..) | Op::Mark(..)
			| Op::Cursor | Op::Visual => idx = state.out,
			Op::Split => {
				let c1 = get_regstart(states, state.out, depth + 1)?;
				let c2 = get_regstart(states, state.out1, depth + 1)?;
				return (c1 == c2).then_some(c1);
			}
			_ => return None,
		}
	}
	None
}

/// When the whole program is `MOPEN0 → literals → MCLOSE0 → MATCH`, the only
/// possible match is that literal string.
fn get_match_text(states: &[NfaState], start: StateIdx) -> Option<String> {
	let state = &states[start as usize];
	if state.op != Op::Mopen(0) {
		return None;
	}
	let mut text = String::new();
	let mut idx = state.out;
	loop {
		let s = &states[idx as usize];
		match &s.op {
			Op::Char(c) => {
				text.push(*c);
				idx = s.out;
			}
			Op::Mclose(0) => {
				let after = &states[s.out as usize];
				return (after.op == Op::Match && !text.is_empty()).then_some(text);
			}
			_ => return None,
		}
	}
}

/// Upper bound on the byte width of the fragment starting at `idx`, up to its
/// `EndInvisible`. `None` when unbounded (loops, backrefs).
fn max_width(states: &[NfaState], start: StateIdx) -> Option<usize> {
	fn walk(states: &[NfaState], idx: StateIdx, visited: &mut Vec<StateIdx>) -> Option<usize> {
		if idx == NONE {
			return Some(0);
		}
		if visited.contains(&idx) {
			// a cycle means unbounded width
			return None;
		}
		visited.push(idx);
		let state = &states[idx as usize];
		let result = match &state.op {
			Op::EndInvisible { .. } | Op::Match => Some(0),
			Op::Char(c) => walk(states, state.out, visited).map(|w| w + c.len_utf8()),
			Op::Newl => walk(states, state.out, visited).map(|w| w + 1),
			Op::Class { .. } | Op::CollClass(_) => {
				walk(states, state.out, visited).map(|w| w + 4)
			}
			Op::StartColl { .. } => {
				// skip to the end of the chain, count the whole thing as one char
				let mut i = state.out;
				while i != NONE && states[i as usize].op != Op::EndColl {
					i = states[i as usize].out;
				}
				if i == NONE {
					None
				} else {
					walk(states, states[i as usize].out, visited).map(|w| w + 4)
				}
			}
			Op::Split => {
				let a = walk(states, state.out, visited)?;
				let b = walk(states, state.out1, visited)?;
				Some(a.max(b))
			}
			Op::Backref(_) | Op::ZBackref(_) | Op::Skip => None,
			// zero-width checks and group markers
			_ => walk(states, state.out, visited),
		};
		visited.pop();
		result
	}
	walk(states, start, &mut Vec::new())
}
