//! The operator engine.
//!
//! Every edit command funnels through here as an `OpArg`: a fully computed
//! region (char-, line- or block-wise) plus the operator to apply. Block-wise
//! regions go through `block_prep` per line, which is where TABs split by a
//! block edge turn into `startspaces`/`endspaces` padding.
//!
//! Operators save undo before touching the buffer, keep the `'[`/`']` marks
//! honest, poll for CTRL-C once per line, and hand any produced text to the
//! register table.
use log::info;
use unicode_segmentation::UnicodeSegmentation;
use unicode_width::UnicodeWidthChar;

use crate::buffer::Editor;
use crate::error::{EditorError, Result};
use crate::interrupt::interrupted;
use crate::options::{CpoFlags, FmtOptions, NrFormats};
use crate::pos::{
	char_vcols, indent_width, line_vcol, make_indent, skip_white, vcol2col, BlockDef, MotionType,
	OpArg, OpKind, Pos, MAXCOL,
};
use crate::registers::{YankReg, REGISTERS};

/// Operator lifecycle, as the command dispatcher sees it: an operator is set,
/// waits for its motion, then executes with a now-immutable `OpArg`.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub enum OpPhase {
	#[default]
	Idle,
	Pending(OpKind),
	Executing,
}

#[derive(Debug, Default)]
pub struct OperatorState {
	phase: OpPhase,
}

impl OperatorState {
	pub fn set_op(&mut self, op: OpKind) {
		self.phase = OpPhase::Pending(op);
	}

	pub fn pending(&self) -> Option<OpKind> {
		match self.phase {
			OpPhase::Pending(op) => Some(op),
			_ => None,
		}
	}

	pub fn cancel(&mut self) {
		self.phase = OpPhase::Idle;
	}

	/// The motion finished: freeze the region and run the operator. Redo state
	/// would be captured exactly here.
	pub fn motion_completed(&mut self, ed: &mut Editor, oap: &mut OpArg) -> Result<()> {
		self.phase = OpPhase::Executing;
		let result = execute(ed, oap);
		self.phase = OpPhase::Idle;
		result
	}
}

/// Dispatch one computed operator.
pub fn execute(ed: &mut Editor, oap: &mut OpArg) -> Result<()> {
	match oap.op {
		OpKind::ShiftRight => op_shift(ed, oap, true, 1),
		OpKind::ShiftLeft => op_shift(ed, oap, true, 1),
		OpKind::Delete => op_delete(ed, oap),
		OpKind::Yank => op_yank(ed, oap, true).map(|_| ()),
		OpKind::Replace(c) => op_replace(ed, oap, c),
		OpKind::ToggleCase | OpKind::Upper | OpKind::Lower | OpKind::Rot13 => {
			op_tilde(ed, oap);
			Ok(())
		}
		OpKind::Join => do_join(ed, oap.line_count.max(2), true, true, true, true),
		OpKind::Add | OpKind::Sub => {
			op_addsub(ed, oap, 1, false);
			Ok(())
		}
		_ => Err(EditorError::Message(format!("operator {:?} needs more context", oap.op))),
	}
}

// ---------------------------------------------------------------------------
// block_prep

/// Work out where a block-wise operation intersects line `lnum`.
///
/// The walk is per codepoint: TABs expand to the next tabstop and wide chars
/// count double, so an edge can land inside a character. `is_del` tweaks the
/// padding rules the way delete-like operators need them.
pub fn block_prep(ed: &Editor, oap: &OpArg, lnum: usize, is_del: bool) -> BlockDef {
	let opts = &ed.opts;
	let line = ed.buf.get_line(lnum);
	let mut bd = BlockDef::default();

	let mut incr = 0;
	let mut vcol = 0;
	let mut idx = 0;
	let mut prev_pstart = 0;
	while vcol < oap.start_vcol {
		let Some(ch) = line[idx..].chars().next() else { break };
		incr = char_vcols(opts, ch, vcol);
		vcol += incr;
		if ch == ' ' || ch == '\t' {
			bd.pre_whitesp += incr;
		} else {
			bd.pre_whitesp = 0;
		}
		prev_pstart = idx;
		idx += ch.len_utf8();
	}
	bd.start_vcol = vcol;
	let mut pstart = idx;
	bd.start_char_vcols = incr;

	if bd.start_vcol < oap.start_vcol {
		// line too short
		bd.end_vcol = bd.start_vcol;
		bd.is_short = true;
		if !is_del || oap.op == OpKind::Append {
			bd.endspaces = oap.end_vcol - oap.start_vcol + 1;
		}
	} else {
		// a partly selected char (TAB, wide char) becomes spaces
		bd.startspaces = bd.start_vcol - oap.start_vcol;
		if is_del && bd.startspaces > 0 {
			bd.startspaces = bd.start_char_vcols - bd.startspaces;
		}
		let mut pend = pstart;
		bd.end_vcol = bd.start_vcol;
		if bd.end_vcol > oap.end_vcol {
			// it's all in one character
			bd.is_one_char = true;
			match oap.op {
				OpKind::Insert => {
					bd.endspaces = bd.start_char_vcols.saturating_sub(bd.startspaces);
				}
				OpKind::Append => {
					bd.startspaces += oap.end_vcol - oap.start_vcol + 1;
					bd.endspaces = bd.start_char_vcols.saturating_sub(bd.startspaces);
				}
				_ => {
					bd.startspaces = oap.end_vcol - oap.start_vcol + 1;
					if is_del && oap.op != OpKind::ShiftLeft {
						// the tab is split in two for Visual replace
						bd.startspaces =
							bd.start_char_vcols - (bd.start_vcol - oap.start_vcol);
						bd.endspaces = bd.end_vcol - oap.end_vcol - 1;
					}
				}
			}
		} else {
			let mut vcol2 = bd.end_vcol;
			let mut idx2 = pend;
			let mut prev_pend = pend;
			while vcol2 <= oap.end_vcol {
				let Some(ch) = line[idx2..].chars().next() else { break };
				prev_pend = idx2;
				incr = char_vcols(opts, ch, vcol2);
				vcol2 += incr;
				idx2 += ch.len_utf8();
			}
			bd.end_vcol = vcol2;
			pend = idx2;

			if bd.end_vcol <= oap.end_vcol
				&& (!is_del
					|| oap.op == OpKind::Append
					|| matches!(oap.op, OpKind::Replace(_)))
			{
				// line too short
				bd.is_short = true;
				if oap.op == OpKind::Append {
					bd.endspaces =
						oap.end_vcol - bd.end_vcol + usize::from(oap.inclusive);
				}
			} else if bd.end_vcol > oap.end_vcol {
				bd.endspaces = bd.end_vcol - oap.end_vcol - 1;
				if !is_del && bd.endspaces > 0 {
					bd.endspaces = incr - bd.endspaces;
					if pend != pstart {
						pend = prev_pend;
					}
				}
			}
		}
		bd.end_char_vcols = incr;
		if is_del && bd.startspaces > 0 {
			pstart = prev_pstart;
		}
		bd.textlen = pend - pstart;
	}
	bd.textcol = pstart;
	bd
}

/// For inclusive char-wise operators, advance the end past the trailing bytes
/// of a multibyte character, composing chars included.
pub fn mb_adjust_opend(ed: &Editor, oap: &mut OpArg) {
	if !oap.inclusive {
		return;
	}
	let line = ed.buf.get_line(oap.end.lnum);
	if oap.end.col >= line.len() {
		return;
	}
	// snap to the grapheme covering end.col and include all but its last byte
	for (at, gr) in line.grapheme_indices(true) {
		if at <= oap.end.col && oap.end.col < at + gr.len() {
			oap.end.col = at + gr.len() - 1;
			break;
		}
	}
}

/// When the cursor sits one past end-of-line, step back one codepoint (unless
/// virtual editing allows it to stay).
pub fn adjust_cursor_eol(ed: &mut Editor) {
	use crate::options::VirtualEdit;
	let line_len = ed.cursor_line().len();
	if line_len > 0
		&& ed.win.cursor.col >= line_len
		&& !ed.opts.virtualedit.contains(VirtualEdit::ONEMORE)
	{
		let line = ed.cursor_line().to_string();
		let mut col = line_len;
		while col > 0 && !line.is_char_boundary(col - 1) {
			col -= 1;
		}
		let prev = line[..col].chars().next_back().map_or(0, char::len_utf8);
		ed.win.cursor.col = line_len - prev;
		if ed.opts.virtualedit.contains(VirtualEdit::ALL) {
			let w = line[ed.win.cursor.col..]
				.chars()
				.next()
				.and_then(UnicodeWidthChar::width)
				.unwrap_or(1);
			ed.win.cursor.coladd = w;
		}
	}
}

// ---------------------------------------------------------------------------
// shift

/// `>` and `<`: indent or dedent the covered lines by `amount` shiftwidths.
/// Block-wise only the block columns move.
pub fn op_shift(ed: &mut Editor, oap: &OpArg, curs_top: bool, amount: usize) -> Result<()> {
	let left = oap.op == OpKind::ShiftLeft;
	ed.buf.u_save(ed.win.cursor);

	let block_col = if oap.is_block() { ed.win.cursor.col } else { 0 };

	for lnum in oap.start.lnum..=oap.end.lnum {
		if interrupted() {
			return Err(EditorError::Interrupt);
		}
		let line = ed.buf.get_line(lnum);
		let first_char = line.chars().next();
		if first_char.is_none() {
			continue;
		}
		if oap.is_block() {
			shift_block(ed, oap, lnum, left, amount);
		} else if first_char != Some('#') || !preprocs_left(ed) {
			shift_line(ed, lnum, left, amount);
		}
	}

	if oap.is_block() {
		ed.win.cursor.lnum = oap.start.lnum;
		ed.win.cursor.col = block_col;
	} else if curs_top {
		ed.win.cursor.lnum = oap.start.lnum;
		ed.win.cursor.col = skip_white(ed.buf.get_line(oap.start.lnum));
	} else {
		ed.win.cursor.lnum = oap.end.lnum;
	}

	if oap.line_count > ed.opts.report {
		let op = if left { "<" } else { ">" };
		info!("{} lines {}ed {} time(s)", oap.line_count, op, amount);
	}

	ed.buf.op_start = oap.start;
	ed.buf.op_end = Pos::new(
		oap.end.lnum,
		ed.buf.get_line(oap.end.lnum).len().saturating_sub(1),
	);
	Ok(())
}

/// 'smartindent' keeps `#`-lines at column 0 unless 'cinoptions' says to
/// shift them.
fn preprocs_left(ed: &Editor) -> bool {
	ed.opts.smartindent && !ed.opts.cin_shift_hash
}

fn shift_line(ed: &mut Editor, lnum: usize, left: bool, amount: usize) {
	let sw = ed.opts.shiftwidth.max(1);
	let line = ed.buf.get_line(lnum).to_string();
	let cur = indent_width(&ed.opts, &line);
	let target = if left {
		cur.saturating_sub(sw * amount)
	} else {
		cur + sw * amount
	};
	set_indent(ed, lnum, target);
}

fn set_indent(ed: &mut Editor, lnum: usize, width: usize) {
	let line = ed.buf.get_line(lnum);
	let body = line[skip_white(line)..].to_string();
	let mut new = make_indent(&ed.opts, width);
	new.push_str(&body);
	ed.buf.set_line(lnum, new);
}

/// Shift one line of a block region: only whitespace between the block's left
/// edge and the first following non-blank is re-laid-out.
fn shift_block(ed: &mut Editor, oap: &OpArg, lnum: usize, left: bool, amount: usize) {
	let sw = ed.opts.shiftwidth.max(1);
	let total = amount * sw;
	let mut bd = block_prep(ed, oap, lnum, true);
	if bd.is_short {
		return;
	}
	let opts = ed.opts.clone();
	let line = ed.buf.get_line(lnum).to_string();

	let newline = if !left {
		// everything from the whitespace run preceding the block through the
		// following whitespace collapses into fresh tabs/spaces
		let mut total = total + bd.pre_whitesp;
		let mut ws_vcol = bd.start_vcol - bd.pre_whitesp;
		let mut textstart = bd.textcol;
		if bd.startspaces > 0 {
			let split_len = line[textstart..].chars().next().map_or(1, char::len_utf8);
			if split_len == 1 {
				textstart += 1;
			} else {
				ws_vcol = 0;
				bd.startspaces = 0;
			}
		}
		let mut vcol = bd.start_vcol;
		for ch in line[textstart..].chars() {
			if ch != ' ' && ch != '\t' {
				break;
			}
			let incr = char_vcols(&opts, ch, vcol);
			total += incr;
			vcol += incr;
			textstart += ch.len_utf8();
		}
		let (tabs, spaces) = if opts.expandtab {
			(0, total)
		} else {
			tabstop_fromto(&opts, ws_vcol, ws_vcol + total)
		};
		// when splitting a TAB, the preceding whitespace chars go too
		let col_pre = bd.pre_whitesp_chars(&line);
		let textcol = bd.textcol - col_pre;
		let mut new = String::with_capacity(line.len() + tabs + spaces);
		new.push_str(&line[..textcol]);
		new.extend(std::iter::repeat_n('\t', tabs));
		new.extend(std::iter::repeat_n(' ', spaces));
		new.push_str(&line[textstart..]);
		new
	} else {
		// find the first non-white displayed at or after the block start
		let mut non_white = bd.textcol;
		if bd.startspaces > 0 {
			non_white += line[non_white..].chars().next().map_or(1, char::len_utf8);
		}
		let mut non_white_col = bd.start_vcol;
		for ch in line[non_white..].chars() {
			if ch != ' ' && ch != '\t' {
				break;
			}
			non_white_col += char_vcols(&opts, ch, non_white_col);
			non_white += ch.len_utf8();
		}
		let block_space_width = non_white_col.saturating_sub(oap.start_vcol);
		let shift_amount = block_space_width.min(total);
		let destination_col = non_white_col - shift_amount;

		// keep the beginning of the line verbatim up to the destination
		let mut verbatim_end = bd.textcol;
		let mut verbatim_width = bd.start_vcol;
		if bd.startspaces > 0 {
			verbatim_width -= bd.start_char_vcols;
		}
		let mut it = line[verbatim_end..].char_indices();
		while verbatim_width < destination_col {
			let Some((off, ch)) = it.next() else { break };
			let incr = char_vcols(&opts, ch, verbatim_width);
			if verbatim_width + incr > destination_col {
				verbatim_end = bd.textcol + off;
				break;
			}
			verbatim_width += incr;
			verbatim_end = bd.textcol + off + ch.len_utf8();
		}
		// a half-crossed TAB is replaced by spaces
		let fill = destination_col - verbatim_width.min(destination_col);
		let mut new = String::with_capacity(line.len());
		new.push_str(&line[..verbatim_end]);
		new.extend(std::iter::repeat_n(' ', fill));
		new.push_str(&line[non_white..]);
		new
	};
	ed.buf.set_line(lnum, newline);
}

impl BlockDef {
	/// Number of whitespace chars making up `pre_whitesp` cells.
	fn pre_whitesp_chars(&self, line: &str) -> usize {
		line[..self.textcol]
			.chars()
			.rev()
			.take_while(|c| *c == ' ' || *c == '\t')
			.count()
	}
}

/// Split `total` display cells starting at `start_vcol` into full tabstops
/// plus leftover spaces.
fn tabstop_fromto(opts: &crate::options::Options, start_vcol: usize, end_vcol: usize) -> (usize, usize) {
	let mut vcol = start_vcol;
	let mut tabs = 0;
	loop {
		let w = opts.tab_width_at(vcol);
		if vcol + w > end_vcol {
			break;
		}
		vcol += w;
		tabs += 1;
	}
	(tabs, end_vcol - vcol)
}

// ---------------------------------------------------------------------------
// delete

pub fn op_delete(ed: &mut Editor, oap: &mut OpArg) -> Result<()> {
	if oap.empty && !oap.is_visual {
		// nothing to delete, but op_change still wants the undo bracket
		ed.buf.u_save(ed.win.cursor);
		return Ok(());
	}
	if !ed.buf.modifiable {
		return Err(EditorError::NotModifiable);
	}

	mb_adjust_opend(ed, oap);

	// Vi quirk: a multi-line char-wise delete leaving a blank line becomes
	// line-wise (not for the change command or Visual mode)
	if oap.motion_type == MotionType::Char
		&& !oap.is_visual
		&& oap.line_count > 1
		&& oap.op == OpKind::Delete
	{
		let end_line = ed.buf.get_line(oap.end.lnum);
		let tail_start = (oap.end.col + usize::from(oap.inclusive)).min(end_line.len());
		let tail = end_line[tail_start..].trim_start_matches([' ', '\t']);
		let lead_ws = skip_white(ed.buf.get_line(oap.start.lnum)) >= oap.start.col;
		if tail.is_empty() && lead_ws {
			oap.motion_type = MotionType::Line;
		}
	}

	// deleting in an empty line is a no-op (an error under cpo-E)
	if oap.motion_type != MotionType::Line
		&& oap.line_count == 1
		&& oap.op == OpKind::Delete
		&& ed.buf.get_line(oap.start.lnum).is_empty()
	{
		if ed.opts.cpoptions.contains(CpoFlags::EMPTY_REGION_ERROR) {
			info!("beep: empty region");
		}
		return Ok(());
	}

	// yank whatever we're about to delete
	if oap.regname != Some('_') {
		let reg = yank_region(ed, oap)?;
		let shift = oap.motion_type == MotionType::Line
			|| oap.line_count > 1
			|| oap.use_reg_one;
		let small = oap.regname.is_none()
			&& oap.motion_type != MotionType::Line
			&& oap.line_count == 1;
		let append_break = ed.opts.cpoptions.contains(CpoFlags::REG_APPEND_NL);
		REGISTERS
			.with_borrow_mut(|r| r.deposit_delete(oap.regname, reg, shift, small, append_break))?;
	}

	match oap.motion_type {
		MotionType::Block => {
			ed.buf.u_save(ed.win.cursor);
			for lnum in oap.start.lnum..=oap.end.lnum {
				if interrupted() {
					return Err(EditorError::Interrupt);
				}
				let bd = block_prep(ed, oap, lnum, true);
				if bd.textlen == 0 {
					continue;
				}
				if lnum == ed.win.cursor.lnum {
					ed.win.cursor.col = bd.textcol + bd.startspaces;
					ed.win.cursor.coladd = 0;
				}
				let old = ed.buf.get_line(lnum);
				let mut new =
					String::with_capacity(old.len() - bd.textlen + bd.startspaces + bd.endspaces);
				new.push_str(&old[..bd.textcol]);
				new.extend(std::iter::repeat_n(' ', bd.startspaces + bd.endspaces));
				new.push_str(&old[bd.textcol + bd.textlen..]);
				ed.buf.set_line(lnum, new);
			}
			ed.check_cursor();
		}
		MotionType::Line => {
			ed.buf.u_save(ed.win.cursor);
			if oap.op == OpKind::Change {
				// keep the first line, empty it (preserving indent under 'autoindent')
				if oap.line_count > 1 {
					ed.buf.delete_lines(oap.start.lnum + 1, oap.line_count - 1);
				}
				ed.win.cursor.lnum = oap.start.lnum;
				let line = ed.buf.get_line(oap.start.lnum).to_string();
				let keep = if ed.opts.autoindent { skip_white(&line) } else { 0 };
				ed.buf.set_line(oap.start.lnum, line[..keep].to_string());
				ed.win.cursor.col = keep;
			} else {
				ed.buf.delete_lines(oap.start.lnum, oap.line_count);
				ed.win.cursor.lnum = oap.start.lnum.min(ed.buf.line_count());
				ed.win.cursor.col = skip_white(ed.buf.get_line(ed.win.cursor.lnum));
			}
		}
		MotionType::Char => {
			ed.buf.u_save(ed.win.cursor);
			if oap.line_count == 1 {
				let line = ed.buf.get_line(oap.start.lnum).to_string();
				let from = oap.start.col.min(line.len());
				let to = (oap.end.col + usize::from(oap.inclusive)).min(line.len());
				let mut new = line[..from].to_string();
				new.push_str(&line[to.max(from)..]);
				ed.buf.set_line(oap.start.lnum, new);
				ed.win.cursor = Pos::new(oap.start.lnum, from);
			} else {
				// truncate first line, drop the middle, trim and join the last
				let first = ed.buf.get_line(oap.start.lnum);
				let mut new = first[..oap.start.col.min(first.len())].to_string();
				let last = ed.buf.get_line(oap.end.lnum);
				let keep_from = (oap.end.col + usize::from(oap.inclusive)).min(last.len());
				new.push_str(&last[keep_from..]);
				ed.buf.set_line(oap.start.lnum, new);
				ed.buf.delete_lines(oap.start.lnum + 1, oap.line_count - 1);
				ed.win.cursor = Pos::new(oap.start.lnum, oap.start.col);
			}
			ed.check_cursor();
		}
	}

	ed.buf.op_start = oap.start;
	ed.buf.op_end = if oap.is_block() {
		Pos::new(oap.end.lnum, oap.start.col)
	} else {
		oap.start
	};
	if oap.motion_type == MotionType::Line && oap.line_count > ed.opts.report {
		info!("{} fewer lines", oap.line_count);
	}
	Ok(())
}

// ---------------------------------------------------------------------------
// yank

/// Extract the region's text without touching the buffer.
fn yank_region(ed: &Editor, oap: &OpArg) -> Result<YankReg> {
	let mut rows = Vec::with_capacity(oap.line_count);
	let mut mt = oap.motion_type;
	match mt {
		MotionType::Block => {
			for lnum in oap.start.lnum..=oap.end.lnum {
				let bd = block_prep(ed, oap, lnum, false);
				let line = ed.buf.get_line(lnum);
				let mut row = " ".repeat(bd.startspaces);
				row.push_str(&line[bd.textcol..bd.textcol + bd.textlen]);
				row.push_str(&" ".repeat(bd.endspaces));
				if oap.excl_tr_ws {
					row.truncate(row.trim_end_matches(' ').len());
				}
				rows.push(row);
			}
		}
		MotionType::Line => {
			for lnum in oap.start.lnum..=oap.end.lnum {
				rows.push(ed.buf.get_line(lnum).to_string());
			}
		}
		MotionType::Char => {
			if oap.line_count == 1 {
				let line = ed.buf.get_line(oap.start.lnum);
				let from = oap.start.col.min(line.len());
				let to = (oap.end.col + usize::from(oap.inclusive)).min(line.len());
				rows.push(line[from..to.max(from)].to_string());
			} else {
				let first = ed.buf.get_line(oap.start.lnum);
				rows.push(first[oap.start.col.min(first.len())..].to_string());
				for lnum in oap.start.lnum + 1..oap.end.lnum {
					rows.push(ed.buf.get_line(lnum).to_string());
				}
				let last = ed.buf.get_line(oap.end.lnum);
				let to = (oap.end.col + usize::from(oap.inclusive)).min(last.len());
				rows.push(last[..to].to_string());
			}
			// classic Vi quirk: a col0-to-col0 exclusive multi-line yank is
			// really line-wise
			if oap.start.col == 0
				&& oap.end.col == 0
				&& oap.line_count > 1
				&& !oap.inclusive
			{
				rows.pop();
				mt = MotionType::Line;
			}
		}
	}
	let width = if mt == MotionType::Block {
		if oap.end_vcol >= MAXCOL {
			rows.iter().map(String::len).max().unwrap_or(1).saturating_sub(1)
		} else {
			oap.end_vcol - oap.start_vcol
		}
	} else {
		0
	};
	Ok(YankReg { mt: Some(mt), rows, width, timestamp: 0 })
}

/// `y`: copy the region into the selected register. Returns false when the
/// register cannot be written.
pub fn op_yank(ed: &mut Editor, oap: &OpArg, message: bool) -> Result<bool> {
	if let Some(c) = oap.regname
		&& !crate::registers::valid_yank_reg(c, true)
	{
		return Ok(false);
	}
	if oap.regname == Some('_') {
		return Ok(true); // black hole: nothing to do
	}
	let reg = yank_region(ed, oap)?;
	let line_count = reg.rows.len();
	let append_break = ed.opts.cpoptions.contains(CpoFlags::REG_APPEND_NL);
	REGISTERS.with_borrow_mut(|r| r.put_yank(oap.regname, reg, 'y', append_break))?;

	ed.win.cursor = Pos::new(oap.start.lnum, oap.start.col);
	ed.buf.op_start = oap.start;
	ed.buf.op_end = oap.end;
	if message && line_count > ed.opts.report {
		info!("{line_count} lines yanked");
	}
	Ok(true)
}

// ---------------------------------------------------------------------------
// replace

/// `r` over a region: overwrite every covered character with `ch`.
pub fn op_replace(ed: &mut Editor, oap: &mut OpArg, ch: char) -> Result<()> {
	if !ed.buf.modifiable {
		return Err(EditorError::NotModifiable);
	}
	ed.buf.u_save(ed.win.cursor);
	mb_adjust_opend(ed, oap);

	if oap.is_block() {
		for lnum in oap.start.lnum..=oap.end.lnum {
			if interrupted() {
				return Err(EditorError::Interrupt);
			}
			let mut bd = block_prep(ed, oap, lnum, true);
			if bd.is_short && bd.textlen == 0 {
				continue;
			}
			let line = ed.buf.get_line(lnum).to_string();
			if ch == '\r' || ch == '\n' {
				// newline replacement splits the line at the block edges
				let left = line[..bd.textcol].to_string();
				let right = line[(bd.textcol + bd.textlen).min(line.len())..].to_string();
				ed.buf.set_line(lnum, left);
				ed.buf.append_line(lnum, right);
				continue;
			}
			let mut numc = oap.end_vcol - oap.start_vcol + 1;
			if bd.is_short {
				numc = numc.saturating_sub(oap.end_vcol - bd.end_vcol + 1);
			}
			// a double-wide char can only fill an even number of cells
			if UnicodeWidthChar::width(ch).unwrap_or(1) > 1 {
				if numc % 2 == 1 && !bd.is_short {
					bd.endspaces += 1;
				}
				numc /= 2;
			}
			let mut new = String::with_capacity(line.len());
			new.push_str(&line[..bd.textcol]);
			new.extend(std::iter::repeat_n(' ', bd.startspaces));
			new.extend(std::iter::repeat_n(ch, numc));
			new.extend(std::iter::repeat_n(' ', bd.endspaces));
			new.push_str(&line[(bd.textcol + bd.textlen).min(line.len())..]);
			ed.buf.set_line(lnum, new);
		}
	} else {
		for lnum in oap.start.lnum..=oap.end.lnum {
			if interrupted() {
				return Err(EditorError::Interrupt);
			}
			let line = ed.buf.get_line(lnum).to_string();
			let from = if lnum == oap.start.lnum { oap.start.col.min(line.len()) } else { 0 };
			let to = if lnum == oap.end.lnum {
				(oap.end.col + usize::from(oap.inclusive)).min(line.len())
			} else {
				line.len()
			};
			let mut new = line[..from].to_string();
			new.extend(line[from..to.max(from)].chars().map(|_| ch));
			new.push_str(&line[to.max(from)..]);
			ed.buf.set_line(lnum, new);
		}
	}

	ed.win.cursor = Pos::new(oap.start.lnum, oap.start.col);
	ed.buf.op_start = oap.start;
	ed.buf.op_end = oap.end;
	Ok(())
}

// ---------------------------------------------------------------------------
// case operators

fn apply_case(op: OpKind, text: &str) -> String {
	match op {
		OpKind::Upper => text.to_uppercase(),
		OpKind::Lower => text.to_lowercase(),
		OpKind::Rot13 => text
			.chars()
			.map(|c| match c {
				'a'..='z' => (b'a' + (c as u8 - b'a' + 13) % 26) as char,
				'A'..='Z' => (b'A' + (c as u8 - b'A' + 13) % 26) as char,
				_ => c,
			})
			.collect(),
		_ => text
			.chars()
			.flat_map(|c| {
				if c.is_lowercase() {
					c.to_uppercase().collect::<Vec<_>>()
				} else if c.is_uppercase() {
					c.to_lowercase().collect::<Vec<_>>()
				} else {
					vec![c]
				}
			})
			.collect(),
	}
}

/// `g~`, `gu`, `gU`, `g?`: flip or force the case of everything in the region.
pub fn op_tilde(ed: &mut Editor, oap: &mut OpArg) {
	if !ed.buf.modifiable {
		return;
	}
	ed.buf.u_save(ed.win.cursor);
	mb_adjust_opend(ed, oap);
	let mut changed = false;

	for lnum in oap.start.lnum..=oap.end.lnum {
		if interrupted() {
			break;
		}
		let line = ed.buf.get_line(lnum).to_string();
		let (from, to) = if oap.is_block() {
			let bd = block_prep(ed, oap, lnum, false);
			(bd.textcol, bd.textcol + bd.textlen)
		} else {
			let from = if lnum == oap.start.lnum && oap.motion_type == MotionType::Char {
				oap.start.col.min(line.len())
			} else {
				0
			};
			let to = if lnum == oap.end.lnum && oap.motion_type == MotionType::Char {
				(oap.end.col + usize::from(oap.inclusive)).min(line.len())
			} else {
				line.len()
			};
			(from, to.max(from))
		};
		let replaced = apply_case(oap.op, &line[from..to]);
		if replaced != line[from..to] {
			changed = true;
			let mut new = line[..from].to_string();
			new.push_str(&replaced);
			new.push_str(&line[to..]);
			ed.buf.set_line(lnum, new);
		}
	}

	if changed {
		ed.win.cursor = Pos::new(oap.start.lnum, oap.start.col);
		ed.buf.op_start = oap.start;
		ed.buf.op_end = oap.end;
		if oap.line_count > ed.opts.report {
			info!("{} lines changed", oap.line_count);
		}
	}
}

// ---------------------------------------------------------------------------
// insert / change (block-wise)

/// Block-wise `I`/`A`: the text typed on the first line is replicated at the
/// block edge on every other covered line. Short lines are skipped on insert
/// and padded on append.
pub fn op_insert(ed: &mut Editor, oap: &OpArg, count1: usize, text: &str) -> Result<()> {
	if !ed.buf.modifiable {
		return Err(EditorError::NotModifiable);
	}
	ed.buf.u_save(ed.win.cursor);
	let ins: String = text.repeat(count1.max(1));
	let append = oap.op == OpKind::Append;

	for lnum in oap.start.lnum..=oap.end.lnum {
		if interrupted() {
			return Err(EditorError::Interrupt);
		}
		let line = ed.buf.get_line(lnum).to_string();
		let width = line_vcol(&ed.opts, &line, line.len());
		// appending after a to-end-of-line block means each line's own end
		let edge_vcol = if append {
			if oap.end_vcol >= MAXCOL { width } else { oap.end_vcol + 1 }
		} else {
			oap.start_vcol
		};
		if width < edge_vcol {
			if !append && lnum != oap.start.lnum {
				continue; // block-I skips short lines
			}
			let mut new = line.clone();
			new.push_str(&" ".repeat(edge_vcol - width));
			new.push_str(&ins);
			ed.buf.set_line(lnum, new);
			continue;
		}
		let new = splice_at_vcol(&ed.opts, &line, edge_vcol, &ins);
		ed.buf.set_line(lnum, new);
	}
	ed.win.cursor = Pos::new(oap.start.lnum, 0);
	ed.buf.op_start = oap.start;
	ed.buf.op_end = oap.end;
	Ok(())
}

/// Insert `ins` at display column `vcol`, splitting a TAB under the edge into
/// spaces so the rest of the line keeps its position.
fn splice_at_vcol(
	opts: &crate::options::Options,
	line: &str,
	vcol: usize,
	ins: &str,
) -> String {
	let (col, cell_start) = vcol2col(opts, line, vcol);
	let mut new = String::with_capacity(line.len() + ins.len() + 8);
	if cell_start < vcol && col < line.len() {
		// the edge falls inside this char: expand it into spaces
		let ch = line[col..].chars().next().unwrap();
		let w = char_vcols(opts, ch, cell_start);
		new.push_str(&line[..col]);
		new.push_str(&" ".repeat(vcol - cell_start));
		new.push_str(ins);
		new.push_str(&" ".repeat(cell_start + w - vcol));
		new.push_str(&line[col + ch.len_utf8()..]);
	} else {
		new.push_str(&line[..col]);
		new.push_str(ins);
		new.push_str(&line[col..]);
	}
	new
}

/// `c` over a region: delete it, splice in the replacement, and mirror the
/// insert across the block when the region was block-wise.
pub fn op_change(ed: &mut Editor, oap: &mut OpArg, text: &str) -> Result<bool> {
	let start = oap.start;
	let block = oap.is_block();
	let start_vcol = oap.start_vcol;
	op_delete(ed, oap)?;

	if block {
		// insert on the first line, then replicate on the rest
		for lnum in start.lnum..=oap.end.lnum {
			let line = ed.buf.get_line(lnum).to_string();
			let width = line_vcol(&ed.opts, &line, line.len());
			if width < start_vcol && lnum != start.lnum {
				continue;
			}
			let new = splice_at_vcol(&ed.opts, &line, start_vcol.min(width), text);
			ed.buf.set_line(lnum, new);
		}
		ed.win.cursor = Pos::new(start.lnum, 0);
	} else {
		let line = ed.buf.get_line(ed.win.cursor.lnum).to_string();
		let col = ed.win.cursor.col.min(line.len());
		let mut pieces = text.split('\n');
		let first = pieces.next().unwrap_or("");
		let mut new = line[..col].to_string();
		new.push_str(first);
		let rest: Vec<&str> = pieces.collect();
		if rest.is_empty() {
			new.push_str(&line[col..]);
			ed.win.cursor.col = col + first.len();
			ed.buf.set_line(ed.win.cursor.lnum, new);
		} else {
			let tail = line[col..].to_string();
			ed.buf.set_line(ed.win.cursor.lnum, new);
			let mut at = ed.win.cursor.lnum;
			for (i, piece) in rest.iter().enumerate() {
				let mut row = piece.to_string();
				if i == rest.len() - 1 {
					ed.win.cursor = Pos::new(at + 1, row.len());
					row.push_str(&tail);
				}
				ed.buf.append_line(at, row);
				at += 1;
			}
		}
	}
	Ok(true)
}

// ---------------------------------------------------------------------------
// reindent

/// `=`: recompute the indent of every covered line through `indenter`.
/// The first line of a multi-line range is left alone (lisp-style callers
/// expect it as the anchor).
pub fn op_reindent(
	ed: &mut Editor,
	oap: &OpArg,
	indenter: &mut dyn FnMut(&Editor, usize) -> usize,
) -> Result<()> {
	if !ed.buf.modifiable {
		return Err(EditorError::NotModifiable);
	}
	ed.buf.u_save(ed.win.cursor);
	let mut count = 0usize;
	for lnum in oap.start.lnum..=oap.end.lnum {
		if interrupted() {
			return Err(EditorError::Interrupt);
		}
		if lnum == oap.start.lnum && oap.line_count > 1 {
			continue;
		}
		count += 1;
		if count % 50 == 0 {
			info!("indented {count} lines");
		}
		if ed.buf.get_line(lnum).is_empty() {
			continue;
		}
		let target = indenter(ed, lnum);
		set_indent(ed, lnum, target);
	}
	ed.win.cursor.lnum = oap.start.lnum;
	ed.win.cursor.col = skip_white(ed.buf.get_line(oap.start.lnum));
	ed.buf.op_start = oap.start;
	ed.buf.op_end = oap.end;
	if oap.line_count > ed.opts.report {
		info!("{} lines indented", oap.line_count);
	}
	Ok(())
}

// ---------------------------------------------------------------------------
// join

/// Leading comment-leader bytes of `line`, for the `j` format option.
fn skip_comment(line: &str, include_space: bool) -> usize {
	let trimmed = skip_white(line);
	let rest = &line[trimmed..];
	let lead = ["///", "//", "\"", "#", "*", "-"]
		.iter()
		.find(|l| rest.starts_with(**l))
		.map_or(0, |l| l.len());
	if lead == 0 {
		return 0;
	}
	let mut n = trimmed + lead;
	if include_space {
		n += line[n..].len() - line[n..].trim_start_matches([' ', '\t']).len();
	}
	n
}

/// `J`: join `count` lines at the cursor into one, computing every inserted
/// space up front so the result is built in a single buffer.
pub fn do_join(
	ed: &mut Editor,
	count: usize,
	insert_space: bool,
	save_undo: bool,
	use_formatoptions: bool,
	setmark: bool,
) -> Result<()> {
	if !ed.buf.modifiable {
		return Err(EditorError::NotModifiable);
	}
	let count = count.max(2);
	let lnum = ed.win.cursor.lnum;
	if lnum + count - 1 > ed.buf.line_count() {
		return Err(EditorError::Message("E1: can't join past last line".into()));
	}
	if save_undo {
		ed.buf.u_save(ed.win.cursor);
	}
	let remove_comments =
		use_formatoptions && ed.opts.formatoptions.contains(FmtOptions::REMOVE_COMS);
	let mbyte_join = ed.opts.formatoptions.contains(FmtOptions::MBYTE_JOIN);

	// first pass: compute each piece and the spaces inserted before it
	let mut pieces: Vec<String> = Vec::with_capacity(count);
	let mut spaces: Vec<usize> = vec![0; count];
	let mut endcurr1: Option<char> = None;
	let mut endcurr2: Option<char> = None;
	let mut sumsize = 0usize;
	let mut currsize = 0usize;
	let mut prev_was_comment = false;

	for t in 0..count {
		if interrupted() {
			return Err(EditorError::Interrupt);
		}
		let line = ed.buf.get_line(lnum + t).to_string();
		let mut piece: &str = &line;
		if t == 0 && setmark {
			ed.buf.op_start = Pos::new(lnum, line.len());
		}
		if remove_comments {
			let skip = if t > 0 && prev_was_comment {
				skip_comment(&line, true)
			} else {
				let n = skip_comment(&line, false);
				prev_was_comment = n > 0;
				0
			};
			piece = &line[skip..];
		}
		if insert_space && t > 0 {
			piece = piece.trim_start_matches([' ', '\t']);
			let next = piece.chars().next();
			if next.is_some_and(|c| c != ')')
				&& sumsize != 0
				&& endcurr1 != Some('\t')
				&& !(mbyte_join
					&& (next.is_some_and(|c| c as u32 >= 0x100)
						|| endcurr1.is_some_and(|c| c as u32 >= 0x100)))
			{
				// don't add a space if the line already ends in one
				if endcurr1 == Some(' ') {
					endcurr1 = endcurr2;
				} else {
					spaces[t] += 1;
				}
				// 'joinspaces': two spaces after sentence punctuation
				if ed.opts.joinspaces
					&& matches!(endcurr1, Some('.') | Some('?') | Some('!'))
				{
					spaces[t] += 1;
				}
			}
		}
		currsize = piece.len();
		sumsize += currsize + spaces[t];
		endcurr1 = None;
		endcurr2 = None;
		if insert_space && !piece.is_empty() {
			let mut rev = piece.chars().rev();
			endcurr1 = rev.next();
			endcurr2 = rev.next();
		}
		pieces.push(piece.to_string());
	}

	// the column where the last piece begins, for the final cursor position
	let col = sumsize - currsize - spaces[count - 1];

	let mut joined = String::with_capacity(sumsize);
	for (t, piece) in pieces.iter().enumerate() {
		joined.extend(std::iter::repeat_n(' ', spaces[t]));
		joined.push_str(piece);
	}
	ed.buf.set_line(lnum, joined);
	if setmark {
		ed.buf.op_end = Pos::new(lnum, sumsize);
	}
	ed.buf.delete_lines(lnum + 1, count - 1);
	ed.win.cursor.lnum = lnum;
	// cursor lands on the last join boundary; the cpo flag asks for the
	// position a two-line join would have used
	ed.win.cursor.col = if ed.opts.cpoptions.contains(CpoFlags::JOIN_COL) {
		pieces[0].len()
	} else {
		col
	};
	ed.win.cursor.coladd = 0;
	ed.check_cursor();
	Ok(())
}

// ---------------------------------------------------------------------------
// increment / decrement

struct ScannedNr {
	/// 'x', 'X', 'b', 'B' for hex/bin, '0' for octal, 0 for decimal
	pre: u8,
	len: usize,
	n: u64,
	overflow: bool,
}

/// A scaled-down `vim_str2nr`: parse an unsigned number with optional base
/// prefix at the head of `s`.
fn str2nr(s: &str, do_bin: bool, do_oct: bool, do_hex: bool, maxlen: usize) -> ScannedNr {
	let bytes = s.as_bytes();
	let limit = if maxlen > 0 { maxlen.min(bytes.len()) } else { bytes.len() };
	let mut pre = 0u8;
	let mut i = 0;

	if bytes.first() == Some(&b'0') && limit > 2 {
		match bytes.get(1) {
			Some(&c @ (b'x' | b'X')) if do_hex && bytes.get(2).is_some_and(u8::is_ascii_hexdigit) => {
				pre = c;
				i = 2;
			}
			Some(&c @ (b'b' | b'B')) if do_bin && matches!(bytes.get(2), Some(&(b'0' | b'1'))) => {
				pre = c;
				i = 2;
			}
			_ => {}
		}
	}
	if pre == 0 && do_oct && bytes.first() == Some(&b'0') {
		// all leading digits must be octal
		let digits = bytes[..limit].iter().take_while(|b| b.is_ascii_digit());
		if digits.clone().count() > 1 && digits.clone().all(|&b| (b'0'..=b'7').contains(&b)) {
			pre = b'0';
		}
	}

	let radix: u64 = match pre {
		b'x' | b'X' => 16,
		b'b' | b'B' => 2,
		b'0' => 8,
		_ => 10,
	};
	let mut n: u64 = 0;
	let mut overflow = false;
	while i < limit {
		let Some(d) = (bytes[i] as char).to_digit(radix as u32) else { break };
		n = match n.checked_mul(radix).and_then(|v| v.checked_add(d as u64)) {
			Some(v) => v,
			None => {
				overflow = true;
				u64::MAX
			}
		};
		i += 1;
	}
	ScannedNr { pre, len: i, n, overflow }
}

/// CTRL-A / CTRL-X on the number under or after `pos`. `length` limits the
/// scan in Visual mode. Returns whether the line changed.
pub fn do_addsub(
	ed: &mut Editor,
	op: OpKind,
	pos: Pos,
	length: usize,
	prenum1: u64,
	visual: bool,
) -> bool {
	let nf = ed.opts.nrformats;
	let do_hex = nf.contains(NrFormats::HEX);
	let do_oct = nf.contains(NrFormats::OCT);
	let do_bin = nf.contains(NrFormats::BIN);
	let do_alpha = nf.contains(NrFormats::ALPHA);
	let do_unsigned = nf.contains(NrFormats::UNSIGNED);
	let do_blank = nf.contains(NrFormats::BLANK);

	let line = ed.buf.get_line(pos.lnum).to_string();
	let bytes = line.as_bytes();
	let mut col = pos.col;
	if col >= line.len() {
		return false;
	}
	let mut length = length;
	let mut blank_unsigned = false;
	let mut negative = false;
	let mut was_positive = true;

	if !visual {
		// maybe the cursor is inside a hex/bin number: scan backwards
		if do_bin {
			while col > 0 && bytes[col].is_ascii_digit() && bytes[col] <= b'1' {
				col -= 1;
			}
		}
		if do_hex {
			while col > 0 && bytes[col].is_ascii_hexdigit() {
				col -= 1;
			}
		}
		if do_bin
			&& do_hex
			&& !(col > 0
				&& matches!(bytes[col], b'x' | b'X')
				&& bytes[col - 1] == b'0'
				&& bytes.get(col + 1).is_some_and(u8::is_ascii_hexdigit))
		{
			// binary/hex overlap: rescan as decimal
			col = pos.col;
			while col > 0 && bytes[col].is_ascii_digit() {
				col -= 1;
			}
		}
		if (do_hex
			&& col > 0
			&& matches!(bytes[col], b'x' | b'X')
			&& bytes[col - 1] == b'0'
			&& bytes.get(col + 1).is_some_and(u8::is_ascii_hexdigit))
			|| (do_bin
				&& col > 0
				&& matches!(bytes[col], b'b' | b'B')
				&& bytes[col - 1] == b'0'
				&& matches!(bytes.get(col + 1), Some(&(b'0' | b'1'))))
		{
			col -= 1;
		} else {
			// search forward, then back to the start of the number
			col = pos.col;
			while col < bytes.len()
				&& !bytes[col].is_ascii_digit()
				&& !(do_alpha && bytes[col].is_ascii_alphabetic())
			{
				col += 1;
			}
			while col > 0
				&& bytes[col - 1].is_ascii_digit()
				&& !(do_alpha && bytes.get(col).is_some_and(u8::is_ascii_alphabetic))
			{
				col -= 1;
			}
		}
	} else {
		while col < bytes.len()
			&& length > 0
			&& !bytes[col].is_ascii_digit()
			&& !(do_alpha && bytes[col].is_ascii_alphabetic())
		{
			col += 1;
			length -= 1;
		}
		if length == 0 {
			return false;
		}
		if col > pos.col && bytes[col - 1] == b'-' && !do_unsigned {
			if do_blank && col >= 2 && !bytes[col - 2].is_ascii_whitespace() {
				blank_unsigned = true;
			} else {
				negative = true;
				was_positive = false;
			}
		}
	}

	let Some(&firstdigit) = bytes.get(col) else { return false };
	if !firstdigit.is_ascii_digit() && !(do_alpha && firstdigit.is_ascii_alphabetic()) {
		return false;
	}

	ed.buf.u_save(ed.win.cursor);

	if do_alpha && firstdigit.is_ascii_alphabetic() {
		// bump a single letter through the alphabet, clamped at the ends
		let ord = if firstdigit.is_ascii_uppercase() {
			firstdigit - b'A'
		} else {
			firstdigit - b'a'
		};
		let new = if op == OpKind::Sub {
			if (ord as u64) < prenum1 {
				if firstdigit.is_ascii_uppercase() { b'A' } else { b'a' }
			} else {
				firstdigit - prenum1 as u8
			}
		} else if 25 - (ord as u64) < prenum1 {
			if firstdigit.is_ascii_uppercase() { b'Z' } else { b'z' }
		} else {
			firstdigit + prenum1 as u8
		};
		let mut newline = line[..col].to_string();
		newline.push(new as char);
		newline.push_str(&line[col + 1..]);
		ed.buf.set_line(pos.lnum, newline);
		ed.win.cursor = Pos::new(pos.lnum, col);
		ed.buf.op_start = Pos::new(pos.lnum, col);
		ed.buf.op_end = Pos::new(pos.lnum, col);
		return true;
	}

	if col > 0 && bytes[col - 1] == b'-' && !visual && !do_unsigned {
		if do_blank && col >= 2 && !bytes[col - 2].is_ascii_whitespace() {
			blank_unsigned = true;
		} else {
			col -= 1;
			negative = true;
		}
	}

	let maxlen = if visual { length } else { 0 };
	// scan the digits; `scan.len` includes a 0x/0b prefix when present.
	// Outside Visual mode a negative number was entered with `col` on the
	// '-'; in Visual mode the '-' sits just before `col`.
	let digits_start = if negative && !visual { col + 1 } else { col };
	let scanned = str2nr(&line[digits_start..], do_bin, do_oct, do_hex, maxlen);
	let mut n = scanned.n;
	let pre = scanned.pre;
	if scanned.len == 0 {
		return false;
	}
	if negative && !visual && pre != 0 {
		// hex/octal/bin numbers never take a sign
		col += 1;
		negative = false;
	}

	let mut subtract = op == OpKind::Sub;
	if negative {
		subtract = !subtract;
	}
	let oldn = n;
	if !scanned.overflow {
		n = if subtract {
			n.wrapping_sub(prenum1)
		} else {
			n.wrapping_add(prenum1)
		};
	}
	// wraparound flips the sign for decimal numbers
	if pre == 0 {
		if subtract {
			if n > oldn {
				n = n.wrapping_neg();
				negative = !negative;
			}
		} else if n < oldn {
			n = !n;
			negative = !negative;
		}
		if n == 0 {
			negative = false;
		}
	}
	if (do_unsigned || blank_unsigned) && negative {
		// stick at the edges instead of wrapping
		n = if subtract { 0 } else { u64::MAX };
		negative = false;
	}
	if visual && !was_positive && !negative && col > 0 && bytes[col - 1] == b'-' {
		// the '-' needs to go
		col -= 1;
	}

	// what gets deleted: the sign (when still at `col`) plus the scanned text
	let del_start = col;
	let del_len = digits_start.saturating_sub(col) + scanned.len;
	let prefix_len: usize = match pre {
		b'x' | b'X' | b'b' | b'B' => 2,
		_ => 0,
	};
	// digit count of the old number, used to preserve its width
	let number_len = scanned.len - prefix_len;
	let deleted: &str = &line[digits_start..(digits_start + scanned.len).min(line.len())];
	let hexupper = deleted
		.chars()
		.skip(prefix_len)
		.find(char::is_ascii_alphabetic)
		.is_some_and(|c| c.is_ascii_uppercase());

	let mut repl = String::new();
	if negative && (!visual || was_positive) {
		repl.push('-');
	}
	if prefix_len == 2 {
		repl.push('0');
		repl.push(pre as char);
	}
	let digits = match pre {
		b'b' | b'B' => format!("{n:b}"),
		b'0' => format!("{n:o}"),
		b'x' | b'X' => {
			if hexupper {
				format!("{n:X}")
			} else {
				format!("{n:x}")
			}
		}
		_ => format!("{n}"),
	};
	// preserve leading zeros so the number keeps its width
	if firstdigit == b'0' && !(do_oct && pre == 0) && number_len > digits.len() {
		repl.extend(std::iter::repeat_n('0', number_len - digits.len()));
	}
	repl.push_str(&digits);

	let mut newline = line[..del_start].to_string();
	newline.push_str(&repl);
	newline.push_str(&line[(del_start + del_len).min(line.len())..]);
	ed.buf.set_line(pos.lnum, newline);

	let end_col = del_start + repl.len();
	ed.win.cursor = Pos::new(pos.lnum, end_col.saturating_sub(1));
	ed.buf.op_start = Pos::new(pos.lnum, del_start);
	ed.buf.op_end = Pos::new(pos.lnum, end_col.saturating_sub(1));
	true
}

/// The operator form: apply add/sub to every covered line. With `g_cmd`
/// (`g<C-a>`) the addend grows by the count on each changed line, producing an
/// arithmetic progression.
pub fn op_addsub(ed: &mut Editor, oap: &OpArg, prenum1: u64, g_cmd: bool) {
	let mut amount = prenum1;
	let mut change_cnt = 0;

	if !oap.is_visual {
		let pos = ed.win.cursor;
		if do_addsub(ed, oap.op, pos, 0, amount, false) {
			change_cnt = 1;
		}
	} else {
		for lnum in oap.start.lnum..=oap.end.lnum {
			if interrupted() {
				break;
			}
			let line_len = ed.buf.get_line(lnum).len();
			let (col, length) = match oap.motion_type {
				MotionType::Block => {
					let bd = block_prep(ed, oap, lnum, false);
					if bd.is_short {
						continue;
					}
					(bd.textcol, bd.textlen)
				}
				MotionType::Line => (0, line_len),
				MotionType::Char => {
					if lnum == oap.start.lnum {
						let len = if oap.line_count == 1 {
							oap.end.col + usize::from(oap.inclusive) - oap.start.col.min(line_len)
						} else {
							line_len - oap.start.col.min(line_len)
						};
						(oap.start.col, len)
					} else if lnum == oap.end.lnum {
						(0, oap.end.col + usize::from(oap.inclusive))
					} else {
						(0, line_len)
					}
				}
			};
			if do_addsub(ed, oap.op, Pos::new(lnum, col), length.max(1), amount, true) {
				change_cnt += 1;
				if g_cmd {
					amount += prenum1;
				}
			}
		}
	}
	if change_cnt > ed.opts.report {
		info!("{change_cnt} lines changed");
	}
}

// ---------------------------------------------------------------------------
// put

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutDir {
	Before,
	After,
}

/// `p`/`P`: insert register contents at the cursor, `count` times.
pub fn do_put(ed: &mut Editor, regname: Option<char>, dir: PutDir, count: usize) -> Result<()> {
	if !ed.buf.modifiable {
		return Err(EditorError::NotModifiable);
	}
	let reg = REGISTERS
		.with_borrow_mut(|r| r.get_for_put(regname).cloned())
		.unwrap_or_default();
	if reg.is_empty() {
		return Ok(());
	}
	ed.buf.u_save(ed.win.cursor);
	let count = count.max(1);
	let lnum = ed.win.cursor.lnum;

	match reg.mt.unwrap_or(MotionType::Char) {
		MotionType::Line => {
			let after = match dir {
				PutDir::After => lnum,
				PutDir::Before => lnum - 1,
			};
			let mut at = after;
			for _ in 0..count {
				for row in &reg.rows {
					ed.buf.append_line(at, row.clone());
					at += 1;
				}
			}
			ed.buf.op_start = Pos::new(after + 1, 0);
			ed.buf.op_end = Pos::new(at, ed.buf.get_line(at).len().saturating_sub(1));
			ed.win.cursor.lnum = after + 1;
			ed.win.cursor.col = skip_white(ed.buf.get_line(after + 1));
		}
		MotionType::Char => {
			let line = ed.buf.get_line(lnum).to_string();
			let col = match dir {
				PutDir::After if !line.is_empty() => {
					let c = ed.win.cursor.col.min(line.len().saturating_sub(1));
					c + line[c..].chars().next().map_or(0, char::len_utf8)
				}
				_ => ed.win.cursor.col.min(line.len()),
			};
			if reg.rows.len() == 1 {
				let body = reg.rows[0].repeat(count);
				let mut new = line[..col].to_string();
				new.push_str(&body);
				new.push_str(&line[col..]);
				ed.buf.set_line(lnum, new);
				ed.buf.op_start = Pos::new(lnum, col);
				ed.buf.op_end = Pos::new(lnum, (col + body.len()).saturating_sub(1));
				ed.win.cursor = Pos::new(lnum, (col + body.len()).saturating_sub(1));
			} else {
				// multi-row char-wise: split the line around the insert
				let tail = line[col..].to_string();
				let mut first = line[..col].to_string();
				first.push_str(&reg.rows[0]);
				ed.buf.set_line(lnum, first);
				let mut at = lnum;
				for row in &reg.rows[1..] {
					ed.buf.append_line(at, row.clone());
					at += 1;
				}
				let last_len = ed.buf.get_line(at).len();
				let mut last = ed.buf.get_line(at).to_string();
				last.push_str(&tail);
				ed.buf.set_line(at, last);
				ed.buf.op_start = Pos::new(lnum, col);
				ed.buf.op_end = Pos::new(at, last_len.saturating_sub(1));
				ed.win.cursor = Pos::new(at, last_len.saturating_sub(1));
			}
		}
		MotionType::Block => {
			let line = ed.buf.get_line(lnum).to_string();
			let base_vcol = line_vcol(&ed.opts, &line, ed.win.cursor.col)
				+ match dir {
					PutDir::After => line[ed.win.cursor.col.min(line.len())..]
						.chars()
						.next()
						.map(|c| char_vcols(&ed.opts, c, 0))
						.unwrap_or(0),
					PutDir::Before => 0,
				};
			for (i, row) in reg.rows.iter().enumerate() {
				let target = lnum + i;
				while target > ed.buf.line_count() {
					ed.buf.append_line(ed.buf.line_count(), String::new());
				}
				let old = ed.buf.get_line(target).to_string();
				let width = line_vcol(&ed.opts, &old, old.len());
				let mut body = row.repeat(count);
				// pad rows narrower than the block
				let row_cells = row.chars().map(|c| char_vcols(&ed.opts, c, 0)).sum::<usize>();
				if row_cells <= reg.width {
					body.push_str(&" ".repeat(reg.width + 1 - row_cells));
				}
				let new = if width < base_vcol {
					let mut padded = old.clone();
					padded.push_str(&" ".repeat(base_vcol - width));
					padded.push_str(&body);
					padded
				} else {
					splice_at_vcol(&ed.opts, &old, base_vcol, &body)
				};
				ed.buf.set_line(target, new);
			}
			ed.buf.op_start = Pos::new(lnum, ed.win.cursor.col);
			ed.buf.op_end = Pos::new(lnum + reg.rows.len() - 1, ed.win.cursor.col);
		}
	}
	Ok(())
}
