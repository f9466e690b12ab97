use pretty_assertions::assert_eq;

use crate::ops::{self, PutDir};
use crate::pos::{MotionType, OpArg, OpKind, Pos};
use crate::registers::{read_register, REGISTERS};

use super::editor;

#[test]
fn charwise_delete_within_line() {
	let mut ed = editor("hello world");
	let mut oap = OpArg::new(OpKind::Delete, MotionType::Char, Pos::new(1, 0), Pos::new(1, 4));
	ops::op_delete(&mut ed, &mut oap).unwrap();
	assert_eq!(ed.buf.get_line(1), " world");
	assert_eq!(ed.win.cursor, Pos::new(1, 0));
	// single-line char-wise delete lands in the small-delete register
	let reg = read_register(None).unwrap();
	assert_eq!(reg.rows, vec!["hello".to_string()]);
}

#[test]
fn linewise_delete_shifts_numbered_registers() {
	let mut ed = editor("hello\nworld\n!");
	let mut oap = OpArg::new(OpKind::Delete, MotionType::Line, Pos::new(1, 3), Pos::new(2, 0));
	ops::op_delete(&mut ed, &mut oap).unwrap();
	assert_eq!(ed.buf.text(), "!\n");
	assert_eq!(ed.win.cursor, Pos::new(1, 0));
	REGISTERS.with_borrow(|r| {
		assert_eq!(r.reg(1).rows, vec!["hello".to_string(), "world".to_string()]);
		assert_eq!(r.reg(1).mt, Some(MotionType::Line));
	});

	// a second delete shifts the first into register 2
	let mut oap = OpArg::new(OpKind::Delete, MotionType::Line, Pos::new(1, 0), Pos::new(1, 0));
	ops::op_delete(&mut ed, &mut oap).unwrap();
	REGISTERS.with_borrow(|r| {
		assert_eq!(r.reg(1).rows, vec!["!".to_string()]);
		assert_eq!(r.reg(2).rows, vec!["hello".to_string(), "world".to_string()]);
	});
}

#[test]
fn charwise_multiline_delete_joins() {
	let mut ed = editor("hello\nworld");
	// from "llo" through "wor" inclusive
	let mut oap = OpArg::new(OpKind::Delete, MotionType::Char, Pos::new(1, 2), Pos::new(2, 2));
	oap.is_visual = true; // keep it char-wise, no Vi line-wise promotion
	ops::op_delete(&mut ed, &mut oap).unwrap();
	assert_eq!(ed.buf.text(), "held\n");
}

#[test]
fn named_register_delete_skips_small_delete() {
	let mut ed = editor("abc");
	let mut oap = OpArg::new(OpKind::Delete, MotionType::Char, Pos::new(1, 0), Pos::new(1, 1))
		.with_register(Some('z'));
	ops::op_delete(&mut ed, &mut oap).unwrap();
	REGISTERS.with_borrow(|r| {
		assert_eq!(r.reg(10 + 25).rows, vec!["ab".to_string()]); // z
	});
	// the '-' register stays empty when a register was named
	assert!(read_register(Some('-')).unwrap().is_empty());
}

#[test]
fn block_yank_splits_tab_into_spaces() {
	// virtual columns 2..=4 cut through the TAB on the first line
	let mut ed = editor("a\tbc\ndefghi");
	let oap = OpArg::new(OpKind::Yank, MotionType::Block, Pos::new(1, 1), Pos::new(2, 3))
		.with_vcols(1, 3);
	assert!(ops::op_yank(&mut ed, &oap, false).unwrap());
	let reg = read_register(None).unwrap();
	assert_eq!(reg.mt, Some(MotionType::Block));
	assert_eq!(reg.rows, vec!["   ".to_string(), "efg".to_string()]);
	assert_eq!(reg.width, 2);
}

#[test]
fn charwise_yank_promotes_to_linewise() {
	let mut ed = editor("one\ntwo\nthree");
	// col-0 to col-0 exclusive over two lines: the classic Vi quirk
	let oap = OpArg::new(OpKind::Yank, MotionType::Char, Pos::new(1, 0), Pos::new(3, 0))
		.exclusive();
	assert!(ops::op_yank(&mut ed, &oap, false).unwrap());
	let reg = read_register(None).unwrap();
	assert_eq!(reg.mt, Some(MotionType::Line));
	assert_eq!(reg.rows, vec!["one".to_string(), "two".to_string()]);
}

#[test]
fn yank_delete_put_round_trip() {
	let original = "alpha\nbeta\ngamma\n";
	let mut ed = editor(original);
	let oap = OpArg::new(OpKind::Yank, MotionType::Line, Pos::new(2, 0), Pos::new(3, 0));
	assert!(ops::op_yank(&mut ed, &oap, false).unwrap());
	let mut del = OpArg::new(OpKind::Delete, MotionType::Line, Pos::new(2, 0), Pos::new(3, 0))
		.with_register(Some('q'));
	ops::op_delete(&mut ed, &mut del).unwrap();
	assert_eq!(ed.buf.text(), "alpha\n");
	ed.win.cursor = Pos::new(1, 0);
	ops::do_put(&mut ed, Some('q'), PutDir::After, 1).unwrap();
	assert_eq!(ed.buf.text(), original);
}

#[test]
fn charwise_put_round_trip() {
	let mut ed = editor("hello");
	let oap = OpArg::new(OpKind::Yank, MotionType::Char, Pos::new(1, 1), Pos::new(1, 3));
	assert!(ops::op_yank(&mut ed, &oap, false).unwrap());
	let mut del = OpArg::new(OpKind::Delete, MotionType::Char, Pos::new(1, 1), Pos::new(1, 3));
	ops::op_delete(&mut ed, &mut del).unwrap();
	assert_eq!(ed.buf.get_line(1), "ho");
	ops::do_put(&mut ed, None, PutDir::Before, 1).unwrap();
	assert_eq!(ed.buf.get_line(1), "hello");
}

#[test]
fn tilde_is_an_involution() {
	let mut ed = editor("Hello, Wörld!");
	let mut oap =
		OpArg::new(OpKind::ToggleCase, MotionType::Line, Pos::new(1, 0), Pos::new(1, 0));
	ops::op_tilde(&mut ed, &mut oap);
	assert_eq!(ed.buf.get_line(1), "hELLO, wÖRLD!");
	let mut oap =
		OpArg::new(OpKind::ToggleCase, MotionType::Line, Pos::new(1, 0), Pos::new(1, 0));
	ops::op_tilde(&mut ed, &mut oap);
	assert_eq!(ed.buf.get_line(1), "Hello, Wörld!");
}

#[test]
fn upper_lower_rot13() {
	let mut ed = editor("abc");
	let mut oap = OpArg::new(OpKind::Upper, MotionType::Line, Pos::new(1, 0), Pos::new(1, 0));
	ops::op_tilde(&mut ed, &mut oap);
	assert_eq!(ed.buf.get_line(1), "ABC");

	let mut ed = editor("Hello");
	let mut oap = OpArg::new(OpKind::Rot13, MotionType::Line, Pos::new(1, 0), Pos::new(1, 0));
	ops::op_tilde(&mut ed, &mut oap);
	assert_eq!(ed.buf.get_line(1), "Uryyb");
}

#[test]
fn replace_charwise() {
	let mut ed = editor("abcdef");
	let mut oap =
		OpArg::new(OpKind::Replace('x'), MotionType::Char, Pos::new(1, 1), Pos::new(1, 3));
	ops::op_replace(&mut ed, &mut oap, 'x').unwrap();
	assert_eq!(ed.buf.get_line(1), "axxxef");
}

#[test]
fn block_delete_keeps_tab_geometry() {
	// deleting vcols 2..=4 inside the TAB pads with spaces
	let mut ed = editor("a\tz");
	let mut oap = OpArg::new(OpKind::Delete, MotionType::Block, Pos::new(1, 1), Pos::new(1, 1))
		.with_vcols(1, 3);
	ops::op_delete(&mut ed, &mut oap).unwrap();
	// the TAB spanned vcols 1..8; three cells go, four remain as spaces
	assert_eq!(ed.buf.get_line(1), "a    z");
}

#[test]
fn join_spacing_rules() {
	let mut ed = editor("foo\nbar");
	ops::do_join(&mut ed, 2, true, true, false, true).unwrap();
	assert_eq!(ed.buf.get_line(1), "foo bar");
	assert_eq!(ed.win.cursor.col, 3);

	// no space before ')'
	let mut ed = editor("call(\n) done");
	ops::do_join(&mut ed, 2, true, true, false, true).unwrap();
	assert_eq!(ed.buf.get_line(1), "call() done");

	// no space after a trailing TAB
	let mut ed = editor("col\t\nnext");
	ops::do_join(&mut ed, 2, true, true, false, true).unwrap();
	assert_eq!(ed.buf.get_line(1), "col\tnext");

	// a line already ending in a space gets no second one
	let mut ed = editor("lead \ntail");
	ops::do_join(&mut ed, 2, true, true, false, true).unwrap();
	assert_eq!(ed.buf.get_line(1), "lead tail");
}

#[test]
fn join_with_joinspaces() {
	let mut ed = editor("End.\nNext");
	ed.opts.joinspaces = true;
	ops::do_join(&mut ed, 2, true, true, false, true).unwrap();
	assert_eq!(ed.buf.get_line(1), "End.  Next");
}

#[test]
fn join_three_lines_cursor_on_last_boundary() {
	let mut ed = editor("a\nb\nc");
	ops::do_join(&mut ed, 3, true, true, false, true).unwrap();
	assert_eq!(ed.buf.get_line(1), "a b c");
	assert_eq!(ed.win.cursor.col, 3);
}

#[test]
fn addsub_preserves_leading_zeros() {
	let mut ed = editor("007");
	assert!(ops::do_addsub(&mut ed, OpKind::Add, Pos::new(1, 2), 0, 3, false));
	assert_eq!(ed.buf.get_line(1), "010");
}

#[test]
fn addsub_decimal_and_sign() {
	let mut ed = editor("x = -5;");
	assert!(ops::do_addsub(&mut ed, OpKind::Add, Pos::new(1, 5), 0, 3, false));
	assert_eq!(ed.buf.get_line(1), "x = -2;");

	let mut ed = editor("x = -5;");
	assert!(ops::do_addsub(&mut ed, OpKind::Add, Pos::new(1, 5), 0, 7, false));
	assert_eq!(ed.buf.get_line(1), "x = 2;");
}

#[test]
fn addsub_hex_preserves_case() {
	let mut ed = editor("0x0f");
	assert!(ops::do_addsub(&mut ed, OpKind::Add, Pos::new(1, 3), 0, 1, false));
	assert_eq!(ed.buf.get_line(1), "0x10");

	let mut ed = editor("mask 0xFF end");
	assert!(ops::do_addsub(&mut ed, OpKind::Add, Pos::new(1, 6), 0, 1, false));
	assert_eq!(ed.buf.get_line(1), "mask 0x100 end");
}

#[test]
fn addsub_binary() {
	let mut ed = editor("0b101");
	assert!(ops::do_addsub(&mut ed, OpKind::Add, Pos::new(1, 3), 0, 1, false));
	assert_eq!(ed.buf.get_line(1), "0b110");
}

#[test]
fn addsub_finds_number_after_cursor() {
	let mut ed = editor("value: 41 end");
	assert!(ops::do_addsub(&mut ed, OpKind::Add, Pos::new(1, 0), 0, 1, false));
	assert_eq!(ed.buf.get_line(1), "value: 42 end");
}

#[test]
fn addsub_alpha() {
	let mut ed = editor("item a");
	ed.opts.nrformats |= crate::options::NrFormats::ALPHA;
	assert!(ops::do_addsub(&mut ed, OpKind::Add, Pos::new(1, 5), 0, 2, false));
	assert_eq!(ed.buf.get_line(1), "item c");

	// clamped at 'z'
	let mut ed = editor("item y");
	ed.opts.nrformats |= crate::options::NrFormats::ALPHA;
	assert!(ops::do_addsub(&mut ed, OpKind::Add, Pos::new(1, 5), 0, 5, false));
	assert_eq!(ed.buf.get_line(1), "item z");
}

#[test]
fn addsub_progression_with_g_cmd() {
	let mut ed = editor("0\n0\n0");
	let mut oap = OpArg::new(OpKind::Add, MotionType::Line, Pos::new(1, 0), Pos::new(3, 0));
	oap.is_visual = true;
	ops::op_addsub(&mut ed, &oap, 1, true);
	assert_eq!(ed.buf.text(), "1\n2\n3\n");
}

#[test]
fn addsub_wraparound_flips_sign() {
	let mut ed = editor("18446744073709551615");
	assert!(ops::do_addsub(&mut ed, OpKind::Add, Pos::new(1, 0), 0, 1, false));
	assert_eq!(ed.buf.get_line(1), "-18446744073709551615");
}

#[test]
fn addsub_unsigned_saturates() {
	let mut ed = editor("18446744073709551615");
	ed.opts.nrformats |= crate::options::NrFormats::UNSIGNED;
	assert!(ops::do_addsub(&mut ed, OpKind::Add, Pos::new(1, 0), 0, 1, false));
	assert_eq!(ed.buf.get_line(1), "18446744073709551615");
}

#[test]
fn block_insert_replicates_text() {
	let mut ed = editor("abc\nabc\nabc");
	let oap = OpArg::new(OpKind::Insert, MotionType::Block, Pos::new(1, 1), Pos::new(3, 1))
		.with_vcols(1, 1);
	ops::op_insert(&mut ed, &oap, 1, "X").unwrap();
	assert_eq!(ed.buf.text(), "aXbc\naXbc\naXbc\n");
}

#[test]
fn block_append_pads_short_lines() {
	let mut ed = editor("long line\nab\nlonger");
	let mut oap =
		OpArg::new(OpKind::Append, MotionType::Block, Pos::new(1, 3), Pos::new(3, 3))
			.with_vcols(3, 3);
	oap.op = OpKind::Append;
	ops::op_insert(&mut ed, &oap, 1, "!").unwrap();
	assert_eq!(ed.buf.get_line(1), "long! line");
	assert_eq!(ed.buf.get_line(2), "ab  !");
	assert_eq!(ed.buf.get_line(3), "long!er");
}

#[test]
fn change_region_inserts_replacement() {
	let mut ed = editor("hello world");
	ed.win.cursor = Pos::new(1, 0);
	let mut oap =
		OpArg::new(OpKind::Change, MotionType::Char, Pos::new(1, 0), Pos::new(1, 4));
	ops::op_change(&mut ed, &mut oap, "goodbye").unwrap();
	assert_eq!(ed.buf.get_line(1), "goodbye world");
}

#[test]
fn reindent_uses_callback() {
	let mut ed = editor("fn x() {\nbody\n}");
	let oap = OpArg::new(OpKind::Indent, MotionType::Line, Pos::new(1, 0), Pos::new(2, 0));
	ops::op_reindent(&mut ed, &oap, &mut |_, _| 4).unwrap();
	assert_eq!(ed.buf.get_line(1), "fn x() {");
	assert_eq!(ed.buf.get_line(2), "    body");
}

#[test]
fn undo_rolls_back_an_operator() {
	let mut ed = editor("one\ntwo");
	let mut oap = OpArg::new(OpKind::Delete, MotionType::Line, Pos::new(1, 0), Pos::new(2, 0));
	ops::op_delete(&mut ed, &mut oap).unwrap();
	assert_eq!(ed.buf.text(), "\n");
	ed.buf.u_undo().unwrap();
	assert_eq!(ed.buf.text(), "one\ntwo\n");
}

#[test]
fn operator_lifecycle() {
	let mut state = ops::OperatorState::default();
	assert!(state.pending().is_none());
	state.set_op(OpKind::Delete);
	assert_eq!(state.pending(), Some(OpKind::Delete));
	state.cancel();
	assert!(state.pending().is_none());

	let mut ed = editor("a\nb");
	state.set_op(OpKind::Delete);
	let mut oap = OpArg::new(OpKind::Delete, MotionType::Line, Pos::new(1, 0), Pos::new(1, 0));
	state.motion_completed(&mut ed, &mut oap).unwrap();
	assert!(state.pending().is_none());
	assert_eq!(ed.buf.text(), "b\n");
}

#[test]
fn shift_block_moves_only_block_columns() {
	let mut ed = editor("ab  cd");
	ed.opts.shiftwidth = 2;
	ed.opts.expandtab = true;
	let oap =
		OpArg::new(OpKind::ShiftRight, MotionType::Block, Pos::new(1, 2), Pos::new(1, 2))
			.with_vcols(2, 3);
	ops::op_shift(&mut ed, &oap, true, 1).unwrap();
	assert_eq!(ed.buf.get_line(1), "ab    cd");
}

#[test]
fn adjust_cursor_eol_steps_back() {
	let mut ed = editor("héllo");
	ed.win.cursor = Pos::new(1, 6); // one past EOL
	ops::adjust_cursor_eol(&mut ed);
	assert_eq!(ed.win.cursor.col, 5); // on the final 'o'
}

#[test]
fn mb_adjust_opend_includes_full_char() {
	let ed = editor("héllo");
	// 'é' occupies bytes 1..3; pointing at its first byte must include both
	let mut oap = OpArg::new(OpKind::Delete, MotionType::Char, Pos::new(1, 0), Pos::new(1, 1));
	ops::mb_adjust_opend(&ed, &mut oap);
	assert_eq!(oap.end.col, 2);
}
