use std::cell::RefCell;
use std::rc::Rc;

use pretty_assertions::assert_eq;

use crate::options::CbFlags;
use crate::pos::MotionType;
use crate::registers::{
	valid_yank_reg, ClipboardProvider, NullEvaluator, Registers, YankReg,
};

fn reg_with(rows: &[&str], mt: MotionType) -> YankReg {
	YankReg {
		mt: Some(mt),
		rows: rows.iter().map(|s| s.to_string()).collect(),
		width: 0,
		timestamp: 0,
	}
}

#[test]
fn write_and_read_named() {
	let mut regs = Registers::new();
	regs.write_reg('a', "hello", false, Some(MotionType::Char), 0).unwrap();
	assert_eq!(regs.reg(10).rows, vec!["hello".to_string()]);
}

#[test]
fn uppercase_appends_joining_rows() {
	let mut regs = Registers::new();
	regs.write_reg('a', "foo", false, Some(MotionType::Char), 0).unwrap();
	regs.write_reg('A', "bar", false, Some(MotionType::Char), 0).unwrap();
	assert_eq!(regs.reg(10).rows, vec!["foobar".to_string()]);
}

#[test]
fn append_with_line_break_under_cpo() {
	let mut regs = Registers::new();
	regs.put_yank(Some('a'), reg_with(&["foo"], MotionType::Char), 'y', false).unwrap();
	// the > cpoption: appended text starts on a new row
	regs.put_yank(Some('A'), reg_with(&["bar"], MotionType::Char), 'y', true).unwrap();
	assert_eq!(regs.reg(10).rows, vec!["foo".to_string(), "bar".to_string()]);
}

#[test]
fn appending_linewise_converts_type() {
	let mut regs = Registers::new();
	regs.put_yank(Some('a'), reg_with(&["foo"], MotionType::Char), 'y', false).unwrap();
	regs.put_yank(Some('A'), reg_with(&["bar"], MotionType::Line), 'y', false).unwrap();
	assert_eq!(regs.reg(10).mt, Some(MotionType::Line));
}

#[test]
fn trailing_newline_means_linewise() {
	let mut regs = Registers::new();
	regs.write_reg('b', "whole line\n", false, None, 0).unwrap();
	assert_eq!(regs.reg(11).mt, Some(MotionType::Line));
	assert_eq!(regs.reg(11).rows, vec!["whole line".to_string()]);

	regs.write_reg('c', "partial", false, None, 0).unwrap();
	assert_eq!(regs.reg(12).mt, Some(MotionType::Char));
}

#[test]
fn unnamed_aliases_last_write() {
	let mut regs = Registers::new();
	regs.write_reg('d', "text", false, Some(MotionType::Char), 0).unwrap();
	let unnamed = regs.get_for_paste(None).unwrap();
	assert_eq!(unnamed.rows, vec!["text".to_string()]);
}

#[test]
fn black_hole_swallows() {
	let mut regs = Registers::new();
	regs.write_reg('e', "keep", false, Some(MotionType::Char), 0).unwrap();
	regs.put_yank(Some('_'), reg_with(&["gone"], MotionType::Char), 'd', false).unwrap();
	// the previous-write pointer is untouched
	assert_eq!(regs.get_for_paste(None).unwrap().rows, vec!["keep".to_string()]);
}

#[test]
fn numbered_shift_drops_the_tenth() {
	let mut regs = Registers::new();
	for i in 0..10 {
		regs.shift_delete_regs(reg_with(&[&format!("d{i}")], MotionType::Line));
	}
	assert_eq!(regs.reg(1).rows, vec!["d9".to_string()]);
	assert_eq!(regs.reg(9).rows, vec!["d1".to_string()]);
	// d0 fell off the end
}

#[test]
fn validity_table() {
	for c in ['a', 'z', 'A', '0', '9', '"', '-', '_', '*', '+'] {
		assert!(valid_yank_reg(c, true), "{c} should be writable");
	}
	for c in ['/', '.', '%', ':', '=', '#'] {
		assert!(valid_yank_reg(c, false), "{c} should be readable");
		assert!(!valid_yank_reg(c, true), "{c} should not be writable");
	}
	assert!(!valid_yank_reg('!', false));
}

#[test]
fn spec_registers() {
	let mut regs = Registers::new();
	regs.last_cmdline = Some("g/foo/d".into());
	regs.last_search = Some("foo".into());
	regs.last_inserted = Some("typed".into());
	let mut eval = NullEvaluator;
	assert_eq!(
		regs.get_spec_reg(':', None, None, &mut eval).unwrap(),
		Some("g/foo/d".into())
	);
	assert_eq!(
		regs.get_spec_reg('/', None, None, &mut eval).unwrap(),
		Some("foo".into())
	);
	assert_eq!(
		regs.get_spec_reg('.', None, None, &mut eval).unwrap(),
		Some("typed".into())
	);
	assert_eq!(
		regs.get_spec_reg('%', Some("file.txt"), None, &mut eval).unwrap(),
		Some("file.txt".into())
	);
	assert_eq!(
		regs.get_spec_reg('_', None, None, &mut eval).unwrap(),
		Some(String::new())
	);
	// no file name is a hard error
	assert!(regs.get_spec_reg('%', None, None, &mut eval).is_err());
}

#[test]
fn recording_toggles() {
	let mut regs = Registers::new();
	assert_eq!(regs.do_record('q').unwrap(), None);
	assert!(regs.is_recording());
	regs.record_keys("dw");
	regs.record_keys("j.");
	let stopped = regs.do_record('q').unwrap();
	assert_eq!(stopped, Some('q'));
	assert!(!regs.is_recording());
	assert_eq!(regs.reg(10 + 16).rows, vec!["dwj.".to_string()]); // q
}

#[test]
fn execreg_colon_joins_continuations() {
	let mut regs = Registers::new();
	regs.put_yank(
		Some('a'),
		reg_with(&["g/foo/d", "\\ello there", "yank"], MotionType::Line),
		'y',
		false,
	)
	.unwrap();
	let cmds = regs.do_execreg('a', true, false).unwrap();
	assert_eq!(cmds, vec![":g/foo/dello there".to_string(), ":yank".to_string()]);
}

#[test]
fn execreg_last_cmdline() {
	let mut regs = Registers::new();
	regs.last_cmdline = Some("2d".into());
	assert_eq!(regs.do_execreg(':', false, false).unwrap(), vec!["2d".to_string()]);
	assert!(regs.do_execreg('.', false, false).is_err());
}

#[test]
fn cmdline_paste_joins_with_cr() {
	let mut regs = Registers::new();
	regs.put_yank(Some('a'), reg_with(&["one", "two"], MotionType::Line), 'y', false)
		.unwrap();
	let pasted = regs.cmdline_paste_reg('a', true, true).unwrap();
	assert_eq!(pasted, "one\rtwo");
}

/// A clipboard that counts every write.
struct CountingClip {
	sets: Rc<RefCell<usize>>,
	content: Rc<RefCell<Vec<String>>>,
}

impl ClipboardProvider for CountingClip {
	fn get(&mut self, _name: char) -> Option<(Vec<String>, MotionType)> {
		Some((self.content.borrow().clone(), MotionType::Char))
	}
	fn set(&mut self, rows: &[String], _mt: MotionType, _name: char) {
		*self.sets.borrow_mut() += 1;
		*self.content.borrow_mut() = rows.to_vec();
	}
}

#[test]
fn clipboard_batch_coalesces_writes() {
	let sets = Rc::new(RefCell::new(0));
	let content = Rc::new(RefCell::new(Vec::new()));
	let mut regs = Registers::new();
	regs.cb_flags = CbFlags::UNNAMED;
	regs.set_clipboard_provider(Box::new(CountingClip {
		sets: Rc::clone(&sets),
		content: Rc::clone(&content),
	}));

	regs.start_batch_changes();
	for i in 0..5 {
		regs.put_yank(None, reg_with(&[&format!("row{i}")], MotionType::Char), 'y', false)
			.unwrap();
	}
	assert_eq!(*sets.borrow(), 0, "writes must be deferred inside a batch");
	regs.end_batch_changes();
	assert_eq!(*sets.borrow(), 1, "one provider-set per batch");
	assert_eq!(*content.borrow(), vec!["row4".to_string()]);
}

#[test]
fn clipboard_registers_go_through_provider() {
	let sets = Rc::new(RefCell::new(0));
	let content = Rc::new(RefCell::new(vec!["external".to_string()]));
	let mut regs = Registers::new();
	regs.set_clipboard_provider(Box::new(CountingClip {
		sets: Rc::clone(&sets),
		content: Rc::clone(&content),
	}));

	// reading * pulls from the provider
	let star = regs.get_for_paste(Some('*')).unwrap();
	assert_eq!(star.rows, vec!["external".to_string()]);

	// writing * pushes to it
	regs.put_yank(Some('*'), reg_with(&["mine"], MotionType::Char), 'y', false).unwrap();
	assert_eq!(*sets.borrow(), 1);
	assert_eq!(*content.borrow(), vec!["mine".to_string()]);
}
