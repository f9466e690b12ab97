//! The CTRL-C flag.
//!
//! Set from a signal handler or the input loop; polled cooperatively by the
//! operators, the regex executor, and the script reader. Thread local like the
//! rest of the global editor state.
use std::cell::Cell;

thread_local! {
	static GOT_INT: Cell<bool> = const { Cell::new(false) };
}

pub fn set_interrupt() {
	GOT_INT.with(|g| g.set(true));
}

pub fn clear_interrupt() {
	GOT_INT.with(|g| g.set(false));
}

pub fn interrupted() -> bool {
	GOT_INT.with(|g| g.get())
}
