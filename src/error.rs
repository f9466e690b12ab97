//! Error kinds shared by every subsystem.
//!
//! `TooExpensive` and `Timeout` are separate variants on purpose: regex callers
//! retry with a different strategy on the former and treat the latter as a plain
//! no-match, so they must be able to tell them apart without string matching.
use thiserror::Error;

pub type Result<T> = std::result::Result<T, EditorError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EditorError {
	#[error("E21: Cannot make changes, 'modifiable' is off")]
	NotModifiable,

	#[error("E32: No file name")]
	NoFileName,

	#[error("E486: Pattern not found: {0}")]
	NoMatch(String),

	#[error("E383: Invalid pattern: {0}")]
	RegexCompile(String),

	#[error("pattern uses more memory than 'maxmempattern'")]
	TooExpensive,

	#[error("regex timed out")]
	Timeout,

	#[error("Interrupted")]
	Interrupt,

	#[error("E354: Invalid register name: '{0}'")]
	InvalidRegister(char),

	#[error("E484: Can't open file {0}")]
	SourceOpenFailure(String),

	#[error("E161: Breakpoint not found: {0}")]
	BreakpointNotFound(String),

	#[error("E951: Value too large")]
	ValueTooLarge,

	#[error("E872: Too many capture groups")]
	TooManyGroups,

	#[error("E492: Not an editor command: {0}")]
	NotACommand(String),

	#[error("{0}")]
	Message(String),
}

impl EditorError {
	/// Whether the caller may sensibly retry the operation with a cheaper
	/// strategy (another engine, a shorter deadline).
	pub fn is_retryable(&self) -> bool {
		matches!(self, Self::TooExpensive | Self::Timeout)
	}
}
