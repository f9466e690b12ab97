//! The option bundle the core reads from.
//!
//! The real option machinery (parsing `:set`, buffer-local overrides) lives
//! outside the core; operators and the script reader only ever see this struct.
use bitflags::bitflags;

bitflags! {
	/// The subset of `cpoptions` flags the core honors.
	#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
	pub struct CpoFlags: u32 {
		/// `>`: put a line break before appended register text
		const REG_APPEND_NL = 1<<0;
		/// `C`: do not concatenate `\`-continuation lines when sourcing
		const NO_CONCAT = 1<<1;
		/// `J`: after a join put the cursor on the last join boundary
		const JOIN_COL = 1<<2;
		/// `E`: operating on an empty region is an error
		const EMPTY_REGION_ERROR = 1<<3;
	}
}

bitflags! {
	/// `nrformats` flags for increment/decrement.
	#[derive(Debug, Clone, Copy, PartialEq, Eq)]
	pub struct NrFormats: u32 {
		const BIN = 1<<0;
		const OCT = 1<<1;
		const HEX = 1<<2;
		/// `p`: single letters are bumped through the alphabet
		const ALPHA = 1<<3;
		/// `u`: numbers are unsigned, `-` is never part of them
		const UNSIGNED = 1<<4;
		/// `k`: `-` preceded by a non-blank is not a sign
		const BLANK = 1<<5;
	}
}

bitflags! {
	/// `formatoptions` flags consulted by join.
	#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
	pub struct FmtOptions: u32 {
		/// `j`: remove comment leaders when joining
		const REMOVE_COMS = 1<<0;
		/// `M`: no space between two multibyte chars when joining
		const MBYTE_JOIN = 1<<1;
	}
}

bitflags! {
	/// `virtualedit` flags.
	#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
	pub struct VirtualEdit: u32 {
		const BLOCK = 1<<0;
		const ALL = 1<<1;
		const ONEMORE = 1<<2;
	}
}

bitflags! {
	/// `clipboard` flags: which selections mirror the unnamed register.
	#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
	pub struct CbFlags: u32 {
		const UNNAMED = 1<<0;
		const UNNAMEDPLUS = 1<<1;
	}
}

#[derive(Debug, Clone)]
pub struct Options {
	pub shiftwidth: usize,
	pub tabstop: usize,
	/// Non-empty overrides `tabstop` with explicit stop widths, last one repeating.
	pub vartabstop: Vec<usize>,
	pub expandtab: bool,
	pub autoindent: bool,
	pub smartindent: bool,
	/// `cinoptions` contains `#`: smartindent shifts `#` lines too
	pub cin_shift_hash: bool,
	pub joinspaces: bool,
	pub cpoptions: CpoFlags,
	pub nrformats: NrFormats,
	pub formatoptions: FmtOptions,
	pub virtualedit: VirtualEdit,
	pub clipboard: CbFlags,
	/// Threshold above which operators report "N lines changed"
	pub report: usize,
	/// Kibibytes of state-list memory the regex engine may use
	pub maxmempattern: usize,
	pub ignorecase: bool,
	pub magic: bool,
	/// Ordered directories searched by `:runtime`
	pub runtimepath: Vec<String>,
}

impl Default for Options {
	fn default() -> Self {
		Self {
			shiftwidth: 8,
			tabstop: 8,
			vartabstop: Vec::new(),
			expandtab: false,
			autoindent: false,
			smartindent: false,
			cin_shift_hash: false,
			joinspaces: false,
			cpoptions: CpoFlags::default(),
			nrformats: NrFormats::BIN | NrFormats::HEX,
			formatoptions: FmtOptions::default(),
			virtualedit: VirtualEdit::default(),
			clipboard: CbFlags::default(),
			report: 2,
			maxmempattern: 1000,
			ignorecase: false,
			magic: true,
			runtimepath: Vec::new(),
		}
	}
}

impl Options {
	/// Width of a TAB starting at virtual column `vcol`.
	pub fn tab_width_at(&self, vcol: usize) -> usize {
		if self.vartabstop.is_empty() {
			let ts = self.tabstop.max(1);
			ts - vcol % ts
		} else {
			let mut stop = 0;
			let mut last = 8;
			for &w in &self.vartabstop {
				last = w.max(1);
				stop += last;
				if stop > vcol {
					return stop - vcol;
				}
			}
			// past the explicit stops the last width repeats
			let rel = (vcol - stop) % last;
			last - rel
		}
	}
}
