// This file is part of the uutils coreutils package.
//
// For the full copyright and license information, please view the LICENSE
// file that was distributed with this source code.

use std::ffi::OsString;
use std::io::Write;
use std::path::{Path, PathBuf};

use uucore::error::UResult;

use crate::io::xwrite_stdout;

pub const STDIN_NAME: &str = "standard input";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InputKind {
    File(PathBuf),
    Stdin,
}

/// One operand from the command line: a path, or `-` for standard input.
#[derive(Clone, Debug)]
pub struct Input {
    pub kind: InputKind,
    pub display_name: String,
}

impl Input {
    pub fn from(string: &OsString) -> Self {
        if string == "-" {
            Self {
                kind: InputKind::Stdin,
                display_name: STDIN_NAME.to_string(),
            }
        } else {
            Self {
                kind: InputKind::File(PathBuf::from(string)),
                display_name: string.to_string_lossy().to_string(),
            }
        }
    }

    pub fn is_stdin(&self) -> bool {
        self.kind == InputKind::Stdin
    }

    pub fn path(&self) -> Option<&Path> {
        match &self.kind {
            InputKind::File(path) => Some(path),
            InputKind::Stdin => None,
        }
    }
}

/// Prints the `==> name <==` banners, with a blank line between
/// successive banners but none before the first.
pub struct HeaderPrinter {
    verbose: bool,
    first_header: bool,
}

impl HeaderPrinter {
    pub fn new(verbose: bool) -> Self {
        Self {
            verbose,
            first_header: true,
        }
    }

    pub fn print(&mut self, out: &mut impl Write, name: &str) -> UResult<()> {
        if self.verbose {
            let header = format!(
                "{}==> {} <==\n",
                if self.first_header { "" } else { "\n" },
                name,
            );
            self.first_header = false;
            xwrite_stdout(out, header.as_bytes())?;
        }
        Ok(())
    }
}
