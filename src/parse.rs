// This file is part of the uutils coreutils package.
//
// For the full copyright and license information, please view the LICENSE
// file that was distributed with this source code.

// spell-checker:ignore (ToDO) kmgtpezyrq

use std::error::Error;
use std::ffi::OsString;
use std::fmt;

use uucore::display::Quotable;
use uucore::error::{UResult, USimpleError};

#[derive(Debug, PartialEq, Eq)]
pub enum ParseSizeErr {
    ParseFailure(String),
    SizeTooBig(String),
}

impl Error for ParseSizeErr {}

impl fmt::Display for ParseSizeErr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::ParseFailure(s) => write!(f, "parse failure: '{s}'"),
            Self::SizeTooBig(s) => write!(f, "size too big: '{s}'"),
        }
    }
}

/// Parse a number with the optional tail multiplier suffixes: `b` for
/// 512-byte blocks, upper-case suffixes for powers of 1024, and the same
/// with a trailing `B` for powers of 1000.
pub fn parse_size(mut size_slice: &str) -> Result<u64, ParseSizeErr> {
    let original = size_slice;
    let had_b = size_slice.ends_with('B');
    let mut base = if had_b {
        size_slice = &size_slice[..size_slice.len() - 1];
        1000u64
    } else {
        1024u64
    };

    // KiB, MiB, ... are the 1024 flavors spelled out.
    let had_i = had_b && size_slice.ends_with('i');
    if had_i {
        size_slice = &size_slice[..size_slice.len() - 1];
        base = 1024;
    }

    let exponent: u32 = match size_slice.chars().last() {
        Some('k') | Some('K') => 1,
        Some('M') => 2,
        Some('G') => 3,
        Some('T') => 4,
        Some('P') => 5,
        Some('E') => 6,
        Some('Z') => 7,
        Some('Y') => 8,
        Some('R') => 9,
        Some('Q') => 10,
        Some('b') if !had_b => {
            base = 512;
            1
        }
        _ => 0,
    };
    if exponent > 0 {
        size_slice = &size_slice[..size_slice.len() - 1];
    }

    if had_b && exponent == 0 {
        // "B" needs a unit letter in front of it.
        return Err(ParseSizeErr::ParseFailure(original.to_string()));
    }

    let value: u64 = size_slice
        .parse()
        .map_err(|_| ParseSizeErr::ParseFailure(original.to_string()))?;
    base.checked_pow(exponent)
        .and_then(|multiplier| value.checked_mul(multiplier))
        .ok_or_else(|| ParseSizeErr::SizeTooBig(original.to_string()))
}

/// The leading-argument syntax inherited from old tail: `+NUM[bcl][f]`
/// and the `-NUM[bcl][f]` extension.
#[derive(Debug, PartialEq, Eq)]
pub struct ObsoleteArgs {
    pub num: u64,
    pub plus: bool,
    pub lines: bool,
    pub follow: bool,
}

/// Recognize the obsolete option forms in `args` (a full argv including
/// the program name). Returns `None` when the first argument has to be
/// parsed the normal way instead.
///
/// Only accepted when at most one operand follows, possibly after `--`,
/// mirroring the original arity rules.
pub fn parse_obsolete(args: &[OsString]) -> UResult<Option<ObsoleteArgs>> {
    let Some(arg) = args.get(1) else {
        return Ok(None);
    };
    let Some(arg) = arg.to_str() else {
        return Ok(None);
    };

    let argc = args.len();
    let plain_operand = argc == 3 && {
        let second = args[2].to_string_lossy();
        !(second.starts_with('-') && second.len() > 1)
    };
    let after_dashdash = (3..=4).contains(&argc) && args[2] == "--";
    if !(argc == 2 || plain_operand || after_dashdash) {
        return Ok(None);
    }

    let (plus, rest) = match arg.as_bytes().first() {
        Some(b'+') => (true, &arg[1..]),
        Some(b'-') => (false, &arg[1..]),
        _ => return Ok(None),
    };
    // "-" is standard input and "-c" requires an option-argument; both
    // belong to the standard syntax.
    if !plus && (rest.is_empty() || rest == "c") {
        return Ok(None);
    }

    let digits_end = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    let (digits, mut suffix) = rest.split_at(digits_end);

    let mut multiplier = 1u64;
    let mut lines = true;
    match suffix.as_bytes().first() {
        Some(b'b') => {
            multiplier = 512;
            lines = false;
            suffix = &suffix[1..];
        }
        Some(b'c') => {
            lines = false;
            suffix = &suffix[1..];
        }
        Some(b'l') => {
            suffix = &suffix[1..];
        }
        _ => {}
    }
    let follow = suffix == "f";
    if !follow && !suffix.is_empty() {
        return Ok(None);
    }

    let num = if digits.is_empty() {
        10
    } else {
        digits
            .parse::<u64>()
            .map_err(|_| USimpleError::new(1, format!("invalid number: {}", arg.quote())))?
    };
    let num = num
        .checked_mul(multiplier)
        .ok_or_else(|| USimpleError::new(1, format!("invalid number: {}", arg.quote())))?;

    Ok(Some(ObsoleteArgs {
        num,
        plus,
        lines,
        follow,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obsolete(args: &[&str]) -> UResult<Option<ObsoleteArgs>> {
        let args: Vec<OsString> = std::iter::once("tail")
            .chain(args.iter().copied())
            .map(OsString::from)
            .collect();
        parse_obsolete(&args)
    }

    #[test]
    fn test_parse_size() {
        // No suffix.
        assert_eq!(Ok(1234), parse_size("1234"));

        // kB is 1000
        assert_eq!(Ok(9 * 1000), parse_size("9kB"));

        // K is 1024
        assert_eq!(Ok(2 * 1024), parse_size("2K"));

        let suffixes = [('M', 2u32), ('G', 3u32), ('T', 4u32), ('P', 5u32), ('E', 6u32)];

        for &(c, exp) in &suffixes {
            let s = format!("2{c}B");
            assert_eq!(Ok(2 * (1000u64).pow(exp)), parse_size(&s));

            let s = format!("2{c}");
            assert_eq!(Ok(2 * (1024u64).pow(exp)), parse_size(&s));
        }

        // Binary prefixes.
        assert_eq!(Ok(2 * 1024), parse_size("2KiB"));
        assert_eq!(Ok(2 * 1024 * 1024), parse_size("2MiB"));

        // 512-byte blocks.
        assert_eq!(Ok(2 * 512), parse_size("2b"));

        // Sizes that are too big.
        assert!(parse_size("1Z").is_err());
        assert!(parse_size("1Y").is_err());

        // Bad numbers.
        assert!(parse_size("328hdsf3290").is_err());
        assert!(parse_size("B").is_err());
        assert!(parse_size("").is_err());
    }

    #[test]
    fn test_parse_obsolete_forms() {
        assert_eq!(
            obsolete(&["-5"]).unwrap(),
            Some(ObsoleteArgs {
                num: 5,
                plus: false,
                lines: true,
                follow: false,
            })
        );
        assert_eq!(
            obsolete(&["+10c", "log"]).unwrap(),
            Some(ObsoleteArgs {
                num: 10,
                plus: true,
                lines: false,
                follow: false,
            })
        );
        assert_eq!(
            obsolete(&["-10b"]).unwrap(),
            Some(ObsoleteArgs {
                num: 10 * 512,
                plus: false,
                lines: false,
                follow: false,
            })
        );
        assert_eq!(
            obsolete(&["-5lf", "log"]).unwrap(),
            Some(ObsoleteArgs {
                num: 5,
                plus: false,
                lines: true,
                follow: true,
            })
        );
        // Follow with the default count.
        assert_eq!(
            obsolete(&["-f", "log"]).unwrap(),
            Some(ObsoleteArgs {
                num: 10,
                plus: false,
                lines: true,
                follow: true,
            })
        );
    }

    #[test]
    fn test_parse_obsolete_rejects() {
        // Standard-syntax arguments.
        assert_eq!(obsolete(&["-c"]).unwrap(), None);
        assert_eq!(obsolete(&["-"]).unwrap(), None);
        assert_eq!(obsolete(&["-n", "5"]).unwrap(), None);
        assert_eq!(obsolete(&["log"]).unwrap(), None);
        // Too many operands.
        assert_eq!(obsolete(&["-5", "a", "b"]).unwrap(), None);
        // Trailing garbage.
        assert_eq!(obsolete(&["-5x"]).unwrap(), None);
    }
}
