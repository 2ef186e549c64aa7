// This file is part of the uutils coreutils package.
//
// For the full copyright and license information, please view the LICENSE
// file that was distributed with this source code.

// spell-checker:ignore (ToDO) Signum fundu kqueue

use std::ffi::OsString;
use std::time::Duration;

use clap::{crate_version, Arg, ArgAction, ArgMatches, Command};
use fundu::{DurationParser, SaturatingInto};
use uucore::display::Quotable;
use uucore::error::{UError, UResult, USimpleError};
use uucore::{format_usage, help_about, help_usage};

use crate::parse::{self, ObsoleteArgs, ParseSizeErr};
use crate::paths::Input;
use crate::platform;

const ABOUT: &str = help_about!("tail.md");
const USAGE: &str = help_usage!("tail.md");

pub const DEFAULT_MAX_UNCHANGED_STATS: u32 = 5;
pub const DEFAULT_SLEEP_SEC: f64 = 1.0;

pub mod options {
    pub static BYTES: &str = "bytes";
    pub static FOLLOW: &str = "follow";
    pub static LINES: &str = "lines";
    pub static MAX_UNCHANGED_STATS: &str = "max-unchanged-stats";
    pub static PID: &str = "pid";
    pub static QUIET: &str = "quiet";
    pub static RETRY: &str = "retry";
    pub static SLEEP_INT: &str = "sleep-interval";
    pub static VERBOSE: &str = "verbose";
    pub static ZERO_TERM: &str = "zero-terminated";
    pub static DISABLE_INOTIFY_TERM: &str = "disable-inotify";
    pub static PRESUME_INPUT_PIPE: &str = "presume-input-pipe";
    pub static FOLLOW_RETRY: &str = "F";
    pub static ARG_FILES: &str = "files";
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FollowMode {
    Descriptor,
    Name,
}

/// The sign-and-magnitude form of NUM: counting from the end, or
/// skipping from the start. The two zeros stay apart because `-n 0`
/// prints nothing while `-n +0` prints everything.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Signum {
    Negative(u64),
    Positive(u64),
    PlusZero,
    MinusZero,
}

impl Signum {
    /// Reduce to `(from_start, count)`, where a from-start count is the
    /// number of units to skip (`+N` starts with unit N).
    pub fn count_and_direction(&self) -> (bool, u64) {
        match self {
            Self::Negative(n) => (false, *n),
            Self::MinusZero => (false, 0),
            Self::Positive(n) => (true, n.saturating_sub(1)),
            Self::PlusZero => (true, 0),
        }
    }

    pub fn is_zero(&self) -> bool {
        matches!(self, Self::MinusZero | Self::Negative(0))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FilterMode {
    Bytes(Signum),
    /// Count of lines, and the byte that delimits them.
    Lines(Signum, u8),
}

impl Default for FilterMode {
    fn default() -> Self {
        Self::Lines(Signum::Negative(10), b'\n')
    }
}

/// The immutable configuration record the engine runs on.
#[derive(Debug)]
pub struct Settings {
    pub follow: Option<FollowMode>,
    pub max_unchanged_stats: u32,
    pub mode: FilterMode,
    pub pids: Vec<platform::Pid>,
    pub retry: bool,
    pub sleep_sec: Duration,
    pub use_polling: bool,
    pub verbose: bool,
    pub presume_input_pipe: bool,
    pub inputs: Vec<Input>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            follow: None,
            max_unchanged_stats: DEFAULT_MAX_UNCHANGED_STATS,
            mode: FilterMode::default(),
            pids: Vec::new(),
            retry: false,
            sleep_sec: Duration::from_secs_f64(DEFAULT_SLEEP_SEC),
            use_polling: false,
            verbose: false,
            presume_input_pipe: false,
            inputs: Vec::new(),
        }
    }
}

fn parse_num(src: &str) -> Result<Signum, ParseSizeErr> {
    let mut size_string = src.trim();
    let mut starting_with = false;

    match size_string.chars().next() {
        Some('+') => {
            starting_with = true;
            size_string = &size_string[1..];
        }
        Some('-') => {
            size_string = &size_string[1..];
        }
        Some(_) => {}
        None => return Err(ParseSizeErr::ParseFailure(src.to_string())),
    }

    let size = parse::parse_size(size_string)?;
    Ok(match (starting_with, size) {
        (true, 0) => Signum::PlusZero,
        (true, n) => Signum::Positive(n),
        (false, 0) => Signum::MinusZero,
        (false, n) => Signum::Negative(n),
    })
}

fn invalid_number(unit: &str, e: ParseSizeErr) -> Box<dyn UError> {
    match e {
        ParseSizeErr::ParseFailure(s) => {
            USimpleError::new(1, format!("invalid number of {unit}: {}", s.quote()))
        }
        ParseSizeErr::SizeTooBig(s) => USimpleError::new(
            1,
            format!(
                "invalid number of {unit}: {}: Value too large for defined data type",
                s.quote()
            ),
        ),
    }
}

impl Settings {
    fn from_matches(matches: &ArgMatches, obsolete: Option<ObsoleteArgs>) -> UResult<Self> {
        let mut settings = Self::default();

        if let Some(args) = obsolete {
            let signum = match (args.plus, args.num) {
                (true, 0) => Signum::PlusZero,
                (true, n) => Signum::Positive(n),
                (false, 0) => Signum::MinusZero,
                (false, n) => Signum::Negative(n),
            };
            settings.mode = if args.lines {
                FilterMode::Lines(signum, b'\n')
            } else {
                FilterMode::Bytes(signum)
            };
            if args.follow {
                settings.follow = Some(FollowMode::Descriptor);
            }
        }

        if matches.get_flag(options::FOLLOW_RETRY) {
            settings.follow = Some(FollowMode::Name);
            settings.retry = true;
        }
        if let Some(mode) = matches.get_one::<String>(options::FOLLOW) {
            settings.follow = Some(if mode == "name" {
                FollowMode::Name
            } else {
                FollowMode::Descriptor
            });
        }
        settings.retry |= matches.get_flag(options::RETRY);

        if let Some(arg) = matches.get_one::<String>(options::BYTES) {
            settings.mode =
                FilterMode::Bytes(parse_num(arg).map_err(|e| invalid_number("bytes", e))?);
        } else if let Some(arg) = matches.get_one::<String>(options::LINES) {
            settings.mode = FilterMode::Lines(
                parse_num(arg).map_err(|e| invalid_number("lines", e))?,
                b'\n',
            );
        }
        if matches.get_flag(options::ZERO_TERM) {
            if let FilterMode::Lines(signum, _) = settings.mode {
                settings.mode = FilterMode::Lines(signum, 0);
            }
        }

        if let Some(source) = matches.get_one::<String>(options::SLEEP_INT) {
            settings.sleep_sec = DurationParser::without_time_units()
                .parse(source)
                .map(|duration| SaturatingInto::<Duration>::saturating_into(duration))
                .map_err(|_| {
                    USimpleError::new(1, format!("invalid number of seconds: {}", source.quote()))
                })?;
        }

        if let Some(arg) = matches.get_one::<String>(options::MAX_UNCHANGED_STATS) {
            settings.max_unchanged_stats = arg.parse().map_err(|_| {
                USimpleError::new(
                    1,
                    format!(
                        "invalid maximum number of unchanged stats between opens: {}",
                        arg.quote()
                    ),
                )
            })?;
        }

        if let Some(pids) = matches.get_many::<String>(options::PID) {
            for pid_str in pids {
                let pid = pid_str.parse::<platform::Pid>().ok().filter(|&p| p >= 0);
                match pid {
                    Some(pid) => settings.pids.push(pid),
                    None => {
                        return Err(USimpleError::new(
                            1,
                            format!("invalid PID: {}", pid_str.quote()),
                        ))
                    }
                }
            }
        }

        settings.use_polling = matches.get_flag(options::DISABLE_INOTIFY_TERM);
        settings.presume_input_pipe = matches.get_flag(options::PRESUME_INPUT_PIPE);

        settings.inputs = match matches.get_many::<OsString>(options::ARG_FILES) {
            Some(files) => files.map(Input::from).collect(),
            None => vec![Input::from(&OsString::from("-"))],
        };

        settings.verbose = if matches.get_flag(options::QUIET) {
            false
        } else if matches.get_flag(options::VERBOSE) {
            true
        } else {
            settings.inputs.len() > 1
        };

        if settings.retry {
            if settings.follow.is_none() {
                show_warning!("--retry ignored; --retry is useful only when following");
                settings.retry = false;
            } else if settings.follow == Some(FollowMode::Descriptor) {
                show_warning!("--retry only effective for the initial open");
            }
        }

        if !settings.pids.is_empty() {
            if settings.follow.is_none() {
                show_warning!("PID ignored; --pid=PID is useful only when following");
            } else if !platform::supports_pid_checks(settings.pids[0]) {
                show_warning!("--pid=PID is not supported on this system");
                settings.pids.clear();
            }
        }

        Ok(settings)
    }
}

pub fn parse_args(args: impl uucore::Args) -> UResult<Settings> {
    let mut args: Vec<OsString> = args.collect();
    let obsolete = parse::parse_obsolete(&args)?;
    if obsolete.is_some() {
        args.remove(1);
    }
    let matches = uu_app().try_get_matches_from(args)?;
    Settings::from_matches(&matches, obsolete)
}

pub fn uu_app() -> Command {
    Command::new(uucore::util_name())
        .version(crate_version!())
        .override_usage(format_usage(USAGE))
        .about(ABOUT)
        .infer_long_args(true)
        .args_override_self(true)
        .arg(
            Arg::new(options::BYTES)
                .short('c')
                .long(options::BYTES)
                .allow_hyphen_values(true)
                .overrides_with(options::LINES)
                .value_name("[+]NUM")
                .help(
                    "output the last NUM bytes; or use -c +NUM to output starting with \
                     byte NUM of each file",
                ),
        )
        .arg(
            Arg::new(options::FOLLOW)
                .short('f')
                .long(options::FOLLOW)
                .default_missing_value("descriptor")
                .num_args(0..=1)
                .require_equals(true)
                .value_parser(["descriptor", "name"])
                .help("output appended data as the file grows"),
        )
        .arg(
            Arg::new(options::LINES)
                .short('n')
                .long(options::LINES)
                .allow_hyphen_values(true)
                .overrides_with(options::BYTES)
                .value_name("[+]NUM")
                .help(
                    "output the last NUM lines, instead of the last 10; or use -n +NUM \
                     to skip NUM-1 lines at the start",
                ),
        )
        .arg(
            Arg::new(options::MAX_UNCHANGED_STATS)
                .long(options::MAX_UNCHANGED_STATS)
                .value_name("N")
                .help(
                    "with --follow=name, reopen a FILE which has not changed size after \
                     N (default 5) iterations to see if it has been unlinked or renamed \
                     (this is the usual case of rotated log files); with inotify, this \
                     option is rarely useful",
                ),
        )
        .arg(
            Arg::new(options::PID)
                .long(options::PID)
                .value_name("PID")
                .action(ArgAction::Append)
                .help(
                    "with -f, terminate after process ID, PID dies; can be repeated to \
                     watch multiple processes",
                ),
        )
        .arg(
            Arg::new(options::QUIET)
                .short('q')
                .long(options::QUIET)
                .visible_alias("silent")
                .action(ArgAction::SetTrue)
                .help("never output headers giving file names"),
        )
        .arg(
            Arg::new(options::RETRY)
                .long(options::RETRY)
                .action(ArgAction::SetTrue)
                .help("keep trying to open a file if it is inaccessible"),
        )
        .arg(
            Arg::new(options::SLEEP_INT)
                .short('s')
                .long(options::SLEEP_INT)
                .value_name("N")
                .help(
                    "with -f, sleep for approximately N seconds (default 1.0) between \
                     iterations; with inotify and --pid=P, check process P at least \
                     once every N seconds",
                ),
        )
        .arg(
            Arg::new(options::VERBOSE)
                .short('v')
                .long(options::VERBOSE)
                .action(ArgAction::SetTrue)
                .help("always output headers giving file names"),
        )
        .arg(
            Arg::new(options::ZERO_TERM)
                .short('z')
                .long(options::ZERO_TERM)
                .action(ArgAction::SetTrue)
                .help("line delimiter is NUL, not newline"),
        )
        .arg(
            Arg::new(options::FOLLOW_RETRY)
                .short('F')
                .action(ArgAction::SetTrue)
                .help("same as --follow=name --retry"),
        )
        .arg(
            Arg::new(options::DISABLE_INOTIFY_TERM)
                .long(options::DISABLE_INOTIFY_TERM)
                .alias("-disable-inotify")
                .hide(true)
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new(options::PRESUME_INPUT_PIPE)
                .long(options::PRESUME_INPUT_PIPE)
                .alias("-presume-input-pipe")
                .hide(true)
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new(options::ARG_FILES)
                .action(ArgAction::Append)
                .value_parser(clap::value_parser!(OsString))
                .value_hint(clap::ValueHint::FilePath),
        )
}
