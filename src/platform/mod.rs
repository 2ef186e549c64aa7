// This file is part of the uutils coreutils package.
//
// For the full copyright and license information, please view the LICENSE
// file that was distributed with this source code.

#[cfg(unix)]
pub use self::unix::{
    die_pipe, dup_stdin, fd_mode, fremote, output_reader_gone, stdin_is_tty, stdout_is_fifo,
    supports_pid_checks, Pid, ProcessChecker,
};

#[cfg(unix)]
mod unix;
