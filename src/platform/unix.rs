// This file is part of the uutils coreutils package.
//
// For the full copyright and license information, please view the LICENSE
// file that was distributed with this source code.

// spell-checker:ignore (fs) statfs fstatfs fsword tmpfs ramfs devpts securityfs squashfs btrfs
// spell-checker:ignore (fs) hugetlbfs mqueue reiserfs xenfs erofs exfat bcachefs nilfs ubifs zonefs

use std::fs::File;
use std::io::{self, Error};
use std::os::fd::{AsRawFd, FromRawFd, RawFd};

pub type Pid = libc::pid_t;

/// Watches one process via the null signal; permission to signal it is
/// taken as proof of life.
pub struct ProcessChecker {
    pid: Pid,
}

impl ProcessChecker {
    pub fn new(process_id: Pid) -> Self {
        Self { pid: process_id }
    }

    pub fn is_dead(&mut self) -> bool {
        unsafe { libc::kill(self.pid, 0) != 0 && get_errno() != libc::EPERM }
    }
}

pub fn supports_pid_checks(pid: Pid) -> bool {
    unsafe { !(libc::kill(pid, 0) != 0 && get_errno() == libc::ENOSYS) }
}

#[inline]
fn get_errno() -> i32 {
    Error::last_os_error().raw_os_error().unwrap_or(0)
}

/// A private handle on standard input, so closing it never takes fd 0
/// away from the rest of the process.
pub fn dup_stdin() -> io::Result<File> {
    let fd = unsafe { libc::dup(libc::STDIN_FILENO) };
    if fd < 0 {
        Err(Error::last_os_error())
    } else {
        Ok(unsafe { File::from_raw_fd(fd) })
    }
}

pub fn fd_mode(fd: RawFd) -> io::Result<u32> {
    let mut st = unsafe { std::mem::zeroed::<libc::stat>() };
    if unsafe { libc::fstat(fd, &mut st) } != 0 {
        Err(Error::last_os_error())
    } else {
        Ok(st.st_mode as u32)
    }
}

pub fn stdout_is_fifo() -> io::Result<bool> {
    fd_mode(libc::STDOUT_FILENO).map(|mode| mode & libc::S_IFMT as u32 == libc::S_IFIFO as u32)
}

pub fn stdin_is_tty() -> bool {
    unsafe { libc::isatty(libc::STDIN_FILENO) == 1 }
}

/// True when the reader side of standard output has gone away. Polls
/// with no requested events; only error conditions are reported.
pub fn output_reader_gone() -> bool {
    let mut pfd = libc::pollfd {
        fd: libc::STDOUT_FILENO,
        events: 0,
        revents: 0,
    };
    let ret = unsafe { libc::poll(&mut pfd, 1, 0) };
    ret > 0 && pfd.revents & (libc::POLLERR | libc::POLLHUP | libc::POLLNVAL) != 0
}

/// Terminate the way a write to a closed pipe would have.
pub fn die_pipe() -> ! {
    unsafe {
        libc::signal(libc::SIGPIPE, libc::SIG_DFL);
        libc::raise(libc::SIGPIPE);
    }
    std::process::exit(1);
}

/// True unless the filesystem holding `file` is positively known to be
/// local. `fstatfs` failing with ENOSYS (pipes, for one) counts as
/// remote without a diagnostic.
#[cfg(any(target_os = "linux", target_os = "android"))]
pub fn fremote(file: &File, name: &str) -> bool {
    use uucore::display::Quotable;

    let mut buf = unsafe { std::mem::zeroed::<libc::statfs>() };
    if unsafe { libc::fstatfs(file.as_raw_fd(), &mut buf) } != 0 {
        if get_errno() != libc::ENOSYS {
            show_error!(
                "cannot determine location of {}. reverting to polling: {}",
                name.quote(),
                Error::last_os_error()
            );
        }
        true
    } else {
        !is_local_fs_type(buf.f_type as u64)
    }
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
pub fn fremote(_file: &File, _name: &str) -> bool {
    true
}

/// Filesystem magics that identify local filesystems. Unknown types are
/// treated as remote so the engine falls back to polling.
#[cfg(any(target_os = "linux", target_os = "android"))]
fn is_local_fs_type(magic: u64) -> bool {
    matches!(
        magic,
        0xca45_1a4e  // bcachefs
        | 0x6264_6576 // bdevfs
        | 0x4249_4e4d // binfmt_misc
        | 0xcafe_4a11 // bpf
        | 0x9123_683e // btrfs
        | 0x0027_e0eb // cgroup
        | 0x6367_7270 // cgroup2
        | 0x28cd_3d45 // cramfs
        | 0x6462_6720 // debugfs
        | 0x0000_1373 // devfs
        | 0x0000_1cd1 // devpts
        | 0x0000_f15f // ecryptfs
        | 0xde5e_81e4 // efivarfs
        | 0xe0f5_e1e2 // erofs
        | 0x2011_bab0 // exfat
        | 0x0000_ef53 // ext2, ext3, ext4
        | 0xf2f5_2010 // f2fs
        | 0x0095_8458 // hugetlbfs (old)
        | 0x9584_58f6 // hugetlbfs
        | 0x0000_9660 // iso9660
        | 0x3153_464a // jfs
        | 0x0000_137f // minix
        | 0x0000_138f // minix (30 char names)
        | 0x0000_2468 // minix v2
        | 0x0000_2478 // minix v2 (30 char names)
        | 0x0000_4d5a // minix v3
        | 0x1980_0202 // mqueue
        | 0x0000_4d44 // msdos, vfat
        | 0x0000_3434 // nilfs
        | 0x5346_544e // ntfs
        | 0x7366_746e // ntfs3
        | 0x0000_9fa1 // openprom
        | 0x794c_7630 // overlayfs
        | 0x5049_5045 // pipefs
        | 0x0000_9fa0 // proc
        | 0x6165_676c // pstorefs
        | 0x8584_58f6 // ramfs
        | 0x5265_4973 // reiserfs
        | 0x0000_7275 // romfs
        | 0x7363_6673 // securityfs
        | 0xf97c_ff8c // selinuxfs
        | 0x534f_434b // sockfs
        | 0x7371_7368 // squashfs
        | 0x6265_6572 // sysfs
        | 0x0102_1994 // tmpfs, devtmpfs
        | 0x7472_6163 // tracefs
        | 0x2405_1905 // ubifs
        | 0x1501_3346 // udf
        | 0xa501_fcf5 // vxfs
        | 0xabba_1974 // xenfs
        | 0x5846_5342 // xfs
        | 0x2fc1_2fc1 // zfs
        | 0x5a4f_4653 // zonefs
    )
}
