//! Thin `libc` wrappers for the process and socket calls std does not expose.
//!
//! std binds listeners with its own backlog and never forks, so listener
//! setup, `fork`, `dup2` and `waitpid` go through here.

use std::io;
use std::mem;
use std::net::{Ipv4Addr, TcpListener};
use std::os::fd::{AsRawFd, FromRawFd, IntoRawFd, OwnedFd, RawFd};
use std::os::unix::ffi::OsStrExt;
use std::os::unix::net::UnixListener;
use std::path::Path;

/// Pending-connection queue length for every listener.
pub(crate) const LISTEN_BACKLOG: libc::c_int = 5;

fn cvt(ret: libc::c_int) -> io::Result<libc::c_int> {
    if ret < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(ret)
    }
}

/// Create a close-on-exec stream socket.
fn stream_socket(domain: libc::c_int) -> io::Result<OwnedFd> {
    // SAFETY: socket(2) takes plain integers and has no memory preconditions.
    let raw = cvt(unsafe { libc::socket(domain, libc::SOCK_STREAM, 0) })?;
    // SAFETY: `raw` was just returned by socket(2) and nothing else owns it.
    let fd = unsafe { OwnedFd::from_raw_fd(raw) };
    // SAFETY: fcntl on a descriptor we own, with integer arguments only.
    cvt(unsafe { libc::fcntl(fd.as_raw_fd(), libc::F_SETFD, libc::FD_CLOEXEC) })?;
    Ok(fd)
}

/// Bind `fd` to the address at `addr` and start listening.
///
/// # Safety
///
/// `addr` must point to a valid socket address of at least `len` bytes.
unsafe fn bind_and_listen(
    fd: &OwnedFd,
    addr: *const libc::sockaddr,
    len: usize,
) -> io::Result<()> {
    // SAFETY: the caller guarantees `addr`/`len` describe a live address.
    cvt(unsafe { libc::bind(fd.as_raw_fd(), addr, len as libc::socklen_t) })?;
    // SAFETY: listen(2) on a descriptor we own.
    cvt(unsafe { libc::listen(fd.as_raw_fd(), LISTEN_BACKLOG) })?;
    Ok(())
}

/// Listen on `0.0.0.0:port` with `SO_REUSEADDR`.
pub(crate) fn tcp_listener(port: u16) -> io::Result<TcpListener> {
    let fd = stream_socket(libc::AF_INET)?;

    let yes: libc::c_int = 1;
    // SAFETY: the option value pointer and length describe `yes`, which
    // outlives the call.
    cvt(unsafe {
        libc::setsockopt(
            fd.as_raw_fd(),
            libc::SOL_SOCKET,
            libc::SO_REUSEADDR,
            std::ptr::addr_of!(yes).cast(),
            mem::size_of::<libc::c_int>() as libc::socklen_t,
        )
    })?;

    // SAFETY: sockaddr_in is plain old data; all-zero is a valid value.
    let mut addr: libc::sockaddr_in = unsafe { mem::zeroed() };
    addr.sin_family = libc::AF_INET as libc::sa_family_t;
    addr.sin_port = port.to_be();
    addr.sin_addr = libc::in_addr {
        s_addr: u32::from(Ipv4Addr::UNSPECIFIED).to_be(),
    };

    // SAFETY: `addr` is a fully initialised sockaddr_in living on our stack.
    unsafe {
        bind_and_listen(
            &fd,
            std::ptr::addr_of!(addr).cast(),
            mem::size_of::<libc::sockaddr_in>(),
        )?;
    }
    Ok(TcpListener::from(fd))
}

/// Listen on a Unix domain socket at `path`.
///
/// The caller is responsible for removing a stale entry first.
pub(crate) fn unix_listener(path: &Path) -> io::Result<UnixListener> {
    let bytes = path.as_os_str().as_bytes();

    // SAFETY: sockaddr_un is plain old data; all-zero is a valid value.
    let mut addr: libc::sockaddr_un = unsafe { mem::zeroed() };
    if bytes.len() >= addr.sun_path.len() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("socket path exceeds {} bytes", addr.sun_path.len() - 1),
        ));
    }
    addr.sun_family = libc::AF_UNIX as libc::sa_family_t;
    for (dst, src) in addr.sun_path.iter_mut().zip(bytes) {
        *dst = *src as libc::c_char;
    }
    // Family header plus the path and its NUL.
    let path_offset = addr.sun_path.as_ptr() as usize - std::ptr::addr_of!(addr) as usize;
    let len = path_offset + bytes.len() + 1;

    let fd = stream_socket(libc::AF_UNIX)?;
    // SAFETY: `addr` is initialised and `len` is within its size.
    unsafe {
        bind_and_listen(&fd, std::ptr::addr_of!(addr).cast(), len)?;
    }
    Ok(UnixListener::from(fd))
}

/// Outcome of [`fork`] as seen by the calling process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Forked {
    /// Running in the original process; holds the child's pid.
    Parent(libc::pid_t),
    /// Running in the new child process.
    Child,
}

/// Fork the current process.
///
/// # Safety
///
/// Only the calling thread survives in the child. The caller must make sure
/// no other thread can hold a lock the child will need (allocator, stdio,
/// logger) at the moment of the fork.
pub(crate) unsafe fn fork() -> io::Result<Forked> {
    // SAFETY: forwarded to the caller's contract above.
    match unsafe { libc::fork() } {
        -1 => Err(io::Error::last_os_error()),
        0 => Ok(Forked::Child),
        pid => Ok(Forked::Parent(pid)),
    }
}

/// Make `fd` the process's standard input and standard output.
///
/// The original descriptor is closed afterwards unless it already was one of
/// the two standard slots. Standard error is untouched.
pub(crate) fn redirect_stdio(fd: OwnedFd) -> io::Result<()> {
    let raw: RawFd = fd.as_raw_fd();
    for target in [libc::STDIN_FILENO, libc::STDOUT_FILENO] {
        if raw != target {
            // SAFETY: dup2(2) on descriptors we hold; replaces the target slot.
            cvt(unsafe { libc::dup2(raw, target) })?;
        }
    }
    if raw == libc::STDIN_FILENO || raw == libc::STDOUT_FILENO {
        // The descriptor now *is* a standard stream; keep it open.
        let _ = fd.into_raw_fd();
    }
    Ok(())
}

/// Put `SIGCHLD` back to its default disposition.
pub(crate) fn restore_default_sigchld() {
    // SAFETY: installing SIG_DFL has no memory preconditions.
    unsafe {
        libc::signal(libc::SIGCHLD, libc::SIG_DFL);
    }
}

/// Collect every child that has already terminated, without blocking.
///
/// Returns how many were collected. Exit statuses are discarded and errors
/// (`ECHILD` when there are no children) end the pass silently. Performs no
/// allocation or buffered I/O.
pub(crate) fn reap_exited() -> usize {
    let mut reclaimed = 0;
    loop {
        // SAFETY: a null status pointer is allowed; WNOHANG never blocks.
        let pid = unsafe { libc::waitpid(-1, std::ptr::null_mut(), libc::WNOHANG) };
        if pid <= 0 {
            return reclaimed;
        }
        reclaimed += 1;
    }
}
