//! Signal delivery to pipeline processes

use std::io;

/// What happened when a termination signal was sent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    /// Nothing was left to signal; the process already exited and was reaped
    AlreadyGone,
}

/// Sends SIGKILL to the process group led by `pid`
#[cfg(unix)]
pub fn terminate(pid: u32) -> io::Result<Delivery> {
    use nix::errno::Errno;
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    let raw = i32::try_from(pid)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, format!("invalid pid {}", pid)))?;

    match killpg(Pid::from_raw(raw), Signal::SIGKILL) {
        Ok(()) => Ok(Delivery::Delivered),
        Err(Errno::ESRCH) => Ok(Delivery::AlreadyGone),
        Err(errno) => Err(io::Error::from(errno)),
    }
}

#[cfg(not(unix))]
pub fn terminate(_pid: u32) -> io::Result<Delivery> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "killing pipelines is only supported on Unix",
    ))
}
