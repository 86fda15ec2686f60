//! Process-group termination.
//!
//! Agents are spawned as leaders of their own process group so that shells,
//! language servers and test runners they start can be killed together.

/// Send SIGKILL to every process in the group led by `pgid`.
///
/// A group that no longer exists is not an error.
#[cfg(unix)]
pub fn kill_process_group(pgid: u32) -> std::io::Result<()> {
    let Ok(pgid) = libc::pid_t::try_from(pgid) else {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("process group id {pgid} out of range"),
        ));
    };
    // SAFETY: killpg has no memory-safety preconditions.
    let rc = unsafe { libc::killpg(pgid, libc::SIGKILL) };
    if rc == 0 {
        return Ok(());
    }
    let err = std::io::Error::last_os_error();
    if err.raw_os_error() == Some(libc::ESRCH) {
        Ok(())
    } else {
        Err(err)
    }
}

#[cfg(not(unix))]
pub fn kill_process_group(_pgid: u32) -> std::io::Result<()> {
    Ok(())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn test_missing_group_is_ok() {
        // Above the kernel pid_max ceiling.
        assert!(kill_process_group(2_000_000_000).is_ok());
    }
}
