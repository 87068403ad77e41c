//! Ctrl+C handling
//!
//! SIGINT and SIGTERM only set the process-wide [`CancelToken`]; the session
//! loop notices it at its next iteration, so an in-progress write is never
//! interrupted and the capture file still gets flushed and closed.

use crate::capture::CancelToken;
use anyhow::Result;
use once_cell::sync::Lazy;

static INTERRUPT: Lazy<CancelToken> = Lazy::new(CancelToken::new);

/// Install the signal handlers and return the token they trip
pub fn install() -> Result<CancelToken> {
    // Initialise before any handler can run
    let token = INTERRUPT.clone();

    #[cfg(unix)]
    {
        for signum in [libc::SIGINT, libc::SIGTERM] {
            let handler = handle_signal as extern "C" fn(libc::c_int) as libc::sighandler_t;
            let previous = unsafe { libc::signal(signum, handler) };
            if previous == libc::SIG_ERR {
                anyhow::bail!(
                    "Failed to install signal handler: {}",
                    std::io::Error::last_os_error()
                );
            }
        }
    }

    Ok(token)
}

#[cfg(unix)]
extern "C" fn handle_signal(_: libc::c_int) {
    // Only an atomic store happens here
    INTERRUPT.cancel();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_install_returns_shared_token() {
        let token = install().unwrap();
        token.cancel();
        assert!(INTERRUPT.is_cancelled());
    }
}
