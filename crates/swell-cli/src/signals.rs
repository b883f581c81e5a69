//! Interrupt wiring.
//!
//! The executor and the watchdog sweep loop poll an atomic flag rather
//! than handling signals themselves. On Unix the flag is flipped by a
//! SIGINT/SIGTERM handler installed here; elsewhere the flag exists but
//! only Ctrl-C's default behavior applies.

use std::sync::atomic::AtomicBool;

static INTERRUPTED: AtomicBool = AtomicBool::new(false);

/// The process-wide interrupt flag, with handlers installed on first call.
pub fn interrupt_flag() -> &'static AtomicBool {
    #[cfg(unix)]
    {
        use std::sync::Once;
        static INSTALL: Once = Once::new();
        INSTALL.call_once(|| {
            use nix::sys::signal::{SaFlags, SigAction, SigHandler, SigSet, Signal, sigaction};

            extern "C" fn on_signal(_: i32) {
                INTERRUPTED.store(true, std::sync::atomic::Ordering::Relaxed);
            }

            let action = SigAction::new(
                SigHandler::Handler(on_signal),
                SaFlags::empty(),
                SigSet::empty(),
            );
            // Handler installation is process-global setup done once,
            // before any threads care about these signals.
            unsafe {
                let _ = sigaction(Signal::SIGINT, &action);
                let _ = sigaction(Signal::SIGTERM, &action);
            }
        });
    }
    &INTERRUPTED
}
