//! Single-threaded event loop.
//!
//! Events are host callbacks queued on an unbounded channel and dispatched,
//! in order, by a current-thread tokio runtime while `exec` blocks the caller.

use std::ffi::c_void;
use std::ptr;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use bridge_traits::ffi::EventFn;
use tokio::runtime::{Builder, Runtime};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, trace, warn};

/// Exit code reported when `exec` cannot run or times out.
pub const EXEC_FAILED: i32 = -1;

enum Event {
    Call { func: EventFn, ctx: *mut c_void },
    Once { func: EventFn, ctx: *mut c_void },
    Quit(i32),
}

pub struct NativeEventLoop {
    runtime: Runtime,
    tx: UnboundedSender<Event>,
    rx: Mutex<Option<UnboundedReceiver<Event>>>,
}

impl NativeEventLoop {
    fn new() -> std::io::Result<Self> {
        let runtime = Builder::new_current_thread().enable_time().build()?;
        let (tx, rx) = mpsc::unbounded_channel();
        Ok(Self {
            runtime,
            tx,
            rx: Mutex::new(Some(rx)),
        })
    }

    fn post(&self, event: Event) {
        // The receiver lives as long as the loop, so sending cannot fail.
        let _ = self.tx.send(event);
    }

    /// Takes the receiver for the duration of one `exec`. `None` while a
    /// nested `exec` already holds it.
    fn take_receiver(&self) -> Option<UnboundedReceiver<Event>> {
        let rx = self.rx.lock().ok().and_then(|mut slot| slot.take());
        if rx.is_none() {
            warn!("Event loop is already running");
        }
        rx
    }

    fn restore_receiver(&self, rx: UnboundedReceiver<Event>) {
        if let Ok(mut slot) = self.rx.lock() {
            *slot = Some(rx);
        }
    }

    fn run(
        &self,
        mut rx: UnboundedReceiver<Event>,
        timeout: Option<Duration>,
        until_once: bool,
    ) -> i32 {
        let code = self.runtime.block_on(async {
            let dispatch = dispatch(&mut rx, until_once);
            match timeout {
                Some(limit) => tokio::time::timeout(limit, dispatch)
                    .await
                    .unwrap_or_else(|_| {
                        debug!(timeout_ms = limit.as_millis() as u64, "Event loop timed out");
                        EXEC_FAILED
                    }),
                None => dispatch.await,
            }
        });

        self.restore_receiver(rx);
        code
    }

    fn process_pending(&self, max_time: Duration) -> usize {
        let Some(mut rx) = self.take_receiver() else {
            return 0;
        };

        let started = Instant::now();
        let mut processed = 0;
        while started.elapsed() <= max_time {
            match rx.try_recv() {
                Ok(Event::Call { func, ctx }) | Ok(Event::Once { func, ctx }) => {
                    unsafe { func(ctx) };
                    processed += 1;
                }
                Ok(Event::Quit(_)) => {}
                Err(_) => break,
            }
        }

        self.restore_receiver(rx);
        processed
    }
}

/// Dispatches until a quit request, or until the one-shot event has run.
///
/// While a one-shot event is queued, quit requests only record the exit code:
/// the event borrows the stack of the `exec_with` caller.
async fn dispatch(rx: &mut UnboundedReceiver<Event>, until_once: bool) -> i32 {
    let mut exit_code = None;
    while let Some(event) = rx.recv().await {
        match event {
            Event::Call { func, ctx } => {
                trace!("Dispatching posted event");
                unsafe { func(ctx) };
            }
            Event::Once { func, ctx } => {
                trace!("Dispatching one-shot event");
                unsafe { func(ctx) };
                return exit_code.unwrap_or(0);
            }
            Event::Quit(code) => {
                let code = *exit_code.get_or_insert(code);
                if !until_once {
                    return code;
                }
            }
        }
    }
    exit_code.unwrap_or(0)
}

#[no_mangle]
pub extern "C" fn netbridge_eventloop_new() -> *mut NativeEventLoop {
    match NativeEventLoop::new() {
        Ok(event_loop) => Box::into_raw(Box::new(event_loop)),
        Err(err) => {
            warn!(error = %err, "Failed to build event loop runtime");
            ptr::null_mut()
        }
    }
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_eventloop_delete(event_loop: *mut NativeEventLoop) {
    if !event_loop.is_null() {
        drop(Box::from_raw(event_loop));
    }
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_eventloop_post(
    event_loop: *const NativeEventLoop,
    func: EventFn,
    ctx: *mut c_void,
) {
    (*event_loop).post(Event::Call { func, ctx });
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_eventloop_exec(event_loop: *const NativeEventLoop) -> i32 {
    let event_loop = &*event_loop;
    match event_loop.take_receiver() {
        Some(rx) => event_loop.run(rx, None, false),
        None => EXEC_FAILED,
    }
}

/// Like `exec`, but gives up after `msecs` and returns `EXEC_FAILED`.
#[no_mangle]
pub unsafe extern "C" fn netbridge_eventloop_exec_timeout(
    event_loop: *const NativeEventLoop,
    msecs: u64,
) -> i32 {
    let event_loop = &*event_loop;
    match event_loop.take_receiver() {
        Some(rx) => event_loop.run(rx, Some(Duration::from_millis(msecs)), false),
        None => EXEC_FAILED,
    }
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_eventloop_exit(event_loop: *const NativeEventLoop, code: i32) {
    (*event_loop).post(Event::Quit(code));
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_eventloop_quit(event_loop: *const NativeEventLoop) {
    (*event_loop).post(Event::Quit(0));
}

/// Dispatches already-queued events for at most `msecs`; returns how many ran.
#[no_mangle]
pub unsafe extern "C" fn netbridge_eventloop_process_events(
    event_loop: *const NativeEventLoop,
    msecs: u64,
) -> usize {
    (*event_loop).process_pending(Duration::from_millis(msecs))
}

/// Runs the loop until `func(ctx)` has been dispatched, then quits.
///
/// `ctx` may point into the caller's stack: this call either returns
/// `EXEC_FAILED` without queueing anything, or returns after `func` ran.
#[no_mangle]
pub unsafe extern "C" fn netbridge_eventloop_exec_with(
    event_loop: *const NativeEventLoop,
    func: EventFn,
    ctx: *mut c_void,
) -> i32 {
    let event_loop = &*event_loop;
    let Some(rx) = event_loop.take_receiver() else {
        return EXEC_FAILED;
    };
    event_loop.post(Event::Once { func, ctx });
    event_loop.run(rx, None, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    unsafe extern "C" fn bump(ctx: *mut c_void) {
        *(ctx as *mut u32) += 1;
    }

    #[test]
    fn test_exec_runs_posted_events_until_quit() {
        let mut hits = 0u32;
        unsafe {
            let event_loop = netbridge_eventloop_new();
            let ctx = (&mut hits as *mut u32).cast();
            netbridge_eventloop_post(event_loop, bump, ctx);
            netbridge_eventloop_post(event_loop, bump, ctx);
            netbridge_eventloop_exit(event_loop, 3);

            assert_eq!(netbridge_eventloop_exec(event_loop), 3);
            netbridge_eventloop_delete(event_loop);
        }
        assert_eq!(hits, 2);
    }

    #[test]
    fn test_exec_with_outlives_early_quit() {
        let mut hits = 0u32;
        unsafe {
            let event_loop = netbridge_eventloop_new();
            netbridge_eventloop_quit(event_loop);
            let code =
                netbridge_eventloop_exec_with(event_loop, bump, (&mut hits as *mut u32).cast());
            netbridge_eventloop_delete(event_loop);
            assert_eq!(code, 0);
        }
        assert_eq!(hits, 1);
    }

    #[test]
    fn test_exec_timeout_without_quit() {
        unsafe {
            let event_loop = netbridge_eventloop_new();
            assert_eq!(netbridge_eventloop_exec_timeout(event_loop, 20), EXEC_FAILED);
            netbridge_eventloop_delete(event_loop);
        }
    }
}
