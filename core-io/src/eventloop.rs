//! Blocking, single-threaded event loop.
//!
//! Closures are queued with [`EventLoop::post`] and run in order while
//! [`EventLoop::exec`] blocks. [`EventLoop::exec_with`] is the scoped variant:
//! it runs one borrowed closure and returns once it has been dispatched.

use std::ffi::c_void;
use std::time::Duration;

use bridge_traits::ffi::EventFn;
use bridge_traits::BridgeError;
use tracing::debug;

use crate::util::owned_object;

/// Exit code of a loop that could not run or timed out.
pub const EXEC_FAILED: i32 = -1;

owned_object! {
    /// Owner of one native event loop.
    ///
    /// Closures still queued when the loop is dropped are leaked, never run.
    pub struct EventLoop(RawEventLoop) {
        delete: netbridge_eventloop_delete,
    }
}

extern "C" {
    fn netbridge_eventloop_new() -> *mut RawEventLoop;
    fn netbridge_eventloop_post(event_loop: *const RawEventLoop, func: EventFn, ctx: *mut c_void);
    fn netbridge_eventloop_exec(event_loop: *const RawEventLoop) -> i32;
    fn netbridge_eventloop_exec_timeout(event_loop: *const RawEventLoop, msecs: u64) -> i32;
    fn netbridge_eventloop_exit(event_loop: *const RawEventLoop, code: i32);
    fn netbridge_eventloop_quit(event_loop: *const RawEventLoop);
    fn netbridge_eventloop_process_events(event_loop: *const RawEventLoop, msecs: u64) -> usize;
    fn netbridge_eventloop_exec_with(event_loop: *const RawEventLoop, func: EventFn, ctx: *mut c_void) -> i32;
}

unsafe extern "C" fn call_boxed<F: FnOnce()>(ctx: *mut c_void) {
    let func = Box::from_raw(ctx.cast::<F>());
    func();
}

unsafe extern "C" fn call_borrowed<F: FnOnce()>(ctx: *mut c_void) {
    if let Some(func) = (*ctx.cast::<Option<F>>()).take() {
        func();
    }
}

fn saturating_msecs(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

impl EventLoop {
    pub fn new() -> Result<Self, BridgeError> {
        let raw = unsafe { netbridge_eventloop_new() };
        Self::from_raw(raw)
            .ok_or_else(|| BridgeError::NotAvailable("event loop runtime".to_string()))
    }

    /// Queues `func` to run on the next `exec`.
    pub fn post<F>(&self, func: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let ctx = Box::into_raw(Box::new(func)).cast::<c_void>();
        unsafe { netbridge_eventloop_post(self.as_ptr(), call_boxed::<F>, ctx) }
    }

    /// Runs queued closures until [`quit`](Self::quit) or
    /// [`exit`](Self::exit) is processed, returning the exit code.
    pub fn exec(&self) -> i32 {
        unsafe { netbridge_eventloop_exec(self.as_ptr()) }
    }

    /// Like [`exec`](Self::exec) but returns [`EXEC_FAILED`] after `timeout`.
    pub fn exec_timeout(&self, timeout: Duration) -> i32 {
        unsafe { netbridge_eventloop_exec_timeout(self.as_ptr(), saturating_msecs(timeout)) }
    }

    pub fn exit(&self, code: i32) {
        unsafe { netbridge_eventloop_exit(self.as_ptr(), code) }
    }

    pub fn quit(&self) {
        unsafe { netbridge_eventloop_quit(self.as_ptr()) }
    }

    /// Runs already queued closures for at most `max_time`.
    pub fn process_events(&self, max_time: Duration) -> usize {
        unsafe { netbridge_eventloop_process_events(self.as_ptr(), saturating_msecs(max_time)) }
    }

    /// Runs the loop until `func` has been dispatched, then returns the exit
    /// code. Closures queued before `func` run first.
    pub fn exec_with<F: FnOnce()>(&self, func: F) -> i32 {
        let mut slot = Some(func);
        let ctx = (&mut slot as *mut Option<F>).cast::<c_void>();
        let code = unsafe { netbridge_eventloop_exec_with(self.as_ptr(), call_borrowed::<F>, ctx) };
        if slot.is_some() {
            debug!(code, "Event loop did not run the scoped closure");
        }
        code
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_posted_closures_run_in_order() {
        let event_loop = EventLoop::new().unwrap();
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        for i in 0..3 {
            let seen = Arc::clone(&seen);
            event_loop.post(move || seen.lock().unwrap().push(i));
        }
        event_loop.exit(7);

        assert_eq!(event_loop.exec(), 7);
        assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn test_exec_with_borrows_stack() {
        let event_loop = EventLoop::new().unwrap();
        let mut total = 0;
        let code = event_loop.exec_with(|| total += 5);
        assert_eq!(code, 0);
        assert_eq!(total, 5);
    }

    #[test]
    fn test_process_events_is_bounded() {
        let event_loop = EventLoop::new().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        event_loop.post(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(event_loop.process_events(Duration::from_millis(100)), 1);
        assert_eq!(event_loop.process_events(Duration::from_millis(10)), 0);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_exec_timeout_gives_up() {
        let event_loop = EventLoop::new().unwrap();
        assert_eq!(event_loop.exec_timeout(Duration::from_millis(20)), EXEC_FAILED);
    }
}
