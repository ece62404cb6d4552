//! Ticker backend on the CoreFoundation run loop.

use std::cell::Cell;
use std::ffi::c_void;
use std::panic::{self, AssertUnwindSafe};
use std::ptr;
use std::time::Duration;

use log::{debug, error, trace};

use super::TickerError;

type CFAllocatorRef = *const c_void;
type CFRunLoopRef = *mut c_void;
type CFRunLoopTimerRef = *mut c_void;
type CFStringRef = *const c_void;
type CFAbsoluteTime = f64;
type CFTimeInterval = f64;
type CFOptionFlags = usize;
type CFIndex = isize;

type CFRunLoopTimerCallBack = extern "C" fn(timer: CFRunLoopTimerRef, info: *mut c_void);

#[repr(C)]
struct CFRunLoopTimerContext {
    version: CFIndex,
    info: *mut c_void,
    retain: Option<extern "C" fn(info: *const c_void) -> *const c_void>,
    release: Option<extern "C" fn(info: *const c_void)>,
    copy_description: Option<extern "C" fn(info: *const c_void) -> CFStringRef>,
}

#[link(name = "CoreFoundation", kind = "framework")]
extern "C" {
    static kCFRunLoopCommonModes: CFStringRef;

    fn CFAbsoluteTimeGetCurrent() -> CFAbsoluteTime;
    fn CFRelease(cf: *const c_void);
    fn CFRunLoopGetCurrent() -> CFRunLoopRef;
    fn CFRunLoopRun();
    fn CFRunLoopStop(rl: CFRunLoopRef);
    fn CFRunLoopAddTimer(rl: CFRunLoopRef, timer: CFRunLoopTimerRef, mode: CFStringRef);
    fn CFRunLoopRemoveTimer(rl: CFRunLoopRef, timer: CFRunLoopTimerRef, mode: CFStringRef);
    fn CFRunLoopTimerCreate(
        allocator: CFAllocatorRef,
        fire_date: CFAbsoluteTime,
        interval: CFTimeInterval,
        flags: CFOptionFlags,
        order: CFIndex,
        callout: CFRunLoopTimerCallBack,
        context: *mut CFRunLoopTimerContext,
    ) -> CFRunLoopTimerRef;
    fn CFRunLoopTimerInvalidate(timer: CFRunLoopTimerRef);
}

struct Tick {
    callback: Box<dyn FnMut()>,
    panicked: bool,
}

thread_local! {
    static ACTIVE: Cell<Option<(CFRunLoopRef, CFRunLoopTimerRef)>> = const { Cell::new(None) };
}

extern "C" fn on_timer(_timer: CFRunLoopTimerRef, info: *mut c_void) {
    // SAFETY: `info` is the `Tick` owned by `run_with_period`, which outlives
    // the timer's registration on this thread's run loop.
    let tick = unsafe { &mut *(info as *mut Tick) };
    trace!("tick");
    if panic::catch_unwind(AssertUnwindSafe(|| (tick.callback)())).is_err() {
        error!("ticker callback panicked, stopping run loop");
        tick.panicked = true;
        stop();
    }
}

pub fn run_with_period<F>(period: Duration, callback: F) -> Result<(), TickerError>
    where F: FnMut() + 'static {
    if is_running() {
        return Err(TickerError::AlreadyRunning);
    }
    if period.is_zero() {
        return Err(TickerError::InvalidPeriod);
    }

    let mut tick = Box::new(Tick {
        callback: Box::new(callback),
        panicked: false,
    });
    let mut context = CFRunLoopTimerContext {
        version: 0,
        info: tick.as_mut() as *mut Tick as *mut c_void,
        retain: None,
        release: None,
        copy_description: None,
    };

    unsafe {
        let rl = CFRunLoopGetCurrent();
        let timer = CFRunLoopTimerCreate(
            ptr::null(),
            CFAbsoluteTimeGetCurrent(),
            period.as_secs_f64(),
            0,
            0,
            on_timer,
            &mut context,
        );
        CFRunLoopAddTimer(rl, timer, kCFRunLoopCommonModes);
        ACTIVE.with(|a| a.set(Some((rl, timer))));
        debug!("ticker started with period {:?}", period);

        CFRunLoopRun();

        // the run loop can also exit when it runs out of sources
        if let Some((rl, timer)) = ACTIVE.with(|a| a.take()) {
            invalidate(rl, timer);
        }
        CFRelease(timer as *const c_void);
    }
    debug!("ticker stopped");

    if tick.panicked {
        Err(TickerError::CallbackPanicked)
    }
    else {
        Ok(())
    }
}

unsafe fn invalidate(rl: CFRunLoopRef, timer: CFRunLoopTimerRef) {
    CFRunLoopTimerInvalidate(timer);
    CFRunLoopRemoveTimer(rl, timer, kCFRunLoopCommonModes);
}

pub fn stop() {
    match ACTIVE.with(|a| a.take()) {
        Some((rl, timer)) => unsafe {
            invalidate(rl, timer);
            CFRunLoopStop(rl);
        },
        None => trace!("stop requested with no active ticker"),
    }
}

pub fn is_running() -> bool {
    ACTIVE.with(|a| a.get().is_some())
}
