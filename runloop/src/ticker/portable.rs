//! Ticker backend on top of [`run_loop`](crate::run_loop).

use std::cell::RefCell;
use std::time::Duration;

use log::{debug, trace};

use super::TickerError;
use crate::run_loop::{self, Interval};

thread_local! {
    static ACTIVE: RefCell<Option<Interval>> = const { RefCell::new(None) };
}

/// Clears the thread's ticker when `run_with_period` returns or unwinds.
struct ActiveTicker;

impl Drop for ActiveTicker {
    fn drop(&mut self) {
        // the loop may also have been stopped through a Handle, or a callback
        // panic is unwinding through it
        if let Some(interval) = ACTIVE.with(|a| a.borrow_mut().take()) {
            interval.cancel();
        }
    }
}

pub fn run_with_period<F>(period: Duration, mut callback: F) -> Result<(), TickerError>
    where F: FnMut() + 'static {
    if is_running() {
        return Err(TickerError::AlreadyRunning);
    }
    if period.is_zero() {
        return Err(TickerError::InvalidPeriod);
    }

    let interval = run_loop::new_interval()
        .with_period(period)
        .with_cancel_on_drop(true)
        .with_callback(move |_| {
            trace!("tick");
            callback()
        })
        .and_start_after(Duration::ZERO);
    ACTIVE.with(|a| *a.borrow_mut() = Some(interval));
    let _active = ActiveTicker;
    debug!("ticker started with period {:?}", period);

    run_loop::run();

    debug!("ticker stopped");
    Ok(())
}

pub fn stop() {
    match ACTIVE.with(|a| a.borrow_mut().take()) {
        Some(interval) => {
            interval.cancel();
            run_loop::stop();
        },
        None => trace!("stop requested with no active ticker"),
    }
}

pub fn is_running() -> bool {
    ACTIVE.with(|a| a.borrow().is_some())
}
