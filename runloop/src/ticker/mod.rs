//! A repeating one-second timer bound to the current thread's run loop.
//!
//! [`run`] parks the calling thread in the platform run loop and invokes the
//! callback on every tick until [`stop`] is called. On macOS this is the
//! CoreFoundation run loop, so the thread keeps servicing the system event
//! sources while it waits; everywhere else it is the portable
//! [`run_loop`](crate::run_loop).

#[cfg(target_os = "macos")]
mod cf;
pub mod portable;

#[cfg(target_os = "macos")]
use self::cf as backend;
#[cfg(not(target_os = "macos"))]
use self::portable as backend;

use std::time::Duration;

use thiserror::Error;

pub const DEFAULT_PERIOD: Duration = Duration::from_secs(1);

#[derive(Error, Debug, PartialEq, Eq)]
pub enum TickerError {
    #[error("a ticker is already running on this thread")]
    AlreadyRunning,
    #[error("ticker period must be non-zero")]
    InvalidPeriod,
    #[error("ticker callback panicked")]
    CallbackPanicked,
}

/// Runs the current thread's loop, calling `callback` once immediately and
/// then every [`DEFAULT_PERIOD`], until [`stop`] is called.
pub fn run<F>(callback: F) -> Result<(), TickerError> where F: FnMut() + 'static {
    run_with_period(DEFAULT_PERIOD, callback)
}

pub fn run_with_period<F>(period: Duration, callback: F) -> Result<(), TickerError>
    where F: FnMut() + 'static {
    if period.is_zero() {
        return Err(TickerError::InvalidPeriod);
    }
    backend::run_with_period(period, callback)
}

/// Cancels the ticker of the current thread and makes the pending [`run`]
/// return. Does nothing when no ticker is running here.
pub fn stop() {
    backend::stop();
}

pub fn is_running() -> bool {
    backend::is_running()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;
    use std::sync::mpsc::{channel, TryRecvError};
    use std::thread;
    use std::time::Instant;

    fn on_fresh_thread<F>(f: F) where F: FnOnce() + Send + 'static {
        thread::spawn(f).join().unwrap();
    }

    #[test]
    fn ticks_until_stopped() {
        on_fresh_thread(|| {
            let ticks = Rc::new(Cell::new(0u32));
            let t = ticks.clone();
            run_with_period(Duration::from_millis(5), move || {
                t.set(t.get() + 1);
                if t.get() == 3 {
                    stop();
                }
            })
            .unwrap();

            assert_eq!(ticks.get(), 3);
            assert!(!is_running());
        });
    }

    #[test]
    fn first_tick_is_immediate() {
        on_fresh_thread(|| {
            let started = Instant::now();
            let first = Rc::new(Cell::new(None));
            let f = first.clone();
            run(move || {
                f.set(Some(started.elapsed()));
                stop();
            })
            .unwrap();

            assert!(first.get().expect("ticked") < DEFAULT_PERIOD);
        });
    }

    #[test]
    fn no_tick_after_stop() {
        on_fresh_thread(|| {
            let ticks = Rc::new(Cell::new(0u32));
            let t = ticks.clone();
            run_with_period(Duration::from_millis(1), move || {
                t.set(t.get() + 1);
                stop();
                stop();
            })
            .unwrap();
            thread::sleep(Duration::from_millis(10));

            assert_eq!(ticks.get(), 1);
        });
    }

    #[test]
    fn can_run_again_after_stop() {
        on_fresh_thread(|| {
            for _ in 0..2 {
                let ticks = Rc::new(Cell::new(0u32));
                let t = ticks.clone();
                run_with_period(Duration::from_millis(2), move || {
                    t.set(t.get() + 1);
                    if t.get() == 2 {
                        stop();
                    }
                })
                .unwrap();
                assert_eq!(ticks.get(), 2);
            }
        });
    }

    #[test]
    fn rejects_zero_period() {
        on_fresh_thread(|| {
            assert_eq!(
                run_with_period(Duration::ZERO, || {}),
                Err(TickerError::InvalidPeriod)
            );
        });
    }

    #[test]
    fn rejects_nested_run() {
        on_fresh_thread(|| {
            let nested = Rc::new(Cell::new(None));
            let n = nested.clone();
            run_with_period(Duration::from_millis(1), move || {
                assert!(is_running());
                n.set(Some(run_with_period(Duration::from_millis(1), || {})));
                stop();
            })
            .unwrap();

            assert_eq!(nested.take(), Some(Err(TickerError::AlreadyRunning)));
        });
    }

    #[test]
    fn stop_without_ticker_is_noop() {
        on_fresh_thread(|| {
            stop();
            assert!(!is_running());
            // the stray stop must not leak into the next run
            let ticks = Rc::new(Cell::new(0u32));
            let t = ticks.clone();
            run_with_period(Duration::from_millis(1), move || {
                t.set(t.get() + 1);
                if t.get() == 2 {
                    stop();
                }
            })
            .unwrap();
            assert_eq!(ticks.get(), 2);
        });
    }

    #[test]
    fn polls_worker_completion() {
        on_fresh_thread(|| {
            let (tx, rx) = channel();
            let worker = thread::spawn(move || {
                thread::sleep(Duration::from_millis(15));
                tx.send(7).unwrap();
            });

            let result = Rc::new(Cell::new(None));
            let r = result.clone();
            run_with_period(Duration::from_millis(5), move || match rx.try_recv() {
                Ok(v) => {
                    r.set(Some(v));
                    stop();
                },
                Err(TryRecvError::Empty) => {},
                Err(TryRecvError::Disconnected) => stop(),
            })
            .unwrap();

            worker.join().unwrap();
            assert_eq!(result.get(), Some(7));
        });
    }

    #[test]
    fn callback_panic_leaves_thread_usable() {
        on_fresh_thread(|| {
            #[cfg(target_os = "macos")]
            assert_eq!(
                run_with_period(Duration::from_millis(1), || {
                    panic!("tick failed");
                }),
                Err(TickerError::CallbackPanicked)
            );
            #[cfg(not(target_os = "macos"))]
            {
                let unwound = std::panic::catch_unwind(|| {
                    run_with_period(Duration::from_millis(1), || {
                        panic!("tick failed");
                    })
                });
                assert!(unwound.is_err());
            }
            assert!(!is_running());

            let started = Instant::now();
            let ticks = Rc::new(Cell::new(0u32));
            let t = ticks.clone();
            run_with_period(Duration::from_millis(10), move || {
                t.set(t.get() + 1);
                if t.get() == 2 {
                    stop();
                }
            })
            .unwrap();
            assert_eq!(ticks.get(), 2);
            assert!(started.elapsed() >= Duration::from_millis(10));
        });
    }
}
