use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::thread;
use std::time::{Duration, Instant};

use super::core::{TimedAction, TimedActionNode};

const DEFAULT_PERIOD: Duration = Duration::from_millis(100);

/// A callback the run loop calls again and again, one period apart.
///
/// Each call is handed the time since the previous one (or since the
/// interval was started). When the loop falls behind, missed ticks are
/// dropped rather than delivered in a burst.
///
/// # Examples
/// ```
/// use runloop::run_loop;
/// use std::time::Duration;
///
/// let mut waited = Duration::ZERO;
///
/// // fires right away, then every 10ms, until a quarter second has passed
/// let heartbeat = run_loop::new_interval()
///     .with_period(Duration::from_millis(10))
///     .with_callback(move |since_last| {
///         waited += since_last;
///         if waited >= Duration::from_millis(250) {
///             run_loop::stop();
///         }
///     })
///     .and_start_after(Duration::ZERO);
///
/// run_loop::run();
/// heartbeat.cancel();
/// assert!(!heartbeat.is_active());
/// ```
pub struct Interval {
    shared: Rc<Shared>,
    cancel_on_drop: Cell<bool>,
}

struct Shared {
    node: TimedActionNode,
    inner: RefCell<Inner>,
}

struct Inner {
    phase: Phase,
    period: Duration,
    last_tick: Instant,
    deadline: Instant,
    callback: Option<Box<dyn FnMut(Duration)>>,
}

/// `Idle` is off the heap. `Scheduled` sits in it. `Firing` and
/// `CancelledWhileFiring` mean the callback is on the stack right now and
/// the loop decides what happens to the heap entry once it returns.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
enum Phase {
    Idle,
    Scheduled,
    Firing,
    CancelledWhileFiring,
}

impl Interval {
    pub fn new() -> Self {
        let now = Instant::now();
        Interval {
            shared: Rc::new(Shared {
                node: TimedActionNode::new(),
                inner: RefCell::new(Inner {
                    phase: Phase::Idle,
                    period: DEFAULT_PERIOD,
                    last_tick: now,
                    deadline: now,
                    callback: None,
                }),
            }),
            cancel_on_drop: Cell::new(false),
        }
    }

    pub fn with_callback<T>(self, cb: T) -> Self where T: FnMut(Duration) + 'static {
        self.set_callback(cb);
        self
    }

    pub fn with_period(self, period: Duration) -> Self {
        self.set_period(period);
        self
    }

    pub fn with_cancel_on_drop(self, cancel_on_drop: bool) -> Self {
        self.cancel_on_drop.set(cancel_on_drop);
        self
    }

    pub fn and_start(self) -> Self {
        self.start();
        self
    }

    pub fn and_start_after(self, delay: Duration) -> Self {
        self.start_after(delay);
        self
    }

    pub fn set_callback<T>(&self, cb: T) where T: FnMut(Duration) + 'static {
        self.shared.inner.borrow_mut().callback = Some(Box::new(cb));
    }

    /// Changes the period. The next deadline moves to one new period after
    /// the last tick, also when called from inside the callback.
    pub fn set_period(&self, period: Duration) {
        let mut inner = self.shared.inner.borrow_mut();
        if inner.period == period {
            return;
        }
        inner.period = period;
        let deadline = inner.last_tick + period;
        match inner.phase {
            Phase::Scheduled => {
                inner.deadline = deadline;
                super::adjust_timed_action(&self.shared.node, deadline);
            },
            // picked up by `process` when the callback returns
            Phase::Firing => inner.deadline = deadline,
            Phase::Idle | Phase::CancelledWhileFiring => {},
        }
    }

    pub fn period(&self) -> Duration {
        self.shared.inner.borrow().period
    }

    pub fn set_cancel_on_drop(&self, cancel_on_drop: bool) {
        self.cancel_on_drop.set(cancel_on_drop);
    }

    pub fn is_cancel_on_drop(&self) -> bool {
        self.cancel_on_drop.get()
    }

    pub fn is_active(&self) -> bool {
        matches!(self.shared.inner.borrow().phase, Phase::Scheduled | Phase::Firing)
    }

    /// Starts ticking; the first tick comes one period from now.
    pub fn start(&self) {
        let period = self.period();
        self.start_after(period);
    }

    /// Starts ticking; the first tick comes after `delay`, later ones one
    /// period apart. Restarts an interval that is already running.
    pub fn start_after(&self, delay: Duration) {
        let mut inner = self.shared.inner.borrow_mut();
        let now = Instant::now();
        let deadline = now + delay;
        inner.last_tick = now;
        inner.deadline = deadline;
        inner.phase = match inner.phase {
            Phase::Idle => {
                super::push_timed_action(self.shared.clone(), deadline);
                Phase::Scheduled
            },
            Phase::Scheduled => {
                super::adjust_timed_action(&self.shared.node, deadline);
                Phase::Scheduled
            },
            Phase::Firing | Phase::CancelledWhileFiring => Phase::Firing,
        };
    }

    pub fn cancel(&self) {
        let mut inner = self.shared.inner.borrow_mut();
        match inner.phase {
            Phase::Scheduled => {
                inner.phase = Phase::Idle;
                super::remove_timed_action(&self.shared.node);
            },
            Phase::Firing => inner.phase = Phase::CancelledWhileFiring,
            Phase::Idle | Phase::CancelledWhileFiring => {},
        }
    }
}

impl Default for Interval {
    fn default() -> Self {
        Interval::new()
    }
}

impl Drop for Interval {
    fn drop(&mut self) {
        if self.cancel_on_drop.get() {
            self.cancel();
        }
    }
}

/// Marks the interval idle if its callback unwinds; the run loop drops the
/// heap entry on the same path.
struct IdleOnUnwind<'a>(&'a RefCell<Inner>);

impl Drop for IdleOnUnwind<'_> {
    fn drop(&mut self) {
        if thread::panicking() {
            if let Ok(mut inner) = self.0.try_borrow_mut() {
                inner.phase = Phase::Idle;
            }
        }
    }
}

impl TimedAction for Shared {
    fn node(&self) -> &TimedActionNode {
        &self.node
    }

    fn process(&self) -> Option<Instant> {
        let mut inner = self.inner.borrow_mut();
        let now = Instant::now();
        let since_last = now - inner.last_tick;
        let period = inner.period;
        inner.last_tick = now;
        inner.deadline = (inner.deadline + period).max(now);

        let Some(mut callback) = inner.callback.take() else {
            return Some(inner.deadline);
        };
        inner.phase = Phase::Firing;
        drop(inner);

        {
            let _guard = IdleOnUnwind(&self.inner);
            callback(since_last);
        }

        let mut inner = self.inner.borrow_mut();
        // keep a callback installed from inside the old one
        inner.callback.get_or_insert(callback);
        match inner.phase {
            Phase::Firing => {
                inner.phase = Phase::Scheduled;
                Some(inner.deadline)
            },
            Phase::CancelledWhileFiring => {
                inner.phase = Phase::Idle;
                None
            },
            Phase::Idle | Phase::Scheduled => unreachable!("interval left firing state early"),
        }
    }
}
