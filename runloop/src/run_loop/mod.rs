mod core;
mod interval;

pub use self::interval::Interval;

use self::core::Core;
use self::core::State;

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::{Arc, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use log::trace;

/// Cross-thread handle to a run loop.
#[derive(Clone)]
pub struct Handle {
    core: Arc<Core>,
}

impl Handle {
    /// Queues `msg` to run on the loop's thread.
    pub fn post<T>(&self, msg: T) where T: FnOnce() + 'static + Send {
        self.core.post(msg);
    }

    pub fn stop(&self) {
        self.core.stop();
    }
}

enum WaitingTime {
    Infinite,
    Zero,
    Duration(Duration),
}

struct RunLoop {
    core: Arc<Core>,
    timers: RefCell<core::TimedActionBinaryHeap>,
}

impl Drop for RunLoop {
    fn drop(&mut self) {
        if let Ok(mut msgs) = self.core.msgs.lock() {
            msgs.drain();
        }
    }
}

impl RunLoop {
    fn process_timers(&self) {
        let mut timers = self.timers.borrow_mut();
        let now = Instant::now();
        while let Some(t) = timers.peek(now) {
            drop(timers);
            let ret = {
                let _guard = DropOnUnwind { timers: &self.timers, action: &t };
                t.process()
            };
            timers = self.timers.borrow_mut();
            if let Some(time) = ret {
                timers.adjust(t.node(), time);
            }
            else {
                timers.remove(t.node());
            }
        }
    }

    fn calculate_waiting_time(&self) -> WaitingTime {
        let timers = self.timers.borrow();
        if let Some(time) = timers.peek_time() {
            let now = Instant::now();
            if now >= time {
                WaitingTime::Zero
            }
            else {
                WaitingTime::Duration(time - now)
            }
        }
        else {
            WaitingTime::Infinite
        }
    }
}

/// Takes a timed action off the heap when its `process` unwinds, so a
/// caught panic does not leave a dead entry behind.
struct DropOnUnwind<'a> {
    timers: &'a RefCell<core::TimedActionBinaryHeap>,
    action: &'a Rc<dyn core::TimedAction>,
}

impl Drop for DropOnUnwind<'_> {
    fn drop(&mut self) {
        if thread::panicking() {
            if let Ok(mut timers) = self.timers.try_borrow_mut() {
                timers.remove(self.action.node());
            }
        }
    }
}

/// Puts the loop back to `Stopped` when `run` unwinds, so the thread can
/// run it again once the panic is caught.
struct StoppedOnUnwind<'a>(&'a Core);

impl Drop for StoppedOnUnwind<'_> {
    fn drop(&mut self) {
        if thread::panicking() {
            let mut msgs = self.0.msgs.lock().unwrap_or_else(PoisonError::into_inner);
            msgs.state = State::Stopped;
        }
    }
}

thread_local! {
    static RUN_LOOP: RunLoop = RunLoop {
        core: Arc::new(Core::new()),
        timers: RefCell::new(core::TimedActionBinaryHeap::new()),
    };
}

/// Asks the current thread's loop to stop. A stop requested before
/// [`run`] makes the next `run` return at once.
pub fn stop() {
    RUN_LOOP.with(|rl| {
        rl.core.stop();
    })
}

/// Runs the current thread's loop until [`stop`] or [`Handle::stop`].
pub fn run() {
    RUN_LOOP.with(|rl| {
        // declared first so it drops after any lock guard below
        let _guard = StoppedOnUnwind(&rl.core);
        let mut msgs = rl.core.msgs.lock().unwrap();
        match msgs.state {
            State::Stopped => {
                msgs.state = State::Running;
            },
            State::Stopping => {
                msgs.state = State::Stopped;
                return;
            },
            State::Running => {
                return;
            },
            _ => unreachable!(),
        }
        trace!("run loop started with {} timed actions", rl.timers.borrow().len());
        process_msgs(msgs);
        rl.process_timers();
        msgs = rl.core.msgs.lock().unwrap();
        loop {
            match msgs.state {
                State::Stopping => {
                    msgs.state = State::Stopped;
                    trace!("run loop stopped");
                    return;
                },
                State::Waiting | State::MsgArrived => {
                    msgs.state = State::Running;
                },
                State::Running => {},
                State::Stopped => unreachable!(),
            }
            match process_msgs(msgs) {
                Some(lck) => msgs = lck,
                None => {
                    rl.process_timers();
                    msgs = rl.core.msgs.lock().unwrap();
                    continue;
                }
            }
            match rl.calculate_waiting_time() {
                WaitingTime::Zero => {
                    drop(msgs);
                    rl.process_timers();
                    msgs = rl.core.msgs.lock().unwrap();
                },
                WaitingTime::Infinite => {
                    msgs.state = State::Waiting;
                    msgs = rl.core.cond.wait(msgs).unwrap();
                },
                WaitingTime::Duration(dur) => {
                    msgs.state = State::Waiting;
                    let (lck, r) = rl.core.cond.wait_timeout(msgs, dur).unwrap();
                    if r.timed_out() {
                        drop(lck);
                        rl.process_timers();
                        msgs = rl.core.msgs.lock().unwrap();
                    }
                    else {
                        msgs = lck;
                    }
                }
            }
        }
    })
}

pub fn clone_handle() -> Handle {
    RUN_LOOP.with(|rl| {
        Handle {
            core: rl.core.clone(),
        }
    })
}

pub fn is_own_handle(handle: &Handle) -> bool {
    RUN_LOOP.with(|rl| Arc::ptr_eq(&rl.core, &handle.core))
}

pub fn new_interval() -> Interval {
    Interval::new()
}

/// Runs every queued message. Returns the guard back when there was nothing
/// to run; otherwise the lock has been released.
fn process_msgs(mut msgs: MutexGuard<core::MsgQueue>) -> Option<MutexGuard<core::MsgQueue>> {
    let batch = msgs.drain();
    if batch.is_empty() {
        return Some(msgs);
    }
    drop(msgs);
    for msg in batch {
        msg();
    }
    None
}

fn push_timed_action(ta: Rc<dyn core::TimedAction>, time: Instant) {
    RUN_LOOP.with(|rl| {
        rl.timers.borrow_mut().push(ta, time);
    })
}

fn adjust_timed_action(node: &core::TimedActionNode, time: Instant) {
    RUN_LOOP.with(|rl| {
        rl.timers.borrow_mut().adjust(node, time);
    })
}

fn remove_timed_action(node: &core::TimedActionNode) {
    RUN_LOOP.with(|rl| {
        rl.timers.borrow_mut().remove(node);
    })
}
