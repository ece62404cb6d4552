use std::cell::Cell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::sync::{Condvar, Mutex};
use std::time::Instant;

pub type Msg = Box<dyn FnOnce() + Send>;

pub struct Core {
    pub msgs: Mutex<MsgQueue>,
    pub cond: Condvar,
}

impl Core {
    pub fn new() -> Core {
        Core {
            msgs: Mutex::new(MsgQueue::new()),
            cond: Condvar::new(),
        }
    }

    pub fn post<T>(&self, msg: T) where T: FnOnce() + Send + 'static {
        let mut msgs = self.msgs.lock().unwrap();
        msgs.list.push_back(Box::new(msg));
        if msgs.state == State::Waiting {
            msgs.state = State::MsgArrived;
            self.cond.notify_one();
        }
    }

    pub fn stop(&self) {
        let mut msgs = self.msgs.lock().unwrap();
        if msgs.state == State::Waiting {
            self.cond.notify_one();
        }
        msgs.state = State::Stopping;
    }
}

pub struct MsgQueue {
    list: VecDeque<Msg>,
    pub state: State,
}

impl MsgQueue {
    fn new() -> MsgQueue {
        MsgQueue {
            list: VecDeque::new(),
            state: State::Stopped,
        }
    }

    /// Takes every queued message, leaving the queue empty.
    pub fn drain(&mut self) -> VecDeque<Msg> {
        std::mem::take(&mut self.list)
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum State {
    Stopped,
    Stopping,
    Running,
    Waiting,
    MsgArrived,
}

/// Position of a timed action inside the heap.
pub struct TimedActionNode {
    time: Cell<Instant>,
    index: Cell<usize>,
}

impl TimedActionNode {
    pub fn new() -> TimedActionNode {
        TimedActionNode {
            time: Cell::new(Instant::now()),
            index: Cell::new(0),
        }
    }
}

pub trait TimedAction {
    fn node(&self) -> &TimedActionNode;

    /// Runs the action; `Some(t)` reschedules it at `t`, `None` drops it.
    fn process(&self) -> Option<Instant>;
}

pub struct TimedActionBinaryHeap {
    data: Vec<Rc<dyn TimedAction>>,
}

impl TimedActionBinaryHeap {
    pub fn new() -> TimedActionBinaryHeap {
        TimedActionBinaryHeap {
            data: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn push(&mut self, act: Rc<dyn TimedAction>, time: Instant) {
        let index = self.data.len();
        {
            let node = act.node();
            node.time.set(time);
            node.index.set(index);
        }
        self.data.push(act);
        self.sift_up(index);
    }

    pub fn peek(&self, time: Instant) -> Option<Rc<dyn TimedAction>> {
        self.data
            .first()
            .filter(|ta| ta.node().time.get() <= time)
            .cloned()
    }

    pub fn peek_time(&self) -> Option<Instant> {
        self.data.first().map(|ta| ta.node().time.get())
    }

    pub fn adjust(&mut self, node: &TimedActionNode, time: Instant) {
        node.time.set(time);
        let index = node.index.get();
        if self.sift_up(index) == index {
            self.sift_down(index);
        }
    }

    pub fn remove(&mut self, node: &TimedActionNode) {
        let index = node.index.get();
        let last = match self.data.len() {
            0 => return,
            n => n - 1,
        };
        if index == last {
            self.data.pop();
        }
        else {
            self.swap(index, last);
            self.data.pop();
            if self.sift_up(index) == index {
                self.sift_down(index);
            }
        }
    }

    fn time_at(&self, index: usize) -> Instant {
        self.data[index].node().time.get()
    }

    fn sift_up(&mut self, index: usize) -> usize {
        let mut index = index;
        while index != 0 {
            let parent = (index - 1) / 2;
            if self.time_at(index) >= self.time_at(parent) {
                break;
            }
            self.swap(index, parent);
            index = parent;
        }
        index
    }

    fn sift_down(&mut self, index: usize) -> usize {
        let mut index = index;
        let end = self.data.len();
        loop {
            let mut child = index * 2 + 1;
            if child >= end {
                break;
            }
            let right = child + 1;
            if right < end && self.time_at(right) < self.time_at(child) {
                child = right;
            }
            if self.time_at(index) < self.time_at(child) {
                break;
            }
            self.swap(index, child);
            index = child;
        }
        index
    }

    fn swap(&mut self, a: usize, b: usize) {
        self.data.swap(a, b);
        self.data[a].node().index.set(a);
        self.data[b].node().index.set(b);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    struct Dummy {
        n: TimedActionNode,
        id: u32,
    }

    impl TimedAction for Dummy {
        fn node(&self) -> &TimedActionNode {
            &self.n
        }

        fn process(&self) -> Option<Instant> {
            None
        }
    }

    fn dummy(id: u32) -> Rc<Dummy> {
        Rc::new(Dummy { n: TimedActionNode::new(), id })
    }

    fn pop_order(heap: &mut TimedActionBinaryHeap, dummies: &[Rc<Dummy>], far: Instant) -> Vec<u32> {
        let mut order = Vec::new();
        while let Some(time) = heap.peek_time() {
            let head = dummies
                .iter()
                .find(|p| p.n.index.get() == 0 && p.n.time.get() == time)
                .expect("head action");
            order.push(head.id);
            heap.remove(&head.n);
            assert!(heap.peek_time().map_or(true, |t| t >= time && t <= far));
        }
        order
    }

    #[test]
    fn orders_by_deadline() {
        let base = Instant::now();
        let mut heap = TimedActionBinaryHeap::new();
        let dummies: Vec<_> = (0..6).map(dummy).collect();
        for (p, ms) in dummies.iter().zip([50u64, 10, 40, 0, 30, 20]) {
            heap.push(p.clone(), base + Duration::from_millis(ms));
        }
        assert_eq!(heap.len(), 6);
        let far = base + Duration::from_secs(1);
        assert_eq!(pop_order(&mut heap, &dummies, far), vec![3, 1, 5, 4, 2, 0]);
    }

    #[test]
    fn peek_respects_now() {
        let base = Instant::now();
        let mut heap = TimedActionBinaryHeap::new();
        let p = dummy(0);
        heap.push(p.clone(), base + Duration::from_millis(100));
        assert!(heap.peek(base).is_none());
        assert!(heap.peek(base + Duration::from_millis(100)).is_some());
    }

    #[test]
    fn adjust_and_remove_keep_heap_valid() {
        let base = Instant::now();
        let mut heap = TimedActionBinaryHeap::new();
        let dummies: Vec<_> = (0..5).map(dummy).collect();
        for (i, p) in dummies.iter().enumerate() {
            heap.push(p.clone(), base + Duration::from_millis(10 * i as u64));
        }
        heap.adjust(&dummies[4].n, base);
        heap.adjust(&dummies[0].n, base + Duration::from_millis(100));
        heap.remove(&dummies[2].n);
        let far = base + Duration::from_secs(1);
        assert_eq!(pop_order(&mut heap, &dummies, far), vec![4, 1, 3, 0]);
    }

    #[test]
    fn post_wakes_waiting_queue() {
        let core = Core::new();
        core.msgs.lock().unwrap().state = State::Waiting;
        core.post(|| {});
        core.post(|| {});
        let mut msgs = core.msgs.lock().unwrap();
        assert_eq!(msgs.state, State::MsgArrived);
        assert_eq!(msgs.drain().len(), 2);
        assert!(msgs.drain().is_empty());
    }
}
