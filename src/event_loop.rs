//! Single-threaded timer queue. Everything asynchronous in this
//! crate (timer delays, transport replies) is a callback run from
//! here, one at a time.

use std::{cell::RefCell,
          cmp::Reverse,
          collections::{BinaryHeap, HashMap},
          fmt,
          rc::Rc,
          time::{Duration, Instant}};

use crate::time_util::sleep_until;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(u64);

enum Clock {
    Real { start: Instant },
    /// Time only moves when the loop jumps to the next deadline.
    Virtual { now: Duration },
}

struct Inner {
    clock: Clock,
    next_seq: u64,
    // (deadline, seq); seq keeps equal deadlines in FIFO order
    queue: BinaryHeap<Reverse<(Duration, u64)>>,
    callbacks: HashMap<u64, Box<dyn FnOnce()>>,
}

impl Inner {
    fn now(&self) -> Duration {
        match &self.clock {
            Clock::Real { start } => start.elapsed(),
            Clock::Virtual { now } => *now,
        }
    }

    /// The next timer that was not cleared.
    fn pop(&mut self) -> Option<(Duration, Box<dyn FnOnce()>)> {
        while let Some(Reverse((deadline, seq))) = self.queue.pop() {
            if let Some(f) = self.callbacks.remove(&seq) {
                return Some((deadline, f))
            }
        }
        None
    }
}

/// Cheap to clone; all clones drive the same queue.
#[derive(Clone)]
pub struct EventLoop(Rc<RefCell<Inner>>);

impl fmt::Debug for EventLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.0.borrow();
        f.debug_struct("EventLoop")
            .field("virtual", &matches!(inner.clock, Clock::Virtual { .. }))
            .field("now", &inner.now())
            .field("pending", &inner.callbacks.len())
            .finish()
    }
}

impl Default for EventLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl EventLoop {
    fn with_clock(clock: Clock) -> Self {
        EventLoop(Rc::new(RefCell::new(Inner {
            clock,
            next_seq: 0,
            queue: BinaryHeap::new(),
            callbacks: HashMap::new(),
        })))
    }

    /// Timers wait for real.
    pub fn new() -> Self {
        Self::with_clock(Clock::Real { start: Instant::now() })
    }

    /// Timers fire as soon as nothing earlier is queued; `now()`
    /// reports the simulated time.
    pub fn new_virtual() -> Self {
        Self::with_clock(Clock::Virtual { now: Duration::ZERO })
    }

    pub fn is_virtual(&self) -> bool {
        matches!(self.0.borrow().clock, Clock::Virtual { .. })
    }

    /// Time since the loop was created.
    pub fn now(&self) -> Duration {
        self.0.borrow().now()
    }

    pub fn set_timeout(&self, delay: Duration, f: impl FnOnce() + 'static) -> TimerId {
        let mut inner = self.0.borrow_mut();
        let deadline = inner.now() + delay;
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.queue.push(Reverse((deadline, seq)));
        inner.callbacks.insert(seq, Box::new(f));
        TimerId(seq)
    }

    /// Run `f` on the next turn, after what is already due.
    pub fn defer(&self, f: impl FnOnce() + 'static) -> TimerId {
        self.set_timeout(Duration::ZERO, f)
    }

    /// False if the timer already ran or was cleared. The queue is
    /// pruned once cleared entries outnumber the live ones.
    pub fn clear_timeout(&self, id: TimerId) -> bool {
        let mut inner = self.0.borrow_mut();
        let cleared = inner.callbacks.remove(&id.0).is_some();
        if inner.queue.len() > 2 * inner.callbacks.len() + 8 {
            let Inner { queue, callbacks, .. } = &mut *inner;
            queue.retain(|Reverse((_, seq))| callbacks.contains_key(seq));
        }
        cleared
    }

    pub fn pending(&self) -> usize {
        self.0.borrow().callbacks.len()
    }

    /// Run timers until none are left. Returns how many ran.
    pub fn run(&self) -> usize {
        let mut count = 0;
        loop {
            let (next, wait) = {
                let mut inner = self.0.borrow_mut();
                let next = inner.pop();
                let mut wait = None;
                if let Some((deadline, _)) = &next {
                    match &mut inner.clock {
                        Clock::Real { start } => wait = Some(*start + *deadline),
                        Clock::Virtual { now } => if *deadline > *now {
                            *now = *deadline;
                        },
                    }
                }
                (next, wait)
            };
            if let Some(target) = wait {
                sleep_until(target);
            }
            match next {
                Some((_, f)) => {
                    f();
                    count += 1;
                }
                None => return count,
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    fn recorder() -> (Rc<RefCell<Vec<String>>>, impl Fn(&str) -> Box<dyn FnOnce()>) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let log2 = log.clone();
        (log, move |s: &str| {
            let log = log2.clone();
            let s = s.to_string();
            Box::new(move || log.borrow_mut().push(s)) as Box<dyn FnOnce()>
        })
    }

    #[test]
    fn t_deadline_then_fifo() {
        let lp = EventLoop::new_virtual();
        let (log, rec) = recorder();
        lp.set_timeout(Duration::from_millis(30), rec("c"));
        lp.set_timeout(Duration::from_millis(10), rec("a1"));
        lp.set_timeout(Duration::from_millis(10), rec("a2"));
        lp.defer(rec("first"));
        lp.set_timeout(Duration::from_millis(20), rec("b"));
        assert_eq!(lp.pending(), 5);
        assert_eq!(lp.run(), 5);
        assert_eq!(*log.borrow(), ["first", "a1", "a2", "b", "c"]);
        assert_eq!(lp.now(), Duration::from_millis(30));
        assert_eq!(lp.pending(), 0);
    }

    #[test]
    fn t_clear_and_nested() {
        let lp = EventLoop::new_virtual();
        let (log, rec) = recorder();
        let id = lp.set_timeout(Duration::from_secs(1), rec("cleared"));
        assert!(lp.clear_timeout(id));
        assert!(!lp.clear_timeout(id));
        {
            let lp2 = lp.clone();
            let log = log.clone();
            lp.set_timeout(Duration::from_secs(2), move || {
                log.borrow_mut().push(format!("outer at {:?}", lp2.now()));
                let log = log.clone();
                let lp3 = lp2.clone();
                lp2.set_timeout(Duration::from_secs(1), move || {
                    log.borrow_mut().push(format!("inner at {:?}", lp3.now()));
                });
            });
        }
        assert_eq!(lp.run(), 2);
        assert_eq!(*log.borrow(), ["outer at 2s", "inner at 3s"]);
    }

    #[test]
    fn t_cleared_timers_do_not_pile_up() {
        let lp = EventLoop::new_virtual();
        let (log, rec) = recorder();
        lp.set_timeout(Duration::from_secs(5), rec("kept"));
        for _ in 0..1000 {
            let id = lp.set_timeout(Duration::from_secs(3600), rec("re-armed"));
            lp.clear_timeout(id);
        }
        assert!(lp.0.borrow().queue.len() <= 11);
        assert_eq!(lp.pending(), 1);
        assert_eq!(lp.run(), 1);
        assert_eq!(*log.borrow(), ["kept"]);
        assert_eq!(lp.now(), Duration::from_secs(5));
    }

    #[test]
    fn t_real_clock_waits() {
        let lp = EventLoop::new();
        assert!(!lp.is_virtual());
        let start = Instant::now();
        let (log, rec) = recorder();
        lp.set_timeout(Duration::from_millis(20), rec("x"));
        lp.run();
        assert!(start.elapsed() >= Duration::from_millis(20));
        assert_eq!(*log.borrow(), ["x"]);
    }
}
