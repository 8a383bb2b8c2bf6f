//! Small control flow helpers on top of the event loop and the
//! sequencer.

use std::{cell::RefCell, collections::HashMap, fmt, rc::Rc, time::Duration};

use crate::{event_loop::{EventLoop, TimerId},
            sequence::{Controller, Sequence, SequenceError}};

/// Continuation handed to `recur_iter` and `poll` handlers: `true`
/// to go on, `false` to finish.
pub struct Next(Box<dyn FnOnce(bool)>);

impl fmt::Debug for Next {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Next")
    }
}

impl Next {
    fn new(f: impl FnOnce(bool) + 'static) -> Self {
        Next(Box::new(f))
    }

    pub fn next(self, go_on: bool) {
        (self.0)(go_on)
    }
}

type Complete = RefCell<Option<Box<dyn FnOnce()>>>;

fn call_complete(complete: &Complete) {
    let c = complete.borrow_mut().take();
    if let Some(c) = c {
        c()
    }
}

struct Recur {
    handler: RefCell<Option<Box<dyn FnMut(usize, Next)>>>,
    complete: Complete,
    index: RefCell<usize>,
    signal: RefCell<Option<bool>>,
    looping: RefCell<bool>,
}

fn drive(st: Rc<Recur>) {
    *st.looping.borrow_mut() = true;
    loop {
        let signal = st.signal.borrow_mut().take();
        match signal {
            None => break,
            Some(false) => {
                call_complete(&st.complete);
                break
            }
            Some(true) => {
                let handler = st.handler.borrow_mut().take();
                let mut handler = match handler {
                    Some(h) => h,
                    None => break,
                };
                let index = {
                    let mut i = st.index.borrow_mut();
                    *i += 1;
                    *i - 1
                };
                let st2 = st.clone();
                handler(index, Next::new(move |go_on| {
                    *st2.signal.borrow_mut() = Some(go_on);
                    let idle = !*st2.looping.borrow();
                    if idle {
                        drive(st2)
                    }
                }));
                *st.handler.borrow_mut() = Some(handler);
            }
        }
    }
    *st.looping.borrow_mut() = false;
}

/// Call `handler` with index 0, 1, 2, … for as long as it continues
/// with `next.next(true)`; `complete` runs after `next.next(false)`.
/// The handler may continue right away or later; synchronous
/// continuation does not grow the stack.
pub fn recur_iter(
    handler: impl FnMut(usize, Next) + 'static,
    complete: impl FnOnce() + 'static,
) {
    let st = Rc::new(Recur {
        handler: RefCell::new(Some(Box::new(handler))),
        complete: RefCell::new(Some(Box::new(complete))),
        index: RefCell::new(0),
        signal: RefCell::new(Some(true)),
        looping: RefCell::new(false),
    });
    drive(st)
}

struct Poll {
    handler: RefCell<Option<Box<dyn FnMut(Next)>>>,
    complete: Complete,
}

fn schedule_poll(lp: &EventLoop, interval: Duration, st: Rc<Poll>) {
    let lp2 = lp.clone();
    lp.set_timeout(interval, move || {
        let handler = st.handler.borrow_mut().take();
        if let Some(mut handler) = handler {
            let st2 = st.clone();
            handler(Next::new(move |go_on| {
                if go_on {
                    schedule_poll(&lp2, interval, st2)
                } else {
                    call_complete(&st2.complete)
                }
            }));
            *st.handler.borrow_mut() = Some(handler);
        }
    });
}

/// Wait `interval`, then call `handler`; `next.next(true)` waits and
/// calls it again, `next.next(false)` runs `complete`.
pub fn poll(
    lp: &EventLoop,
    interval: Duration,
    handler: impl FnMut(Next) + 'static,
    complete: impl FnOnce() + 'static,
) {
    let st = Rc::new(Poll {
        handler: RefCell::new(Some(Box::new(handler))),
        complete: RefCell::new(Some(Box::new(complete))),
    });
    schedule_poll(lp, interval, st)
}

/// Per-id timers where arming an id again drops the callback still
/// pending for it.
#[derive(Debug, Clone)]
pub struct Debouncer {
    lp: EventLoop,
    timers: Rc<RefCell<HashMap<String, TimerId>>>,
}

impl Debouncer {
    pub fn new(lp: &EventLoop) -> Self {
        Debouncer { lp: lp.clone(), timers: Default::default() }
    }

    pub fn debounce(&self, id: &str, delay: Duration, f: impl FnOnce() + 'static) -> TimerId {
        let old = self.timers.borrow_mut().remove(id);
        if let Some(old) = old {
            self.lp.clear_timeout(old);
        }
        let timers = self.timers.clone();
        let key = id.to_string();
        let timer = self.lp.set_timeout(delay, move || {
            timers.borrow_mut().remove(&key);
            f()
        });
        self.timers.borrow_mut().insert(id.into(), timer);
        timer
    }

    /// Ids with a callback still waiting.
    pub fn pending(&self) -> usize {
        self.timers.borrow().len()
    }
}

/// Lets the next item of `each_in_sequence` start.
#[derive(Debug)]
pub struct Done(Controller<(), ()>);

impl Done {
    pub fn done(self) {
        self.0.resolve(())
    }
}

/// Call `f` for each item, starting the next one only once the
/// previous call has signalled `done`, then run `complete`. Returns
/// the (already started) sequence doing this.
pub fn each_in_sequence<I: 'static>(
    items: impl IntoIterator<Item = I>,
    f: impl Fn(Done, I, usize) + 'static,
    complete: impl FnOnce() + 'static,
) -> Result<Sequence<(), ()>, SequenceError> {
    let f = Rc::new(f);
    let mut seq = Sequence::new();
    for (index, item) in items.into_iter().enumerate() {
        let f = f.clone();
        seq = seq.chain(move |c| f(Done(c), item, index));
    }
    seq = seq.chain(move |c| {
        complete();
        c.resolve(())
    });
    seq.execute()?;
    Ok(seq)
}


#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    use crate::sequence::SequenceStatus;

    #[test]
    fn t_recur_iter_synchronous() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let completed = Rc::new(RefCell::new(0));
        let (s, c) = (seen.clone(), completed.clone());
        recur_iter(move |i, next| {
            s.borrow_mut().push(i);
            next.next(i < 5)
        }, move || *c.borrow_mut() += 1);
        assert_eq!(*seen.borrow(), [0, 1, 2, 3, 4, 5]);
        assert_eq!(*completed.borrow(), 1);
    }

    #[test]
    fn t_recur_iter_deep() {
        let last = Rc::new(RefCell::new(0));
        let l = last.clone();
        recur_iter(move |i, next| {
            *l.borrow_mut() = i;
            next.next(i < 200_000)
        }, || ());
        assert_eq!(*last.borrow(), 200_000);
    }

    #[test]
    fn t_recur_iter_async() {
        let lp = EventLoop::new_virtual();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let (s, lp2) = (seen.clone(), lp.clone());
        let s2 = seen.clone();
        recur_iter(move |i, next| {
            s.borrow_mut().push(i);
            lp2.set_timeout(Duration::from_millis(10), move || next.next(i < 2));
        }, move || s2.borrow_mut().push(99));
        assert_eq!(*seen.borrow(), [0]);
        lp.run();
        assert_eq!(*seen.borrow(), [0, 1, 2, 99]);
        assert_eq!(lp.now(), Duration::from_millis(30));
    }

    #[test]
    fn t_poll() {
        let lp = EventLoop::new_virtual();
        let times = Rc::new(RefCell::new(Vec::new()));
        let done = Rc::new(RefCell::new(None));
        let (t, lp2) = (times.clone(), lp.clone());
        let (d, lp3) = (done.clone(), lp.clone());
        poll(&lp, Duration::from_secs(1), move |next| {
            t.borrow_mut().push(lp2.now().as_secs());
            let n = t.borrow().len();
            next.next(n < 3)
        }, move || *d.borrow_mut() = Some(lp3.now().as_secs()));
        assert!(times.borrow().is_empty());
        lp.run();
        assert_eq!(*times.borrow(), [1, 2, 3]);
        assert_eq!(*done.borrow(), Some(3));
    }

    #[test]
    fn t_debounce() {
        let lp = EventLoop::new_virtual();
        let deb = Debouncer::new(&lp);
        let fired = Rc::new(RefCell::new(Vec::new()));
        for t in [0, 10, 20] {
            let (deb, fired, lp2) = (deb.clone(), fired.clone(), lp.clone());
            lp.set_timeout(Duration::from_millis(t), move || {
                let lp3 = lp2.clone();
                deb.debounce("search", Duration::from_millis(50), move || {
                    fired.borrow_mut().push(("search", lp3.now().as_millis()))
                });
            });
        }
        {
            let fired = fired.clone();
            deb.debounce("other", Duration::from_millis(5), move || {
                fired.borrow_mut().push(("other", 5))
            });
        }
        assert_eq!(deb.pending(), 1);
        lp.run();
        assert_eq!(*fired.borrow(), [("other", 5), ("search", 70)]);
        assert_eq!(deb.pending(), 0);
    }

    #[test]
    fn t_each_in_sequence() -> Result<()> {
        let lp = EventLoop::new_virtual();
        let log = Rc::new(RefCell::new(Vec::new()));
        let (l, lp2) = (log.clone(), lp.clone());
        let l2 = log.clone();
        // later items finish faster, order must still hold
        let seq = each_in_sequence(["a", "b", "c"], move |done, item, i| {
            l.borrow_mut().push(format!("start {item}"));
            let l = l.clone();
            lp2.set_timeout(Duration::from_millis(30 - 10 * i as u64), move || {
                l.borrow_mut().push(format!("end {item}"));
                done.done()
            });
        }, move || l2.borrow_mut().push("complete".into()))?;
        assert_eq!(seq.status(), SequenceStatus::Running(0));
        lp.run();
        assert_eq!(*log.borrow(), ["start a", "end a", "start b", "end b",
                                   "start c", "end c", "complete"]);
        assert_eq!(seq.status(), SequenceStatus::Done);
        Ok(())
    }
}
