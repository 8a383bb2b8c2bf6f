//! Running asynchronous steps strictly one after the other.
//!
//! A step is handed a [`Controller`]; the sequence moves on when the
//! step calls `resolve` or `reject` on it, whenever that is (right
//! away, or later from an event loop callback). The next step sees
//! the outcome of the previous one in `response()`. A rejection does
//! not stop the sequence. A step that drops its controller without
//! resolving stalls the sequence for good.

use std::{cell::RefCell, collections::VecDeque, fmt, mem, rc::Rc};

use serde_json::Value;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceError {
    #[error("sequence was already started")]
    AlreadyStarted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceStatus {
    Idle,
    /// Waiting for the step with this index to resolve.
    Running(usize),
    Done,
}

/// The outcome of one step; at most one of the two is set, none for
/// the first step.
#[derive(Debug, Clone, PartialEq)]
pub struct Response<T, E> {
    pub value: Option<T>,
    pub error: Option<E>,
}

impl<T, E> Default for Response<T, E> {
    fn default() -> Self {
        Response { value: None, error: None }
    }
}

type Step<T, E> = Box<dyn FnOnce(Controller<T, E>)>;

struct State<T, E> {
    steps: VecDeque<Step<T, E>>,
    len: usize,
    next_index: usize,
    status: SequenceStatus,
    /// Outcome of the step that finished last, not yet handed on.
    handoff: Option<Response<T, E>>,
    dispatching: bool,
    outcome: Option<Response<T, E>>,
}

pub struct Sequence<T = Value, E = anyhow::Error> {
    state: Rc<RefCell<State<T, E>>>,
}

impl<T, E> Clone for Sequence<T, E> {
    fn clone(&self) -> Self {
        Sequence { state: self.state.clone() }
    }
}

impl<T, E> fmt::Debug for Sequence<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let st = self.state.borrow();
        f.debug_struct("Sequence")
            .field("len", &st.len)
            .field("status", &st.status)
            .finish()
    }
}

impl<T: 'static, E: 'static> Default for Sequence<T, E> {
    fn default() -> Self {
        Self::new()
    }
}

/// Hands on `handoff` to the next step for as long as steps finish
/// synchronously; returns once a step is left pending.
fn dispatch<T: 'static, E: 'static>(state: &Rc<RefCell<State<T, E>>>) {
    loop {
        let (step, controller) = {
            let mut st = state.borrow_mut();
            let response = match st.handoff.take() {
                Some(r) => r,
                None => {
                    st.dispatching = false;
                    return
                }
            };
            match st.steps.pop_front() {
                Some(step) => {
                    let index = st.next_index;
                    st.next_index += 1;
                    st.status = SequenceStatus::Running(index);
                    st.dispatching = true;
                    (step, Controller { state: state.clone(), index, response })
                }
                None => {
                    st.status = SequenceStatus::Done;
                    st.outcome = Some(response);
                    st.dispatching = false;
                    return
                }
            }
        };
        step(controller);
    }
}

impl<T: 'static, E: 'static> Sequence<T, E> {
    pub fn new() -> Self {
        Sequence {
            state: Rc::new(RefCell::new(State {
                steps: VecDeque::new(),
                len: 0,
                next_index: 0,
                status: SequenceStatus::Idle,
                handoff: None,
                dispatching: false,
                outcome: None,
            }))
        }
    }

    /// Append a step. Steps chained once the sequence is done are
    /// never run.
    pub fn chain(self, step: impl FnOnce(Controller<T, E>) + 'static) -> Self {
        {
            let mut st = self.state.borrow_mut();
            if st.status == SequenceStatus::Done {
                debug!("sequence: step chained after completion is ignored");
            } else {
                st.steps.push_back(Box::new(step));
                st.len += 1;
            }
        }
        self
    }

    /// Start with the first step. Only once.
    pub fn execute(&self) -> Result<(), SequenceError> {
        {
            let mut st = self.state.borrow_mut();
            if st.status != SequenceStatus::Idle {
                return Err(SequenceError::AlreadyStarted)
            }
            st.handoff = Some(Response::default());
        }
        dispatch(&self.state);
        Ok(())
    }

    pub fn status(&self) -> SequenceStatus {
        self.state.borrow().status
    }

    pub fn len(&self) -> usize {
        self.state.borrow().len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The outcome of the last step, once the sequence is done (and
    /// only the first time).
    pub fn take_outcome(&self) -> Option<Response<T, E>> {
        self.state.borrow_mut().outcome.take()
    }
}

/// What a step gets to report its outcome with.
pub struct Controller<T = Value, E = anyhow::Error> {
    state: Rc<RefCell<State<T, E>>>,
    index: usize,
    response: Response<T, E>,
}

impl<T, E> fmt::Debug for Controller<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Controller").field("index", &self.index).finish()
    }
}

impl<T: 'static, E: 'static> Controller<T, E> {
    /// The outcome of the previous step.
    pub fn response(&self) -> &Response<T, E> {
        &self.response
    }

    pub fn take_response(&mut self) -> Response<T, E> {
        mem::take(&mut self.response)
    }

    /// Position of the running step in the sequence.
    pub fn index(&self) -> usize {
        self.index
    }

    fn finish(self, response: Response<T, E>) {
        let start = {
            let mut st = self.state.borrow_mut();
            st.handoff = Some(response);
            !st.dispatching
        };
        if start {
            dispatch(&self.state);
        }
    }

    pub fn resolve(self, value: T) {
        self.finish(Response { value: Some(value), error: None })
    }

    pub fn reject(self, error: E) {
        self.finish(Response { value: None, error: Some(error) })
    }
}
