//! Single-resolution promises for request/reply correlation.
//!
//! The whole client runs on one cooperative thread: a query goes out, the
//! caller attaches continuations, and the transport resolves the promise
//! when the matching reply (or a failure) arrives. `Rc<RefCell<..>>` is
//! deliberate; none of this is `Send`.

use std::cell::RefCell;
use std::rc::Rc;

use tracing::error;

use crate::error::SessionError;

enum State<T> {
    Pending,
    Resolved(Rc<T>),
    Rejected(Rc<SessionError>),
}

struct Inner<T> {
    state: State<T>,
    callbacks: Vec<Box<dyn FnOnce(&T)>>,
    errbacks: Vec<Box<dyn FnOnce(&SessionError)>>,
}

/// The consumer half of a promise. Cloneable; all clones observe the same
/// resolution.
pub struct Deferred<T> {
    inner: Rc<RefCell<Inner<T>>>,
}

impl<T> Clone for Deferred<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

/// The producer half. Resolves or rejects exactly once; consumed by use.
pub struct Resolver<T> {
    inner: Rc<RefCell<Inner<T>>>,
}

impl<T: 'static> Deferred<T> {
    /// Create a pending promise and its resolver.
    pub fn new() -> (Deferred<T>, Resolver<T>) {
        let inner = Rc::new(RefCell::new(Inner {
            state: State::Pending,
            callbacks: Vec::new(),
            errbacks: Vec::new(),
        }));
        (
            Deferred {
                inner: Rc::clone(&inner),
            },
            Resolver { inner },
        )
    }

    /// A promise that is already resolved.
    pub fn resolved(value: T) -> Deferred<T> {
        let (deferred, resolver) = Deferred::new();
        resolver.resolve(value);
        deferred
    }

    /// A promise that is already rejected.
    pub fn rejected(err: SessionError) -> Deferred<T> {
        let (deferred, resolver) = Deferred::new();
        resolver.reject(err);
        deferred
    }

    /// Attach a success continuation.
    ///
    /// Fires immediately if the promise is already resolved; otherwise it
    /// fires on the cooperative thread when the resolver runs.
    pub fn add_callback(&self, f: impl FnOnce(&T) + 'static) {
        let fire = {
            let mut inner = self.inner.borrow_mut();
            match &inner.state {
                State::Pending => {
                    inner.callbacks.push(Box::new(f));
                    return;
                }
                State::Resolved(value) => Some(Rc::clone(value)),
                State::Rejected(_) => None,
            }
        };
        if let Some(value) = fire {
            f(&value);
        }
    }

    /// Attach a failure continuation. Same late-attachment rules as
    /// [`Deferred::add_callback`].
    pub fn add_errback(&self, f: impl FnOnce(&SessionError) + 'static) {
        let fire = {
            let mut inner = self.inner.borrow_mut();
            match &inner.state {
                State::Pending => {
                    inner.errbacks.push(Box::new(f));
                    return;
                }
                State::Rejected(err) => Some(Rc::clone(err)),
                State::Resolved(_) => None,
            }
        };
        if let Some(err) = fire {
            f(&err);
        }
    }
}

impl<T: 'static> Resolver<T> {
    /// Resolve the promise, running every attached callback.
    pub fn resolve(self, value: T) {
        let (value, callbacks) = {
            let mut inner = self.inner.borrow_mut();
            if !matches!(inner.state, State::Pending) {
                return;
            }
            let value = Rc::new(value);
            inner.state = State::Resolved(Rc::clone(&value));
            inner.errbacks.clear();
            (value, std::mem::take(&mut inner.callbacks))
        };
        // Run outside the borrow; a callback may attach further
        // continuations to this same promise.
        for callback in callbacks {
            callback(&value);
        }
    }

    /// Reject the promise, running every attached errback.
    ///
    /// A rejection nobody listens to is logged in full rather than
    /// swallowed.
    pub fn reject(self, err: SessionError) {
        let (err, errbacks) = {
            let mut inner = self.inner.borrow_mut();
            if !matches!(inner.state, State::Pending) {
                return;
            }
            let err = Rc::new(err);
            inner.state = State::Rejected(Rc::clone(&err));
            inner.callbacks.clear();
            (err, std::mem::take(&mut inner.errbacks))
        };
        if errbacks.is_empty() {
            error!(%err, "unhandled request failure");
            return;
        }
        for errback in errbacks {
            errback(&err);
        }
    }
}
