//! Transport abstraction.
//!
//! The session layer only assumes an ordered, reliable, non-blocking pipe
//! to the relay server. Socket handling, reconnection, and TLS belong to
//! whoever implements this trait; the session never sees them.

use std::collections::VecDeque;

use crate::deferred::{Deferred, Resolver};
use crate::error::SessionError;
use crate::packets::Packet;

/// An ordered, reliable, non-blocking packet pipe.
pub trait Transport {
    /// Send a fire-and-forget packet.
    fn send(&mut self, packet: Packet) -> Result<(), SessionError>;

    /// Send a query packet and obtain a promise for its reply.
    ///
    /// The session keeps at most one outstanding snapshot query per join
    /// attempt.
    fn query(&mut self, packet: Packet) -> Deferred<Packet>;
}

/// A scripted in-memory transport.
///
/// Records every packet the session sends and parks query promises until
/// the test resolves them, so negotiation sequences can be driven one
/// reply at a time.
pub mod scripted {
    use super::*;

    #[derive(Default)]
    pub struct ScriptedTransport {
        /// Every packet sent or queried, in order.
        pub sent: Vec<Packet>,
        pending: VecDeque<Resolver<Packet>>,
    }

    impl ScriptedTransport {
        pub fn new() -> Self {
            Self::default()
        }

        /// Number of queries still awaiting a scripted reply.
        pub fn pending_queries(&self) -> usize {
            self.pending.len()
        }
    }

    /// The test-facing half: resolve or reject parked queries.
    ///
    /// Separate from the transport itself because the session owns the
    /// transport once constructed; tests keep this handle.
    #[derive(Clone, Default)]
    pub struct ScriptHandle {
        inner: std::rc::Rc<std::cell::RefCell<ScriptedTransport>>,
    }

    impl ScriptHandle {
        pub fn new() -> Self {
            Self::default()
        }

        /// A transport backed by this handle's shared state.
        pub fn transport(&self) -> SharedScriptedTransport {
            SharedScriptedTransport {
                inner: std::rc::Rc::clone(&self.inner),
            }
        }

        /// All packets the session has sent so far.
        pub fn sent(&self) -> Vec<Packet> {
            self.inner.borrow().sent.clone()
        }

        pub fn pending_queries(&self) -> usize {
            self.inner.borrow().pending.len()
        }

        /// Resolve the oldest outstanding query with `reply`.
        ///
        /// Panics if no query is outstanding; a test that replies out of
        /// turn is broken.
        pub fn resolve_next_query(&self, reply: Packet) {
            let resolver = self
                .inner
                .borrow_mut()
                .pending
                .pop_front()
                .expect("no outstanding query to resolve");
            resolver.resolve(reply);
        }

        /// Reject the oldest outstanding query.
        pub fn reject_next_query(&self, err: SessionError) {
            let resolver = self
                .inner
                .borrow_mut()
                .pending
                .pop_front()
                .expect("no outstanding query to reject");
            resolver.reject(err);
        }
    }

    /// Transport view over a [`ScriptHandle`]'s state.
    pub struct SharedScriptedTransport {
        inner: std::rc::Rc<std::cell::RefCell<ScriptedTransport>>,
    }

    impl Transport for SharedScriptedTransport {
        fn send(&mut self, packet: Packet) -> Result<(), SessionError> {
            self.inner.borrow_mut().sent.push(packet);
            Ok(())
        }

        fn query(&mut self, packet: Packet) -> Deferred<Packet> {
            let (deferred, resolver) = Deferred::new();
            let mut inner = self.inner.borrow_mut();
            inner.sent.push(packet);
            inner.pending.push_back(resolver);
            deferred
        }
    }
}
