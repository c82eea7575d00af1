//! # idbsync Testkit
//!
//! Testing utilities for idbsync.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Mock host**: an in-memory [`MockHost`] that records every mutation
//!   call, supports failure injection, and can echo notifications back into
//!   the capture layer
//! - **Generators**: proptest strategies covering the event taxonomy
//!
//! ## Mock Host
//!
//! ```rust
//! use idbsync_core::Event;
//! use idbsync_core::Ea;
//! use idbsync_testkit::MockHost;
//!
//! let mut host = MockHost::new();
//! Event::MakeCode { ea: Ea(0x401000) }.apply(&mut host).unwrap();
//! assert_eq!(host.ops, ["make_code(0x401000)"]);
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use idbsync_core::{decode_event, encode_event};
//! use idbsync_testkit::generators;
//!
//! proptest! {
//!     #[test]
//!     fn events_roundtrip(event in generators::event()) {
//!         let bytes = encode_event(&event).unwrap();
//!         prop_assert_eq!(decode_event(&bytes).unwrap(), event);
//!     }
//! }
//! ```

pub mod generators;
pub mod mock_host;

pub use mock_host::MockHost;

/// Install a test-friendly tracing subscriber. Safe to call from every
/// test; only the first call wins.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing_subscriber::filter::LevelFilter::DEBUG)
        .with_test_writer()
        .try_init();
}
