//! # idbsync Core
//!
//! Pure primitives for idbsync: the event taxonomy, its wire codec, the
//! host capability traits, and the local type catalogue.
//!
//! This crate contains no I/O and no session logic. It is pure computation
//! over database mutations: an [`Event`] captures one user edit, and
//! [`Event::apply`] reproduces it through the [`host`] traits on another
//! copy of the same snapshot.
//!
//! ## Key Types
//!
//! - [`Event`] - One replayable database mutation, tagged with its legacy
//!   wire name
//! - [`host::Host`] - The capability surface replay requires
//! - [`TypeCatalogue`] - Snapshot of the host's local types, diffable into
//!   [`TypePatch`]es
//! - [`RawData`] - Byte payloads in the legacy escaped-string encoding
//!
//! ## Codec
//!
//! Events travel as CBOR with the legacy tag under the `"event"` key. See
//! the [`codec`] module.

pub mod codec;
pub mod error;
pub mod event;
pub mod host;
pub mod local_types;
pub mod payloads;
pub mod types;

pub use codec::{decode_event, encode_event};
pub use error::{ApplyError, CodecError, HostError};
pub use event::Event;
pub use host::{Host, RefreshTarget};
pub use local_types::{TypeCatalogue, TypePatch, TypeRecord};
pub use types::{Ea, RawData};
