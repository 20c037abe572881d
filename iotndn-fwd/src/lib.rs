//! Embedded NDN forwarding engine.
//!
//! A [`Forwarder`] owns fixed-capacity tables sized once from a
//! [`ForwarderConfig`]: the shared [`NameTree`], the [`Fib`], the [`Pit`] and
//! the [`FaceTable`]. Everything runs on the caller's thread; timeouts and
//! scheduled tasks fire only from [`Forwarder::process`].

pub mod clock;
pub mod config;
pub mod error;
pub mod face;
pub mod face_set;
pub mod fib;
pub mod forwarder;
pub mod name_tree;
pub mod pit;
pub mod scheduler;
pub mod slots;
pub mod stats;

pub use clock::{Clock, ManualClock, MonotonicClock};
pub use config::{ConfigError, ForwarderConfig};
pub use error::{ForwarderError, Outcome, Result};
pub use face::{Face, FaceError, FaceHandle, FaceId, FaceTable, MemoryFace, Registration};
pub use face_set::{FaceSet, FACE_SET_WIDTH};
pub use fib::{Fib, InterestHandler, Strategy};
pub use forwarder::Forwarder;
pub use name_tree::NameTree;
pub use pit::{Consumer, Pit};
pub use stats::ForwarderStats;
