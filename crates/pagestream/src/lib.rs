//! Cursor-based paging as a single backpressure-aware sequence.
//!
//! Many data sources can only be read a page at a time, where each page is
//! addressed by the last item of the previous one (keyset pagination). A
//! [`PagingPublisher`] hides that loop: give it an initial cursor supplier and
//! a [`PageGenerator`], and it emits every item of every page, in order, only
//! as fast as the subscriber asks for them. The sequence ends when a page
//! comes back empty.
//!
//! The crate is built around a small pull-based signal protocol
//! ([`Publisher`], [`Subscriber`], [`Subscription`]). Pages are publishers
//! too, so any source can act as a page; [`page`] has in-memory ones.
//!
//! ## Features
//!
//! - `futures`: [`PublisherStreamExt`] to consume any publisher as a
//!   `futures::Stream`.
//! - `async-tokio`: [`StreamPage`], a page backed by an async stream and driven
//!   on a Tokio runtime. Implies `futures`.
//! - `tracing`: emits `tracing` events for page fetches and terminal signals.
#![cfg_attr(docsrs, feature(doc_cfg))]

mod error;
mod flow;
#[cfg(feature = "futures")]
mod futures;
pub mod page;
mod paging;

pub use crate::error::*;
pub use crate::flow::*;
#[cfg(feature = "futures")]
pub use crate::futures::*;
pub use crate::paging::*;
