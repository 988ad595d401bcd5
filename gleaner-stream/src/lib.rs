//! Push listener over a websocket.
//!
//! [`Subscription`] connects, sends opening frames and delivers every text
//! frame to one consumer through a bounded queue. [`frame`] decodes the
//! Socket.IO-style event frames and turns answer events into
//! [`StructuredAnswer`](gleaner_common::StructuredAnswer)s.

pub mod frame;
pub mod subscription;

pub use frame::{answer_from_event, event_frame, query_frame, Frame};
pub use subscription::{MonitorEnd, MonitorSummary, StreamError, Subscription};
