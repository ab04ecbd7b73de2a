//! Bastion Events
//!
//! Every observable state change is published as a [`BastionEvent`] on the
//! process-wide [`EventBus`]. Payload shapes are checked at compile time;
//! subscribers that fall behind lose the oldest events (they lag), publishers
//! never block.

mod bus;
mod event;

pub use bus::EventBus;
pub use event::BastionEvent;
