//! Host port allocation for SSH bindings.
//!
//! A port is "in use" while some container record references it; the
//! allocator adds an in-process reservation on top so concurrent creations
//! cannot collide before their records land in the store.

pub mod allocator;

pub use allocator::{PortAllocator, PortReservation, PortsExhausted, DEFAULT_PORT_RANGE};
