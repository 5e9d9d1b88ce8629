//! Timeline propagation.
//!
//! # Responsibility
//! - Decide which related todos move after an interval change, and by how
//!   much.
//! - Seed children of repeated todos at creation.

pub mod propagator;
pub mod repeat;
