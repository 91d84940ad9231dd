//! Asimov - gesture-driven person-following controller for a wheeled base.
//!
//! Skeleton frames flow from a [`sensor::SkeletonSource`] through the
//! [`pipeline::Pipeline`]: the person locator and every gesture see each
//! frame, then the mode controller turns it into actuator commands.

pub mod actuator;
pub mod config;
pub mod events;
pub mod geometry;
pub mod gesture;
pub mod ipc;
pub mod locator;
pub mod mode;
pub mod pipeline;
pub mod sensor;
pub mod sexp;
pub mod skeleton;
