//! Motion Server
//!
//! The trajectory pipeline: per-group state, the bounded increment queue,
//! the cubic-Hermite interpolator, the trajectory validator, the motion
//! control state machine, the realtime dispatcher, and the connection-slot
//! controller that ties them together.
//!
//! # Module Structure
//!
//! - [`primitives`] - `MotionPrimitives` trait and its in-memory simulation
//! - [`group`] - per-group trajectory and geometry state
//! - [`queue`] - the bounded increment queue
//! - [`interpolator`] - cubic-Hermite segment stepping
//! - [`validator`] - per-point admission checks
//! - [`handler`] - motion control sub-commands and the trajectory-mode state machine
//! - [`dispatcher`] - the realtime dispatch loop
//! - [`controller`] - the process-wide singleton tying every task together

pub mod controller;
pub mod dispatcher;
pub mod group;
pub mod handler;
pub mod interpolator;
pub mod primitives;
pub mod queue;
pub mod validator;
