//! Motion Supervisor
//!
//! TCP listener, Session Manager, and Connection Reader that sit on top of
//! `motion_server`'s trajectory pipeline and turn it into a network service.
//!
//! # Module Structure
//!
//! - [`session`] - accept loop, connection-slot bookkeeping (§4.G)
//! - [`reader`] - per-connection framing and carry-over (§4.D)
//! - [`dispatch`] - msg_type routing into validator/handler/primitives (§4.E, §4.H)

pub mod dispatch;
pub mod reader;
pub mod session;
