//! WebSocket connection lifecycle, group membership, and broadcast fan-out.
//!
//! ## Submodules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `connection` | Per-connection state: identity, group, send channel |
//! | `registry` | Group name → member set; join/leave/snapshot |
//! | `dispatch` | Event fan-out to every member of a group |
//! | `session` | Handshake outcome → join → relay loop → teardown |
//!
//! ## Data Flow
//!
//! Upgrade handler resolves identity + group → `session` registers with
//! `registry` and publishes a join via `dispatch` → inbound frames are
//! republished to the group → teardown deregisters and publishes a leave.

pub mod connection;
pub mod dispatch;
pub mod registry;
pub mod session;
