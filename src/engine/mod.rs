//! Engine modules: the planner that turns desired partitions into a layout.
//!
//! The engine sits between the request (what the profile asks for) and the
//! executor (which partitions to create, shrink, reuse or delete). Data flows
//! leaves first:
//!
//! `sizing` → `gaps` → `search` (with `distribute` and `score`) → `select` →
//! `materialize`
//!
//! Everything here is pure: no I/O, deterministic for identical input.

pub mod distribute;
pub mod gaps;
pub mod materialize;
pub mod score;
pub mod search;
pub mod select;
pub mod sizing;
