//! CX: a declarative command-vector dispatch engine.
//!
//! A vector `entity:type:opac:function:command` is decoded, matched against
//! wildcard route patterns in a fixed priority order, handed to its handler,
//! and recorded in an append-only SQLite ledger. Links executed through the
//! [`engine::ExecutionEngine`] are additionally HMAC-verified and checked
//! against a role-based policy.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod logging;

pub mod vector;
pub mod link;
pub mod signature;
pub mod policy;

pub mod guard;
pub mod engine;
pub mod group;

pub mod ledger;
pub mod observer;
pub mod router;
pub mod plugins;
