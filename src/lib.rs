//! Slim process interface (PSI) and safe-node (SN) boot/synchronization core
//! for a POWERLINK-based safety fieldbus slave.
//!
//! This crate connects an application processor (AP) to a POWERLINK
//! communication processor (PCP) through the shared-memory triple-buffer
//! transport ([`tbuf`], [`stream`]) and its sub-channels ([`pdo`], [`cc`],
//! [`ssdo`], [`logbook`]), and, for safety variants, coordinates the two
//! redundant processors of an openSAFETY safety node through the dual-
//! processor boot protocol ([`sn`]) and the consecutive-time/cycle-
//! monitoring services ([`constime`], [`cyclemon`]).
//!
//! See `DESIGN.md` in the repository root for the grounding of each module
//! against the original sources this crate's specification was distilled
//! from.
#![cfg_attr(not(test), no_std)]
#![deny(unsafe_code)]

pub mod cc;
pub mod codec;
pub mod config;
pub mod constime;
pub mod cyclemon;
pub mod error;
pub mod fifo;
pub mod framework;
pub mod logbook;
pub mod nvs;
pub mod pdo;
pub mod platform;
pub mod seqnr;
pub mod sn;
pub mod ssdo;
pub mod status;
pub mod stream;
pub mod tbuf;
