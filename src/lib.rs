//! Tollgate - Visitor Identification and Distributed Rate Limiting
//!
//! This crate assigns a stable anonymous identity to an otherwise
//! unauthenticated client and enforces a per-identity usage quota over a
//! rolling time window, backed by a shared remote key-value store. The
//! coordinator fails open: store outages never lock visitors out.

pub mod config;
pub mod error;
pub mod http;
pub mod ratelimit;
pub mod store;
pub mod visitor;
