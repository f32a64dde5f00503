//! CRPT API - Rate-Limited Document Submission Client
//!
//! This crate implements a client for a remote document-submission endpoint.
//! Every outbound request passes through a fixed-window [`RateLimiter`] that
//! admits at most N requests per interval and makes excess callers wait for
//! the next window instead of rejecting them.
//!
//! [`RateLimiter`]: ratelimit::RateLimiter

pub mod client;
pub mod config;
pub mod error;
pub mod ratelimit;
