//! Tracks how long each website stays in the foreground of the browser.
//!
//! The browser extension reports tab and idle events to a native messaging host, which runs the
//! [tracker::Tracker] accounting engine and persists per day, per domain totals. The cli reads the
//! same state to print reports.

pub mod cli;
pub mod host;
pub mod storage;
pub mod tracker;
pub mod utils;
