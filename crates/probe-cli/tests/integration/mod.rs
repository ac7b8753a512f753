//! Integration tests for probe-cli.
//!
//! These tests verify the interaction between components:
//! - Feed adapter lifecycle against live mock servers
//! - End-to-end probe runs from window open to report

pub mod common;
