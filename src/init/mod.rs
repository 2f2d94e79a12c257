// SPDX-License-Identifier: Apache-2.0

//! Command line and configuration file front end for the `rotel-tail` binary.

pub mod args;
pub mod config;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;
