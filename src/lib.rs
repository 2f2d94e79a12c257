// SPDX-License-Identifier: Apache-2.0

pub mod bounded_channel;
pub mod init;
pub mod ratelimiter;
pub mod supervisor;
pub mod tail;

pub use tail::{Line, Location, Tail, TailConfig};
