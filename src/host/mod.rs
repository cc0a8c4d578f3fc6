//! Host matching: pattern normalization and page identity.

pub mod page;
pub mod pattern;
