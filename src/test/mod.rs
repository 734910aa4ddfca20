//! Shared fixtures for the unit tests
pub(crate) mod corelib;

pub(crate) use corelib::*;
