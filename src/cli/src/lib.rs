//! a3s-offline CLI - keeps an offline mirror of container images current.

pub mod commands;
pub mod logging;
pub mod output;
