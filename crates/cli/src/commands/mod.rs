//! CLI subcommands.

pub mod migrate;
pub mod publish;
pub mod warm_check;
