//! daptest: resolves firmware, boards and target images into test
//! configurations and runs them against a bench of DAPLink boards.

pub mod config;
pub mod error;
pub mod executor;
pub mod manager;
pub mod model;
pub mod reporter;
pub mod resolver;
pub mod test_info;
pub mod toolchain;
pub mod utils;
