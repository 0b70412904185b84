//! Configuration: command line arguments, the inventory file and tool commands.

pub mod cli_args;
pub mod inventory_config;
pub mod tools_config;
