//! 基于外部命令的测试台实现
//!
//! `CommandHarness` implements the loader and tester traits by running the shell
//! commands configured in the inventory's `[tools]` table. Commands can use these
//! placeholders:
//!
//! | placeholder | value |
//! |---|---|
//! | `{{ board }}` | board display name |
//! | `{{ unique_id }}` | board unique id |
//! | `{{ board_id }}` | board id |
//! | `{{ hic_id }}` | board HIC id |
//! | `{{ image }}` | image being loaded (load commands) |
//! | `{{ mode }}` | requested mode (`set_mode`) |
//! | `{{ enabled }}` | `true`/`false` (`check_fs_on_remount`) |
//! | `{{ firmware }}` | interface firmware name (test commands) |
//! | `{{ bootloader }}` | bootloader firmware name or empty (test commands) |
//! | `{{ target_hex }}`, `{{ target_bin }}` | target image paths or empty (test commands) |

use crate::config::tools_config::ToolsConfig;
use crate::executor::{BoardLoader, DaplinkTester, EndpointTester};
use crate::model::{Board, BoardMode, TestConfiguration};
use crate::utils::{replace_placeholders, run_command};
use anyhow::{anyhow, bail, Result};
use log::{debug, info};
use std::collections::HashMap;
use std::path::Path;

/// 通过本地命令驱动开发板
pub struct CommandHarness {
    tools: ToolsConfig,
}

impl CommandHarness {
    pub fn new(tools: ToolsConfig) -> Self {
        CommandHarness { tools }
    }

    /// 执行一个工具命令，非零退出码或超时视为失败
    fn run_tool(&self, step: &str, template: &str, vars: &HashMap<&str, String>) -> Result<()> {
        let command = replace_placeholders(template, vars)?;
        info!("{step}: {command}");
        let output = run_command(&command, self.tools.timeout)?;
        if !output.stdout.is_empty() {
            debug!("{step} stdout:\n{}", output.stdout);
        }
        if output.timed_out {
            bail!("{step} timed out after {:?}", self.tools.timeout);
        }
        if !output.success() {
            bail!(
                "{step} exited with code {}: {}",
                output.exit_code,
                output.stderr.trim()
            );
        }
        Ok(())
    }

    fn required<'a>(command: &'a Option<String>, step: &str) -> Result<&'a str> {
        command
            .as_deref()
            .ok_or_else(|| anyhow!("no command configured for {step}"))
    }
}

fn board_vars(board: &Board) -> HashMap<&'static str, String> {
    HashMap::from([
        ("board", board.name().to_string()),
        ("unique_id", board.unique_id.clone()),
        ("board_id", board.board_id.to_string()),
        ("hic_id", board.hic_id.to_string()),
    ])
}

fn configuration_vars(configuration: &TestConfiguration) -> HashMap<&'static str, String> {
    let mut vars = board_vars(&configuration.board);
    vars.insert("firmware", configuration.interface_firmware.name.clone());
    vars.insert(
        "bootloader",
        configuration
            .bootloader_firmware
            .as_ref()
            .map(|bl| bl.name.clone())
            .unwrap_or_default(),
    );
    let (hex, bin) = configuration
        .target
        .as_ref()
        .map(|t| {
            (
                t.hex_path.display().to_string(),
                t.bin_path.display().to_string(),
            )
        })
        .unwrap_or_default();
    vars.insert("target_hex", hex);
    vars.insert("target_bin", bin);
    vars
}

impl BoardLoader for CommandHarness {
    fn load_interface(&mut self, board: &Board, image: &Path) -> Result<()> {
        let template = Self::required(&self.tools.load_interface, "load_interface")?;
        let mut vars = board_vars(board);
        vars.insert("image", image.display().to_string());
        self.run_tool("load_interface", template, &vars)
    }

    fn load_bootloader(&mut self, board: &Board, image: &Path) -> Result<()> {
        let template = Self::required(&self.tools.load_bootloader, "load_bootloader")?;
        let mut vars = board_vars(board);
        vars.insert("image", image.display().to_string());
        self.run_tool("load_bootloader", template, &vars)
    }

    fn set_check_fs_on_remount(&mut self, board: &Board, enabled: bool) -> Result<()> {
        let Some(template) = self.tools.check_fs_on_remount.as_deref() else {
            debug!("check_fs_on_remount not configured, skipping for {}", board);
            return Ok(());
        };
        let mut vars = board_vars(board);
        vars.insert("enabled", enabled.to_string());
        self.run_tool("check_fs_on_remount", template, &vars)
    }

    fn set_mode(&mut self, board: &Board, mode: BoardMode) -> Result<()> {
        let template = Self::required(&self.tools.set_mode, "set_mode")?;
        let mut vars = board_vars(board);
        vars.insert("mode", mode.to_string());
        self.run_tool("set_mode", template, &vars)
    }
}

impl DaplinkTester for CommandHarness {
    fn test_daplink(&mut self, configuration: &TestConfiguration) -> Result<()> {
        let template = Self::required(&self.tools.daplink_test, "daplink_test")?;
        self.run_tool("daplink_test", template, &configuration_vars(configuration))
    }
}

impl EndpointTester for CommandHarness {
    fn test_hid(&mut self, configuration: &TestConfiguration) -> Result<()> {
        let template = Self::required(&self.tools.hid_test, "hid_test")?;
        self.run_tool("hid_test", template, &configuration_vars(configuration))
    }

    fn test_serial(&mut self, configuration: &TestConfiguration) -> Result<()> {
        let template = Self::required(&self.tools.serial_test, "serial_test")?;
        self.run_tool("serial_test", template, &configuration_vars(configuration))
    }

    fn test_mass_storage(&mut self, configuration: &TestConfiguration) -> Result<()> {
        let template = Self::required(&self.tools.msd_test, "msd_test")?;
        self.run_tool("msd_test", template, &configuration_vars(configuration))
    }
}
