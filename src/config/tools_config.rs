//! 外部工具命令配置
//!
//! Each entry is a shell command run by [`crate::toolchain::CommandHarness`].
//! Commands may use `{{ name }}` placeholders, see the harness for the list.
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct ToolsConfig {
    #[serde(default)]
    pub load_interface: Option<String>,
    #[serde(default)]
    pub load_bootloader: Option<String>,
    /// 可选，未配置时视为成功
    #[serde(default)]
    pub check_fs_on_remount: Option<String>,
    #[serde(default)]
    pub set_mode: Option<String>,
    #[serde(default)]
    pub daplink_test: Option<String>,
    #[serde(default)]
    pub hid_test: Option<String>,
    #[serde(default)]
    pub serial_test: Option<String>,
    #[serde(default)]
    pub msd_test: Option<String>,
    /// 单条命令的超时时间
    #[serde(with = "humantime_serde", default = "default_timeout")]
    pub timeout: Duration,
}

fn default_timeout() -> Duration {
    Duration::from_secs(300) // 5 minutes
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            load_interface: None,
            load_bootloader: None,
            check_fs_on_remount: None,
            set_mode: None,
            daplink_test: None,
            hid_test: None,
            serial_test: None,
            msd_test: None,
            timeout: default_timeout(),
        }
    }
}
