use crate::model::TargetRequirement;
use crate::test_info::MessageLevel;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

pub const DEFAULT_TEST_DIR: &str = "./test_results";

/// How much of each configuration's log is printed after the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Verbosity {
    /// Just top level errors
    Minimal,
    /// Top level errors and warnings
    Normal,
    /// All errors and warnings
    Verbose,
    /// Everything
    All,
}

impl Verbosity {
    /// Message threshold and subtest depth used when rendering a `TestInfo`
    pub fn render_settings(self) -> (MessageLevel, Option<usize>) {
        match self {
            Verbosity::Minimal => (MessageLevel::Failure, Some(0)),
            Verbosity::Normal | Verbosity::Verbose => (MessageLevel::Warning, None),
            Verbosity::All => (MessageLevel::Info, None),
        }
    }
}

/// Matches `TargetRequirement` one to one, kept separate so the model stays free of clap
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TargetRequiredArg {
    WhenNoFunctionalTests,
    WhenFunctionalTests,
    Always,
    Never,
}

impl From<TargetRequiredArg> for TargetRequirement {
    fn from(value: TargetRequiredArg) -> Self {
        match value {
            TargetRequiredArg::WhenNoFunctionalTests => TargetRequirement::WhenNoFunctionalTests,
            TargetRequiredArg::WhenFunctionalTests => TargetRequirement::WhenFunctionalTests,
            TargetRequiredArg::Always => TargetRequirement::Always,
            TargetRequiredArg::Never => TargetRequirement::Never,
        }
    }
}

// daptest - DAPLink 验证与测试工具
#[derive(Parser, Debug)]
#[clap(
    name = "daptest",
    version,
    about = "DAPLink validation and testing tool",
    after_help = "EXAMPLES:\n  Test everything in the inventory:\n    daptest --inventory daptest.toml\n\n  Test a single firmware on the first board of each type:\n    daptest --firmware k20dx_frdmk64f_if --testfirst\n\n  Verify the USB endpoints of boards that already run the firmware:\n    daptest --noloadif"
)]
pub struct CliArgs {
    // Inventory file - Firmware, boards, targets and tool commands
    // 清单文件 - 固件、开发板、目标镜像以及工具命令
    #[clap(short = 'i', long = "inventory", default_value = "daptest.toml", help = "Inventory file describing firmware, boards, targets and tools")]
    pub inventory: PathBuf,

    // Target directory - Base directory for target test images
    // 目标目录 - 目标测试镜像所在目录
    #[clap(long = "targetdir", help = "Directory with pre-built target test images")]
    pub targetdir: Option<PathBuf>,

    // Firmware directory - Base directory for firmware images
    // 固件目录 - 待测固件镜像所在目录
    #[clap(long = "firmwaredir", help = "Directory with firmware images to test")]
    pub firmwaredir: Option<PathBuf>,

    // Firmware filter - Only test the named interface firmware
    // 固件筛选 - 仅测试指定名称的接口固件
    #[clap(long = "firmware", help = "Firmware to test (repeatable)")]
    pub firmware: Vec<String>,

    // Log directory - Where test results are written
    // 日志目录 - 测试结果输出目录
    #[clap(long = "logdir", default_value = DEFAULT_TEST_DIR, help = "Directory to log test results to")]
    pub logdir: PathBuf,

    #[clap(long = "noloadif", help = "Skip load step for interface")]
    pub noloadif: bool,

    #[clap(long = "notestendpt", help = "Dont test the interface USB endpoints")]
    pub notestendpt: bool,

    #[clap(long = "loadbl", help = "Load bootloader before test")]
    pub loadbl: bool,

    #[clap(long = "testdl", help = "Run DAPLink specific tests. The DAPLink test tests bootloader updates so use with caution")]
    pub testdl: bool,

    #[clap(long = "testfirst", help = "If multiple boards of the same type are found only test the first one")]
    pub testfirst: bool,

    // Target requirement - When a target image must exist for a firmware to be tested
    // 目标要求 - 何时要求固件必须有对应的目标镜像
    #[clap(long = "target-required", value_enum, default_value = "when-no-functional-tests", help = "When a target image is required to test a firmware")]
    pub target_required: TargetRequiredArg,

    #[clap(long = "verbose", value_enum, default_value = "normal", help = "Verbose output")]
    pub verbose: Verbosity,

    #[clap(long = "dryrun", help = "Print info on configurations but dont actually run tests")]
    pub dryrun: bool,

    #[clap(long = "force", help = "Try to run tests even if there are problems. Delete logs from previous run")]
    pub force: bool,
}

impl CliArgs {
    /// Parse command line arguments
    /// 解析命令行参数
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Whether the firmware filter was given explicitly
    /// 是否显式指定了固件
    pub fn firmware_explicitly_specified(&self) -> bool {
        !self.firmware.is_empty()
    }
}
