//! Core records shared by the resolver, the run manager and the executor.
//!
//! Firmware, boards and targets come out of the registries and never change once
//! resolution starts. Test configurations are only ever built by
//! [`crate::resolver::resolve`].

use crate::test_info::TestInfo;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

/// Identifier of a board family, used to join firmware, boards and target images.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BoardId(pub String);

/// Identifier of a hardware interface circuit, used to join interface firmware to its bootloader.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HicId(pub String);

impl fmt::Display for BoardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for HicId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BoardId {
    fn from(value: &str) -> Self {
        BoardId(value.to_string())
    }
}

impl From<&str> for HicId {
    fn from(value: &str) -> Self {
        HicId(value.to_string())
    }
}

/// The two kinds of firmware image a bundle can contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FirmwareKind {
    Bootloader,
    Interface,
}

impl fmt::Display for FirmwareKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FirmwareKind::Bootloader => f.write_str("bootloader"),
            FirmwareKind::Interface => f.write_str("interface"),
        }
    }
}

/// A firmware image from the firmware registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Firmware {
    /// Unique within its kind, e.g. `k20dx_frdmk64f_if`.
    pub name: String,
    pub kind: FirmwareKind,
    /// Board family the image is built for. Bootloaders are not tied to a board.
    pub board_id: Option<BoardId>,
    pub hic_id: HicId,
    pub image_path: PathBuf,
}

impl Firmware {
    pub fn interface(name: &str, board_id: &str, hic_id: &str, image_path: impl AsRef<Path>) -> Self {
        Firmware {
            name: name.to_string(),
            kind: FirmwareKind::Interface,
            board_id: Some(BoardId::from(board_id)),
            hic_id: HicId::from(hic_id),
            image_path: image_path.as_ref().to_path_buf(),
        }
    }

    pub fn bootloader(name: &str, hic_id: &str, image_path: impl AsRef<Path>) -> Self {
        Firmware {
            name: name.to_string(),
            kind: FirmwareKind::Bootloader,
            board_id: None,
            hic_id: HicId::from(hic_id),
            image_path: image_path.as_ref().to_path_buf(),
        }
    }
}

impl fmt::Display for Firmware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Which firmware a board is currently running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoardMode {
    Bootloader,
    Interface,
}

impl fmt::Display for BoardMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BoardMode::Bootloader => f.write_str("bootloader"),
            BoardMode::Interface => f.write_str("interface"),
        }
    }
}

/// A physically attached board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Board {
    pub unique_id: String,
    pub name: Option<String>,
    pub board_id: BoardId,
    pub hic_id: HicId,
    pub mode: BoardMode,
}

impl Board {
    pub fn new(unique_id: &str, board_id: &str, hic_id: &str) -> Self {
        Board {
            unique_id: unique_id.to_string(),
            name: None,
            board_id: BoardId::from(board_id),
            hic_id: HicId::from(hic_id),
            mode: BoardMode::Interface,
        }
    }

    /// Display name, falling back to the unique id.
    pub fn name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.unique_id)
    }
}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Reference application image for a board family.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Target {
    pub board_id: BoardId,
    pub hex_path: PathBuf,
    pub bin_path: PathBuf,
}

impl Target {
    pub fn new(board_id: &str, hex_path: impl AsRef<Path>, bin_path: impl AsRef<Path>) -> Self {
        Target {
            board_id: BoardId::from(board_id),
            hex_path: hex_path.as_ref().to_path_buf(),
            bin_path: bin_path.as_ref().to_path_buf(),
        }
    }

    pub fn name(&self) -> String {
        self.hex_path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| self.board_id.to_string())
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// When a resolved firmware must also have a target image.
///
/// The default keeps the rule the tool has always used: a target is demanded
/// exactly when neither the DAPLink nor the endpoint tests will run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TargetRequirement {
    #[default]
    WhenNoFunctionalTests,
    WhenFunctionalTests,
    Always,
    Never,
}

/// Policy toggles that decide which joins are required and which steps run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolverPolicy {
    pub only_first_board: bool,
    pub load_interface: bool,
    pub load_bootloader: bool,
    pub run_daplink_tests: bool,
    pub run_endpoint_tests: bool,
    pub target_requirement: TargetRequirement,
    /// Restrict resolution to these interface firmware names.
    pub firmware_name_filter: Option<BTreeSet<String>>,
}

impl Default for ResolverPolicy {
    fn default() -> Self {
        // By default test all configurations and boards
        ResolverPolicy {
            only_first_board: false,
            load_interface: true,
            load_bootloader: true,
            run_daplink_tests: true,
            run_endpoint_tests: true,
            target_requirement: TargetRequirement::default(),
            firmware_name_filter: None,
        }
    }
}

impl ResolverPolicy {
    pub fn target_required(&self) -> bool {
        let functional_tests = self.run_endpoint_tests || self.run_daplink_tests;
        match self.target_requirement {
            TargetRequirement::WhenNoFunctionalTests => !functional_tests,
            TargetRequirement::WhenFunctionalTests => functional_tests,
            TargetRequirement::Always => true,
            TargetRequirement::Never => false,
        }
    }

    pub fn bootloader_required(&self) -> bool {
        self.load_bootloader || self.run_daplink_tests
    }
}

/// One executable combination of interface firmware, board and optional extras.
#[derive(Debug, Clone)]
pub struct TestConfiguration {
    pub name: String,
    pub interface_firmware: Firmware,
    pub bootloader_firmware: Option<Firmware>,
    pub board: Board,
    pub target: Option<Target>,
    /// Filled in by the executor.
    pub result: Option<TestInfo>,
}

impl TestConfiguration {
    pub(crate) fn new(
        interface_firmware: &Firmware,
        bootloader_firmware: Option<&Firmware>,
        board: &Board,
        target: Option<&Target>,
    ) -> Self {
        TestConfiguration {
            name: format!("{} {}", interface_firmware.name, board.name()),
            interface_firmware: interface_firmware.clone(),
            bootloader_firmware: bootloader_firmware.cloned(),
            board: board.clone(),
            target: target.cloned(),
            result: None,
        }
    }

    /// `None` until the configuration has been run.
    pub fn passed(&self) -> Option<bool> {
        self.result.as_ref().map(TestInfo::passed)
    }
}

impl fmt::Display for TestConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn or_none<T: fmt::Display>(value: Option<&T>) -> String {
            value.map_or_else(|| "<None>".to_string(), |v| v.to_string())
        }
        write!(
            f,
            "APP={} BL={} Board={} Target={}",
            self.interface_firmware,
            or_none(self.bootloader_firmware.as_ref()),
            self.board,
            or_none(self.target.as_ref())
        )
    }
}

/// Why an interface firmware could not be put into any configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UntestedReason {
    NoBoard,
    NoTarget,
    NoBootloader,
}

impl fmt::Display for UntestedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UntestedReason::NoBoard => f.write_str("no board to test"),
            UntestedReason::NoTarget => f.write_str("no target to test"),
            UntestedReason::NoBootloader => f.write_str("no bootloader to test"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UntestedFirmware {
    pub firmware: Firmware,
    pub reason: UntestedReason,
}

impl fmt::Display for UntestedFirmware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.firmware.name, self.reason)
    }
}
