//! Represents the inventory of firmware images, attached boards and target images.
//!
//! The inventory is a TOML file deserialized with `utils::read_toml_from_file`:
//!
//! ```toml
//! [[firmware]]
//! name = "k20dx_frdmk64f_if"
//! kind = "interface"
//! board_id = "0240"
//! hic_id = "97969900"
//! image = "k20dx_frdmk64f_if_crc.hex"
//!
//! [[board]]
//! unique_id = "0240000032044e4500257009997b00386781000097969900"
//! board_id = "0240"
//! hic_id = "97969900"
//!
//! [[target]]
//! board_id = "0240"
//! hex = "k64f.hex"
//! bin = "k64f.bin"
//!
//! [tools]
//! hid_test = "python hid_test.py {{ unique_id }}"
//! ```
//!
//! Relative image paths are resolved against the firmware/target directories given
//! on the command line, or the directory holding the inventory file.

use crate::config::tools_config::ToolsConfig;
use crate::model::{Board, BoardId, BoardMode, Firmware, FirmwareKind, HicId, Target};
use crate::utils;
use anyhow::{bail, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct FirmwareEntry {
    pub name: String,
    pub kind: FirmwareKind,
    #[serde(default)]
    pub board_id: Option<BoardId>,
    pub hic_id: HicId,
    pub image: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BoardEntry {
    pub unique_id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub board_id: BoardId,
    pub hic_id: HicId,
    #[serde(default = "default_mode")]
    pub mode: BoardMode,
}

fn default_mode() -> BoardMode {
    BoardMode::Interface
}

#[derive(Debug, Deserialize, Clone)]
pub struct TargetEntry {
    pub board_id: BoardId,
    pub hex: PathBuf,
    pub bin: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct InventoryConfig {
    #[serde(default)]
    pub firmware: Vec<FirmwareEntry>,
    #[serde(default, rename = "board")]
    pub boards: Vec<BoardEntry>,
    #[serde(default, rename = "target")]
    pub targets: Vec<TargetEntry>,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(skip)]
    path: PathBuf,
}

fn rebase(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

impl InventoryConfig {
    /// 从文件中读取
    pub fn from_file(path: &Path) -> Result<Self> {
        let mut config: Self = utils::read_toml_from_file(path)?;
        config.path = path.to_path_buf();
        Ok(config)
    }

    /// Directory holding the inventory file.
    pub fn base_dir(&self) -> &Path {
        self.path.parent().unwrap_or(Path::new("."))
    }

    /// Firmware records with image paths resolved against `firmware_dir`.
    ///
    /// Interface firmware must name its board id.
    pub fn firmware_list(&self, firmware_dir: Option<&Path>) -> Result<Vec<Firmware>> {
        let base = firmware_dir.unwrap_or(self.base_dir());
        let mut list = Vec::with_capacity(self.firmware.len());
        for entry in &self.firmware {
            if entry.kind == FirmwareKind::Interface && entry.board_id.is_none() {
                bail!("Interface firmware {} has no board_id", entry.name);
            }
            list.push(Firmware {
                name: entry.name.clone(),
                kind: entry.kind,
                board_id: entry.board_id.clone(),
                hic_id: entry.hic_id.clone(),
                image_path: rebase(base, &entry.image),
            });
        }
        Ok(list)
    }

    pub fn board_list(&self) -> Vec<Board> {
        self.boards
            .iter()
            .map(|entry| Board {
                unique_id: entry.unique_id.clone(),
                name: entry.name.clone(),
                board_id: entry.board_id.clone(),
                hic_id: entry.hic_id.clone(),
                mode: entry.mode,
            })
            .collect()
    }

    /// Target records with image paths resolved against `target_dir`.
    pub fn target_list(&self, target_dir: Option<&Path>) -> Vec<Target> {
        let base = target_dir.unwrap_or(self.base_dir());
        self.targets
            .iter()
            .map(|entry| Target {
                board_id: entry.board_id.clone(),
                hex_path: rebase(base, &entry.hex),
                bin_path: rebase(base, &entry.bin),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const INVENTORY: &str = r#"
[[firmware]]
name = "k20dx_bl"
kind = "bootloader"
hic_id = "97969900"
image = "k20dx_bl.hex"

[[firmware]]
name = "k20dx_frdmk64f_if"
kind = "interface"
board_id = "0240"
hic_id = "97969900"
image = "/abs/k20dx_frdmk64f_if.hex"

[[board]]
unique_id = "0240000032044e45"
name = "frdm-k64f"
board_id = "0240"
hic_id = "97969900"
mode = "bootloader"

[[board]]
unique_id = "0240000032044e46"
board_id = "0240"
hic_id = "97969900"

[[target]]
board_id = "0240"
hex = "k64f.hex"
bin = "k64f.bin"

[tools]
hid_test = "true"
timeout = "10s"
"#;

    #[test]
    fn test_load_inventory() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("daptest.toml");
        std::fs::write(&path, INVENTORY).unwrap();

        let inventory = InventoryConfig::from_file(&path).unwrap();
        assert_eq!(inventory.base_dir(), dir.path());

        let firmware = inventory.firmware_list(None).unwrap();
        assert_eq!(firmware.len(), 2);
        assert_eq!(firmware[0].kind, FirmwareKind::Bootloader);
        assert_eq!(firmware[0].board_id, None);
        assert_eq!(firmware[0].image_path, dir.path().join("k20dx_bl.hex"));
        assert_eq!(firmware[1].image_path, PathBuf::from("/abs/k20dx_frdmk64f_if.hex"));

        let boards = inventory.board_list();
        assert_eq!(boards[0].mode, BoardMode::Bootloader);
        assert_eq!(boards[0].name(), "frdm-k64f");
        assert_eq!(boards[1].mode, BoardMode::Interface);
        assert_eq!(boards[1].name(), "0240000032044e46");

        let targets = inventory.target_list(Some(Path::new("/targets")));
        assert_eq!(targets[0].hex_path, PathBuf::from("/targets/k64f.hex"));
        assert_eq!(inventory.tools.hid_test.as_deref(), Some("true"));
    }

    #[test]
    fn test_interface_without_board_id_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("daptest.toml");
        std::fs::write(
            &path,
            r#"
[[firmware]]
name = "orphan_if"
kind = "interface"
hic_id = "97969900"
image = "orphan_if.hex"
"#,
        )
        .unwrap();

        let inventory = InventoryConfig::from_file(&path).unwrap();
        let err = inventory.firmware_list(None).unwrap_err();
        assert!(err.to_string().contains("orphan_if"));
    }
}
