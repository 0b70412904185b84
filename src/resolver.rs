//! Configuration resolver.
//!
//! Joins interface firmware to attached boards by board id, to target images by
//! board id and to bootloaders by HIC id. Every filtered interface firmware ends
//! up either in one or more configurations or in the untested list, never both.

use crate::error::ConfigurationError;
use crate::model::{
    Board, BoardId, Firmware, FirmwareKind, HicId, ResolverPolicy, Target, TestConfiguration,
    UntestedFirmware, UntestedReason,
};
use crate::test_info::TestInfo;
use std::collections::{HashMap, HashSet};

/// Output of a successful resolution.
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    /// Firmware order, then board discovery order.
    pub configurations: Vec<TestConfiguration>,
    /// Firmware order.
    pub untested: Vec<UntestedFirmware>,
}

/// Resolve the registries into test configurations under `policy`.
///
/// Decisions and warnings are recorded into `log`.
///
/// # Errors
///
/// Returns a [`ConfigurationError`] for duplicate targets, duplicate bootloaders,
/// duplicate firmware names or filter names missing from the interface firmware.
pub fn resolve(
    firmware: &[Firmware],
    boards: &[Board],
    targets: &[Target],
    policy: &ResolverPolicy,
    log: &mut TestInfo,
) -> Result<Resolution, ConfigurationError> {
    let board_groups = group_boards(boards, policy.only_first_board, log);
    let target_by_board = index_targets(targets)?;
    let (bootloaders, interfaces) = split_firmware(firmware, policy, log)?;
    let bootloader_by_hic = index_bootloaders(&bootloaders)?;

    let target_required = policy.target_required();
    let bootloader_required = policy.bootloader_required();

    let mut resolution = Resolution::default();
    for fw in interfaces {
        // Check if there is a board to test this firmware
        let Some(group) = fw.board_id.as_ref().and_then(|id| board_groups.get(id)) else {
            log.info(format!("No board to test firmware {}", fw.name));
            resolution.untested.push(untested(fw, UntestedReason::NoBoard));
            continue;
        };

        let target = fw.board_id.as_ref().and_then(|id| target_by_board.get(id).copied());
        if target.is_none() && target_required {
            log.info(format!("No target to test firmware {}", fw.name));
            resolution.untested.push(untested(fw, UntestedReason::NoTarget));
            continue;
        }

        let bootloader = bootloader_by_hic.get(&fw.hic_id).copied();
        if bootloader.is_none() && bootloader_required {
            log.info(format!("No bootloader to test firmware {}", fw.name));
            resolution.untested.push(untested(fw, UntestedReason::NoBootloader));
            continue;
        }

        for board in group {
            if fw.hic_id != board.hic_id {
                log.warning(format!(
                    "FW HIC ID {} != Board HIC ID {} ({} on {})",
                    fw.hic_id,
                    board.hic_id,
                    fw.name,
                    board.name()
                ));
            }
            // Bootloaders are looked up by HIC id, so this only fires if the
            // lookup key ever changes
            if let Some(bl) = bootloader {
                if fw.hic_id != bl.hic_id {
                    log.warning(format!(
                        "FW HIC ID {} != BL HIC ID {} ({} with {})",
                        fw.hic_id, bl.hic_id, fw.name, bl.name
                    ));
                }
            }
            resolution
                .configurations
                .push(TestConfiguration::new(fw, bootloader, board, target));
        }
    }

    Ok(resolution)
}

fn untested(firmware: &Firmware, reason: UntestedReason) -> UntestedFirmware {
    UntestedFirmware {
        firmware: firmware.clone(),
        reason,
    }
}

/// Map each board id to its boards in discovery order.
fn group_boards<'a>(
    boards: &'a [Board],
    only_first: bool,
    log: &mut TestInfo,
) -> HashMap<&'a BoardId, Vec<&'a Board>> {
    let mut groups: HashMap<&BoardId, Vec<&Board>> = HashMap::new();
    for board in boards {
        let group = groups.entry(&board.board_id).or_default();
        if only_first && !group.is_empty() {
            log.info(format!(
                "Ignoring extra board {} of type {}",
                board.name(),
                board.board_id
            ));
            continue;
        }
        group.push(board);
    }
    groups
}

fn index_targets(targets: &[Target]) -> Result<HashMap<&BoardId, &Target>, ConfigurationError> {
    let mut by_board = HashMap::new();
    for target in targets {
        if by_board.insert(&target.board_id, target).is_some() {
            return Err(ConfigurationError::DuplicateTarget {
                board_id: target.board_id.clone(),
            });
        }
    }
    Ok(by_board)
}

/// Split into bootloaders and filtered interface firmware.
fn split_firmware<'a>(
    firmware: &'a [Firmware],
    policy: &ResolverPolicy,
    log: &mut TestInfo,
) -> Result<(Vec<&'a Firmware>, Vec<&'a Firmware>), ConfigurationError> {
    let mut seen: HashSet<(FirmwareKind, &str)> = HashSet::new();
    let mut bootloaders = Vec::new();
    let mut interfaces = Vec::new();

    for fw in firmware {
        if !seen.insert((fw.kind, fw.name.as_str())) {
            return Err(ConfigurationError::DuplicateFirmware {
                name: fw.name.clone(),
                kind: fw.kind,
            });
        }
        match fw.kind {
            FirmwareKind::Bootloader => bootloaders.push(fw),
            FirmwareKind::Interface => {
                let selected = policy
                    .firmware_name_filter
                    .as_ref()
                    .is_none_or(|filter| filter.contains(&fw.name));
                if selected {
                    interfaces.push(fw);
                }
            }
        }
    }

    // Explicitly requested firmware must be present
    if let Some(filter) = &policy.firmware_name_filter {
        let found: HashSet<&str> = interfaces.iter().map(|fw| fw.name.as_str()).collect();
        let missing: Vec<String> = filter
            .iter()
            .filter(|name| !found.contains(name.as_str()))
            .cloned()
            .collect();
        if !missing.is_empty() {
            for name in &missing {
                log.failure(format!("Cannot find firmware {name}"));
            }
            return Err(ConfigurationError::UnknownFirmware { missing });
        }
    }

    Ok((bootloaders, interfaces))
}

fn index_bootloaders<'a>(
    bootloaders: &[&'a Firmware],
) -> Result<HashMap<&'a HicId, &'a Firmware>, ConfigurationError> {
    let mut by_hic: HashMap<&HicId, &Firmware> = HashMap::new();
    for &bl in bootloaders {
        if let Some(first) = by_hic.insert(&bl.hic_id, bl) {
            return Err(ConfigurationError::DuplicateBootloader {
                hic_id: bl.hic_id.clone(),
                first: first.name.clone(),
                second: bl.name.clone(),
            });
        }
    }
    Ok(by_hic)
}
