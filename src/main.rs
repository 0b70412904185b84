use anyhow::{bail, Context, Result};
use daptest::config::cli_args::CliArgs;
use daptest::config::inventory_config::InventoryConfig;
use daptest::executor::BoardLoader;
use daptest::manager::TestManager;
use daptest::model::{Board, BoardMode};
use daptest::reporter::Reporter;
use daptest::test_info::{MessageLevel, TestInfo};
use daptest::toolchain::CommandHarness;
use daptest::utils;
use log::{debug, info, warn};
use std::fs;
use std::process::ExitCode;

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = CliArgs::parse_args();
    match run(&args) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

/// 将处于 bootloader 模式的开发板切换到接口模式，失败时仅告警
fn switch_to_interface_mode(harness: &mut CommandHarness, boards: &mut [Board]) {
    for board in boards.iter_mut().filter(|b| b.mode == BoardMode::Bootloader) {
        match harness.set_mode(board, BoardMode::Interface) {
            Ok(()) => board.mode = BoardMode::Interface,
            Err(e) => {
                println!("Unable to switch mode on bootloader board {board}: {e:#}");
                warn!("Unable to switch mode on bootloader board {board}");
            }
        }
    }
}

/// Returns whether every test passed.
fn run(args: &CliArgs) -> Result<bool> {
    let inventory = InventoryConfig::from_file(&args.inventory)?;
    let targets = inventory.target_list(args.targetdir.as_deref());
    if !args.notestendpt && targets.is_empty() {
        bail!("Target test images must be specified to test endpoints");
    }

    if args.logdir.exists() {
        if args.force {
            info!("删除旧的测试结果目录: {}", args.logdir.display());
            fs::remove_dir_all(&args.logdir)
                .with_context(|| format!("Failed to remove {}", args.logdir.display()))?;
        } else {
            bail!(
                "Test results directory \"{}\" already exists. Use --force to delete it",
                args.logdir.display()
            );
        }
    }

    let git_info = match utils::get_git_info(inventory.base_dir()) {
        Ok(git_info) => Some(git_info),
        Err(e) => {
            warn!("Unable to get git info: {e:#}");
            None
        }
    };

    let firmware = inventory.firmware_list(args.firmwaredir.as_deref())?;
    let mut boards = inventory.board_list();
    let mut harness = CommandHarness::new(inventory.tools.clone());
    switch_to_interface_mode(&mut harness, &mut boards);

    let mut manager = TestManager::new();
    manager.set_load_if(!args.noloadif)?;
    manager.set_test_ep(!args.notestendpt)?;
    manager.set_load_bl(args.loadbl)?;
    manager.set_test_daplink(args.testdl)?;
    manager.set_test_first_board_only(args.testfirst)?;
    manager.set_target_requirement(args.target_required.into())?;
    if args.firmware_explicitly_specified() {
        manager.set_firmware_filter(args.firmware.iter().cloned())?;
    }
    manager.add_firmware(firmware)?;
    manager.add_boards(boards)?;
    manager.add_targets(targets)?;

    let mut setup_log = TestInfo::new("DAPLink");
    manager.build_test_configurations(&mut setup_log)?;
    debug!("{}", setup_log.render(MessageLevel::Info, None));

    let configurations = manager.test_configurations()?;
    if configurations.is_empty() {
        println!("Nothing that can be tested");
        return Ok(false);
    }

    println!("Test configurations to be run:");
    for (index, configuration) in configurations.iter().enumerate() {
        println!("    {index}: {configuration}");
    }
    println!();

    let untested = manager.untested_firmware()?;
    if untested.is_empty() {
        println!("All firmware can be tested");
    } else {
        println!("Untested firmware:");
        for firmware in untested {
            println!("    {firmware}");
        }
    }
    println!();

    // 显式指定的固件必须全部可测
    if args.firmware_explicitly_specified() && !untested.is_empty() {
        println!("Exiting because not all firmware could be tested");
        return Ok(false);
    }

    if args.dryrun {
        return Ok(true);
    }

    let all_tests_pass = manager.run_tests(&mut harness)?;

    print!("{}", Reporter::render_results(&manager, args.verbose)?);
    let reporter = Reporter::new(args.logdir.clone());
    reporter.write_test_results(&manager, git_info.as_ref(), MessageLevel::Info)?;

    for firmware in manager.untested_firmware()? {
        println!("Warning - configuration {} is untested", firmware.firmware.name);
    }

    if all_tests_pass {
        println!("All boards passed");
    } else {
        println!("Test Failed");
    }
    Ok(all_tests_pass)
}
