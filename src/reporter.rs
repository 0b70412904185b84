//! 测试报告生成器
//!
//! Renders the results of a completed run to the console and writes the result
//! directory: one text file per configuration, `summary.txt`, `summary.json`,
//! `version.txt` and a `target/` copy of every target image.

use crate::config::cli_args::Verbosity;
use crate::error::LifecycleError;
use crate::manager::TestManager;
use crate::model::{ResolverPolicy, TestConfiguration, UntestedFirmware};
use crate::test_info::{MessageLevel, TestInfo};
use crate::utils::{self, GitInfo};
use anyhow::{bail, Context, Result};
use log::info;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Serialize)]
struct ConfigurationSummary {
    name: String,
    description: String,
    passed: bool,
    failures: usize,
    warnings: usize,
}

#[derive(Debug, Serialize)]
struct Summary<'a> {
    all_tests_pass: bool,
    run_date: String,
    git: Option<&'a GitInfo>,
    settings: &'a ResolverPolicy,
    tested: Vec<ConfigurationSummary>,
    untested: &'a [UntestedFirmware],
}

/// 报告生成器
pub struct Reporter {
    /// 输出目录
    output_dir: PathBuf,
}

fn result_of(configuration: &TestConfiguration) -> Option<&TestInfo> {
    configuration.result.as_ref()
}

impl Reporter {
    pub fn new(output_dir: PathBuf) -> Self {
        Self { output_dir }
    }

    /// Render every configuration's log at the given verbosity.
    pub fn render_results(manager: &TestManager, verbosity: Verbosity) -> Result<String, LifecycleError> {
        manager.all_tests_pass()?;
        let (level, depth) = verbosity.render_settings();
        let mut out = String::new();
        for configuration in manager.test_configurations()? {
            out.push('\n');
            if let Some(result) = result_of(configuration) {
                out.push_str(&result.render(level, depth));
            }
        }
        Ok(out)
    }

    /// Write the complete result directory. The directory must not exist yet.
    pub fn write_test_results(
        &self,
        manager: &TestManager,
        git_info: Option<&GitInfo>,
        level: MessageLevel,
    ) -> Result<()> {
        let all_tests_pass = manager.all_tests_pass()?;
        let configurations = manager.test_configurations()?;
        let untested = manager.untested_firmware()?;

        if self.output_dir.exists() {
            bail!(
                "Test results directory \"{}\" already exists",
                self.output_dir.display()
            );
        }
        fs::create_dir_all(&self.output_dir)
            .with_context(|| format!("无法创建输出目录: {}", self.output_dir.display()))?;

        fs::write(
            self.output_dir.join("version.txt"),
            format!("{} {}\n", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
        )?;

        for (configuration, file_name) in configurations.iter().zip(report_file_names(configurations)) {
            self.write_configuration(configuration, &file_name, level)?;
        }

        let run_date = chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
        let summary_text = summary_text(
            all_tests_pass,
            &run_date,
            git_info,
            manager.policy(),
            configurations,
            untested,
        );
        fs::write(self.output_dir.join("summary.txt"), summary_text)?;

        let summary = Summary {
            all_tests_pass,
            run_date,
            git: git_info,
            settings: manager.policy(),
            tested: configurations
                .iter()
                .map(|c| ConfigurationSummary {
                    name: c.name.clone(),
                    description: c.to_string(),
                    passed: c.passed().unwrap_or(false),
                    failures: result_of(c).map_or(0, TestInfo::failure_count),
                    warnings: result_of(c).map_or(0, TestInfo::warning_count),
                })
                .collect(),
            untested,
        };
        utils::write_json_to_file(&self.output_dir.join("summary.json"), &summary)?;

        // Target test images
        let target_dir = self.output_dir.join("target");
        fs::create_dir(&target_dir)?;
        for target in manager.targets() {
            for image in [&target.hex_path, &target.bin_path] {
                copy_into(image, &target_dir)?;
            }
        }

        info!("已生成测试报告: {}", self.output_dir.display());
        Ok(())
    }

    fn write_configuration(
        &self,
        configuration: &TestConfiguration,
        file_name: &str,
        level: MessageLevel,
    ) -> Result<()> {
        let mut content = String::new();
        let _ = writeln!(content, "Test configuration: {}", configuration);
        let _ = writeln!(content, "Board: {}", configuration.board);
        let _ = writeln!(content, "Application: {}", configuration.interface_firmware);
        let _ = writeln!(
            content,
            "Bootloader: {}",
            configuration
                .bootloader_firmware
                .as_ref()
                .map_or("<None>".to_string(), |bl| bl.name.clone())
        );
        let _ = writeln!(
            content,
            "Target: {}",
            configuration
                .target
                .as_ref()
                .map_or("<None>".to_string(), |t| t.name())
        );
        content.push('\n');
        if let Some(result) = result_of(configuration) {
            content.push_str(&result.render(level, None));
        }

        let path = self.output_dir.join(file_name);
        fs::write(&path, content).with_context(|| format!("无法写入报告文件: {}", path.display()))
    }
}

/// One distinct file name per configuration.
///
/// Board display names may repeat, so a clash falls back to the board's unique
/// id and then to the configuration index.
fn report_file_names(configurations: &[TestConfiguration]) -> Vec<String> {
    let mut used = HashSet::new();
    configurations
        .iter()
        .enumerate()
        .map(|(index, configuration)| {
            let candidates = [
                configuration.name.clone(),
                format!(
                    "{} {}",
                    configuration.interface_firmware.name, configuration.board.unique_id
                ),
            ];
            let stem = candidates
                .into_iter()
                .map(|name| utils::sanitize_file_name(&name))
                .find(|stem| !used.contains(stem))
                .unwrap_or_else(|| {
                    format!("{} {}", utils::sanitize_file_name(&configuration.name), index)
                });
            let file_name = format!("{stem}.txt");
            used.insert(stem);
            file_name
        })
        .collect()
}

fn copy_into(image: &Path, dir: &Path) -> Result<()> {
    let file_name = image
        .file_name()
        .with_context(|| format!("Target image path has no file name: {}", image.display()))?;
    fs::copy(image, dir.join(file_name))
        .with_context(|| format!("Failed to copy target image {}", image.display()))?;
    Ok(())
}

fn summary_text(
    all_tests_pass: bool,
    run_date: &str,
    git_info: Option<&GitInfo>,
    policy: &ResolverPolicy,
    configurations: &[TestConfiguration],
    untested: &[UntestedFirmware],
) -> String {
    let mut s = String::new();
    if all_tests_pass {
        s.push_str("All tests pass\n\n");
    } else {
        s.push_str("One or more tests have failed\n\n");
    }

    let _ = writeln!(s, "Run date: {run_date}");
    if let Some(git) = git_info {
        s.push_str("Git info for test:\n");
        let _ = writeln!(s, "  Git SHA: {}", git.sha);
        let _ = writeln!(s, "  Local changes: {}", git.local_changes);
    }
    s.push('\n');

    s.push_str("Test settings:\n");
    let _ = writeln!(s, "  Load application before test: {}", policy.load_interface);
    let _ = writeln!(s, "  Load bootloader before test: {}", policy.load_bootloader);
    let _ = writeln!(s, "  Run DAPLink specific tests: {}", policy.run_daplink_tests);
    let _ = writeln!(s, "  Run endpoint tests: {}", policy.run_endpoint_tests);
    let _ = writeln!(s, "  Only test first board: {}", policy.only_first_board);
    s.push('\n');

    s.push_str("Tested configurations:\n");
    for configuration in configurations {
        let result = if configuration.passed() == Some(true) {
            "Pass"
        } else {
            "Fail"
        };
        let _ = writeln!(s, "  {}: {}", configuration, result);
    }
    s.push('\n');

    if untested.is_empty() {
        s.push_str("All firmware in package tested\n");
    } else {
        s.push_str("Untested firmware:\n");
        for firmware in untested {
            let _ = writeln!(s, "  {}", firmware);
        }
    }
    s.push('\n');
    s
}
