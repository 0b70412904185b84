//! Run lifecycle: collect registries and policy, resolve once, execute once.
//!
//! `TestManager` moves through `Init → Configured → Complete` and never back.
//! Every public operation checks the phase it needs and returns a
//! [`LifecycleError`] when called out of order.

use crate::error::{LifecycleError, ManagerError, RunState};
use crate::executor::{Executor, Harness};
use crate::model::{
    Board, Firmware, ResolverPolicy, Target, TargetRequirement, TestConfiguration,
    UntestedFirmware,
};
use crate::resolver::resolve;
use crate::test_info::TestInfo;
use log::info;
use std::collections::BTreeSet;

const INIT: &[RunState] = &[RunState::Init];
const CONFIGURED: &[RunState] = &[RunState::Configured];
const COMPLETE: &[RunState] = &[RunState::Complete];
const RESOLVED: &[RunState] = &[RunState::Configured, RunState::Complete];

/// Handle test configuration, running and results.
#[derive(Debug)]
pub struct TestManager {
    state: RunState,
    firmware: Vec<Firmware>,
    boards: Vec<Board>,
    targets: Vec<Target>,
    policy: ResolverPolicy,
    configurations: Vec<TestConfiguration>,
    untested: Vec<UntestedFirmware>,
    all_tests_pass: Option<bool>,
}

impl Default for TestManager {
    fn default() -> Self {
        Self::new()
    }
}

impl TestManager {
    pub fn new() -> Self {
        TestManager {
            state: RunState::Init,
            firmware: Vec::new(),
            boards: Vec::new(),
            targets: Vec::new(),
            policy: ResolverPolicy::default(),
            configurations: Vec::new(),
            untested: Vec::new(),
            all_tests_pass: None,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    fn require(
        &self,
        operation: &'static str,
        allowed: &'static [RunState],
    ) -> Result<(), LifecycleError> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(LifecycleError::WrongState {
                operation,
                allowed,
                actual: self.state,
            })
        }
    }

    /// Only test one board of each type.
    pub fn set_test_first_board_only(&mut self, first: bool) -> Result<(), LifecycleError> {
        self.require("set_test_first_board_only", INIT)?;
        self.policy.only_first_board = first;
        Ok(())
    }

    /// Load new interface firmware before testing.
    pub fn set_load_if(&mut self, load: bool) -> Result<(), LifecycleError> {
        self.require("set_load_if", INIT)?;
        self.policy.load_interface = load;
        Ok(())
    }

    /// Load new bootloader firmware before testing.
    pub fn set_load_bl(&mut self, load: bool) -> Result<(), LifecycleError> {
        self.require("set_load_bl", INIT)?;
        self.policy.load_bootloader = load;
        Ok(())
    }

    /// Run DAPLink specific tests.
    pub fn set_test_daplink(&mut self, run_test: bool) -> Result<(), LifecycleError> {
        self.require("set_test_daplink", INIT)?;
        self.policy.run_daplink_tests = run_test;
        Ok(())
    }

    /// Test each endpoint - MSD, CDC, HID.
    pub fn set_test_ep(&mut self, run_test: bool) -> Result<(), LifecycleError> {
        self.require("set_test_ep", INIT)?;
        self.policy.run_endpoint_tests = run_test;
        Ok(())
    }

    pub fn set_target_requirement(
        &mut self,
        requirement: TargetRequirement,
    ) -> Result<(), LifecycleError> {
        self.require("set_target_requirement", INIT)?;
        self.policy.target_requirement = requirement;
        Ok(())
    }

    pub fn add_firmware(
        &mut self,
        firmware: impl IntoIterator<Item = Firmware>,
    ) -> Result<(), LifecycleError> {
        self.require("add_firmware", INIT)?;
        self.firmware.extend(firmware);
        Ok(())
    }

    pub fn add_boards(&mut self, boards: impl IntoIterator<Item = Board>) -> Result<(), LifecycleError> {
        self.require("add_boards", INIT)?;
        self.boards.extend(boards);
        Ok(())
    }

    pub fn add_targets(
        &mut self,
        targets: impl IntoIterator<Item = Target>,
    ) -> Result<(), LifecycleError> {
        self.require("add_targets", INIT)?;
        self.targets.extend(targets);
        Ok(())
    }

    /// Test only the interface firmware named here. Can be set once.
    pub fn set_firmware_filter<S: Into<String>>(
        &mut self,
        names: impl IntoIterator<Item = S>,
    ) -> Result<(), LifecycleError> {
        self.require("set_firmware_filter", INIT)?;
        if self.policy.firmware_name_filter.is_some() {
            return Err(LifecycleError::FilterAlreadySet);
        }
        self.policy.firmware_name_filter =
            Some(names.into_iter().map(Into::into).collect::<BTreeSet<String>>());
        Ok(())
    }

    /// Resolve the registries into test configurations.
    ///
    /// A configuration error leaves the manager in `Init` with no results, so
    /// `run_tests` stays unreachable.
    pub fn build_test_configurations(&mut self, parent: &mut TestInfo) -> Result<(), ManagerError> {
        self.require("build_test_configurations", INIT)?;
        let log = parent.create_subtest("Build test configuration");

        let resolution = resolve(&self.firmware, &self.boards, &self.targets, &self.policy, log)?;
        info!(
            "Resolved {} test configuration(s), {} untested firmware",
            resolution.configurations.len(),
            resolution.untested.len()
        );
        self.configurations = resolution.configurations;
        self.untested = resolution.untested;
        self.state = RunState::Configured;
        Ok(())
    }

    /// Run all configurations. Tests can only be run once per manager.
    pub fn run_tests(&mut self, harness: &mut dyn Harness) -> Result<bool, LifecycleError> {
        self.require("run_tests", CONFIGURED)?;
        self.state = RunState::Complete;

        let mut executor = Executor::new(harness, &self.policy);
        let all_tests_pass = executor.run(&mut self.configurations);
        self.all_tests_pass = Some(all_tests_pass);
        Ok(all_tests_pass)
    }

    pub fn test_configurations(&self) -> Result<&[TestConfiguration], LifecycleError> {
        self.require("test_configurations", RESOLVED)?;
        Ok(&self.configurations)
    }

    pub fn untested_firmware(&self) -> Result<&[UntestedFirmware], LifecycleError> {
        self.require("untested_firmware", RESOLVED)?;
        Ok(&self.untested)
    }

    /// Must call `run_tests` first.
    pub fn all_tests_pass(&self) -> Result<bool, LifecycleError> {
        self.require("all_tests_pass", COMPLETE)?;
        self.all_tests_pass.ok_or(LifecycleError::WrongState {
            operation: "all_tests_pass",
            allowed: COMPLETE,
            actual: self.state,
        })
    }

    pub fn policy(&self) -> &ResolverPolicy {
        &self.policy
    }

    pub fn targets(&self) -> &[Target] {
        &self.targets
    }
}
