//! Executes resolved test configurations against the load and test collaborators.
//!
//! Configurations run strictly in resolver order. A failing step is recorded
//! against its configuration and never stops the remaining steps or configurations.

use crate::model::{Board, BoardMode, ResolverPolicy, TestConfiguration};
use crate::test_info::TestInfo;
use anyhow::Result;
use log::info;
use std::path::Path;

/// Writes firmware onto a board and controls its mode.
pub trait BoardLoader {
    /// Flash the interface firmware image.
    fn load_interface(&mut self, board: &Board, image: &Path) -> Result<()>;

    /// Flash the bootloader image.
    fn load_bootloader(&mut self, board: &Board, image: &Path) -> Result<()>;

    /// Ask the board to verify its filesystem after each remount.
    fn set_check_fs_on_remount(&mut self, board: &Board, enabled: bool) -> Result<()>;

    /// Switch the board to run the given firmware.
    fn set_mode(&mut self, board: &Board, mode: BoardMode) -> Result<()>;
}

/// DAPLink specific functional tests (bootloader update paths and similar).
pub trait DaplinkTester {
    fn test_daplink(&mut self, configuration: &TestConfiguration) -> Result<()>;
}

/// Exercises the USB endpoints of a board running interface firmware.
pub trait EndpointTester {
    fn test_hid(&mut self, configuration: &TestConfiguration) -> Result<()>;
    fn test_serial(&mut self, configuration: &TestConfiguration) -> Result<()>;
    fn test_mass_storage(&mut self, configuration: &TestConfiguration) -> Result<()>;
}

/// Everything the executor needs from the bench.
pub trait Harness: BoardLoader + DaplinkTester + EndpointTester {}

impl<T: BoardLoader + DaplinkTester + EndpointTester> Harness for T {}

/// Runs configurations one after another and aggregates the outcome.
pub struct Executor<'a> {
    harness: &'a mut dyn Harness,
    policy: &'a ResolverPolicy,
}

impl<'a> Executor<'a> {
    pub fn new(harness: &'a mut dyn Harness, policy: &'a ResolverPolicy) -> Self {
        Executor { harness, policy }
    }

    /// Run every configuration and store its result. Returns the overall pass.
    pub fn run(&mut self, configurations: &mut [TestConfiguration]) -> bool {
        let mut all_tests_pass = true;
        for (index, configuration) in configurations.iter_mut().enumerate() {
            info!("Running configuration {}: {}", index, configuration);
            let result = self.run_configuration(configuration);
            if !result.passed() {
                info!(
                    "Configuration {} failed with {} failure(s)",
                    configuration.name,
                    result.failure_count()
                );
                all_tests_pass = false;
            }
            configuration.result = Some(result);
        }
        all_tests_pass
    }

    fn run_configuration(&mut self, configuration: &TestConfiguration) -> TestInfo {
        let mut test_info = TestInfo::new(configuration.name.clone());
        let board = &configuration.board;

        test_info.info(format!("Board: {}", board));
        test_info.info(format!("Application: {}", configuration.interface_firmware));
        test_info.info(format!(
            "Bootloader: {}",
            configuration
                .bootloader_firmware
                .as_ref()
                .map_or("<None>".to_string(), |bl| bl.name.clone())
        ));
        test_info.info(format!(
            "Target: {}",
            configuration
                .target
                .as_ref()
                .map_or("<None>".to_string(), |t| t.name())
        ));

        if self.policy.load_interface {
            let image = &configuration.interface_firmware.image_path;
            record(
                &mut test_info,
                "Load interface",
                self.harness.load_interface(board, image),
            );
        }

        if self.policy.load_bootloader {
            if let Some(bootloader) = &configuration.bootloader_firmware {
                record(
                    &mut test_info,
                    "Load bootloader",
                    self.harness.load_bootloader(board, &bootloader.image_path),
                );
            }
        }

        record(
            &mut test_info,
            "Enable filesystem check on remount",
            self.harness.set_check_fs_on_remount(board, true),
        );

        if self.policy.run_daplink_tests {
            let subtest = test_info.create_subtest("daplink_test");
            record(subtest, "DAPLink test", self.harness.test_daplink(configuration));
        }

        if self.policy.run_endpoint_tests {
            let subtest = test_info.create_subtest("test_endpoints");
            record(subtest, "HID test", self.harness.test_hid(configuration));
            record(subtest, "Serial test", self.harness.test_serial(configuration));
            record(
                subtest,
                "Mass storage test",
                self.harness.test_mass_storage(configuration),
            );
        }

        test_info
    }
}

fn record(test_info: &mut TestInfo, step: &str, outcome: Result<()>) {
    match outcome {
        Ok(()) => test_info.info(format!("{step} passed")),
        Err(e) => test_info.failure(format!("{step} failed: {e:#}")),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::model::{Firmware, Target};
    use anyhow::anyhow;
    use mockall::{mock, Sequence};

    mock! {
        pub Bench {}

        impl BoardLoader for Bench {
            fn load_interface(&mut self, board: &Board, image: &Path) -> Result<()>;
            fn load_bootloader(&mut self, board: &Board, image: &Path) -> Result<()>;
            fn set_check_fs_on_remount(&mut self, board: &Board, enabled: bool) -> Result<()>;
            fn set_mode(&mut self, board: &Board, mode: BoardMode) -> Result<()>;
        }

        impl DaplinkTester for Bench {
            fn test_daplink(&mut self, configuration: &TestConfiguration) -> Result<()>;
        }

        impl EndpointTester for Bench {
            fn test_hid(&mut self, configuration: &TestConfiguration) -> Result<()>;
            fn test_serial(&mut self, configuration: &TestConfiguration) -> Result<()>;
            fn test_mass_storage(&mut self, configuration: &TestConfiguration) -> Result<()>;
        }
    }

    fn configuration(unique_id: &str, with_bootloader: bool) -> TestConfiguration {
        let fw = Firmware::interface("k20dx_frdmk64f_if", "0240", "97969900", "if.hex");
        let bl = Firmware::bootloader("k20dx_bl", "97969900", "bl.hex");
        let board = Board::new(unique_id, "0240", "97969900");
        let target = Target::new("0240", "k64f.hex", "k64f.bin");
        TestConfiguration::new(&fw, with_bootloader.then_some(&bl), &board, Some(&target))
    }

    fn load_only() -> ResolverPolicy {
        ResolverPolicy {
            load_bootloader: false,
            run_daplink_tests: false,
            run_endpoint_tests: false,
            ..Default::default()
        }
    }

    #[test]
    fn test_failed_load_does_not_stop_next_configuration() {
        let mut bench = MockBench::new();
        bench
            .expect_load_interface()
            .withf(|board, _| board.unique_id == "b1")
            .times(1)
            .returning(|_, _| Err(anyhow!("flash write timed out")));
        bench
            .expect_load_interface()
            .withf(|board, _| board.unique_id == "b2")
            .times(1)
            .returning(|_, _| Ok(()));
        bench
            .expect_set_check_fs_on_remount()
            .times(2)
            .returning(|_, _| Ok(()));
        bench.expect_test_hid().times(2).returning(|_| Ok(()));
        bench.expect_test_serial().times(2).returning(|_| Ok(()));
        bench.expect_test_mass_storage().times(2).returning(|_| Ok(()));

        let policy = ResolverPolicy {
            run_endpoint_tests: true,
            ..load_only()
        };
        let mut configurations = vec![configuration("b1", false), configuration("b2", false)];
        let all_pass = Executor::new(&mut bench, &policy).run(&mut configurations);

        assert!(!all_pass);
        assert_eq!(configurations[0].passed(), Some(false));
        assert_eq!(configurations[1].passed(), Some(true));
        let first = configurations[0].result.as_ref().unwrap();
        assert_eq!(first.failure_count(), 1);
        assert!(first
            .render(crate::test_info::MessageLevel::Failure, None)
            .contains("Load interface failed: flash write timed out"));
    }

    #[test]
    fn test_steps_follow_policy_order() {
        let mut bench = MockBench::new();
        let mut seq = Sequence::new();
        bench
            .expect_load_interface()
            .withf(|_, image| image == Path::new("if.hex"))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));
        bench
            .expect_load_bootloader()
            .withf(|_, image| image == Path::new("bl.hex"))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));
        bench
            .expect_set_check_fs_on_remount()
            .withf(|_, enabled| *enabled)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));
        bench
            .expect_test_daplink()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        bench
            .expect_test_hid()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        bench
            .expect_test_serial()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        bench
            .expect_test_mass_storage()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));

        let policy = ResolverPolicy::default();
        let mut configurations = vec![configuration("b1", true)];
        assert!(Executor::new(&mut bench, &policy).run(&mut configurations));

        let result = configurations[0].result.as_ref().unwrap();
        let names: Vec<&str> = result
            .entries()
            .iter()
            .filter_map(|entry| match entry {
                crate::test_info::Entry::Subtest(sub) => Some(sub.name.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(names, vec!["daplink_test", "test_endpoints"]);
    }

    #[test]
    fn test_bootloader_skipped_when_absent() {
        let mut bench = MockBench::new();
        bench.expect_load_interface().times(0);
        bench.expect_load_bootloader().times(0);
        bench
            .expect_set_check_fs_on_remount()
            .times(1)
            .returning(|_, _| Ok(()));

        let policy = ResolverPolicy {
            load_interface: false,
            load_bootloader: true,
            ..load_only()
        };
        let mut configurations = vec![configuration("b1", false)];
        assert!(Executor::new(&mut bench, &policy).run(&mut configurations));
    }

    #[test]
    fn test_endpoint_failures_are_counted() {
        let mut bench = MockBench::new();
        bench
            .expect_set_check_fs_on_remount()
            .returning(|_, _| Ok(()));
        bench
            .expect_test_hid()
            .returning(|_| Err(anyhow!("no HID interface")));
        bench.expect_test_serial().returning(|_| Ok(()));
        bench
            .expect_test_mass_storage()
            .returning(|_| Err(anyhow!("MSD did not remount")));

        let policy = ResolverPolicy {
            load_interface: false,
            run_endpoint_tests: true,
            ..load_only()
        };
        let mut configurations = vec![configuration("b1", false)];
        assert!(!Executor::new(&mut bench, &policy).run(&mut configurations));
        assert_eq!(configurations[0].result.as_ref().unwrap().failure_count(), 2);
    }
}
