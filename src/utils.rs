//! Utility types and helpers for the daptest project.
//!
//! This module provides command execution with a timeout, TOML loading,
//! `{{ name }}` placeholder substitution and git metadata for the reports.

use anyhow::{bail, Context, Result};
use log::{debug, error, warn};
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use regex::{Captures, Regex};
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io::Read;
use std::os::unix::process::CommandExt;
use std::path::Path;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

/// 命令执行结果
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// 标准输出
    pub stdout: String,
    /// 标准错误
    pub stderr: String,
    /// 退出码，超时或被信号终止时为 -1
    pub exit_code: i32,
    pub timed_out: bool,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0 && !self.timed_out
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = String::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_string(&mut buf);
        }
        buf
    })
}

/// Run `command` through `sh -c`, killing it once `timeout` has elapsed.
///
/// The shell runs in its own process group and a timeout kills the whole
/// group, so tools started by a compound command go down with it.
///
/// # Errors
///
/// Returns an error only if the process cannot be spawned or waited on; a
/// non-zero exit or a timeout is reported through [`CommandOutput`].
pub fn run_command(command: &str, timeout: Duration) -> Result<CommandOutput> {
    debug!("执行本地命令: {command}");

    let mut child = Command::new("sh")
        .arg("-c")
        .arg(command)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .process_group(0)
        .spawn()
        .with_context(|| format!("无法启动命令进程: {command}"))?;

    // 另开线程读取输出，避免管道写满导致子进程阻塞
    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    let start_time = Instant::now();
    let mut timed_out = false;
    while child.try_wait()?.is_none() {
        if start_time.elapsed() > timeout {
            timed_out = true;
            warn!("命令执行超时: {command}");
            // pgid == pid because of process_group(0)
            let pgid = Pid::from_raw(child.id() as i32);
            if let Err(e) = killpg(pgid, Signal::SIGKILL) {
                warn!("无法终止进程组 {pgid}: {e}");
                child.kill()?;
            }
            break;
        }
        thread::sleep(Duration::from_millis(50));
    }

    let status = child.wait()?;
    let exit_code = if timed_out {
        -1
    } else {
        status.code().unwrap_or(-1) // 被信号终止
    };

    let output = CommandOutput {
        stdout: stdout.join().unwrap_or_default(),
        stderr: stderr.join().unwrap_or_default(),
        exit_code,
        timed_out,
    };
    debug!("命令执行完成: exit_code={}", output.exit_code);
    Ok(output)
}

/// Reads a TOML file into an arbitrary struct.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub fn read_toml_from_file<T>(path: &Path) -> Result<T>
where
    T: DeserializeOwned,
{
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    match toml::de::from_str(&content) {
        Ok(config) => Ok(config),
        Err(e) => {
            error!("Failed to parse TOML file: {e}");
            Err(e).with_context(|| format!("Failed to parse {}", path.display()))
        }
    }
}

/// Writes any serializable value as pretty JSON.
pub fn write_json_to_file<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))
}

/// Replace every `{{ name }}` in `template` with its value from `vars`.
///
/// # Errors
///
/// Returns an error naming the first placeholder that has no value.
pub fn replace_placeholders(template: &str, vars: &HashMap<&str, String>) -> Result<String> {
    let pattern = Regex::new(r"\{\{\s*([A-Za-z0-9_]+)\s*\}\}")?;
    let mut unknown = None;
    let replaced = pattern.replace_all(template, |caps: &Captures| match vars.get(&caps[1]) {
        Some(value) => value.clone(),
        None => {
            unknown.get_or_insert_with(|| caps[1].to_string());
            String::new()
        }
    });
    if let Some(name) = unknown {
        bail!("Unknown placeholder {{{{ {name} }}}} in command: {template}");
    }
    Ok(replaced.into_owned())
}

/// Turn a configuration name into a safe file name.
pub fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c => c,
        })
        .collect()
}

/// Git revision of the tree the run was started from.
#[derive(Debug, Clone, Serialize)]
pub struct GitInfo {
    pub sha: String,
    pub local_changes: bool,
}

/// Query git for the HEAD SHA and whether there are uncommitted changes.
pub fn get_git_info(dir: &Path) -> Result<GitInfo> {
    let output = Command::new("git")
        .args(["rev-parse", "--verify", "HEAD"])
        .current_dir(dir)
        .output()
        .context("Failed to get git SHA, do you have git in your PATH?")?;
    if !output.status.success() {
        bail!(
            "git rev-parse failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    let sha = String::from_utf8_lossy(&output.stdout).trim().to_string();

    let diff = Command::new("git")
        .args(["diff", "--no-ext-diff", "--quiet", "--exit-code"])
        .current_dir(dir)
        .status()?;

    Ok(GitInfo {
        sha,
        local_changes: !diff.success(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replace_placeholders() {
        let vars = HashMap::from([
            ("unique_id", "0240000032044e45".to_string()),
            ("image", "/fw/k64f_if.hex".to_string()),
        ]);
        let cmd = replace_placeholders("pyocd flash -u {{ unique_id }} {{image}}", &vars).unwrap();
        assert_eq!(cmd, "pyocd flash -u 0240000032044e45 /fw/k64f_if.hex");
    }

    #[test]
    fn test_unknown_placeholder_is_an_error() {
        let vars = HashMap::new();
        let err = replace_placeholders("echo {{ nope }}", &vars).unwrap_err();
        assert!(err.to_string().contains("nope"));
    }

    #[test]
    fn test_run_command_captures_output() {
        let output = run_command("echo hello; echo oops >&2; exit 3", Duration::from_secs(10)).unwrap();
        assert_eq!(output.stdout.trim(), "hello");
        assert_eq!(output.stderr.trim(), "oops");
        assert_eq!(output.exit_code, 3);
        assert!(!output.success());
    }

    #[test]
    fn test_run_command_times_out() {
        let output = run_command("sleep 2", Duration::from_millis(200)).unwrap();
        assert!(output.timed_out);
        assert!(!output.success());
    }

    #[test]
    fn test_timeout_kills_compound_command() {
        let start = Instant::now();
        let output = run_command("sleep 4; true", Duration::from_millis(200)).unwrap();
        assert!(output.timed_out);
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("k20dx_if board/1"), "k20dx_if board_1");
    }
}
