//! Subprocess execution utilities.

use std::collections::{BTreeMap, HashMap};
use std::ffi::OsStr;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Output, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};

/// Directory, relative to the project root, searched for tools before `PATH`.
pub const PROJECT_TOOL_DIR: &str = ".dockyard/bin";

/// Builder for subprocess execution.
#[derive(Debug, Clone)]
pub struct ProcessBuilder {
    program: PathBuf,
    args: Vec<String>,
    env: HashMap<String, String>,
    cwd: Option<PathBuf>,
}

impl ProcessBuilder {
    /// Create a new process builder for the given program.
    pub fn new(program: impl AsRef<Path>) -> Self {
        ProcessBuilder {
            program: program.as_ref().to_path_buf(),
            args: Vec::new(),
            env: HashMap::new(),
            cwd: None,
        }
    }

    /// Add a single argument.
    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_string_lossy().into_owned());
        self
    }

    /// Add multiple arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args.extend(
            args.into_iter()
                .map(|s| s.as_ref().to_string_lossy().into_owned()),
        );
        self
    }

    /// Set an environment variable.
    pub fn env(mut self, key: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        self.env
            .insert(key.as_ref().to_string(), value.as_ref().to_string());
        self
    }

    /// Set the working directory.
    pub fn cwd(mut self, cwd: impl AsRef<Path>) -> Self {
        self.cwd = Some(cwd.as_ref().to_path_buf());
        self
    }

    fn build_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);

        for (key, value) in &self.env {
            cmd.env(key, value);
        }

        if let Some(ref cwd) = self.cwd {
            cmd.current_dir(cwd);
        }

        cmd
    }

    fn spawn(&self) -> Result<Child> {
        let mut cmd = self.build_command();
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        cmd.spawn()
            .with_context(|| format!("failed to spawn `{}`", self.program.display()))
    }

    /// Execute the command, killing it if it runs longer than `timeout`.
    ///
    /// Output is drained on helper threads so a chatty child cannot block
    /// on a full pipe while we poll.
    pub fn exec_with_timeout(&self, timeout: Duration) -> Result<Output> {
        let mut child = self.spawn()?;

        let stdout = child.stdout.take().map(drain);
        let stderr = child.stderr.take().map(drain);

        let started = Instant::now();
        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if started.elapsed() >= timeout {
                let _ = child.kill();
                let _ = child.wait();
                bail!(
                    "`{}` timed out after {}s",
                    self.display_command(),
                    timeout.as_secs()
                );
            }
            thread::sleep(Duration::from_millis(20));
        };

        Ok(Output {
            status,
            stdout: join(stdout),
            stderr: join(stderr),
        })
    }

    /// Execute with a timeout and require success.
    pub fn exec_checked_with_timeout(&self, timeout: Duration) -> Result<Output> {
        let output = self.exec_with_timeout(timeout)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!(
                "`{}` failed with exit code {:?}\n{}",
                self.display_command(),
                output.status.code(),
                stderr.trim_end()
            );
        }
        Ok(output)
    }

    /// Display the command for error messages.
    pub fn display_command(&self) -> String {
        let mut parts = vec![self.program.display().to_string()];
        parts.extend(self.args.iter().cloned());
        parts.join(" ")
    }
}

fn drain<R: Read + Send + 'static>(mut reader: R) -> thread::JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = reader.read_to_end(&mut buf);
        buf
    })
}

fn join(handle: Option<thread::JoinHandle<Vec<u8>>>) -> Vec<u8> {
    handle.and_then(|h| h.join().ok()).unwrap_or_default()
}

/// Find an executable in PATH.
pub fn find_executable(name: &str) -> Option<PathBuf> {
    which::which(name).ok()
}

/// Locate a tool, preferring a project-local copy under
/// [`PROJECT_TOOL_DIR`] over whatever `PATH` provides.
pub fn locate_tool(name: &str, project_root: Option<&Path>) -> Option<PathBuf> {
    if let Some(root) = project_root {
        let dir = root.join(PROJECT_TOOL_DIR);
        if let Ok(found) = which::which_in(name, Some(&dir), root) {
            return Some(found);
        }
    }
    find_executable(name)
}

/// Answers whether an external tool is installed.
pub trait ToolProbe: Send + Sync {
    fn has_tool(&self, name: &str) -> bool;
}

/// Probes the real system: project tool directory, then `PATH`.
#[derive(Debug, Clone, Default)]
pub struct SystemProbe {
    project_root: Option<PathBuf>,
}

impl SystemProbe {
    pub fn new(project_root: Option<PathBuf>) -> Self {
        SystemProbe { project_root }
    }
}

impl ToolProbe for SystemProbe {
    fn has_tool(&self, name: &str) -> bool {
        locate_tool(name, self.project_root.as_deref()).is_some()
    }
}

/// Tool availability, probed once per resolution run.
#[derive(Debug, Clone, Default)]
pub struct ToolSet {
    available: BTreeMap<String, bool>,
}

impl ToolSet {
    /// Probe each tool once.
    pub fn probe<'a>(probe: &dyn ToolProbe, tools: impl IntoIterator<Item = &'a str>) -> Self {
        let available = tools
            .into_iter()
            .map(|tool| {
                let found = probe.has_tool(tool);
                tracing::debug!("tool `{}`: {}", tool, if found { "found" } else { "missing" });
                (tool.to_string(), found)
            })
            .collect();
        ToolSet { available }
    }

    /// Whether a tool was found. Tools never probed count as missing.
    pub fn has(&self, tool: &str) -> bool {
        self.available.get(tool).copied().unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Only(&'static str);

    impl ToolProbe for Only {
        fn has_tool(&self, name: &str) -> bool {
            name == self.0
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_exec_with_timeout() {
        let output = ProcessBuilder::new("echo")
            .arg("hello")
            .exec_with_timeout(Duration::from_secs(10))
            .unwrap();

        assert!(output.status.success());
        assert!(String::from_utf8_lossy(&output.stdout).contains("hello"));
    }

    #[cfg(unix)]
    #[test]
    fn test_exec_times_out() {
        let err = ProcessBuilder::new("sleep")
            .arg("5")
            .exec_with_timeout(Duration::from_millis(100))
            .unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }

    #[cfg(unix)]
    #[test]
    fn test_exec_checked_reports_failure() {
        let err = ProcessBuilder::new("sh")
            .args(["-c", "echo broken >&2; exit 3"])
            .exec_checked_with_timeout(Duration::from_secs(10))
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("exit code Some(3)"));
        assert!(msg.contains("broken"));
    }

    #[test]
    fn test_display_command() {
        let pb = ProcessBuilder::new("git").args(["clone", "--depth", "1", "url"]);
        assert_eq!(pb.display_command(), "git clone --depth 1 url");
    }

    #[test]
    fn test_tool_set() {
        let tools = ToolSet::probe(&Only("git"), ["git", "hg"]);
        assert!(tools.has("git"));
        assert!(!tools.has("hg"));
        assert!(!tools.has("svn"));
    }

    #[cfg(unix)]
    #[test]
    fn test_locate_tool_prefers_project_dir() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempfile::TempDir::new().unwrap();
        let bin = tmp.path().join(PROJECT_TOOL_DIR);
        std::fs::create_dir_all(&bin).unwrap();
        let tool = bin.join("dockyard-test-tool");
        std::fs::write(&tool, "#!/bin/sh\n").unwrap();
        std::fs::set_permissions(&tool, std::fs::Permissions::from_mode(0o755)).unwrap();

        assert_eq!(
            locate_tool("dockyard-test-tool", Some(tmp.path())),
            Some(tool)
        );
        assert_eq!(locate_tool("dockyard-test-tool", None), None);
    }
}
