//! Shared fixtures for integration tests.

use std::cell::RefCell;
use std::collections::HashSet;
use std::fs;
use std::os::unix::process::ExitStatusExt;
use std::process::ExitStatus;
use std::sync::Mutex;

use anyhow::Result;
use camino::{Utf8Path, Utf8PathBuf};
use envstrap::config::Settings;
use envstrap::executor::{CommandExecutor, CommandSpec, ExecutionResult};
use envstrap::platform::Platform;
use envstrap::reporter::Reporter;
use tempfile::TempDir;

type FailRule = Box<dyn Fn(&CommandSpec) -> bool + Send + Sync>;

/// Fake executor that records every command and simulates a host.
///
/// - Query commands (`dpkg -s`, `rpm -q`, `brew list --versions`,
///   `xcode-select -p`, `git -C`) succeed when their subject is marked installed.
/// - Install commands mark their packages installed.
/// - `git clone` creates the target directory with a `.git` inside, and
///   `git -C <dir> rev-parse` succeeds once that `.git` exists.
/// - The Homebrew installer (`bash <script>`) drops a `brew` file into the
///   configured install directory; the shell framework installer
///   (`sh <script>`) creates the directory named by `ZSH`.
/// - Any command matching a fail rule exits with status 1 and has no effect,
///   unless the rule was added with `failing_after_effect`.
#[derive(Default)]
pub struct MockExecutor {
    calls: Mutex<Vec<CommandSpec>>,
    installed: Mutex<HashSet<String>>,
    programs: Mutex<HashSet<String>>,
    prefix: Mutex<Vec<Utf8PathBuf>>,
    fail_rules: Mutex<Vec<FailRule>>,
    late_fail_rules: Mutex<Vec<FailRule>>,
    brew_install_dir: Mutex<Option<Utf8PathBuf>>,
}

#[allow(dead_code)]
impl MockExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks packages (or `xcode-select`) as already present.
    pub fn with_installed<I, S>(self, packages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.installed
            .lock()
            .unwrap()
            .extend(packages.into_iter().map(Into::into));
        self
    }

    /// Makes programs locatable on the inherited PATH.
    pub fn with_programs<I, S>(self, programs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.programs
            .lock()
            .unwrap()
            .extend(programs.into_iter().map(Into::into));
        self
    }

    /// Fails every command for which `rule` returns true.
    pub fn failing_when(self, rule: impl Fn(&CommandSpec) -> bool + Send + Sync + 'static) -> Self {
        self.fail_rules.lock().unwrap().push(Box::new(rule));
        self
    }

    /// Like [`failing_when`](Self::failing_when), but the command still has
    /// its effect before exiting non-zero.
    pub fn failing_after_effect(
        self,
        rule: impl Fn(&CommandSpec) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.late_fail_rules.lock().unwrap().push(Box::new(rule));
        self
    }

    /// Directory where the simulated Homebrew installer places `brew`.
    pub fn with_brew_install_dir(self, dir: Utf8PathBuf) -> Self {
        *self.brew_install_dir.lock().unwrap() = Some(dir);
        self
    }

    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().unwrap().clone()
    }

    /// Command lines as `command arg1 arg2 ...`.
    pub fn command_lines(&self) -> Vec<String> {
        self.calls()
            .iter()
            .map(|spec| {
                std::iter::once(spec.command.as_str())
                    .chain(spec.args.iter().map(String::as_str))
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .collect()
    }

    /// Calls that are not read-only queries.
    pub fn mutating_calls(&self) -> Vec<CommandSpec> {
        self.calls().into_iter().filter(|spec| !is_query(spec)).collect()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn is_installed(&self, package: &str) -> bool {
        self.installed.lock().unwrap().contains(package)
    }

    pub fn search_prefix(&self) -> Vec<Utf8PathBuf> {
        self.prefix.lock().unwrap().clone()
    }

    fn simulate(&self, spec: &CommandSpec) -> Result<()> {
        let args: Vec<&str> = spec.args.iter().map(String::as_str).collect();
        match (spec.command.as_str(), args.as_slice()) {
            ("brew", ["install", packages @ ..])
            | ("apt-get", ["install", "-y", packages @ ..])
            | ("dnf", ["install", "-y", packages @ ..]) => {
                self.installed
                    .lock()
                    .unwrap()
                    .extend(packages.iter().map(|p| p.to_string()));
            }
            ("xcode-select", ["--install"]) => {
                self.installed.lock().unwrap().insert("xcode-select".to_string());
            }
            ("git", ["clone", .., target]) => {
                fs::create_dir_all(Utf8Path::new(target).join(".git"))?;
            }
            ("bash", [_script, ..]) => {
                if let Some(dir) = self.brew_install_dir.lock().unwrap().as_ref() {
                    fs::create_dir_all(dir)?;
                    fs::write(dir.join("brew"), "#!/bin/sh\n")?;
                }
            }
            ("sh", [_script, ..]) => {
                if let Some((_, dir)) = spec.env.iter().find(|(key, _)| key == "ZSH") {
                    fs::create_dir_all(dir)?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn query_succeeds(&self, spec: &CommandSpec) -> bool {
        let installed = self.installed.lock().unwrap();
        let args: Vec<&str> = spec.args.iter().map(String::as_str).collect();
        match (spec.command.as_str(), args.as_slice()) {
            ("dpkg", ["-s", package])
            | ("rpm", ["-q", package])
            | ("brew", ["list", "--versions", package]) => installed.contains(*package),
            ("xcode-select", ["-p"]) => installed.contains("xcode-select"),
            ("git", ["-C", dir, "rev-parse", ..]) => Utf8Path::new(dir).join(".git").is_dir(),
            _ => true,
        }
    }
}

fn is_query(spec: &CommandSpec) -> bool {
    let first = spec.args.first().map(String::as_str);
    matches!(
        (spec.command.as_str(), first),
        ("dpkg", Some("-s"))
            | ("rpm", Some("-q"))
            | ("brew", Some("list"))
            | ("xcode-select", Some("-p"))
            | ("git", Some("-C"))
    )
}

fn exit_status(code: i32) -> ExitStatus {
    ExitStatus::from_raw(code << 8)
}

impl CommandExecutor for MockExecutor {
    fn execute(&self, spec: &CommandSpec) -> Result<ExecutionResult> {
        self.calls.lock().unwrap().push(spec.clone());

        if self.fail_rules.lock().unwrap().iter().any(|rule| rule(spec)) {
            return Ok(ExecutionResult {
                status: Some(exit_status(1)),
            });
        }

        let code = if is_query(spec) {
            if self.query_succeeds(spec) { 0 } else { 1 }
        } else {
            self.simulate(spec)?;
            if self.late_fail_rules.lock().unwrap().iter().any(|rule| rule(spec)) { 1 } else { 0 }
        };
        Ok(ExecutionResult {
            status: Some(exit_status(code)),
        })
    }

    fn locate(&self, program: &str) -> Option<Utf8PathBuf> {
        if self.programs.lock().unwrap().contains(program) {
            return Some(Utf8PathBuf::from("/usr/bin").join(program));
        }
        self.prefix
            .lock()
            .unwrap()
            .iter()
            .map(|dir| dir.join(program))
            .find(|path| path.is_file())
    }

    fn prepend_path(&self, dir: &Utf8Path) {
        self.prefix.lock().unwrap().insert(0, dir.to_owned());
    }
}

/// Reporter that keeps every message with its kind.
#[derive(Default)]
pub struct RecordingReporter {
    lines: RefCell<Vec<(&'static str, String)>>,
}

#[allow(dead_code)]
impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<(&'static str, String)> {
        self.lines.borrow().clone()
    }

    pub fn messages_of(&self, kind: &str) -> Vec<String> {
        self.lines
            .borrow()
            .iter()
            .filter(|(k, _)| *k == kind)
            .map(|(_, message)| message.clone())
            .collect()
    }

    fn push(&self, kind: &'static str, message: &str) {
        self.lines.borrow_mut().push((kind, message.to_string()));
    }
}

impl Reporter for RecordingReporter {
    fn announce_start(&self, title: &str) {
        self.push("start", title);
    }
    fn step(&self, message: &str) {
        self.push("step", message);
    }
    fn success(&self, message: &str) {
        self.push("success", message);
    }
    fn info(&self, message: &str) {
        self.push("info", message);
    }
    fn warn(&self, message: &str) {
        self.push("warn", message);
    }
    fn error(&self, message: &str) {
        self.push("error", message);
    }
    fn separator(&self) {}
}

/// A temporary home and source directory pair.
pub struct Sandbox {
    _temp: TempDir,
    pub root: Utf8PathBuf,
    pub home: Utf8PathBuf,
    pub source: Utf8PathBuf,
}

#[allow(dead_code)]
impl Sandbox {
    pub fn new() -> Self {
        let temp = tempfile::tempdir().expect("failed to create temp dir");
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf())
            .expect("temp path should be valid UTF-8");
        let home = root.join("home");
        let source = root.join("source");
        fs::create_dir_all(&home).unwrap();
        fs::create_dir_all(&source).unwrap();
        Self {
            _temp: temp,
            root,
            home,
            source,
        }
    }

    pub fn settings(&self, platform: Platform) -> Settings {
        Settings::new(platform, self.home.clone(), self.source.clone())
    }

    /// Writes a file under the source directory, creating parents.
    pub fn write_source(&self, relative: &str, content: &str) -> Utf8PathBuf {
        let path = self.source.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, content).unwrap();
        path
    }
}
