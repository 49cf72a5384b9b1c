//! In-memory [`Host`] for tests.
//!
//! Records every command line, keeps a simulated mount table and
//! device-mapper state, and fails commands matching injected patterns. It
//! understands just enough of kpartx/mount/umount/mountpoint/blkid/parted to
//! drive the image subsystem end to end without root.

use std::cell::RefCell;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

use crate::process::{Cmd, CommandResult, Host};

#[derive(Default)]
struct State {
    log: Vec<String>,
    mounted: Vec<PathBuf>,
    mapped: Vec<String>,
    partitions: Vec<String>,
    fs_types: HashMap<String, String>,
    failures: Vec<Failure>,
    outputs: Vec<(String, String)>,
    parted_print: Option<String>,
    partial_attach: Option<Vec<String>>,
    stdin: Vec<(String, String)>,
}

struct Failure {
    pattern: String,
    code: i32,
}

/// Recording fake for [`Host`].
pub struct FakeHost {
    state: RefCell<State>,
}

impl Default for FakeHost {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeHost {
    /// A host whose images have the usual boot + root partitions.
    pub fn new() -> Self {
        Self::with_partitions(&["loop0p1", "loop0p2"])
    }

    /// A host whose images map to exactly these device-mapper names.
    pub fn with_partitions(names: &[&str]) -> Self {
        let state = State {
            partitions: names.iter().map(|s| s.to_string()).collect(),
            ..State::default()
        };
        Self {
            state: RefCell::new(state),
        }
    }

    /// Fail every command whose command line contains `pattern`.
    pub fn fail_on(self, pattern: &str) -> Self {
        self.fail_with(pattern, 1)
    }

    /// Fail every matching command with exit code `code`.
    pub fn fail_with(self, pattern: &str, code: i32) -> Self {
        self.state.borrow_mut().failures.push(Failure {
            pattern: pattern.to_string(),
            code,
        });
        self
    }

    /// Answer commands containing `pattern` with `stdout`.
    pub fn respond(self, pattern: &str, stdout: &str) -> Self {
        self.state
            .borrow_mut()
            .outputs
            .push((pattern.to_string(), stdout.to_string()));
        self
    }

    /// Report `fs_type` from blkid for device-mapper node `name`.
    pub fn fs_type(self, name: &str, fs_type: &str) -> Self {
        self.state
            .borrow_mut()
            .fs_types
            .insert(format!("/dev/mapper/{name}"), fs_type.to_string());
        self
    }

    /// Make `kpartx -av` map only `names` and then exit non-zero.
    pub fn partial_attach(self, names: &[&str]) -> Self {
        self.state.borrow_mut().partial_attach =
            Some(names.iter().map(|s| s.to_string()).collect());
        self
    }

    /// Override the machine-readable `parted print` output.
    pub fn parted_print(self, output: &str) -> Self {
        self.state.borrow_mut().parted_print = Some(output.to_string());
        self
    }

    /// Mark `path` as mounted before the test starts.
    pub fn premount(self, path: &Path) -> Self {
        self.state.borrow_mut().mounted.push(path.to_path_buf());
        self
    }

    /// Every command line executed so far, in order.
    pub fn commands(&self) -> Vec<String> {
        self.state.borrow().log.clone()
    }

    /// Index of the first executed command containing `pattern`.
    pub fn position(&self, pattern: &str) -> Option<usize> {
        self.state.borrow().log.iter().position(|c| c.contains(pattern))
    }

    /// Number of executed commands containing `pattern`.
    pub fn count(&self, pattern: &str) -> usize {
        self.state
            .borrow()
            .log
            .iter()
            .filter(|c| c.contains(pattern))
            .count()
    }

    /// Currently mounted paths, in mount order.
    pub fn mounted(&self) -> Vec<PathBuf> {
        self.state.borrow().mounted.clone()
    }

    /// Whether any device-mapper nodes are attached.
    pub fn is_mapped(&self) -> bool {
        !self.state.borrow().mapped.is_empty()
    }

    /// Stdin passed to commands, as (command line, input).
    pub fn stdin_log(&self) -> Vec<(String, String)> {
        self.state.borrow().stdin.clone()
    }

    fn injected_failure(&self, line: &str) -> Option<i32> {
        self.state
            .borrow()
            .failures
            .iter()
            .find(|f| line.contains(&f.pattern))
            .map(|f| f.code)
    }

    fn simulate(&self, cmd: &Cmd) -> CommandResult {
        let args = cmd.arguments();
        let last = args.last().map(PathBuf::from).unwrap_or_default();
        let mut state = self.state.borrow_mut();

        match cmd.program() {
            "kpartx" if args.first().is_some_and(|a| a == "-av") => {
                let (mapped, complete) = match &state.partial_attach {
                    Some(names) => (names.clone(), false),
                    None => (state.partitions.clone(), true),
                };
                state.mapped = mapped;
                let stdout = state
                    .mapped
                    .iter()
                    .enumerate()
                    .map(|(i, name)| {
                        format!("add map {name} (254:{i}): 0 1048576 linear 7:0 {}\n", 8192 + i)
                    })
                    .collect::<String>();
                if complete {
                    CommandResult::ok(stdout)
                } else {
                    CommandResult {
                        code: Some(1),
                        stdout,
                        stderr: "device-mapper: resume ioctl failed".to_string(),
                    }
                }
            }
            "kpartx" if args.first().is_some_and(|a| a == "-d") => {
                if state.mapped.is_empty() {
                    CommandResult::failed(1, "no mappings to remove")
                } else {
                    state.mapped.clear();
                    CommandResult::ok("")
                }
            }
            "mount" if args.iter().any(|a| a == "--make-rslave") => {
                if state.mounted.contains(&last) {
                    CommandResult::ok("")
                } else {
                    CommandResult::failed(32, "not mount point")
                }
            }
            "mount" => {
                state.mounted.push(last);
                CommandResult::ok("")
            }
            "umount" if args.iter().any(|a| a == "-R") => {
                if !state.mounted.contains(&last) {
                    return CommandResult::failed(32, "not mounted");
                }
                state.mounted.retain(|m| !m.starts_with(&last));
                CommandResult::ok("")
            }
            "umount" => match state.mounted.iter().rposition(|m| *m == last) {
                Some(idx) => {
                    if state.mounted.iter().any(|m| m != &last && m.starts_with(&last)) {
                        return CommandResult::failed(32, "target is busy");
                    }
                    state.mounted.remove(idx);
                    CommandResult::ok("")
                }
                None => CommandResult::failed(32, "not mounted"),
            },
            "mountpoint" => {
                if state.mounted.contains(&last) {
                    CommandResult::ok("")
                } else {
                    CommandResult::failed(32, "")
                }
            }
            "blkid" => {
                let device = last.to_string_lossy().into_owned();
                CommandResult::ok(state.fs_types.get(&device).cloned().unwrap_or_default())
            }
            "parted" if args.iter().any(|a| a == "print") => {
                let output = state.parted_print.clone().unwrap_or_else(|| {
                    "BYT;\n/tmp/image.img:3221225472B:file:512:512:msdos::;\n\
                     1:4194304B:541065215B:536870912B:fat32::lba;\n\
                     2:541065216B:3221225471B:2680160256B:ext4::;\n"
                        .to_string()
                });
                CommandResult::ok(output)
            }
            _ => {
                let line = cmd.command_line();
                let stdout = state
                    .outputs
                    .iter()
                    .find(|(pattern, _)| line.contains(pattern.as_str()))
                    .map(|(_, out)| out.clone())
                    .unwrap_or_default();
                CommandResult::ok(stdout)
            }
        }
    }
}

impl Host for FakeHost {
    fn execute(&self, cmd: &Cmd) -> io::Result<CommandResult> {
        let line = cmd.command_line();
        {
            let mut state = self.state.borrow_mut();
            state.log.push(line.clone());
            if let Some(input) = cmd.stdin_data() {
                state.stdin.push((line.clone(), input.to_string()));
            }
        }

        if let Some(code) = self.injected_failure(&line) {
            return Ok(CommandResult::failed(code, format!("injected failure: {line}")));
        }
        Ok(self.simulate(cmd))
    }
}
