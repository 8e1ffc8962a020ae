//! Small `/proc` scanning helpers shared by the tracker and the scheduler:
//! discovering a process's children and reading its argv. Kept separate
//! from [`crate::sampler`], which reads per-tick instant metrics for pids
//! the tracker already knows about.

use std::fs;
use std::io;

use crate::Pid;

/// Reads `argv` from `/proc/<pid>/cmdline` (NUL-separated, trailing NUL).
pub fn read_cmdline(pid: Pid) -> io::Result<Vec<String>> {
    let raw = fs::read(format!("/proc/{}/cmdline", pid))?;
    Ok(raw
        .split(|&b| b == 0)
        .filter(|part| !part.is_empty())
        .map(|part| String::from_utf8_lossy(part).into_owned())
        .collect())
}

fn parse_ppid(stat_contents: &str) -> Option<Pid> {
    let right_paren = stat_contents.rfind(')')?;
    stat_contents[right_paren + 1..].split_whitespace().nth(1)?.parse().ok()
}

/// Scans every numeric entry of `/proc` and returns the pids whose
/// `/proc/<pid>/stat` reports `parent` as their ppid. This is the portable
/// fallback to Linux's per-task `children` file (which requires a
/// `/proc/<pid>/task/<tid>/children` that isn't mounted on every kernel
/// configuration).
pub fn children_of(parent: Pid) -> io::Result<Vec<Pid>> {
    let mut children = Vec::new();
    for entry in fs::read_dir("/proc")? {
        let entry = entry?;
        let Some(pid) = entry.file_name().to_str().and_then(|s| s.parse::<Pid>().ok()) else {
            continue;
        };
        let stat = match fs::read_to_string(format!("/proc/{}/stat", pid)) {
            Ok(contents) => contents,
            Err(_) => continue, // process raced us and exited; not a child we can observe now.
        };
        if parse_ppid(&stat) == Some(parent) {
            children.push(pid);
        }
    }
    Ok(children)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ppid_from_stat_with_spacey_comm() {
        let stat = "42 (my (odd) prog) S 7 42 42 0 -1 0 0 0 0 0 0 0 0 0 20 0 1 0 0 0";
        assert_eq!(parse_ppid(stat), Some(7));
    }
}
