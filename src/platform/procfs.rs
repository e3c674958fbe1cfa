//! Linux counter source backed by `/proc`.
//!
//! All paths are resolved against a configurable root so the reader can be
//! pointed at a fixture tree.

use crate::config::ProcfsConfig;
use crate::core::{
    CounterSource, CpuCounters, DiskCounters, MemoryCounters, ProcessCounters, SourceError,
};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

const ESRCH: i32 = 3;

/// Reads counters from a procfs mount.
#[derive(Debug, Clone)]
pub struct ProcfsSource {
    proc_root: PathBuf,
    passwd_path: PathBuf,
}

impl ProcfsSource {
    pub fn new(proc_root: impl Into<PathBuf>, passwd_path: impl Into<PathBuf>) -> Self {
        Self {
            proc_root: proc_root.into(),
            passwd_path: passwd_path.into(),
        }
    }

    pub fn from_config(config: &ProcfsConfig) -> Self {
        Self::new(&config.proc_root, &config.passwd_path)
    }

    pub fn proc_root(&self) -> &Path {
        &self.proc_root
    }

    fn read(&self, relative: impl AsRef<Path>) -> Result<String, SourceError> {
        read_file(&self.proc_root.join(relative))
    }

    /// Uid to user name, from the passwd file. An unreadable file yields an
    /// empty map, so every user falls back to its numeric uid.
    fn users(&self) -> HashMap<u32, String> {
        match fs::read_to_string(&self.passwd_path) {
            Ok(content) => parse_passwd(&content),
            Err(e) => {
                debug!(path = %self.passwd_path.display(), error = %e, "Cannot read passwd file");
                HashMap::new()
            }
        }
    }

    /// Reads one process. `Ok(None)` means it exited while being read.
    fn read_process(
        &self,
        pid: u32,
        users: &HashMap<u32, String>,
    ) -> Result<Option<ProcessCounters>, SourceError> {
        let dir = self.proc_root.join(pid.to_string());
        let Some(stat) = read_if_present(&dir.join("stat"))? else {
            return Ok(None);
        };
        let Some(status) = read_if_present(&dir.join("status"))? else {
            return Ok(None);
        };

        let stat = parse_pid_stat(&stat).map_err(|reason| parse_error(&dir.join("stat"), reason))?;
        let status = parse_pid_status(&status);
        let user = match status.uid {
            Some(uid) => users.get(&uid).cloned().unwrap_or_else(|| uid.to_string()),
            None => String::new(),
        };

        Ok(Some(ProcessCounters {
            pid,
            command: stat.command,
            user,
            cpu_user: stat.utime,
            cpu_kernel: stat.stime,
            rss_bytes: status.rss_kb.unwrap_or(0) * 1024,
            vsize_bytes: stat.vsize,
        }))
    }
}

impl CounterSource for ProcfsSource {
    fn name(&self) -> &str {
        "procfs"
    }

    fn read_cpu(&self) -> Result<CpuCounters, SourceError> {
        let content = self.read("stat")?;
        parse_cpu_stat(&content).map_err(|reason| parse_error(&self.proc_root.join("stat"), reason))
    }

    fn read_memory(&self) -> Result<MemoryCounters, SourceError> {
        let content = self.read("meminfo")?;
        parse_meminfo(&content)
            .map_err(|reason| parse_error(&self.proc_root.join("meminfo"), reason))
    }

    fn list_processes(&self) -> Result<Vec<ProcessCounters>, SourceError> {
        let entries = fs::read_dir(&self.proc_root).map_err(|source| SourceError::Io {
            path: self.proc_root.display().to_string(),
            source,
        })?;
        let users = self.users();

        let mut processes = Vec::new();
        for entry in entries.flatten() {
            let Some(pid) = entry.file_name().to_str().and_then(|n| n.parse::<u32>().ok()) else {
                continue;
            };
            match self.read_process(pid, &users) {
                Ok(Some(process)) => processes.push(process),
                Ok(None) => debug!(pid, "Process exited while being read"),
                Err(e) => debug!(pid, error = %e, "Skipping unreadable process"),
            }
        }
        processes.sort_by_key(|p| p.pid);
        Ok(processes)
    }

    fn read_disks(&self) -> Result<DiskCounters, SourceError> {
        let content = self.read("diskstats")?;
        Ok(parse_diskstats(&content))
    }
}

fn read_file(path: &Path) -> Result<String, SourceError> {
    fs::read_to_string(path).map_err(|source| SourceError::Io {
        path: path.display().to_string(),
        source,
    })
}

fn parse_error(path: &Path, reason: String) -> SourceError {
    SourceError::Parse {
        path: path.display().to_string(),
        reason,
    }
}

/// Like `read_file`, but a process that exited between listing and reading
/// yields `Ok(None)`.
fn read_if_present(path: &Path) -> Result<Option<String>, SourceError> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == io::ErrorKind::NotFound || e.raw_os_error() == Some(ESRCH) => Ok(None),
        Err(source) => Err(SourceError::Io {
            path: path.display().to_string(),
            source,
        }),
    }
}

/// Parses the aggregate `cpu` line of `/proc/stat`.
///
/// Columns are user, nice, system, idle, iowait, irq, softirq, steal; guest
/// time is already included in user and is not counted twice.
pub fn parse_cpu_stat(content: &str) -> Result<CpuCounters, String> {
    let line = content
        .lines()
        .find(|line| line.starts_with("cpu "))
        .ok_or_else(|| "missing aggregate cpu line".to_string())?;

    let fields = line
        .split_whitespace()
        .skip(1)
        .take(8)
        .map(|f| f.parse::<u64>().map_err(|e| format!("invalid cpu field '{}': {}", f, e)))
        .collect::<Result<Vec<_>, _>>()?;
    if fields.len() < 4 {
        return Err(format!("expected at least 4 cpu fields, found {}", fields.len()));
    }
    let field = |i: usize| fields.get(i).copied().unwrap_or(0);

    Ok(CpuCounters {
        user: field(0) + field(1),
        kernel: field(2) + field(5) + field(6),
        total: fields.iter().sum(),
    })
}

/// Parses `/proc/meminfo`. Values there are in kB.
pub fn parse_meminfo(content: &str) -> Result<MemoryCounters, String> {
    let values: HashMap<&str, u64> = content
        .lines()
        .filter_map(|line| {
            let (key, rest) = line.split_once(':')?;
            let value = rest.split_whitespace().next()?.parse().ok()?;
            Some((key.trim(), value))
        })
        .collect();

    let total = *values.get("MemTotal").ok_or_else(|| "missing MemTotal".to_string())?;
    let available = match values.get("MemAvailable") {
        Some(available) => *available,
        None => ["MemFree", "Buffers", "Cached"]
            .iter()
            .map(|key| values.get(key).copied().unwrap_or(0))
            .sum(),
    };

    Ok(MemoryCounters {
        used_bytes: total.saturating_sub(available) * 1024,
        total_bytes: total * 1024,
    })
}

/// The fields of `/proc/<pid>/stat` used here.
#[derive(Debug, Clone, PartialEq)]
pub struct PidStat {
    pub command: String,
    pub utime: u64,
    pub stime: u64,
    pub vsize: u64,
}

/// Parses `/proc/<pid>/stat`. The command is enclosed in parentheses and may
/// itself contain spaces and parentheses, so fields are counted from the last
/// `)`.
pub fn parse_pid_stat(content: &str) -> Result<PidStat, String> {
    let open = content.find('(').ok_or_else(|| "missing '('".to_string())?;
    let close = content.rfind(')').ok_or_else(|| "missing ')'".to_string())?;
    if close < open {
        return Err("malformed command field".to_string());
    }
    let command = content[open + 1..close].to_string();

    // rest[0] is field 3 (state).
    let rest: Vec<&str> = content[close + 1..].split_whitespace().collect();
    let field = |index: usize, name: &str| -> Result<u64, String> {
        rest.get(index)
            .ok_or_else(|| format!("missing {} field", name))?
            .parse()
            .map_err(|e| format!("invalid {} field: {}", name, e))
    };

    Ok(PidStat {
        command,
        utime: field(11, "utime")?,
        stime: field(12, "stime")?,
        vsize: field(20, "vsize")?,
    })
}

/// The fields of `/proc/<pid>/status` used here.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PidStatus {
    /// Real uid.
    pub uid: Option<u32>,
    /// Resident set size in kB. Absent for kernel threads.
    pub rss_kb: Option<u64>,
}

pub fn parse_pid_status(content: &str) -> PidStatus {
    let mut status = PidStatus::default();
    for line in content.lines() {
        let Some((key, rest)) = line.split_once(':') else {
            continue;
        };
        let first = rest.split_whitespace().next();
        match key {
            "Uid" => status.uid = first.and_then(|v| v.parse().ok()),
            "VmRSS" => status.rss_kb = first.and_then(|v| v.parse().ok()),
            _ => {}
        }
    }
    status
}

/// Parses `/proc/diskstats` into cumulative I/O milliseconds per device.
/// Devices that never did any I/O are left out.
pub fn parse_diskstats(content: &str) -> DiskCounters {
    content
        .lines()
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            let name = fields.get(2)?;
            let io_ticks: u64 = fields.get(12)?.parse().ok()?;
            (io_ticks > 0).then(|| (name.to_string(), io_ticks))
        })
        .collect()
}

/// Parses an `/etc/passwd` style file into a uid to name map.
pub fn parse_passwd(content: &str) -> HashMap<u32, String> {
    content
        .lines()
        .filter(|line| !line.starts_with('#'))
        .filter_map(|line| {
            let mut fields = line.split(':');
            let name = fields.next()?;
            let uid = fields.nth(1)?.parse().ok()?;
            Some((uid, name.to_string()))
        })
        .collect()
}
