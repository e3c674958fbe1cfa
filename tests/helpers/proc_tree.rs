#![allow(dead_code)]
//! A fake procfs tree in a temporary directory.

use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

pub struct ProcTree {
    dir: TempDir,
}

impl Default for ProcTree {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcTree {
    /// An empty tree with a passwd file knowing `root` and `alice`.
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("proc")).unwrap();
        let tree = Self { dir };
        tree.write_passwd(&[("root", 0), ("alice", 1000)]);
        tree
    }

    pub fn proc_root(&self) -> PathBuf {
        self.dir.path().join("proc")
    }

    pub fn passwd_path(&self) -> PathBuf {
        self.dir.path().join("passwd")
    }

    pub fn write_passwd(&self, users: &[(&str, u32)]) {
        let content: String = users
            .iter()
            .map(|(name, uid)| format!("{}:x:{}:{}::/home/{}:/bin/sh\n", name, uid, uid, name))
            .collect();
        fs::write(self.passwd_path(), content).unwrap();
    }

    /// Writes `/proc/stat` with the given user, nice, system and idle ticks.
    pub fn write_stat(&self, user: u64, nice: u64, system: u64, idle: u64) {
        let content = format!(
            "cpu  {} {} {} {} 0 0 0 0 0 0\ncpu0 {} {} {} {} 0 0 0 0 0 0\nintr 0\nctxt 0\n",
            user, nice, system, idle, user, nice, system, idle
        );
        fs::write(self.proc_root().join("stat"), content).unwrap();
    }

    pub fn write_meminfo(&self, total_kb: u64, available_kb: u64) {
        let content = format!(
            "MemTotal:       {} kB\nMemFree:        {} kB\nMemAvailable:   {} kB\nBuffers:        0 kB\nCached:         0 kB\n",
            total_kb, available_kb / 2, available_kb
        );
        fs::write(self.proc_root().join("meminfo"), content).unwrap();
    }

    /// Writes `/proc/diskstats` with the given cumulative I/O milliseconds.
    pub fn write_diskstats(&self, disks: &[(&str, u64)]) {
        let content: String = disks
            .iter()
            .enumerate()
            .map(|(i, (name, io_ms))| {
                format!("   8 {:7} {} 100 0 200 30 40 0 80 50 0 {} {} 0 0 0 0\n", i * 16, name, io_ms, io_ms)
            })
            .collect();
        fs::write(self.proc_root().join("diskstats"), content).unwrap();
    }

    #[allow(clippy::too_many_arguments)]
    pub fn add_process(
        &self,
        pid: u32,
        comm: &str,
        uid: u32,
        utime: u64,
        stime: u64,
        vsize: u64,
        rss_kb: Option<u64>,
    ) {
        let dir = self.proc_root().join(pid.to_string());
        fs::create_dir_all(&dir).unwrap();
        let stat = format!(
            "{} ({}) S 1 {} {} 0 -1 4194560 100 0 0 0 {} {} 0 0 20 0 1 0 123 {} 300 18446744073709551615\n",
            pid, comm, pid, pid, utime, stime, vsize
        );
        fs::write(dir.join("stat"), stat).unwrap();

        let mut status = format!("Name:\t{}\nState:\tS (sleeping)\nUid:\t{}\t{}\t{}\t{}\n", comm, uid, uid, uid, uid);
        if let Some(rss_kb) = rss_kb {
            status.push_str(&format!("VmRSS:\t{:8} kB\n", rss_kb));
        }
        fs::write(dir.join("status"), status).unwrap();
    }

    pub fn remove_process(&self, pid: u32) {
        fs::remove_dir_all(self.proc_root().join(pid.to_string())).unwrap();
    }

    /// Creates a non-pid entry, like `/proc/self` or `/proc/sys`.
    pub fn add_other_entry(&self, name: &str) {
        fs::create_dir_all(self.proc_root().join(name)).unwrap();
    }
}
