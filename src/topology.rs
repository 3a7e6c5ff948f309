//! CPU hotplug control.
//!
//! Core counts are changed machine-wide through `cpuN/online` files. The
//! change outlives this process, so every change made during a run must be
//! undone before exit; [`CoreGuard`] owns that obligation.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::errors::EvalError;

pub const SYSFS_CPU_ROOT: &str = "/sys/devices/system/cpu";

/// Machine-wide processing-unit state.
pub trait CpuTopology {
    fn total_units(&self) -> usize;

    fn online_count(&self) -> usize;

    fn set_unit_online(&mut self, unit: usize, online: bool) -> Result<(), EvalError>;

    /// Brings units `1..target` online and the rest offline. Unit 0 is never
    /// touched, so it stays available to the harness itself.
    fn set_online_cores(&mut self, target: usize) {
        apply_online_cores(self, target);
    }
}

/// Default body of [`CpuTopology::set_online_cores`]. Failed writes are
/// logged and skipped; the resulting count is not verified.
pub fn apply_online_cores<T: CpuTopology + ?Sized>(topology: &mut T, target: usize) {
    let total = topology.total_units();
    if target > total {
        warn!(target, total, "requested more cores than the machine has");
    }
    debug!(target, total, "setting online cores");
    for unit in 1..total {
        let online = unit < target;
        if let Err(err) = topology.set_unit_online(unit, online) {
            warn!("{err}");
        }
    }
}

/// Units under a sysfs-style root (`cpu0/`, `cpu1/online`, ...).
#[derive(Debug)]
pub struct SysfsTopology {
    root: PathBuf,
    total: usize,
}

impl SysfsTopology {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let mut total = count_cpu_dirs(&root);
        if total == 0 {
            total = std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1);
            warn!(root = %root.display(), total, "no cpu directories found, assuming all units online");
        }
        Self { root, total }
    }

    fn online_path(&self, unit: usize) -> PathBuf {
        self.root.join(format!("cpu{unit}")).join("online")
    }

    fn is_online(&self, unit: usize) -> bool {
        // cpu0 usually has no `online` file: it cannot be hot-unplugged.
        match fs::read_to_string(self.online_path(unit)) {
            Ok(s) => s.trim() == "1",
            Err(_) => true,
        }
    }
}

impl Default for SysfsTopology {
    fn default() -> Self {
        Self::new(SYSFS_CPU_ROOT)
    }
}

fn count_cpu_dirs(root: &Path) -> usize {
    let entries = match fs::read_dir(root) {
        Ok(entries) => entries,
        Err(_) => return 0,
    };
    entries
        .filter_map(|e| e.ok())
        .filter(|e| e.path().is_dir())
        .filter(|e| {
            e.file_name()
                .to_str()
                .and_then(|name| name.strip_prefix("cpu"))
                .is_some_and(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
        })
        .count()
}

impl CpuTopology for SysfsTopology {
    fn total_units(&self) -> usize {
        self.total
    }

    fn online_count(&self) -> usize {
        (0..self.total).filter(|&u| self.is_online(u)).count()
    }

    fn set_unit_online(&mut self, unit: usize, online: bool) -> Result<(), EvalError> {
        let path = self.online_path(unit);
        fs::write(&path, if online { "1" } else { "0" }).map_err(|source| {
            EvalError::CpuToggleError {
                unit,
                state: if online { "online" } else { "offline" },
                source,
            }
        })
    }
}

/// In-memory topology. Records every `set_online_cores` request.
#[derive(Debug, Clone)]
pub struct SimulatedTopology {
    online: Vec<bool>,
    pub requests: Vec<usize>,
}

impl SimulatedTopology {
    pub fn new(total: usize, online: usize) -> Self {
        Self {
            online: (0..total).map(|u| u == 0 || u < online).collect(),
            requests: Vec::new(),
        }
    }

    /// Snapshot of a real topology, for dry runs.
    pub fn mirror(real: &dyn CpuTopology) -> Self {
        Self::new(real.total_units(), real.online_count())
    }
}

impl CpuTopology for SimulatedTopology {
    fn total_units(&self) -> usize {
        self.online.len()
    }

    fn online_count(&self) -> usize {
        self.online.iter().filter(|&&o| o).count()
    }

    fn set_unit_online(&mut self, unit: usize, online: bool) -> Result<(), EvalError> {
        match self.online.get_mut(unit) {
            Some(slot) => {
                *slot = online;
                Ok(())
            }
            None => Err(EvalError::CpuToggleError {
                unit,
                state: if online { "online" } else { "offline" },
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such unit"),
            }),
        }
    }

    fn set_online_cores(&mut self, target: usize) {
        self.requests.push(target);
        apply_online_cores(self, target);
    }
}

/// Scoped ownership of the core count for one trial matrix.
///
/// Dropping the guard restores `original` if [`CoreGuard::set_online_cores`]
/// was called at least once.
pub struct CoreGuard<'a> {
    topology: &'a mut dyn CpuTopology,
    original: usize,
    changed: bool,
}

impl<'a> CoreGuard<'a> {
    pub fn new(topology: &'a mut dyn CpuTopology, original: usize) -> Self {
        Self {
            topology,
            original,
            changed: false,
        }
    }

    pub fn online(&self) -> usize {
        self.topology.online_count()
    }

    pub fn changed(&self) -> bool {
        self.changed
    }

    pub fn set_online_cores(&mut self, target: usize) {
        info!(target, "changing online cores");
        self.topology.set_online_cores(target);
        self.changed = true;
    }

    /// Restores the original count now. Later drops are no-ops.
    pub fn restore(&mut self) {
        if self.changed {
            info!(original = self.original, "restoring online cores");
            self.topology.set_online_cores(self.original);
            self.changed = false;
        }
    }
}

impl Drop for CoreGuard<'_> {
    fn drop(&mut self) {
        self.restore();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Builds `cpu0..cpu{total}` with `online` files for every unit but 0.
    fn fake_sysfs(total: usize, online: usize) -> tempfile::TempDir {
        let tmp = tempfile::tempdir().unwrap();
        for unit in 0..total {
            let dir = tmp.path().join(format!("cpu{unit}"));
            fs::create_dir_all(&dir).unwrap();
            if unit > 0 {
                let state = if unit < online { "1\n" } else { "0\n" };
                fs::write(dir.join("online"), state).unwrap();
            }
        }
        fs::create_dir_all(tmp.path().join("cpufreq")).unwrap();
        fs::create_dir_all(tmp.path().join("cpuidle")).unwrap();
        fs::write(tmp.path().join("online"), "0-3\n").unwrap();
        tmp
    }

    #[test]
    fn sysfs_counts_units_and_online() {
        let tmp = fake_sysfs(8, 6);
        let topo = SysfsTopology::new(tmp.path());
        assert_eq!(topo.total_units(), 8);
        assert_eq!(topo.online_count(), 6);
    }

    #[test]
    fn sysfs_set_online_cores_writes_unit_files() {
        let tmp = fake_sysfs(4, 4);
        let mut topo = SysfsTopology::new(tmp.path());
        topo.set_online_cores(2);
        assert_eq!(topo.online_count(), 2);
        assert_eq!(
            fs::read_to_string(tmp.path().join("cpu1/online")).unwrap(),
            "1"
        );
        assert_eq!(
            fs::read_to_string(tmp.path().join("cpu2/online")).unwrap(),
            "0"
        );
        assert!(!tmp.path().join("cpu0/online").exists());
    }

    #[test]
    fn sysfs_round_trip_restores_original() {
        let tmp = fake_sysfs(12, 12);
        let mut topo = SysfsTopology::new(tmp.path());
        let original = topo.online_count();
        for k in [1, 2, 4, 8, 12] {
            topo.set_online_cores(k);
            assert_eq!(topo.online_count(), k);
            topo.set_online_cores(original);
            assert_eq!(topo.online_count(), original);
        }
    }

    #[test]
    fn sysfs_missing_root_falls_back() {
        let topo = SysfsTopology::new("/nonexistent/cpu/root");
        assert!(topo.total_units() >= 1);
        assert_eq!(topo.online_count(), topo.total_units());
    }

    #[test]
    fn simulated_round_trip() {
        let mut topo = SimulatedTopology::new(12, 12);
        for k in [1, 2, 4, 8, 12] {
            topo.set_online_cores(k);
            assert_eq!(topo.online_count(), k);
            topo.set_online_cores(12);
            assert_eq!(topo.online_count(), 12);
        }
    }

    #[test]
    fn unit_zero_stays_online() {
        let mut topo = SimulatedTopology::new(4, 4);
        topo.set_online_cores(0);
        assert_eq!(topo.online_count(), 1);
    }

    #[test]
    fn oversized_target_brings_everything_online() {
        let mut topo = SimulatedTopology::new(4, 1);
        topo.set_online_cores(12);
        assert_eq!(topo.online_count(), 4);
    }

    #[test]
    fn guard_restores_on_drop_after_change() {
        let mut topo = SimulatedTopology::new(8, 8);
        {
            let mut guard = CoreGuard::new(&mut topo, 8);
            guard.set_online_cores(2);
            assert_eq!(guard.online(), 2);
        }
        assert_eq!(topo.online_count(), 8);
        assert_eq!(topo.requests, vec![2, 8]);
    }

    #[test]
    fn guard_without_change_does_nothing() {
        let mut topo = SimulatedTopology::new(8, 8);
        {
            let guard = CoreGuard::new(&mut topo, 8);
            assert!(!guard.changed());
        }
        assert!(topo.requests.is_empty());
    }

    #[test]
    fn explicit_restore_is_not_repeated_on_drop() {
        let mut topo = SimulatedTopology::new(8, 8);
        {
            let mut guard = CoreGuard::new(&mut topo, 8);
            guard.set_online_cores(4);
            guard.restore();
        }
        assert_eq!(topo.requests, vec![4, 8]);
    }

    #[test]
    fn guard_restores_when_unwinding() {
        let mut topo = SimulatedTopology::new(4, 4);
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let mut guard = CoreGuard::new(&mut topo, 4);
            guard.set_online_cores(1);
            panic!("trial blew up");
        }));
        assert!(result.is_err());
        assert_eq!(topo.online_count(), 4);
    }
}
