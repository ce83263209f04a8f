#![allow(unsafe_code)]

use std::fs;
use std::path::Path;

use tracing::debug;

/// Logical CPUs grouped by NUMA node, indexed by the kernel's node id.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NumaTopology {
    nodes: Vec<Vec<usize>>,
    /// First node id that owns at least one CPU.
    fallback: usize,
}

impl NumaTopology {
    /// Reads the node layout from sysfs, falling back to a single node that
    /// spans every available CPU.
    pub fn detect() -> Self {
        match Self::from_sysfs(Path::new("/sys/devices/system/node")) {
            Some(topology) => topology,
            None => {
                let cpus = std::thread::available_parallelism()
                    .map(|n| n.get())
                    .unwrap_or(1);
                debug!(cpus, "numa.detect.single_node_fallback");
                Self::single(cpus)
            }
        }
    }

    /// A single node owning CPUs `0..cpus`.
    pub fn single(cpus: usize) -> Self {
        Self {
            nodes: vec![(0..cpus.max(1)).collect()],
            fallback: 0,
        }
    }

    /// Builds a topology where `nodes[id]` lists the CPUs of node `id`.
    /// Memory-only nodes keep their id with an empty CPU list.
    pub fn from_nodes(nodes: Vec<Vec<usize>>) -> Self {
        match nodes.iter().position(|cpus| !cpus.is_empty()) {
            Some(fallback) => Self { nodes, fallback },
            None => Self::single(1),
        }
    }
    fn from_sysfs(root: &Path) -> Option<Self> {
        let mut found: Vec<(usize, Vec<usize>)> = Vec::new();
        for entry in fs::read_dir(root).ok()? {
            let entry = entry.ok()?;
            let name = entry.file_name();
            let Some(id) = name
                .to_str()
                .and_then(|n| n.strip_prefix("node"))
                .and_then(|n| n.parse::<usize>().ok())
            else {
                continue;
            };
            let list = fs::read_to_string(entry.path().join("cpulist")).ok()?;
            found.push((id, parse_cpu_list(&list)?));
        }
        let slots = found.iter().map(|(id, _)| id + 1).max().unwrap_or(0);
        let mut nodes = vec![Vec::new(); slots];
        for (id, cpus) in found {
            nodes[id] = cpus;
        }
        let topology = Self::from_nodes(nodes);
        debug!(nodes = topology.node_count(), "numa.detect.sysfs");
        Some(topology)
    }

    /// Number of nodes that own at least one CPU.
    pub fn node_count(&self) -> usize {
        self.nodes.iter().filter(|cpus| !cpus.is_empty()).count()
    }

    /// CPUs of `node`, or of the first node with CPUs when `node` is unknown
    /// or has none.
    pub fn cpus(&self, node: usize) -> &[usize] {
        match self.nodes.get(node) {
            Some(cpus) if !cpus.is_empty() => cpus,
            _ => &self.nodes[self.fallback],
        }
    }

    /// Number of logical threads on `node`.
    pub fn threads_on(&self, node: usize) -> usize {
        self.cpus(node).len()
    }
}

/// Parses a sysfs CPU list such as `0-3,8,10-11`.
pub(crate) fn parse_cpu_list(raw: &str) -> Option<Vec<usize>> {
    let mut cpus = Vec::new();
    for part in raw.trim().split(',').filter(|p| !p.is_empty()) {
        match part.split_once('-') {
            Some((lo, hi)) => {
                let lo: usize = lo.trim().parse().ok()?;
                let hi: usize = hi.trim().parse().ok()?;
                if hi < lo {
                    return None;
                }
                cpus.extend(lo..=hi);
            }
            None => cpus.push(part.trim().parse().ok()?),
        }
    }
    Some(cpus)
}

/// Pins the calling thread to `cpu`. Returns false when pinning is unsupported or refused.
#[cfg(target_os = "linux")]
pub fn pin_current_thread(cpu: usize) -> bool {
    if cpu >= libc::CPU_SETSIZE as usize {
        debug!(cpu, "numa.pin.beyond_cpu_set");
        return false;
    }
    // SAFETY: `set` is a plain bitmask owned by this frame, `cpu` is within
    // its bounds, and the kernel only reads it.
    let rc = unsafe {
        let mut set: libc::cpu_set_t = std::mem::zeroed();
        libc::CPU_ZERO(&mut set);
        libc::CPU_SET(cpu, &mut set);
        libc::sched_setaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), &set)
    };
    if rc != 0 {
        debug!(cpu, error = %std::io::Error::last_os_error(), "numa.pin.failed");
    }
    rc == 0
}

/// Pins the calling thread to `cpu`. Returns false when pinning is unsupported or refused.
#[cfg(not(target_os = "linux"))]
pub fn pin_current_thread(_cpu: usize) -> bool {
    false
}
