//! Physical resources of the host.

use std::path::Path;

use ghost_reservations::{ResourceMap, LOCAL_GB, MEMORY_MB, VCPUS};

const MIB: i64 = 1024 * 1024;
const GIB: i64 = 1024 * MIB;

#[derive(Debug, Clone)]
pub struct SystemResources {
    pub cpu_cores: i32,
    pub total_memory_bytes: i64,
    pub available_memory_bytes: i64,
    pub total_disk_bytes: i64,
}

impl SystemResources {
    /// Measure the host; disk is the filesystem holding `data_dir`.
    pub fn measure(data_dir: &Path) -> Self {
        let cpu_cores = get_cpu_count();
        let (total_memory, available_memory) = get_memory_info();

        Self {
            cpu_cores,
            total_memory_bytes: total_memory,
            available_memory_bytes: available_memory,
            total_disk_bytes: get_disk_total(data_dir),
        }
    }

    /// Schedulable capacity in `vcpus`, `memory_mb` and `local_gb`.
    pub fn capacity(&self) -> ResourceMap {
        [
            (VCPUS, i64::from(self.cpu_cores)),
            (MEMORY_MB, self.total_memory_bytes / MIB),
            (LOCAL_GB, self.total_disk_bytes / GIB),
        ]
        .into_iter()
        .collect()
    }
}

fn get_cpu_count() -> i32 {
    #[cfg(unix)]
    {
        let count = unsafe { libc::sysconf(libc::_SC_NPROCESSORS_ONLN) };
        if count > 0 {
            return count as i32;
        }
    }

    std::thread::available_parallelism()
        .map(|p| p.get() as i32)
        .unwrap_or(1)
}

#[cfg(target_os = "linux")]
fn get_memory_info() -> (i64, i64) {
    if let Ok(meminfo) = std::fs::read_to_string("/proc/meminfo") {
        let (total, available) = parse_meminfo(&meminfo);
        if total > 0 {
            return (total, available);
        }
    }

    sysconf_memory().unwrap_or((16 * GIB, 8 * GIB))
}

#[cfg(not(target_os = "linux"))]
fn get_memory_info() -> (i64, i64) {
    sysconf_memory()
        .map(|(total, _)| (total, total / 2))
        .unwrap_or((16 * GIB, 8 * GIB))
}

#[cfg(unix)]
fn sysconf_memory() -> Option<(i64, i64)> {
    let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    let total_pages = unsafe { libc::sysconf(libc::_SC_PHYS_PAGES) };

    if page_size <= 0 || total_pages <= 0 {
        return None;
    }

    let total = (page_size as i64).saturating_mul(total_pages as i64);

    #[cfg(target_os = "linux")]
    let avail = {
        let avail_pages = unsafe { libc::sysconf(libc::_SC_AVPHYS_PAGES) };
        if avail_pages > 0 {
            (page_size as i64).saturating_mul(avail_pages as i64)
        } else {
            total
        }
    };
    #[cfg(not(target_os = "linux"))]
    let avail = total;

    Some((total, avail))
}

#[cfg(not(unix))]
fn sysconf_memory() -> Option<(i64, i64)> {
    None
}

#[cfg(target_os = "linux")]
fn parse_meminfo(content: &str) -> (i64, i64) {
    let mut total: i64 = 0;
    let mut available: i64 = 0;
    let mut free: i64 = 0;
    let mut buffers: i64 = 0;
    let mut cached: i64 = 0;

    for line in content.lines() {
        let mut parts = line.split_whitespace();
        let (Some(key), Some(raw)) = (parts.next(), parts.next()) else {
            continue;
        };
        let value = raw.parse::<i64>().unwrap_or(0).saturating_mul(1024);
        match key {
            "MemTotal:" => total = value,
            "MemAvailable:" => available = value,
            "MemFree:" => free = value,
            "Buffers:" => buffers = value,
            "Cached:" => cached = value,
            _ => {}
        }
    }

    if available == 0 {
        available = free + buffers + cached;
    }

    (total, available)
}

#[cfg(unix)]
fn get_disk_total(path: &Path) -> i64 {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let Ok(c_path) = CString::new(path.as_os_str().as_bytes()) else {
        return 0;
    };

    let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };
    if unsafe { libc::statvfs(c_path.as_ptr(), &mut stat) } != 0 {
        return 0;
    }

    (stat.f_blocks as i64).saturating_mul(stat.f_frsize as i64)
}

#[cfg(not(unix))]
fn get_disk_total(_path: &Path) -> i64 {
    0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_measure_resources() {
        let dir = tempfile::tempdir().unwrap();
        let resources = SystemResources::measure(dir.path());
        assert!(resources.cpu_cores > 0);
        assert!(resources.total_memory_bytes > 0);
        assert!(resources.available_memory_bytes > 0);
        assert!(resources.total_disk_bytes >= 0);
    }

    #[test]
    fn test_missing_data_dir_has_no_disk() {
        let resources = SystemResources::measure(Path::new("/nonexistent/ghost/data"));
        assert_eq!(resources.total_disk_bytes, 0);
        assert_eq!(resources.capacity().get(LOCAL_GB), 0);
    }

    #[test]
    fn test_capacity_units() {
        let resources = SystemResources {
            cpu_cores: 8,
            total_memory_bytes: 16 * GIB + 512 * 1024,
            available_memory_bytes: 4 * GIB,
            total_disk_bytes: 100 * GIB + 1,
        };

        let capacity = resources.capacity();
        assert_eq!(capacity.get(VCPUS), 8);
        assert_eq!(capacity.get(MEMORY_MB), 16 * 1024);
        assert_eq!(capacity.get(LOCAL_GB), 100);
    }

    #[test]
    fn test_get_cpu_count() {
        assert!(get_cpu_count() >= 1);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_parse_meminfo() {
        let sample = r#"MemTotal:       16384000 kB
MemFree:         1234567 kB
MemAvailable:    8000000 kB
Buffers:          123456 kB
Cached:          2345678 kB
"#;
        let (total, available) = parse_meminfo(sample);
        assert_eq!(total, 16384000 * 1024);
        assert_eq!(available, 8000000 * 1024);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_parse_meminfo_no_available() {
        let sample = r#"MemTotal:       16384000 kB
MemFree:         1000000 kB
Buffers:          500000 kB
Cached:          2000000 kB
"#;
        let (total, available) = parse_meminfo(sample);
        assert_eq!(total, 16384000 * 1024);
        assert_eq!(available, (1000000 + 500000 + 2000000) * 1024);
    }
}
