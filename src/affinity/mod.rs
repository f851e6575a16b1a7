use crate::error::SweepError;

/// Pins the current process to `core_id`. Child processes inherit the mask.
#[cfg(target_os = "linux")]
pub fn set_affinity(core_id: usize) -> Result<(), SweepError> {
    let max_cpus = 8 * std::mem::size_of::<libc::cpu_set_t>();
    if core_id >= max_cpus {
        return Err(SweepError::Affinity {
            core_id,
            source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "core id out of range"),
        });
    }

    unsafe {
        let mut set: libc::cpu_set_t = std::mem::zeroed();
        libc::CPU_ZERO(&mut set);
        libc::CPU_SET(core_id, &mut set);

        if libc::sched_setaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), &set) != 0 {
            return Err(SweepError::Affinity {
                core_id,
                source: std::io::Error::last_os_error(),
            });
        }
    }

    tracing::info!(core_id, "pinned to core");
    Ok(())
}

#[cfg(not(target_os = "linux"))]
pub fn set_affinity(core_id: usize) -> Result<(), SweepError> {
    tracing::warn!(core_id, "CPU pinning is only supported on Linux, ignoring");
    Ok(())
}
