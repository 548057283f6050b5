//! Process and thread introspection
//!
//! Kernel thread ids tag samples, the executable path goes into the
//! app-info file, and affinity control backs `pin_thread`.

use std::path::PathBuf;

/// Kernel thread id of the calling thread.
#[cfg(target_os = "linux")]
pub fn gettid() -> u32 {
    // SAFETY: gettid(2) takes no arguments and cannot fail.
    (unsafe { libc::syscall(libc::SYS_gettid) }) as u32
}

/// Fallback thread id derived from the std thread handle.
#[cfg(not(target_os = "linux"))]
pub fn gettid() -> u32 {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    std::thread::current().id().hash(&mut hasher);
    hasher.finish() as u32
}

/// Absolute path of the running executable, or a placeholder when the OS
/// refuses to reveal it.
pub fn executable_path() -> PathBuf {
    std::env::current_exe().unwrap_or_else(|_| PathBuf::from("<unknown>"))
}

/// Pin a pthread to the given CPU core.
#[cfg(target_os = "linux")]
pub fn pin_thread(thread: libc::pthread_t, core: usize) -> std::io::Result<()> {
    // SAFETY: cpu_set_t is plain data; CPU_ZERO/CPU_SET only touch the set.
    unsafe {
        let mut cpu_set: libc::cpu_set_t = std::mem::zeroed();
        libc::CPU_ZERO(&mut cpu_set);
        libc::CPU_SET(core, &mut cpu_set);
        let rc = libc::pthread_setaffinity_np(
            thread,
            std::mem::size_of::<libc::cpu_set_t>(),
            &cpu_set,
        );
        if rc != 0 {
            return Err(std::io::Error::from_raw_os_error(rc));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gettid_stable_within_thread() {
        assert_eq!(gettid(), gettid());
    }

    #[test]
    fn test_gettid_differs_across_threads() {
        let main_tid = gettid();
        let other = std::thread::spawn(gettid).join().unwrap();
        assert_ne!(main_tid, other);
    }

    #[test]
    fn test_executable_path_is_absolute() {
        assert!(executable_path().is_absolute());
    }
}
