//! App-info file emission.
//!
//! Written once when the background thread starts. Profilers read it to
//! find the control port and to map call sites:
//!
//! ```text
//! pid: <decimal>
//! port: <decimal listener port>
//! binary: <absolute path to executable>
//! tscHz: <decimal>
//! <one line per probe: file,line,name,enabled>
//! ```

use crate::domain::InitError;
use crate::probes;
use crate::util;
use log::info;
use std::io::Write;
use std::path::Path;

pub fn write_app_info(path: &Path, listener_port: u16) -> Result<(), InitError> {
    let open_err = |source: std::io::Error| InitError::AppInfoUnwritable {
        path: path.to_path_buf(),
        source,
    };
    let mut out = std::io::BufWriter::new(std::fs::File::create(path).map_err(open_err)?);

    writeln!(out, "pid: {}", std::process::id()).map_err(open_err)?;
    writeln!(out, "port: {listener_port}").map_err(open_err)?;
    writeln!(out, "binary: {}", util::executable_path().display()).map_err(open_err)?;
    writeln!(out, "tscHz: {}", util::estimate_tsc_hz()).map_err(open_err)?;
    for status in probes::registry().snapshot() {
        writeln!(out, "{}", status.csv_line()).map_err(open_err)?;
    }
    out.flush().map_err(open_err)?;

    info!("app info stored at {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_app_info_contents() {
        probes::registry().register("appinfo_a.rs", 12, "txn");

        let dir = tempdir().unwrap();
        let path = dir.path().join("app.info");
        write_app_info(&path, 45678).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next().unwrap(), format!("pid: {}", std::process::id()));
        assert_eq!(lines.next().unwrap(), "port: 45678");
        assert!(lines.next().unwrap().starts_with("binary: "));
        let tsc_line = lines.next().unwrap();
        let tsc_hz: u64 = tsc_line.strip_prefix("tscHz: ").unwrap().parse().unwrap();
        assert!(tsc_hz > 0);
        assert!(text.contains("appinfo_a.rs,12,txn,0"));
    }

    #[test]
    fn test_unwritable_path_fails() {
        let err = write_app_info(Path::new("/nonexistent-dir/app.info"), 1).unwrap_err();
        assert!(matches!(err, InitError::AppInfoUnwritable { .. }));
    }
}
