use config::EngineConfig;
use std::fs;
use std::path::{Path, PathBuf};
use store::FileData;

pub fn test_config(dir: &Path) -> EngineConfig {
    EngineConfig::new(dir.join("db")).with_sync_on_close(false)
}

pub fn titled(title: &str) -> FileData {
    FileData {
        url: Some(format!("http://example.com/{title}")),
        title: Some(title.to_string()),
        size: title.len() as i32,
        ..FileData::default()
    }
}

/// Every regular file under `dir` (one level plus `pos/`), with contents.
pub fn snapshot_dir(dir: &Path) -> Vec<(PathBuf, Vec<u8>)> {
    let mut out = Vec::new();
    for d in [dir.to_path_buf(), dir.join("pos")] {
        let Ok(entries) = fs::read_dir(&d) else {
            continue;
        };
        for e in entries.flatten() {
            let p = e.path();
            if p.is_file() {
                let bytes = fs::read(&p).unwrap();
                out.push((p, bytes));
            }
        }
    }
    out.sort();
    out
}
