use crate::config::load_config;
use anyhow::{anyhow, Result};
use anyping_model::ProbeConfig;
use blake3::Hasher;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::ffi::OsString;
use std::fs::File;
use std::io::{self, ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::sync::mpsc::channel;
use std::thread;
use tracing::{debug, info, warn};

/// Keeps the file watcher alive; dropping it ends the reload thread.
pub struct ConfigWatcher {
    _watcher: RecommendedWatcher,
}

/// Digest of the file contents, `None` when the file does not exist.
pub fn file_digest(path: &Path) -> io::Result<Option<String>> {
    let mut file = match File::open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err),
    };
    let mut hasher = Hasher::new();
    let mut buffer = [0u8; 8192];
    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(Some(hasher.finalize().to_hex().to_string()))
}

/// Decides whether a watch event means the config file really changed.
#[derive(Debug)]
pub struct ChangeFilter {
    path: PathBuf,
    file_name: Option<OsString>,
    last: Option<String>,
}

impl ChangeFilter {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            file_name: path.file_name().map(|name| name.to_os_string()),
            last: file_digest(path).ok().flatten(),
        }
    }

    pub fn observe(&mut self, event: &Event) -> bool {
        if matches!(event.kind, EventKind::Access(_)) {
            return false;
        }
        let touches_config = event
            .paths
            .iter()
            .any(|path| path.file_name().map(|name| name.to_os_string()) == self.file_name);
        if !touches_config {
            return false;
        }

        match file_digest(&self.path) {
            Ok(Some(digest)) if self.last.as_deref() != Some(digest.as_str()) => {
                self.last = Some(digest);
                true
            }
            Ok(_) => false,
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "config digest failed");
                false
            }
        }
    }
}

/// Watches the directory holding `path` and calls `on_change` with the freshly
/// loaded config whenever the file content changes. Unreadable or invalid
/// configs are logged and skipped.
pub fn watch_config<F>(path: &Path, on_change: F) -> Result<ConfigWatcher>
where
    F: Fn(ProbeConfig) + Send + 'static,
{
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };

    let (tx, rx) = channel::<notify::Result<Event>>();
    let mut watcher = notify::recommended_watcher(tx)
        .map_err(|err| anyhow!("failed to create config watcher: {err}"))?;
    watcher
        .watch(&dir, RecursiveMode::NonRecursive)
        .map_err(|err| anyhow!("failed to watch {:?}: {}", dir, err))?;

    let mut filter = ChangeFilter::new(path);
    let path = path.to_path_buf();
    thread::Builder::new()
        .name("config-watch".to_string())
        .spawn(move || {
            for event in rx {
                match event {
                    Ok(event) => {
                        if !filter.observe(&event) {
                            continue;
                        }
                        match load_config(&path) {
                            Ok(config) => {
                                info!(path = %path.display(), "config changed, reloading");
                                on_change(config);
                            }
                            Err(err) => warn!(error = %err, "ignoring config change"),
                        }
                    }
                    Err(err) => warn!(error = %err, "config watch error"),
                }
            }
            debug!("config watcher stopped");
        })
        .map_err(|err| anyhow!("failed to start config watcher thread: {err}"))?;

    Ok(ConfigWatcher { _watcher: watcher })
}
