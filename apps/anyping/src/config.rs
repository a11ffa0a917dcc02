use anyhow::{anyhow, Result};
use anyping_model::{ProbeConfig, ProbeSpec};
use std::env;
use std::ffi::OsString;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

pub const CONFIG_FILE_NAME: &str = ".anyping.json";

pub fn default_config_path() -> PathBuf {
    env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(CONFIG_FILE_NAME)
}

/// Reads the config at `path`. A missing file yields the default config.
pub fn load_config(path: &Path) -> Result<ProbeConfig> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(ProbeConfig::default()),
        Err(err) => return Err(anyhow!("failed to read config {:?}: {}", path, err)),
    };
    let config: ProbeConfig = serde_json::from_str(&contents)
        .map_err(|err| anyhow!("failed to parse config {:?}: {}", path, err))?;
    config
        .validate()
        .map_err(|err| anyhow!("invalid config {:?}: {}", path, err))?;
    Ok(config)
}

/// Saves `config` so that readers of `path` see either the previous file or
/// the complete new one.
pub fn persist_config(path: &Path, config: &ProbeConfig) -> Result<()> {
    let mut json = serde_json::to_vec_pretty(config)
        .map_err(|err| anyhow!("failed to encode config: {err}"))?;
    json.push(b'\n');
    replace_config_file(path, &json)
}

pub fn add_probe(config: &mut ProbeConfig, spec: ProbeSpec) -> Result<usize> {
    spec.validate().map_err(|err| anyhow!("invalid probe: {err}"))?;
    config.probes.push(spec);
    Ok(config.probes.len() - 1)
}

pub fn remove_probe(config: &mut ProbeConfig, position: usize) -> Result<ProbeSpec> {
    if position >= config.probes.len() {
        return Err(out_of_range(position, config.probes.len()));
    }
    Ok(config.probes.remove(position))
}

pub fn move_probe(config: &mut ProbeConfig, from: usize, to: usize) -> Result<()> {
    let len = config.probes.len();
    if from >= len {
        return Err(out_of_range(from, len));
    }
    if to >= len {
        return Err(out_of_range(to, len));
    }
    let spec = config.probes.remove(from);
    config.probes.insert(to, spec);
    Ok(())
}

pub fn set_threshold(config: &mut ProbeConfig, ms: f64) -> Result<()> {
    if !ms.is_finite() || ms < 0.0 {
        return Err(anyhow!("warning threshold must be a non-negative number, got {ms}"));
    }
    config.warning_threshold_ms = ms;
    Ok(())
}

fn out_of_range(position: usize, len: usize) -> anyhow::Error {
    anyhow!("position {position} is out of range for {len} probes")
}

static STAGING_SEQ: AtomicU64 = AtomicU64::new(0);

fn replace_config_file(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)
        .map_err(|err| anyhow!("cannot create config directory {}: {err}", dir.display()))?;

    let staged = staging_path(path);
    let saved = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&staged)
        .and_then(|mut file| {
            file.write_all(contents)?;
            file.sync_all()
        })
        .and_then(|()| fs::rename(&staged, path));
    if let Err(err) = saved {
        let _ = fs::remove_file(&staged);
        return Err(anyhow!("cannot save config {}: {err}", path.display()));
    }

    // Best effort: makes the rename itself durable.
    let _ = fs::File::open(dir).and_then(|dir| dir.sync_all());
    Ok(())
}

/// Sibling of `path` that is unique within this process.
fn staging_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(OsString::from)
        .unwrap_or_else(|| OsString::from(CONFIG_FILE_NAME));
    let seq = STAGING_SEQ.fetch_add(1, Ordering::Relaxed);
    name.push(format!(".{}-{seq}.tmp", std::process::id()));
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = env::temp_dir().join(format!("anyping-{name}-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn missing_file_loads_default() {
        let dir = scratch_dir("missing");
        let config = load_config(&dir.join("absent.json")).unwrap();
        assert_eq!(config, ProbeConfig::default());
        assert_eq!(config.probes[0].address, "8.8.8.8");
    }

    #[test]
    fn persisted_config_loads_back_without_temp_files() {
        let dir = scratch_dir("persist");
        let path = dir.join("nested").join("anyping.json");
        let mut config = ProbeConfig::default();
        add_probe(&mut config, ProbeSpec::new("192.0.2.1")).unwrap();
        set_threshold(&mut config, 80.0).unwrap();

        persist_config(&path, &config).unwrap();
        assert_eq!(load_config(&path).unwrap(), config);

        let leftovers: Vec<_> = fs::read_dir(path.parent().unwrap())
            .unwrap()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());

        set_threshold(&mut config, 20.0).unwrap();
        persist_config(&path, &config).unwrap();
        assert_eq!(load_config(&path).unwrap().warning_threshold_ms, 20.0);
    }

    #[test]
    fn unwritable_location_names_the_config() {
        let dir = scratch_dir("blocked");
        let blocker = dir.join("not-a-dir");
        fs::write(&blocker, "").unwrap();

        let err = persist_config(&blocker.join("anyping.json"), &ProbeConfig::default())
            .unwrap_err()
            .to_string();
        assert!(err.contains("config directory"), "{err}");
    }

    #[test]
    fn staging_files_sit_next_to_the_config() {
        let path = Path::new("/tmp/anyping/settings.json");
        let first = staging_path(path);
        let second = staging_path(path);
        assert_ne!(first, second);
        assert_eq!(first.parent(), path.parent());
        assert!(first
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("settings.json."));
    }

    #[test]
    fn invalid_file_is_an_error() {
        let dir = scratch_dir("invalid");
        let path = dir.join("anyping.json");
        fs::write(&path, r#"{ "probes": [ { "address": "1.1.1.1", "echo_count": 0 } ] }"#)
            .unwrap();
        let err = load_config(&path).unwrap_err();
        assert!(err.to_string().contains("echo count"));

        fs::write(&path, "not json").unwrap();
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn editing_helpers_keep_order_and_check_positions() {
        let mut config = ProbeConfig {
            probes: Vec::new(),
            ..ProbeConfig::default()
        };
        for address in ["192.0.2.1", "192.0.2.2", "192.0.2.3"] {
            add_probe(&mut config, ProbeSpec::new(address)).unwrap();
        }

        move_probe(&mut config, 2, 0).unwrap();
        let order: Vec<&str> = config.probes.iter().map(|p| p.address.as_str()).collect();
        assert_eq!(order, vec!["192.0.2.3", "192.0.2.1", "192.0.2.2"]);

        assert!(move_probe(&mut config, 0, 3).is_err());
        assert!(remove_probe(&mut config, 3).is_err());
        assert_eq!(remove_probe(&mut config, 1).unwrap().address, "192.0.2.1");
        assert_eq!(config.probes.len(), 2);

        assert!(add_probe(&mut config, ProbeSpec::new("-f")).is_err());
        assert!(set_threshold(&mut config, f64::NAN).is_err());
    }
}
