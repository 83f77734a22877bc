//! Best-effort device fingerprint.
//!
//! A fixed list of environment probes is sampled once per device and folded
//! into a SHA-256 digest. A probe that fails contributes [`PROBE_SENTINEL`]
//! instead of failing the whole fingerprint. The result is cached in durable
//! storage and never recomputed while the cache is intact. It is an
//! auxiliary signal for the server, not an identity.

use chrono::Local;
use parking_lot::Mutex;
use quill_storage::ClientStore;
use sha2::{Digest, Sha256};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Value recorded for a probe that could not be sampled.
pub const PROBE_SENTINEL: &str = "unavailable";

type Sampler = Box<dyn Fn() -> io::Result<String> + Send + Sync>;

/// One named environment signal.
pub struct EnvironmentProbe {
    pub name: &'static str,
    sample: Sampler,
}

impl EnvironmentProbe {
    pub fn new<F>(name: &'static str, sample: F) -> Self
    where
        F: Fn() -> io::Result<String> + Send + Sync + 'static,
    {
        Self {
            name,
            sample: Box::new(sample),
        }
    }

    /// Run the probe, substituting the sentinel on error or empty output.
    pub fn sample(&self) -> String {
        match (self.sample)() {
            Ok(value) if !value.trim().is_empty() => value.trim().to_string(),
            Ok(_) => PROBE_SENTINEL.to_string(),
            Err(e) => {
                debug!(probe = self.name, error = %e, "Fingerprint probe failed");
                PROBE_SENTINEL.to_string()
            }
        }
    }
}

impl std::fmt::Debug for EnvironmentProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvironmentProbe")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

fn env_var(name: &str) -> io::Result<String> {
    std::env::var(name).map_err(|e| io::Error::new(io::ErrorKind::NotFound, e))
}

fn first_env(names: &[&str]) -> io::Result<String> {
    names
        .iter()
        .find_map(|name| env_var(name).ok().filter(|v| !v.is_empty()))
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, names.join("/")))
}

fn read_trimmed(path: impl AsRef<Path>) -> io::Result<String> {
    Ok(std::fs::read_to_string(path)?.trim().to_string())
}

fn font_dirs() -> Vec<PathBuf> {
    let mut dirs: Vec<PathBuf> = dirs::font_dir().into_iter().collect();
    dirs.extend(
        [
            "/usr/share/fonts",
            "/usr/local/share/fonts",
            "/Library/Fonts",
            "/System/Library/Fonts",
            "C:\\Windows\\Fonts",
        ]
        .iter()
        .map(PathBuf::from),
    );
    dirs
}

/// Installed font directories and how many entries each holds.
fn sample_fonts() -> io::Result<String> {
    let summary: Vec<String> = font_dirs()
        .into_iter()
        .filter_map(|dir| {
            let count = std::fs::read_dir(&dir).ok()?.count();
            Some(format!("{}:{}", dir.display(), count))
        })
        .collect();
    if summary.is_empty() {
        return Err(io::Error::new(io::ErrorKind::NotFound, "no font directories"));
    }
    Ok(summary.join(","))
}

/// The standard probe list.
pub fn default_probes() -> Vec<EnvironmentProbe> {
    vec![
        EnvironmentProbe::new("platform", || {
            Ok(format!("{}-{}", std::env::consts::OS, std::env::consts::ARCH))
        }),
        EnvironmentProbe::new("hostname", || {
            read_trimmed("/etc/hostname").or_else(|_| first_env(&["HOSTNAME", "COMPUTERNAME"]))
        }),
        EnvironmentProbe::new("locale", || first_env(&["LC_ALL", "LC_MESSAGES", "LANG"])),
        EnvironmentProbe::new("timezone", || {
            let offset = Local::now().offset().to_string();
            Ok(match env_var("TZ") {
                Ok(tz) => format!("{}{}", tz, offset),
                Err(_) => offset,
            })
        }),
        EnvironmentProbe::new("surface", || {
            let term = first_env(&["TERM", "TERM_PROGRAM"])?;
            let color = env_var("COLORTERM").unwrap_or_default();
            Ok(format!("{}/{}", term, color))
        }),
        EnvironmentProbe::new("fonts", sample_fonts),
        EnvironmentProbe::new("concurrency", || {
            Ok(std::thread::available_parallelism()?.get().to_string())
        }),
        EnvironmentProbe::new("machine_id", || {
            read_trimmed("/etc/machine-id").or_else(|_| read_trimmed("/var/lib/dbus/machine-id"))
        }),
    ]
}

/// Hash probe samples into a hex digest.
fn digest(samples: &[(&str, String)]) -> String {
    let mut hasher = Sha256::new();
    for (name, value) in samples {
        hasher.update(name.as_bytes());
        hasher.update(b"=");
        hasher.update(value.as_bytes());
        hasher.update(b"\n");
    }
    hasher
        .finalize()
        .iter()
        .map(|byte| format!("{:02x}", byte))
        .collect()
}

/// Produces and caches the device fingerprint.
pub struct FingerprintGenerator {
    store: ClientStore,
    probes: Vec<EnvironmentProbe>,
    cached: Mutex<Option<String>>,
}

impl FingerprintGenerator {
    pub fn new(store: ClientStore) -> Self {
        Self::with_probes(store, default_probes())
    }

    pub fn with_probes(store: ClientStore, probes: Vec<EnvironmentProbe>) -> Self {
        Self {
            store,
            probes,
            cached: Mutex::new(None),
        }
    }

    /// Return the fingerprint, sampling probes only when neither memory nor
    /// durable storage holds one. Never fails.
    pub fn get_or_create(&self) -> String {
        let mut cached = self.cached.lock();
        if let Some(fingerprint) = cached.as_ref() {
            return fingerprint.clone();
        }

        match self.store.device_fingerprint() {
            Ok(Some(stored)) => {
                *cached = Some(stored.clone());
                return stored;
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Failed to read device fingerprint"),
        }

        let samples: Vec<(&str, String)> = self
            .probes
            .iter()
            .map(|probe| (probe.name, probe.sample()))
            .collect();
        let unavailable = samples
            .iter()
            .filter(|(_, value)| value == PROBE_SENTINEL)
            .count();
        let fingerprint = digest(&samples);
        debug!(
            probes = samples.len(),
            unavailable, "Generated device fingerprint"
        );

        if let Err(e) = self.store.set_device_fingerprint(&fingerprint) {
            warn!(error = %e, "Failed to persist device fingerprint");
        }
        *cached = Some(fingerprint.clone());
        fingerprint
    }
}
