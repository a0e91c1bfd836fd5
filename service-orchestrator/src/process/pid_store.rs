use log::warn;
use service_model::ProcessRecord;
use std::fs;
use std::io::{self, ErrorKind};
use std::path::PathBuf;

/// One JSON [`ProcessRecord`] per service under the run directory.
#[derive(Debug, Clone)]
pub struct PidStore {
    dir: PathBuf,
}

impl PidStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path(&self, service: &str) -> PathBuf {
        self.dir.join(format!("{}.pid.json", service))
    }

    pub fn record(&self, record: &ProcessRecord) -> io::Result<()> {
        fs::create_dir_all(&self.dir)?;
        let json = serde_json::to_vec_pretty(record)
            .map_err(|e| io::Error::new(ErrorKind::InvalidData, e))?;
        fs::write(self.path(&record.service), json)
    }

    /// Returns `None` when nothing is recorded. Unreadable records are
    /// discarded with a warning.
    pub fn load(&self, service: &str) -> io::Result<Option<ProcessRecord>> {
        let path = self.path(service);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };
        match serde_json::from_slice(&bytes) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                warn!("PidStore: discarding corrupt record {}: {}", path.display(), e);
                self.clear(service)?;
                Ok(None)
            }
        }
    }

    pub fn clear(&self, service: &str) -> io::Result<()> {
        match fs::remove_file(self.path(service)) {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }
}
