use crate::error::{Error, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Key-value storage for the persisted schedule settings.
pub trait ScheduleStore: Send {
    fn read(&self, key: &str) -> Result<Option<String>>;
    fn write(&mut self, key: &str, value: &str) -> Result<()>;
    /// Where the values live, for log output.
    fn location(&self) -> String;
}

/// Dotenv-style file. Every read goes back to disk so a rewrite is seen by
/// the next cycle, regardless of what was loaded into the environment.
pub struct EnvFileStore {
    path: PathBuf,
}

impl EnvFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Sibling of the store file, so the final rename stays on one filesystem.
    fn temp_path(&self) -> PathBuf {
        let tmp_name = format!(
            ".{}.tmp-{}",
            self.path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("env"),
            std::process::id()
        );
        self.path
            .parent()
            .map(|p| p.join(&tmp_name))
            .unwrap_or_else(|| PathBuf::from(&tmp_name))
    }
}

impl ScheduleStore for EnvFileStore {
    fn read(&self, key: &str) -> Result<Option<String>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let entries = dotenvy::from_path_iter(&self.path).map_err(|e| dotenv_error(&self.path, e))?;
        let mut found = None;
        for entry in entries {
            let (k, v) = entry.map_err(|e| dotenv_error(&self.path, e))?;
            if k == key {
                found = Some(v);
            }
        }
        Ok(found)
    }

    fn write(&mut self, key: &str, value: &str) -> Result<()> {
        let content = if self.path.exists() {
            fs::read_to_string(&self.path)?
        } else {
            String::new()
        };

        let mut out = String::with_capacity(content.len() + key.len() + value.len() + 2);
        for line in content.lines() {
            if line_key(line) == Some(key) {
                continue;
            }
            out.push_str(line);
            out.push('\n');
        }
        out.push_str(&format!("{key}={value}\n"));

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        // The file also holds credentials; never leave it half written.
        let tmp_path = self.temp_path();
        fs::write(&tmp_path, out)?;
        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }

    fn location(&self) -> String {
        format!("file {}", self.path.display())
    }
}

/// The process environment. Writes only last as long as the process.
#[derive(Default)]
pub struct ProcessEnvStore;

impl ScheduleStore for ProcessEnvStore {
    fn read(&self, key: &str) -> Result<Option<String>> {
        Ok(std::env::var(key).ok())
    }

    fn write(&mut self, key: &str, value: &str) -> Result<()> {
        std::env::set_var(key, value);
        Ok(())
    }

    fn location(&self) -> String {
        "process environment".to_string()
    }
}

/// The file store when `path` exists, the process environment otherwise.
pub fn open(path: &Path) -> Box<dyn ScheduleStore> {
    if path.exists() {
        Box::new(EnvFileStore::new(path))
    } else {
        Box::new(ProcessEnvStore)
    }
}

fn line_key(line: &str) -> Option<&str> {
    let line = line.trim_start();
    if line.starts_with('#') {
        return None;
    }
    let line = line.strip_prefix("export ").unwrap_or(line);
    line.split_once('=').map(|(k, _)| k.trim())
}

fn dotenv_error(path: &Path, err: dotenvy::Error) -> Error {
    match err {
        dotenvy::Error::Io(e) => Error::Store(e),
        other => Error::Configuration(format!("{}: {other}", path.display())),
    }
}
