use std::{
    path::{Path, PathBuf},
    str::FromStr,
};

use anyhow::{Result, anyhow, bail};
use serde::Serialize;

/// A chart id paired with the data file it is drawn from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChartSource {
    pub id: String,
    pub file: String,
}

impl ChartSource {
    pub fn new(id: &str, file: &str) -> Self {
        Self {
            id: id.to_string(),
            file: file.to_string(),
        }
    }
}

// "id=file" on the command line
impl FromStr for ChartSource {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let (id, file) = s
            .split_once('=')
            .ok_or_else(|| anyhow!("expected id=file, got {:?}", s))?;
        let id = id.trim();
        let file = file.trim();
        if id.is_empty() || !id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
            bail!("invalid chart id {:?}", id);
        }
        if file.is_empty() {
            bail!("chart {} has no file", id);
        }
        Ok(Self::new(id, file))
    }
}

pub const CONNECTIONS: &str = "connections";
pub const DATA_SENT: &str = "data_sent";
pub const DATA_RECEIVED: &str = "data_received";
pub const UPLOAD_SPEED: &str = "upload_speed";
pub const DOWNLOAD_SPEED: &str = "download_speed";

pub fn default_sources() -> Vec<ChartSource> {
    [CONNECTIONS, DATA_SENT, DATA_RECEIVED, UPLOAD_SPEED, DOWNLOAD_SPEED]
        .iter()
        .map(|id| ChartSource::new(id, &format!("{}.json", id)))
        .collect()
}

#[derive(Debug, Clone)]
pub struct Charts {
    pub media_dir: PathBuf,
    pub sources: Vec<ChartSource>,
}

impl Charts {
    /// Default sources with `extra` replacing same-id entries or appended in order.
    pub fn new(media_dir: impl Into<PathBuf>, extra: Vec<ChartSource>) -> Self {
        let mut sources = default_sources();
        for src in extra {
            match sources.iter_mut().find(|s| s.id == src.id) {
                Some(slot) => *slot = src,
                None => sources.push(src),
            }
        }
        Self {
            media_dir: media_dir.into(),
            sources,
        }
    }

    pub fn get(&self, id: &str) -> Option<&ChartSource> {
        self.sources.iter().find(|s| s.id == id)
    }

    pub fn by_file(&self, file: &str) -> Option<&ChartSource> {
        self.sources.iter().find(|s| s.file == file)
    }

    pub fn path_of(&self, src: &ChartSource) -> PathBuf {
        let file = Path::new(&src.file);
        if file.is_absolute() {
            file.to_path_buf()
        } else {
            self.media_dir.join(file)
        }
    }
}
