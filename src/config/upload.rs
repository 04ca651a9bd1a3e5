use std::env;
use std::path::PathBuf;

pub const DEFAULT_MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;
pub const DEFAULT_UPLOAD_DIR: &str = "./data/uploads";

/// Where attachments live on disk and how large they may be.
#[derive(Debug, Clone)]
pub struct UploadConfig {
    pub upload_dir: PathBuf,
    pub max_file_size: u64,
    pub thumbnails: bool,
}

impl UploadConfig {
    pub fn new(upload_dir: impl Into<PathBuf>) -> Self {
        Self {
            upload_dir: upload_dir.into(),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            thumbnails: false,
        }
    }

    pub fn with_max_file_size(mut self, bytes: u64) -> Self {
        self.max_file_size = bytes;
        self
    }

    pub fn with_thumbnails(mut self, enabled: bool) -> Self {
        self.thumbnails = enabled;
        self
    }

    pub fn from_env() -> anyhow::Result<Self> {
        let upload_dir =
            env::var("UPLOAD_DIR").unwrap_or_else(|_| DEFAULT_UPLOAD_DIR.to_string());

        let max_file_size = match env::var("UPLOAD_MAX_FILE_SIZE") {
            Ok(raw) => raw.trim().parse::<u64>().map_err(|_| {
                anyhow::anyhow!("UPLOAD_MAX_FILE_SIZE must be a byte count, got '{}'", raw)
            })?,
            Err(_) => DEFAULT_MAX_FILE_SIZE,
        };
        if max_file_size == 0 {
            return Err(anyhow::anyhow!("UPLOAD_MAX_FILE_SIZE must be > 0"));
        }

        Ok(Self::new(upload_dir)
            .with_max_file_size(max_file_size)
            .with_thumbnails(super::parse_bool_env("UPLOAD_THUMBNAILS", false)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_ten_megabytes() {
        let config = UploadConfig::new("/tmp/x");
        assert_eq!(config.max_file_size, 10_485_760);
        assert!(!config.thumbnails);
    }
}
