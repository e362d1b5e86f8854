use std::path::PathBuf;

pub trait AppPaths: Send + Sync {
    fn downloads_dir(&self) -> PathBuf;
    fn data_dir(&self) -> PathBuf;
    fn cache_dir(&self) -> PathBuf;
}

pub struct DesktopPaths;

impl AppPaths for DesktopPaths {
    fn downloads_dir(&self) -> PathBuf {
        dirs::download_dir().unwrap_or_else(|| PathBuf::from("."))
    }

    fn data_dir(&self) -> PathBuf {
        if let Ok(dir) = std::env::var("VIDLINK_DATA_DIR") {
            return PathBuf::from(dir);
        }
        dirs::data_dir()
            .map(|d| d.join("vidlink"))
            .unwrap_or_else(|| PathBuf::from("."))
    }

    fn cache_dir(&self) -> PathBuf {
        dirs::cache_dir()
            .map(|d| d.join("vidlink"))
            .unwrap_or_else(|| PathBuf::from(".").join("cache"))
    }
}

/// Fixed-root layout, used by tests and portable installs.
pub struct RootedPaths {
    pub root: PathBuf,
}

impl RootedPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl AppPaths for RootedPaths {
    fn downloads_dir(&self) -> PathBuf {
        self.root.join("downloads")
    }

    fn data_dir(&self) -> PathBuf {
        self.root.join("data")
    }

    fn cache_dir(&self) -> PathBuf {
        self.root.join("cache")
    }
}
