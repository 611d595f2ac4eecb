use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Where an image's encoded bytes come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    Path(PathBuf),
    /// Bytes already in memory, e.g. a camera frame
    Encoded { name: String, bytes: Arc<[u8]> },
}

impl ImageSource {
    pub fn path(path: impl Into<PathBuf>) -> Self {
        Self::Path(path.into())
    }

    pub fn encoded(name: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self::Encoded {
            name: name.into(),
            bytes: bytes.into(),
        }
    }

    /// Identity reported in comparison results
    pub fn identity(&self) -> String {
        match self {
            Self::Path(path) => path.display().to_string(),
            Self::Encoded { name, .. } => name.clone(),
        }
    }

    pub async fn read(&self) -> std::io::Result<Arc<[u8]>> {
        match self {
            Self::Path(path) => Ok(tokio::fs::read(path).await?.into()),
            Self::Encoded { bytes, .. } => Ok(Arc::clone(bytes)),
        }
    }
}

impl From<PathBuf> for ImageSource {
    fn from(path: PathBuf) -> Self {
        Self::Path(path)
    }
}

impl From<&Path> for ImageSource {
    fn from(path: &Path) -> Self {
        Self::Path(path.to_path_buf())
    }
}

impl fmt::Display for ImageSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.identity())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_read_path_and_encoded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logo.bin");
        std::fs::write(&path, [1u8, 2, 3]).unwrap();

        let from_disk = ImageSource::from(path.as_path());
        assert_eq!(&*from_disk.read().await.unwrap(), &[1, 2, 3]);
        assert_eq!(from_disk.identity(), path.display().to_string());

        let in_memory = ImageSource::encoded("frame-7", vec![9u8, 8]);
        assert_eq!(&*in_memory.read().await.unwrap(), &[9, 8]);
        assert_eq!(in_memory.to_string(), "frame-7");
    }

    #[tokio::test]
    async fn test_missing_file() {
        let missing = ImageSource::path("/definitely/not/here.png");
        assert_eq!(missing.read().await.unwrap_err().kind(), std::io::ErrorKind::NotFound);
    }
}
