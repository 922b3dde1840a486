use crate::core::interfaces::FileSystemService;
use crate::utils::Result;
use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use std::path::{Path, PathBuf};
use tokio::fs;

pub struct TokioFileSystemService;

impl TokioFileSystemService {
    /// Scatter over sibling directories, gather their listings.
    fn walk(dir: PathBuf) -> BoxFuture<'static, Result<Vec<PathBuf>>> {
        async move {
            let mut files = Vec::new();
            let mut subdirs = Vec::new();
            let mut entries = fs::read_dir(&dir).await?;

            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                let mut file_type = entry.file_type().await?;
                if file_type.is_symlink() {
                    file_type = fs::metadata(&path).await?.file_type();
                }

                if file_type.is_dir() {
                    subdirs.push(path);
                } else if file_type.is_file() {
                    files.push(path);
                }
            }

            let nested = join_all(subdirs.into_iter().map(Self::walk)).await;
            for listing in nested {
                files.extend(listing?);
            }

            Ok(files)
        }
        .boxed()
    }
}

#[async_trait::async_trait]
impl FileSystemService for TokioFileSystemService {
    async fn list_files(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        let mut files = Self::walk(dir.to_path_buf()).await?;
        files.sort();
        Ok(files)
    }

    async fn write_file(&self, path: &Path, content: &str) -> Result<()> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        Ok(fs::write(path, content).await?)
    }
}
