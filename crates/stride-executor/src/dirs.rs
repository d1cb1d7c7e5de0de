//! Filesystem-backed directory manager.
//!
//! Plans work inside `base/<root_plan_id>/`. An optional external folder
//! is materialized into the plan directory as a scoped symbolic link for
//! top-level plans and removed again on cleanup. Uploaded files are
//! synced from `base/uploads/<upload_key>/`.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use stride_contract::DirectoryManager;

const EXTERNAL_LINK_NAME: &str = "linked_external";

pub struct FsDirectoryManager {
    base: PathBuf,
    external_folder: Option<PathBuf>,
}

impl FsDirectoryManager {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self {
            base: base.into(),
            external_folder: None,
        }
    }

    #[must_use]
    pub fn with_external_folder(mut self, folder: impl Into<PathBuf>) -> Self {
        self.external_folder = Some(folder.into());
        self
    }

    fn upload_dir(&self, upload_key: &str) -> PathBuf {
        self.base.join("uploads").join(upload_key)
    }

    fn link_path(&self, root_plan_id: &str) -> PathBuf {
        self.base.join(root_plan_id).join(EXTERNAL_LINK_NAME)
    }

    fn copy_dir(from: &Path, to: &Path) -> io::Result<()> {
        fs::create_dir_all(to)?;
        for entry in fs::read_dir(from)? {
            let entry = entry?;
            let target = to.join(entry.file_name());
            if entry.file_type()?.is_dir() {
                Self::copy_dir(&entry.path(), &target)?;
            } else {
                fs::copy(entry.path(), target)?;
            }
        }
        Ok(())
    }
}

impl DirectoryManager for FsDirectoryManager {
    fn root_plan_dir(&self, root_plan_id: &str) -> PathBuf {
        self.base.join(root_plan_id)
    }

    fn ensure_external_folder_link(&self, root_plan_id: &str) -> io::Result<()> {
        let Some(external) = &self.external_folder else {
            return Ok(());
        };
        let plan_dir = self.root_plan_dir(root_plan_id);
        fs::create_dir_all(&plan_dir)?;
        let link = self.link_path(root_plan_id);
        if link.symlink_metadata().is_ok() {
            return Ok(());
        }
        #[cfg(unix)]
        std::os::unix::fs::symlink(external, &link)?;
        #[cfg(windows)]
        std::os::windows::fs::symlink_dir(external, &link)?;
        Ok(())
    }

    fn remove_external_folder_link(&self, root_plan_id: &str) -> io::Result<()> {
        let link = self.link_path(root_plan_id);
        if link.symlink_metadata().is_ok() {
            fs::remove_file(&link)?;
        }
        Ok(())
    }

    fn sync_uploaded_files(&self, upload_key: &str, root_plan_id: &str) -> io::Result<()> {
        let uploads = self.upload_dir(upload_key);
        if !uploads.is_dir() {
            return Ok(());
        }
        Self::copy_dir(&uploads, &self.root_plan_dir(root_plan_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn link_is_created_and_removed() {
        let base = tempfile::tempdir().unwrap();
        let external = tempfile::tempdir().unwrap();
        let manager =
            FsDirectoryManager::new(base.path()).with_external_folder(external.path());

        manager.ensure_external_folder_link("plan-1").unwrap();
        let link = base.path().join("plan-1").join(EXTERNAL_LINK_NAME);
        assert!(link.symlink_metadata().is_ok());

        // Idempotent.
        manager.ensure_external_folder_link("plan-1").unwrap();

        manager.remove_external_folder_link("plan-1").unwrap();
        assert!(link.symlink_metadata().is_err());
        // Removing again is a no-op.
        manager.remove_external_folder_link("plan-1").unwrap();
    }

    #[test]
    fn no_external_folder_means_no_link() {
        let base = tempfile::tempdir().unwrap();
        let manager = FsDirectoryManager::new(base.path());
        manager.ensure_external_folder_link("plan-1").unwrap();
        assert!(base
            .path()
            .join("plan-1")
            .join(EXTERNAL_LINK_NAME)
            .symlink_metadata()
            .is_err());
    }

    #[test]
    fn uploads_are_copied_into_the_plan_dir() {
        let base = tempfile::tempdir().unwrap();
        let manager = FsDirectoryManager::new(base.path());
        let upload_dir = base.path().join("uploads").join("batch-1");
        fs::create_dir_all(upload_dir.join("nested")).unwrap();
        fs::write(upload_dir.join("a.txt"), "alpha").unwrap();
        fs::write(upload_dir.join("nested/b.txt"), "beta").unwrap();

        manager.sync_uploaded_files("batch-1", "plan-1").unwrap();
        let plan_dir = base.path().join("plan-1");
        assert_eq!(fs::read_to_string(plan_dir.join("a.txt")).unwrap(), "alpha");
        assert_eq!(
            fs::read_to_string(plan_dir.join("nested/b.txt")).unwrap(),
            "beta"
        );

        // Missing upload key is not an error.
        manager.sync_uploaded_files("missing", "plan-1").unwrap();
    }
}
