//! LocalTreeStorageAdapter: a directory subtree on the local disk.
//!
//! Paths are [`PathElement::PlainPath`]s relative to the adapter root. A
//! leading `/` is ignored, so `"/"` and `""` both name the root. Paths may
//! not climb out of the root with `..`.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Component, Path, PathBuf};

use parking_lot::Mutex;
use tracing::debug;
use walkdir::WalkDir;

use persistconf::TreeConfig;

use crate::adapter::{StorageAdapter, StorageType};
use crate::error::{Result, StorageError};
use crate::hash::md5_hex_reader;
use crate::meta::{extension_of, MetaInfo};
use crate::path::PathElement;

/// Storage adapter over a local directory tree.
#[derive(Debug)]
pub struct LocalTreeStorageAdapter {
    root: PathBuf,
    lock: Mutex<()>,
}

impl LocalTreeStorageAdapter {
    /// Create an adapter rooted at `config.root_dir`, creating the root
    /// directory if needed.
    pub fn new(config: &TreeConfig) -> Result<Self> {
        Self::at(&config.root_dir)
    }

    /// Create an adapter rooted at a specific path.
    pub fn at(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .map_err(|e| StorageError::io("create root", root.display(), e))?;
        debug!(root = %root.display(), "tree adapter ready");
        Ok(Self {
            root,
            lock: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute path for `element`, after type and containment checks.
    fn resolve(&self, element: &PathElement) -> Result<PathBuf> {
        let raw = element.as_plain().ok_or(StorageError::TypeMismatch {
            expected: "plain path",
            actual: element.kind(),
        })?;

        let relative = Path::new(raw.trim_start_matches('/'));
        let mut resolved = self.root.clone();
        for component in relative.components() {
            match component {
                Component::Normal(part) => resolved.push(part),
                Component::CurDir => {}
                Component::ParentDir => {
                    return Err(StorageError::unsupported(format!(
                        "path {} leaves the storage root",
                        raw
                    )))
                }
                Component::RootDir | Component::Prefix(_) => {}
            }
        }
        Ok(resolved)
    }

    fn write_at(&self, target: &Path, offset: u64, bytes: &[u8]) -> Result<()> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(target)
            .map_err(|e| StorageError::io("open", target.display(), e))?;

        let len = file
            .metadata()
            .map_err(|e| StorageError::io("stat", target.display(), e))?
            .len();
        let start = offset.min(len);
        if start == 0 {
            file.set_len(0)
                .map_err(|e| StorageError::io("truncate", target.display(), e))?;
        }

        file.seek(SeekFrom::Start(start))
            .and_then(|_| file.write_all(bytes))
            .and_then(|_| file.flush())
            .map_err(|e| StorageError::io("write", target.display(), e))?;

        debug!(path = %target.display(), offset = start, bytes = bytes.len(), "wrote file");
        Ok(())
    }

    /// Rename, falling back to copy + delete across filesystems.
    fn rename_or_copy(&self, from: &Path, to: &Path, is_dir: bool) -> Result<()> {
        match fs::rename(from, to) {
            Ok(()) => Ok(()),
            Err(e) if e.raw_os_error() == Some(libc::EXDEV) => {
                debug!(from = %from.display(), to = %to.display(), "cross-device move, copying");
                let removed = if is_dir {
                    copy_dir_recursive(from, to)?;
                    fs::remove_dir_all(from)
                } else {
                    fs::copy(from, to)
                        .map_err(|e| StorageError::io("copy", from.display(), e))?;
                    fs::remove_file(from)
                };
                removed.map_err(|e| StorageError::io("remove moved", from.display(), e))
            }
            Err(e) => Err(StorageError::io("rename", from.display(), e)),
        }
    }

    fn relative_to_root(&self, canonical_root: &Path, path: &Path) -> String {
        path.strip_prefix(canonical_root)
            .unwrap_or(path)
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    }
}

fn copy_dir_recursive(from: &Path, to: &Path) -> Result<()> {
    for entry in WalkDir::new(from) {
        let entry = entry.map_err(|e| StorageError::io("walk", from.display(), e.into()))?;
        let relative = entry.path().strip_prefix(from).unwrap_or(entry.path());
        let target = to.join(relative);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)
                .map_err(|e| StorageError::io("create", target.display(), e))?;
        } else {
            fs::copy(entry.path(), &target)
                .map_err(|e| StorageError::io("copy", entry.path().display(), e))?;
        }
    }
    Ok(())
}

/// Metadata, with a missing path mapped to `NotFound`.
fn stat(path: &Path, element: &PathElement) -> Result<fs::Metadata> {
    fs::metadata(path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => StorageError::not_found(element),
        _ => StorageError::io("stat", path.display(), e),
    })
}

impl StorageAdapter for LocalTreeStorageAdapter {
    fn persist(&self, storage_type: StorageType, path: &PathElement, bytes: &[u8]) -> Result<()> {
        self.persist_at(storage_type, path, 0, bytes)
    }

    fn persist_at(
        &self,
        storage_type: StorageType,
        path: &PathElement,
        offset: u64,
        bytes: &[u8],
    ) -> Result<()> {
        let target = self.resolve(path)?;
        let _guard = self.lock.lock();

        match storage_type {
            StorageType::File => self.write_at(&target, offset, bytes),
            StorageType::Directory => {
                fs::create_dir(&target)
                    .map_err(|e| StorageError::io("create directory", target.display(), e))?;
                debug!(path = %target.display(), "created directory");
                Ok(())
            }
        }
    }

    /// Deleting `/` or `./` removes the root directory itself. Later calls
    /// fail until the root is recreated.
    fn delete(&self, path: &PathElement) -> Result<()> {
        let target = self.resolve(path)?;
        let _guard = self.lock.lock();

        let metadata = fs::symlink_metadata(&target).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => StorageError::not_found(path),
            _ => StorageError::io("stat", target.display(), e),
        })?;

        let removed = if metadata.is_dir() {
            fs::remove_dir_all(&target)
        } else {
            fs::remove_file(&target)
        };
        removed.map_err(|e| StorageError::io("delete", target.display(), e))?;

        debug!(path = %target.display(), "deleted");
        Ok(())
    }

    fn read(&self, path: &PathElement) -> Result<Vec<u8>> {
        let target = self.resolve(path)?;
        let _guard = self.lock.lock();

        fs::read(&target).map_err(|e| StorageError::io("read", target.display(), e))
    }

    fn read_range(&self, path: &PathElement, offset: u64, length: u64) -> Result<Vec<u8>> {
        let target = self.resolve(path)?;
        let _guard = self.lock.lock();

        let mut file =
            File::open(&target).map_err(|e| StorageError::io("open", target.display(), e))?;
        let len = file
            .metadata()
            .map_err(|e| StorageError::io("stat", target.display(), e))?
            .len();
        let start = offset.min(len);

        file.seek(SeekFrom::Start(start))
            .map_err(|e| StorageError::io("seek", target.display(), e))?;

        let mut chunk = Vec::new();
        file.take(length)
            .read_to_end(&mut chunk)
            .map_err(|e| StorageError::io("read", target.display(), e))?;
        Ok(chunk)
    }

    fn move_path(
        &self,
        storage_type: StorageType,
        old_path: &PathElement,
        new_path: &PathElement,
    ) -> Result<()> {
        let from = self.resolve(old_path)?;
        let to = self.resolve(new_path)?;
        let _guard = self.lock.lock();

        if fs::symlink_metadata(&to).is_ok() {
            return Err(StorageError::AlreadyExists {
                path: new_path.path(),
            });
        }

        match storage_type {
            StorageType::File => self.rename_or_copy(&from, &to, false)?,
            StorageType::Directory => {
                if !stat(&from, old_path)?.is_dir() {
                    return Err(StorageError::unsupported(format!(
                        "{} is not a directory",
                        old_path
                    )));
                }
                if let Some(parent) = to.parent() {
                    fs::create_dir_all(parent)
                        .map_err(|e| StorageError::io("create", parent.display(), e))?;
                }
                self.rename_or_copy(&from, &to, true)?;
            }
        }

        debug!(from = %from.display(), to = %to.display(), "moved");
        Ok(())
    }

    fn meta_information(&self, path: &PathElement) -> Result<MetaInfo> {
        let target = self.resolve(path)?;
        let _guard = self.lock.lock();

        let metadata = stat(&target, path)?;
        if metadata.is_dir() {
            return Ok(MetaInfo::directory());
        }

        let name = target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(MetaInfo::file(metadata.len(), extension_of(&name)))
    }

    fn exists(&self, storage_type: StorageType, path: &PathElement) -> Result<bool> {
        let target = self.resolve(path)?;
        let _guard = self.lock.lock();

        Ok(match fs::metadata(&target) {
            Ok(metadata) => match storage_type {
                StorageType::File => metadata.is_file(),
                StorageType::Directory => metadata.is_dir(),
            },
            Err(_) => false,
        })
    }

    fn is_file(&self, path: &PathElement) -> Result<bool> {
        let target = self.resolve(path)?;
        let _guard = self.lock.lock();

        Ok(stat(&target, path)?.is_file())
    }

    fn is_dir(&self, path: &PathElement) -> Result<bool> {
        let target = self.resolve(path)?;
        let _guard = self.lock.lock();

        Ok(stat(&target, path)?.is_dir())
    }

    fn directory_contents(&self, directory: &PathElement) -> Result<Vec<PathElement>> {
        let target = self.resolve(directory)?;
        let _guard = self.lock.lock();

        if !stat(&target, directory)?.is_dir() {
            return Err(StorageError::unsupported(format!(
                "{} is not a directory",
                directory
            )));
        }

        let canonical_root = self
            .root
            .canonicalize()
            .map_err(|e| StorageError::io("canonicalize", self.root.display(), e))?;
        let canonical_dir = target
            .canonicalize()
            .map_err(|e| StorageError::io("canonicalize", target.display(), e))?;

        let mut contents = Vec::new();
        for entry in WalkDir::new(&canonical_dir)
            .min_depth(1)
            .sort_by_file_name()
        {
            let entry = entry.map_err(|e| StorageError::io("walk", target.display(), e.into()))?;
            contents.push(PathElement::plain(
                self.relative_to_root(&canonical_root, entry.path()),
            ));
        }
        Ok(contents)
    }

    fn checksum(&self, path: &PathElement) -> Result<String> {
        let target = self.resolve(path)?;
        let _guard = self.lock.lock();

        if !stat(&target, path)?.is_file() {
            return Err(StorageError::unsupported(format!(
                "only files have a checksum, {} is a directory",
                path
            )));
        }

        let mut file =
            File::open(&target).map_err(|e| StorageError::io("open", target.display(), e))?;
        md5_hex_reader(&mut file).map_err(|e| StorageError::io("hash", target.display(), e))
    }

    fn root_dir(&self) -> Option<PathElement> {
        Some(PathElement::plain(self.root.to_string_lossy()))
    }
}
