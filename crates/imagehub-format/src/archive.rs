use crate::{Error, Result};
use std::fs::{self, File};
use std::io::{self, Seek, Write};
use std::path::{Component, Path, PathBuf};
use zip::{write::FileOptions, CompressionMethod, ZipArchive, ZipWriter};

/// Represents an entry within a package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageEntry {
    /// Name of the entry as stored in the package.
    pub name: String,
    /// Uncompressed size of the entry.
    pub size: u64,
    /// Whether the entry is flagged as a directory.
    pub is_dir: bool,
}

/// Builder for flat packages.
///
/// Every source file is stored under its base name only; the directory
/// structure of the sources is discarded.
#[derive(Debug, Default, Clone)]
pub struct PackageBuilder {
    files: Vec<PathBuf>,
}

impl PackageBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one source file.
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.files.push(path.into());
        self
    }

    /// Add several source files, keeping their order.
    pub fn with_files<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.files.extend(paths.into_iter().map(Into::into));
        self
    }

    /// Write the package to a seekable sink and hand the sink back.
    pub fn write_to<W: Write + Seek>(&self, writer: W) -> Result<W> {
        let mut zip = ZipWriter::new(writer);

        for path in &self.files {
            let name = path
                .file_name()
                .map(|name| name.to_string_lossy().to_string())
                .ok_or_else(|| Error::InvalidSource(path.display().to_string()))?;

            let mut source = File::open(path)?;
            let options = entry_options(&source)?;

            zip.start_file(name, options)?;
            io::copy(&mut source, &mut zip)?;
        }

        Ok(zip.finish()?)
    }

    /// Write the package to the specified path.
    pub fn write_to_path<P: AsRef<Path>>(&self, path: P) -> Result<PathBuf> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let file = File::create(path)?;
        self.write_to(file)?;

        Ok(path.to_path_buf())
    }
}

#[cfg(unix)]
fn entry_options(source: &File) -> Result<FileOptions<()>> {
    use std::os::unix::fs::PermissionsExt;

    let mode = source.metadata()?.permissions().mode();
    Ok(FileOptions::default()
        .compression_method(CompressionMethod::Stored)
        .unix_permissions(mode))
}

#[cfg(not(unix))]
fn entry_options(_source: &File) -> Result<FileOptions<()>> {
    Ok(FileOptions::default().compression_method(CompressionMethod::Stored))
}

/// A package on disk.
#[derive(Debug)]
pub struct Package {
    path: PathBuf,
    entries: Vec<PackageEntry>,
}

impl Package {
    /// Open a package from the given path and read its entry table.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut archive = ZipArchive::new(File::open(path)?)?;
        let mut entries = Vec::with_capacity(archive.len());

        for i in 0..archive.len() {
            let file = archive.by_index(i)?;
            entries.push(PackageEntry {
                name: file.name().to_string(),
                size: file.size(),
                is_dir: file.is_dir(),
            });
        }

        Ok(Self {
            path: path.to_path_buf(),
            entries,
        })
    }

    /// Path of the package file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get all entries in the package.
    pub fn entries(&self) -> &[PackageEntry] {
        &self.entries
    }

    /// Find an entry by name.
    pub fn entry(&self, name: &str) -> Option<&PackageEntry> {
        self.entries.iter().find(|entry| entry.name == name)
    }

    /// Restore every entry under `dest`, returning the paths written.
    ///
    /// Existing files with the same name are overwritten; nothing is removed
    /// from `dest` beforehand. Unpacking stops at the first failing entry and
    /// whatever was written before it stays in place.
    pub fn unpack_into<P: AsRef<Path>>(&self, dest: P) -> Result<Vec<PathBuf>> {
        let dest = dest.as_ref();
        fs::create_dir_all(dest)?;

        let mut archive = ZipArchive::new(File::open(&self.path)?)?;
        let mut written = Vec::with_capacity(archive.len());

        for i in 0..archive.len() {
            let mut file = archive.by_index(i)?;
            let target = resolve_entry_path(dest, file.name())?;

            if file.is_dir() {
                fs::create_dir_all(&target)?;
            } else {
                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent)?;
                }
                let mut out = File::create(&target)?;
                io::copy(&mut file, &mut out)?;
                apply_mode(&target, file.unix_mode())?;
            }

            written.push(target);
        }

        Ok(written)
    }
}

#[cfg(unix)]
fn apply_mode(path: &Path, mode: Option<u32>) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    if let Some(mode) = mode {
        // Keep the owner able to rewrite the file on the next unpack.
        let mode = (mode & 0o777) | 0o600;
        fs::set_permissions(path, fs::Permissions::from_mode(mode))?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn apply_mode(_path: &Path, _mode: Option<u32>) -> Result<()> {
    Ok(())
}

/// Resolve `root/name` lexically, failing if the result is not strictly
/// below `root`.
fn resolve_entry_path(root: &Path, name: &str) -> Result<PathBuf> {
    let mut parts: Vec<&std::ffi::OsStr> = Vec::new();

    for component in Path::new(name).components() {
        match component {
            Component::Normal(part) => parts.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                if parts.pop().is_none() {
                    return Err(Error::IllegalPath(root.join(name).display().to_string()));
                }
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(Error::IllegalPath(name.to_string()));
            }
        }
    }

    if parts.is_empty() {
        return Err(Error::IllegalPath(root.join(name).display().to_string()));
    }

    let mut resolved = root.to_path_buf();
    resolved.extend(parts);
    Ok(resolved)
}
