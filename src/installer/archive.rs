use std::fs;
use std::io::{self, Read};
use std::path::Path;

use flate2::read::GzDecoder;
use log::debug;
use sha2::{Digest, Sha256};
use tar::Archive;
use walkdir::WalkDir;
use zip::read::ZipArchive;
use zip::result::ZipError;

use crate::error::{LauncherError, LauncherResult};

/// How a downloaded payload is turned into a directory tree.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PayloadKind {
    Zip,
    TarGz,
    /// Placed as-is under its file name.
    File,
}

impl PayloadKind {
    pub fn from_file_name(name: &str) -> Self {
        let lower = name.to_ascii_lowercase();
        if lower.ends_with(".zip") {
            PayloadKind::Zip
        } else if lower.ends_with(".tar.gz") || lower.ends_with(".tgz") {
            PayloadKind::TarGz
        } else {
            PayloadKind::File
        }
    }
}

/// Reject empty downloads and, when a digest is published, mismatching ones.
pub fn verify_payload(component: &str, path: &Path, expected_sha256: Option<&str>) -> LauncherResult<()> {
    let len = fs::metadata(path)
        .map_err(|e| LauncherError::apply(component, path, e))?
        .len();
    if len == 0 {
        return Err(LauncherError::corrupt(component, "payload is empty"));
    }

    let Some(expected) = expected_sha256.map(str::trim).filter(|v| !v.is_empty()) else {
        return Ok(());
    };
    let actual = sha256_file(path).map_err(|e| LauncherError::apply(component, path, e))?;
    if !actual.eq_ignore_ascii_case(expected) {
        return Err(LauncherError::corrupt(
            component,
            format!("checksum mismatch: expected {expected}, got {actual}"),
        ));
    }
    debug!("{component}: checksum verified");
    Ok(())
}

pub fn sha256_file(path: &Path) -> io::Result<String> {
    let mut file = fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        let read = file.read(&mut buf)?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Expand `payload` into the empty directory `dest`.
pub fn unpack(
    component: &str,
    kind: PayloadKind,
    payload: &Path,
    file_name: &str,
    dest: &Path,
) -> LauncherResult<()> {
    fs::create_dir_all(dest).map_err(|e| LauncherError::apply(component, dest, e))?;
    match kind {
        PayloadKind::Zip => extract_zip(component, payload, dest),
        PayloadKind::TarGz => extract_targz(component, payload, dest),
        PayloadKind::File => {
            let target = dest.join(file_name);
            fs::copy(payload, &target)
                .map(|_| ())
                .map_err(|e| LauncherError::apply(component, target, e))
        }
    }
}

fn extract_zip(component: &str, archive_path: &Path, dest: &Path) -> LauncherResult<()> {
    let file = fs::File::open(archive_path).map_err(|e| LauncherError::apply(component, archive_path, e))?;
    let mut archive = ZipArchive::new(file).map_err(|e| zip_error(component, archive_path, e))?;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| zip_error(component, archive_path, e))?;
        let relative = entry.enclosed_name().ok_or_else(|| {
            LauncherError::corrupt(component, format!("unsafe entry path {:?}", entry.name()))
        })?;
        let out_path = dest.join(relative);
        if entry.is_dir() {
            fs::create_dir_all(&out_path).map_err(|e| LauncherError::apply(component, &out_path, e))?;
            continue;
        }
        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent).map_err(|e| LauncherError::apply(component, parent, e))?;
        }
        let mut out_file =
            fs::File::create(&out_path).map_err(|e| LauncherError::apply(component, &out_path, e))?;
        io::copy(&mut entry, &mut out_file).map_err(|e| match e.kind() {
            io::ErrorKind::InvalidData | io::ErrorKind::UnexpectedEof => {
                LauncherError::corrupt(component, format!("zip entry {:?}: {e}", entry.name()))
            }
            _ => LauncherError::apply(component, &out_path, e),
        })?;
        drop(out_file);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(mode) = entry.unix_mode() {
                fs::set_permissions(&out_path, fs::Permissions::from_mode(mode & 0o7777))
                    .map_err(|e| LauncherError::apply(component, &out_path, e))?;
            }
        }
    }
    Ok(())
}

fn extract_targz(component: &str, archive_path: &Path, dest: &Path) -> LauncherResult<()> {
    let file = fs::File::open(archive_path).map_err(|e| LauncherError::apply(component, archive_path, e))?;
    let mut archive = Archive::new(GzDecoder::new(file));
    archive
        .unpack(dest)
        .map_err(|e| tar_error(component, dest, e))
}

/// Local filesystem failures are apply errors; anything else means the archive is bad.
fn tar_error(component: &str, dest: &Path, err: io::Error) -> LauncherError {
    match err.kind() {
        io::ErrorKind::PermissionDenied
        | io::ErrorKind::StorageFull
        | io::ErrorKind::ReadOnlyFilesystem
        | io::ErrorKind::FileTooLarge
        | io::ErrorKind::ResourceBusy => LauncherError::apply(component, dest, err),
        _ => LauncherError::corrupt(component, format!("tar.gz extract error: {err}")),
    }
}

fn zip_error(component: &str, path: &Path, err: ZipError) -> LauncherError {
    match err {
        ZipError::Io(source) => LauncherError::apply(component, path, source),
        other => LauncherError::corrupt(component, format!("zip parse error: {other}")),
    }
}

/// Number of regular files below `dir`.
pub fn count_files(dir: &Path) -> usize {
    WalkDir::new(dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .count()
}
