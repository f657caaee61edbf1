//! Loading firmware images from disk.

use std::path::{Path, PathBuf};
use std::process::Command;

use crate::PreconditionError;

/// Sections stripped when converting an ELF to a flash image
const STRIP_SECTIONS: &[&str] = &[".fuse", ".eeprom", ".lock", ".signature"];

pub const OBJCOPY: &str = "avr-objcopy";

/// Read a raw binary image, rejecting unreadable or empty files
pub fn load<P: AsRef<Path>>(path: P) -> Result<Vec<u8>, PreconditionError> {
    let path = path.as_ref();

    let image = std::fs::read(path).map_err(|e| PreconditionError::Firmware {
        path: path.display().to_string(),
        kind: e.kind(),
    })?;

    if image.is_empty() {
        return Err(PreconditionError::EmptyImage);
    }

    debug!("Loaded {} bytes from {}", image.len(), path.display());

    Ok(image)
}

/// Whether `path` names an ELF file that needs converting first
pub fn is_elf<P: AsRef<Path>>(path: P) -> bool {
    path.as_ref().extension().map_or(false, |e| e == "elf")
}

/// Convert an ELF file to a raw binary next to it with `objcopy`.
///
/// Paths that are not ELF files are returned unchanged.
pub fn convert_elf<P: AsRef<Path>>(path: P, objcopy: &str) -> Result<PathBuf, PreconditionError> {
    let path = path.as_ref();
    if !is_elf(path) {
        return Ok(path.to_path_buf());
    }

    let bin = path.with_extension("bin");
    warn!("Converting ELF {} to binary {}", path.display(), bin.display());

    let mut cmd = Command::new(objcopy);
    for s in STRIP_SECTIONS {
        cmd.arg("-R").arg(s);
    }
    cmd.args(&["-S", "-O", "binary"]).arg(path).arg(&bin);

    let failed = || PreconditionError::Conversion(path.display().to_string());

    let out = cmd.output().map_err(|e| {
        error!("Unable to run {}: {}", objcopy, e);
        failed()
    })?;

    if !out.status.success() {
        error!(
            "{} failed: {}",
            objcopy,
            String::from_utf8_lossy(&out.stderr).trim()
        );
        return Err(failed());
    }

    Ok(bin)
}
