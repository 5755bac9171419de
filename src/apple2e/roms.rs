//! ROM file loader for the IIe.
//!
//! Both `.rom` and `.bin` extensions are accepted (`.rom` tried first).
//!
//! # Search paths (tried in order)
//! 1. `$LUMEN_ROM_DIR`  (environment variable)
//! 2. `./roms/`         in the working directory, then next to the binary
//! 3. `./`              the working directory itself
//! 4. `~/.local/share/lumen/roms/`

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use super::error::MachineError;

const ROM_BASE_NAME: &str = "apple2e";

/// Full $C000-$FFFF image.
pub const FULL_ROM_LEN: usize = 0x4000;
/// $D000-$FFFF only.
pub const MAIN_ROM_LEN: usize = 0x3000;

/// A system ROM image ready to be written at `origin`.
pub struct RomImage {
    pub data: Vec<u8>,
    pub origin: u16,
    pub path: PathBuf,
}

impl RomImage {
    /// Search the standard paths.
    pub fn find() -> Result<Self, MachineError> {
        let path = find_rom()?;
        Self::load(&path, None)
    }

    /// Load `path`.  Without an explicit origin it is inferred from the
    /// length: 16K loads at $C000, 12K at $D000, and larger images keep
    /// their last 16K.
    pub fn load(path: &Path, origin: Option<u16>) -> Result<Self, MachineError> {
        let mut data = fs::read(path).map_err(|e| MachineError::io(path, e))?;

        let origin = match origin {
            Some(o) => o,
            None if data.len() == MAIN_ROM_LEN => 0xD000,
            None if data.len() >= FULL_ROM_LEN => {
                if data.len() > FULL_ROM_LEN {
                    data.drain(..data.len() - FULL_ROM_LEN);
                }
                0xC000
            }
            None => {
                return Err(MachineError::RomSize {
                    path: path.to_path_buf(),
                    len: data.len(),
                })
            }
        };

        log::info!("Loaded ROM: {} at ${origin:04X}", path.display());
        Ok(Self {
            data,
            origin,
            path: path.to_path_buf(),
        })
    }
}

// ── Internal helpers ──────────────────────────────────────────

fn find_rom() -> Result<PathBuf, MachineError> {
    let candidates = search_dirs();
    for dir in &candidates {
        if let Some(p) = rom_path(dir) {
            return Ok(p);
        }
    }

    Err(MachineError::RomNotFound {
        searched: candidates
            .iter()
            .map(|p| format!("  {}", p.display()))
            .collect::<Vec<_>>()
            .join("\n"),
    })
}

fn search_dirs() -> Vec<PathBuf> {
    let mut candidates: Vec<PathBuf> = Vec::new();

    if let Ok(val) = env::var("LUMEN_ROM_DIR") {
        candidates.push(PathBuf::from(val));
    }
    if let Ok(cwd) = env::current_dir() {
        candidates.push(cwd.join("roms"));
        candidates.push(cwd);
    }
    if let Ok(exe) = env::current_exe() {
        if let Some(d) = exe.parent() {
            candidates.push(d.join("roms"));
            candidates.push(d.to_path_buf());
        }
    }
    if let Some(home) = dirs_home() {
        candidates.push(home.join(".local").join("share").join("lumen").join("roms"));
    }
    candidates
}

fn rom_path(dir: &Path) -> Option<PathBuf> {
    ["rom", "bin"]
        .iter()
        .map(|ext| dir.join(format!("{ROM_BASE_NAME}.{ext}")))
        .find(|p| p.is_file())
}

fn dirs_home() -> Option<PathBuf> {
    env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(|| env::var_os("USERPROFILE").map(PathBuf::from))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_rom(name: &str, len: usize) -> PathBuf {
        let dir = env::temp_dir().join(format!("lumen-roms-{}-{name}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(format!("{ROM_BASE_NAME}.bin"));
        let data: Vec<u8> = (0..len).map(|i| (i >> 8) as u8).collect();
        fs::write(&path, data).unwrap();
        path
    }

    #[test]
    fn origin_follows_image_length() {
        let full = RomImage::load(&temp_rom("full", FULL_ROM_LEN), None).unwrap();
        assert_eq!(full.origin, 0xC000);

        let main = RomImage::load(&temp_rom("main", MAIN_ROM_LEN), None).unwrap();
        assert_eq!(main.origin, 0xD000);

        let big = RomImage::load(&temp_rom("big", 0x8000), None).unwrap();
        assert_eq!(big.origin, 0xC000);
        assert_eq!(big.data.len(), FULL_ROM_LEN);
        assert_eq!(big.data[0], 0x40);
    }

    #[test]
    fn odd_sizes_need_explicit_origin() {
        let path = temp_rom("odd", 0x800);
        assert!(matches!(
            RomImage::load(&path, None),
            Err(MachineError::RomSize { len: 0x800, .. })
        ));
        assert_eq!(RomImage::load(&path, Some(0xF800)).unwrap().origin, 0xF800);
    }

    #[test]
    fn missing_image_names_its_path_once() {
        let path = Path::new("/nonexistent/lumen/apple2e.rom");
        let msg = RomImage::load(path, None).err().unwrap().to_string();
        assert_eq!(msg.matches("/nonexistent/lumen/apple2e.rom").count(), 1, "{msg}");
    }

    #[test]
    fn rom_dir_lookup_prefers_rom_extension() {
        let path = temp_rom("ext", 16);
        let dir = path.parent().unwrap();
        assert_eq!(rom_path(dir), Some(path.clone()));
        fs::write(dir.join(format!("{ROM_BASE_NAME}.rom")), [0u8]).unwrap();
        assert_eq!(rom_path(dir), Some(dir.join("apple2e.rom")));
    }
}
