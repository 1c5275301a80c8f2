//! Path safety checks consulted before any file is moved

use std::path::Path;

/// System locations files are never moved out of
const PROTECTED_ROOTS: &[&str] = &[
    "/",
    "/System",
    "/usr",
    "/bin",
    "/sbin",
    "/etc",
    "/Library",
    "/Applications",
    "/private",
    "/var",
    "C:\\Windows",
    "C:\\Program Files",
    "C:\\Program Files (x86)",
];

/// Validates source and destination paths before the executor touches them
pub struct PathValidator;

impl PathValidator {
    /// A protected root itself, a direct child of one (outside the home
    /// directory), or the home directory itself
    pub fn is_protected_path(path: &Path) -> bool {
        let check_path = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        let home = dirs::home_dir();

        if home.as_deref() == Some(check_path.as_path()) {
            return true;
        }
        let in_home = home.as_deref().is_some_and(|h| check_path.starts_with(h));

        PROTECTED_ROOTS.iter().map(Path::new).any(|root| {
            check_path == root || (!in_home && check_path.parent() == Some(root))
        })
    }

    /// Validate a file move into `dest_folder`
    pub fn validate_move(source: &Path, dest_folder: &Path) -> Result<(), String> {
        if Self::is_protected_path(source) {
            return Err(format!("Cannot move protected path: {}", source.display()));
        }
        if source.is_dir() {
            return Err(format!("Only files can be placed: {}", source.display()));
        }
        if dest_folder == Path::new("/") || dest_folder.as_os_str().is_empty() {
            return Err(format!("Invalid destination folder: {:?}", dest_folder));
        }
        Ok(())
    }
}
