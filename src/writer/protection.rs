//! Protected file detection
//!
//! Files whose name contains `.prt.` (any case), e.g. `Customer.prt.cs`,
//! are maintained by hand and never touched by generation.

use crate::error::{AppError, AppResult};
use std::path::Path;

pub const PROTECTED_MARKER: &str = ".prt.";

pub fn is_protected(path: &Path) -> bool {
    path.file_name()
        .map(|name| {
            name.to_string_lossy()
                .to_ascii_lowercase()
                .contains(PROTECTED_MARKER)
        })
        .unwrap_or(false)
}

/// Fail with `ProtectedFile` for a protected path
pub fn ensure_writable(path: &Path) -> AppResult<()> {
    if is_protected(path) {
        return Err(AppError::ProtectedFile {
            path: path.to_path_buf(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protected_names() {
        assert!(is_protected(Path::new("Report.prt.cs")));
        assert!(is_protected(Path::new("out/api/Customer.PRT.tsx")));
        assert!(is_protected(Path::new("Customer.Prt.Designer.cs")));
    }

    #[test]
    fn test_unprotected_names() {
        assert!(!is_protected(Path::new("Report.cs")));
        assert!(!is_protected(Path::new("Report.prt")));
        assert!(!is_protected(Path::new("prt.cs")));
        assert!(!is_protected(Path::new("out.prt.d/Report.cs")));
        assert!(!is_protected(Path::new("")));
    }

    #[test]
    fn test_ensure_writable() {
        let err = ensure_writable(Path::new("Report.prt.cs")).unwrap_err();
        assert!(err.is_protected());
        assert!(ensure_writable(Path::new("Report.cs")).is_ok());
    }
}
