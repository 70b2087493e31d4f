//! System font lookup through `font-kit`.
//!
//! Scripts name fonts either by file (`"data/fonts/mono.ttf"`) or by family
//! (`"Arial"`, `"sans-serif"`). File names are used as-is; family names are
//! matched against the installed fonts and resolved to a file path.

use std::path::{Path, PathBuf};

use font_kit::family_name::FamilyName;
use font_kit::handle::Handle;
use font_kit::properties::{Properties, Style, Weight};
use font_kit::source::SystemSource;
use log::debug;

use crate::raster::FontStyle;

/// Resolve a script font name to a file.
pub fn resolve(name: &str, style: FontStyle) -> Option<PathBuf> {
    let path = Path::new(name);
    if path.extension().is_some() {
        return Some(path.to_path_buf());
    }
    locate(name, style)
}

/// Find the installed font file that best matches a family name.
///
/// Generic names (`serif`, `sans-serif`, `monospace`) map to the platform
/// defaults. Returns `None` for fonts that only exist in memory.
pub fn locate(family: &str, style: FontStyle) -> Option<PathBuf> {
    let family_name = match family.trim().to_lowercase().as_str() {
        "serif" => FamilyName::Serif,
        "sans-serif" => FamilyName::SansSerif,
        "monospace" => FamilyName::Monospace,
        "cursive" => FamilyName::Cursive,
        "fantasy" => FamilyName::Fantasy,
        _ => FamilyName::Title(family.trim().to_string()),
    };
    let mut properties = Properties::new();
    if style.is_bold() {
        properties.weight = Weight::BOLD;
    }
    if style.is_italic() {
        properties.style = Style::Italic;
    }

    let handle = SystemSource::new()
        .select_best_match(&[family_name], &properties)
        .ok()?;
    match handle {
        Handle::Path { path, .. } => {
            debug!("Font '{family}' resolved to {}", path.display());
            Some(path)
        }
        Handle::Memory { .. } => None,
    }
}

// ===================================================================
// Tests
// ===================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_names_pass_through() {
        assert_eq!(
            resolve("fonts/mono.ttf", FontStyle::REGULAR),
            Some(PathBuf::from("fonts/mono.ttf"))
        );
    }

    #[test]
    fn test_locate_generic_family() {
        // Depends on installed fonts; only check the result is a file.
        if let Some(path) = locate("sans-serif", FontStyle::REGULAR) {
            assert!(path.is_file());
        }
    }

    #[test]
    fn test_unknown_family_does_not_panic() {
        let _ = locate("No Such Family 12345", FontStyle::BOLD);
    }
}
