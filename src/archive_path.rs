//! Entry name type with validation for names written into archives.

use crate::{Error, Result};
use std::borrow::Borrow;
use std::fmt;

/// Maximum length for entry names (in bytes).
///
/// Both the local header and the central directory store the name length
/// in a 16-bit field.
pub const MAX_NAME_LENGTH: usize = u16::MAX as usize;

/// A validated entry name.
///
/// Names use forward slashes as separators. `ArchivePath::new` checks that:
/// - The name is non-empty and at most 65535 bytes long
/// - No NUL bytes are present
/// - The name is not absolute (does not start with `/`) and has no backslashes
/// - No empty, `.` or `..` segments exist
///
/// A single trailing `/` is allowed and marks a directory entry.
///
/// Names read from an existing archive's central directory are taken as
/// stored, without validation, so foreign archives can always be reopened
/// and re-committed unchanged.
///
/// # Examples
///
/// ```
/// use zipmend::ArchivePath;
///
/// let path = ArchivePath::new("res/layout/main.xml").unwrap();
/// assert_eq!(path.as_str(), "res/layout/main.xml");
/// assert!(!path.is_directory());
///
/// assert!(ArchivePath::new("assets/").unwrap().is_directory());
/// assert!(ArchivePath::new("../secret").is_err());
/// assert!(ArchivePath::new("/absolute/path").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ArchivePath(String);

impl ArchivePath {
    /// Creates a new `ArchivePath` from a string, validating it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidEntryName`] if any rule listed on the type
    /// is violated.
    pub fn new(s: &str) -> Result<Self> {
        Self::validate(s)?;
        Ok(Self(s.to_string()))
    }

    /// Wraps a name decoded from an existing central directory.
    pub(crate) fn from_stored(name: String) -> Self {
        Self(name)
    }

    fn validate(s: &str) -> Result<()> {
        if s.is_empty() {
            return Err(Error::InvalidEntryName("empty name".into()));
        }

        if s.len() > MAX_NAME_LENGTH {
            return Err(Error::InvalidEntryName(format!(
                "name exceeds maximum length of {} bytes",
                MAX_NAME_LENGTH
            )));
        }

        if s.contains('\0') {
            return Err(Error::InvalidEntryName("contains NUL byte".into()));
        }

        if s.contains('\\') {
            return Err(Error::InvalidEntryName(
                "backslash separator not allowed".into(),
            ));
        }

        if s.starts_with('/') {
            return Err(Error::InvalidEntryName("absolute path not allowed".into()));
        }

        let body = s.strip_suffix('/').unwrap_or(s);
        for segment in body.split('/') {
            match segment {
                "" => {
                    return Err(Error::InvalidEntryName(
                        "empty segment (consecutive slashes)".into(),
                    ));
                }
                "." => return Err(Error::InvalidEntryName("'.' segment not allowed".into())),
                ".." => {
                    return Err(Error::InvalidEntryName(
                        "'..' segment not allowed (path traversal)".into(),
                    ));
                }
                _ => {}
            }
        }

        Ok(())
    }

    /// Returns the name as a string slice.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the name as the bytes stored on disk.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    /// Returns the encoded length of the name in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if the name is empty (only possible for stored names).
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns `true` if this name denotes a directory entry.
    pub fn is_directory(&self) -> bool {
        self.0.ends_with('/')
    }

    /// Returns `true` if the name needs the UTF-8 language encoding flag.
    pub fn needs_utf8_flag(&self) -> bool {
        !self.0.is_ascii()
    }

    /// Returns the last segment of the name.
    pub fn file_name(&self) -> &str {
        let body = self.0.strip_suffix('/').unwrap_or(&self.0);
        body.rsplit('/').next().unwrap_or(body)
    }

    /// Returns the parent directory of this name, if any.
    ///
    /// The parent is returned without the trailing slash.
    ///
    /// ```
    /// use zipmend::ArchivePath;
    ///
    /// let path = ArchivePath::new("lib/arm64-v8a/libapp.so").unwrap();
    /// assert_eq!(path.parent().unwrap().as_str(), "lib/arm64-v8a");
    /// assert!(ArchivePath::new("classes.dex").unwrap().parent().is_none());
    /// ```
    pub fn parent(&self) -> Option<Self> {
        let body = self.0.strip_suffix('/').unwrap_or(&self.0);
        body.rfind('/').map(|idx| Self(body[..idx].to_string()))
    }
}

impl AsRef<str> for ArchivePath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// Lookups by `&str` hash the same bytes as the derived `Hash`.
impl Borrow<str> for ArchivePath {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ArchivePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<&str> for ArchivePath {
    type Error = Error;

    fn try_from(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for ArchivePath {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        Self::validate(&s)?;
        Ok(Self(s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_simple_file() {
        let path = ArchivePath::new("AndroidManifest.xml").unwrap();
        assert_eq!(path.as_str(), "AndroidManifest.xml");
        assert_eq!(path.len(), 19);
    }

    #[test]
    fn test_valid_nested_path() {
        let path = ArchivePath::new("res/drawable/icon.png").unwrap();
        assert_eq!(path.file_name(), "icon.png");
    }

    #[test]
    fn test_valid_directory() {
        let path = ArchivePath::new("assets/fonts/").unwrap();
        assert!(path.is_directory());
        assert_eq!(path.file_name(), "fonts");
        assert_eq!(path.parent().unwrap().as_str(), "assets");
    }

    #[test]
    fn test_valid_unicode_needs_flag() {
        let path = ArchivePath::new("日本語/файл.txt").unwrap();
        assert!(path.needs_utf8_flag());
        assert!(!ArchivePath::new("plain.txt").unwrap().needs_utf8_flag());
    }

    #[test]
    fn test_invalid_empty() {
        let err = ArchivePath::new("").unwrap_err();
        assert!(matches!(err, Error::InvalidEntryName(_)));
    }

    #[test]
    fn test_invalid_nul_byte() {
        let err = ArchivePath::new("file\0.txt").unwrap_err();
        assert!(err.to_string().contains("NUL"));
    }

    #[test]
    fn test_invalid_absolute_path() {
        assert!(ArchivePath::new("/etc/passwd").is_err());
    }

    #[test]
    fn test_invalid_backslash() {
        assert!(ArchivePath::new("dir\\file.txt").is_err());
    }

    #[test]
    fn test_invalid_segments() {
        assert!(ArchivePath::new("a//b").is_err());
        assert!(ArchivePath::new("a/./b").is_err());
        assert!(ArchivePath::new("a/../b").is_err());
        assert!(ArchivePath::new("dir//").is_err());
    }

    #[test]
    fn test_dots_inside_names_allowed() {
        assert!(ArchivePath::new("..hidden").is_ok());
        assert!(ArchivePath::new("a/b..c/d...e").is_ok());
    }

    #[test]
    fn test_invalid_too_long() {
        let long = "a".repeat(MAX_NAME_LENGTH + 1);
        assert!(ArchivePath::new(&long).is_err());
        let max = "a".repeat(MAX_NAME_LENGTH);
        assert!(ArchivePath::new(&max).is_ok());
    }

    #[test]
    fn test_stored_names_skip_validation() {
        let stored = ArchivePath::from_stored("../legacy".to_string());
        assert_eq!(stored.as_str(), "../legacy");
    }

    #[test]
    fn test_try_from() {
        let path: ArchivePath = "classes.dex".try_into().unwrap();
        assert_eq!(path.to_string(), "classes.dex");
        let result: Result<ArchivePath> = String::from("../x").try_into();
        assert!(result.is_err());
    }

    #[test]
    fn test_ordering_is_bytewise() {
        let mut names = vec![
            ArchivePath::new("b.txt").unwrap(),
            ArchivePath::new("a/z.txt").unwrap(),
            ArchivePath::new("a.txt").unwrap(),
        ];
        names.sort();
        let sorted: Vec<_> = names.iter().map(|n| n.as_str()).collect();
        assert_eq!(sorted, vec!["a.txt", "a/z.txt", "b.txt"]);
    }
}
