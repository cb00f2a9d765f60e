//! Helpers for filesystem manipulations

use crate::errors::{Result, Error};

use std::ffi::OsStr;
use std::fs;
use std::io::ErrorKind;
use std::os::unix::ffi::OsStrExt;
use std::path::{Component, Path, PathBuf};

/// Normalizes a path.
///
/// The following operations are performed:
///
/// 1. Sequences of multiple `'/'` characters are collapsed into a single `'/'`.
/// 2. Any leading `'/'` is stripped. (If the request path doesn’t lead with a
///    slash, the path is ill-formed for our purposes and we return an `Err`).
/// 3. Percent-encoded bytes are decoded. Bogus percent-encoding, like `b"%bo"`,
///    will return `Err`.
pub fn normalize_path(path: &[u8]) -> Result<Vec<u8>> {
    // Check for a leading `'/'`
    if path.first() != Some(&b'/') {
        return Err(Error::PathNotInOriginForm);
    }

    let mut buffer = Vec::with_capacity(path.len() - 1);
    let mut i = 1;

    // skip leading '/' characters
    while i < path.len() && path[i] == b'/' {
        i += 1;
    }

    while i < path.len() {
        match path[i] {
            b'/' => {
                buffer.push(b'/');
                while i < path.len() && path[i] == b'/' {
                    i += 1;
                }
            },
            b'%' => {
                if path.len() < i + 3 {
                    return Err(Error::IllegalPercentEncoding);
                }

                let high_nybble = path[i + 1];
                let low_nybble = path[i + 2];

                if !is_hexit(high_nybble) || !is_hexit(low_nybble) {
                    return Err(Error::IllegalPercentEncoding);
                }

                buffer.push(from_hexit(high_nybble) << 4 |
                            from_hexit(low_nybble));

                i += 3;
            },
            b => {
                buffer.push(b);
                i += 1;
            }
        }
    }

    Ok(buffer)
}

/// A script found under the CGI root
#[derive(Debug, PartialEq, Eq)]
pub struct ResolvedScript {
    /// Canonical location of the script on disk
    pub path: PathBuf,
    /// The request path segments that named the script, joined with `/`
    pub script_name: PathBuf,
    /// Whatever followed the script in the request path, with a leading `/`,
    /// or empty
    pub path_info: Vec<u8>
}

/// Finds the script a normalized, root-relative request path refers to.
///
/// Segments are walked left to right; the first one naming a regular file is
/// the script and the rest becomes `PATH_INFO`. The canonicalized script has
/// to stay inside `root` (which must itself be canonical), so `..` segments
/// and symlinks can't escape it.
pub fn resolve_script(root: &Path, relative: &[u8]) -> Result<ResolvedScript> {
    let relative = Path::new(OsStr::from_bytes(relative));
    let mut candidate = root.to_path_buf();
    let mut script_name = PathBuf::new();
    let mut components = relative.components();

    while let Some(component) = components.next() {
        match component {
            Component::Normal(segment) => {
                candidate.push(segment);
                script_name.push(segment);
            },
            Component::CurDir => continue,
            _ => return Err(Error::PermissionDenied)
        }

        let meta = match fs::metadata(&candidate) {
            Ok(m) => m,
            Err(e) => return match e.kind() {
                ErrorKind::NotFound => Err(Error::NotFound),
                ErrorKind::PermissionDenied => Err(Error::PermissionDenied),
                _ => Err(Error::from(e))
            }
        };

        if meta.is_file() {
            let canonical = fs::canonicalize(&candidate)?;
            if !canonical.starts_with(root) {
                return Err(Error::PermissionDenied);
            }

            let rest = components.as_path();
            let path_info = if rest.as_os_str().is_empty() {
                Vec::new()
            }
            else {
                let mut info = vec![b'/'];
                info.extend_from_slice(rest.as_os_str().as_bytes());
                info
            };

            return Ok(ResolvedScript {
                path: canonical,
                script_name: script_name,
                path_info: path_info
            });
        }
    }

    // Ran out of segments without hitting a file: a directory, or the root
    Err(Error::NotFound)
}

/// Splits a script path into the directory it should run in and the bare
/// file name it should be invoked as.
pub fn split_script_path(script: &Path) -> (PathBuf, PathBuf) {
    let dir = match script.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from(".")
    };
    let name = script.file_name()
        .map(PathBuf::from)
        .unwrap_or_else(|| script.to_path_buf());

    (dir, name)
}

#[cfg(test)]
mod test {
    use super::*;

    use std::fs::{self, File};

    #[test]
    fn normalize_strips_leading_slashes() {
        assert_eq!(normalize_path(b"/blah").unwrap(), b"blah");
        assert_eq!(normalize_path(b"//bleh").unwrap(), b"bleh");
    }

    #[test]
    fn normalize_collapses_embedded_slash_sequences() {
        assert_eq!(normalize_path(b"/foo//bar").unwrap(), b"foo/bar");
    }

    #[test]
    fn normalize_decodes_percents() {
        assert_eq!(normalize_path(b"/foo%20bar").unwrap(), b"foo bar");
    }

    #[test]
    fn normalize_handles_trailing_percents_correctly() {
        assert_eq!(normalize_path(b"/trail%20").unwrap(), b"trail ");
        assert!(normalize_path(b"/trail%2").is_err());
    }

    #[test]
    fn normalize_errors_on_bogus_percent() {
        assert!(normalize_path(b"/bog%us").is_err());
    }

    #[test]
    fn normalize_errors_without_leading_slash() {
        assert!(normalize_path(b"bogus").is_err());
        assert!(normalize_path(b"").is_err());
    }

    fn cgi_root() -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        File::create(dir.path().join("sub/post.rb")).unwrap();
        File::create(dir.path().join("time.rb")).unwrap();
        let root = fs::canonicalize(dir.path()).unwrap();
        (dir, root)
    }

    #[test]
    fn resolve_finds_plain_script() {
        let (_dir, root) = cgi_root();
        let script = resolve_script(&root, b"time.rb").unwrap();
        assert_eq!(script.path, root.join("time.rb"));
        assert_eq!(script.script_name, PathBuf::from("time.rb"));
        assert!(script.path_info.is_empty());
    }

    #[test]
    fn resolve_splits_off_path_info() {
        let (_dir, root) = cgi_root();
        let script = resolve_script(&root, b"sub/post.rb/extra/bits").unwrap();
        assert_eq!(script.path, root.join("sub/post.rb"));
        assert_eq!(script.script_name, PathBuf::from("sub/post.rb"));
        assert_eq!(script.path_info, b"/extra/bits");
    }

    #[test]
    fn resolve_refuses_parent_segments() {
        let (_dir, root) = cgi_root();
        match resolve_script(&root, b"sub/../time.rb") {
            Err(Error::PermissionDenied) => (),
            other => panic!("{:?}", other)
        }
    }

    #[test]
    fn resolve_reports_missing_and_directories() {
        let (_dir, root) = cgi_root();
        match resolve_script(&root, b"nope.rb") {
            Err(Error::NotFound) => (),
            other => panic!("{:?}", other)
        }
        match resolve_script(&root, b"sub") {
            Err(Error::NotFound) => (),
            other => panic!("{:?}", other)
        }
    }

    #[test]
    fn split_script_path_separates_dir_and_name() {
        let (dir, name) = split_script_path(Path::new("/srv/cgi-bin/post.rb"));
        assert_eq!(dir, PathBuf::from("/srv/cgi-bin"));
        assert_eq!(name, PathBuf::from("post.rb"));

        let (dir, name) = split_script_path(Path::new("loop.rb"));
        assert_eq!(dir, PathBuf::from("."));
        assert_eq!(name, PathBuf::from("loop.rb"));
    }
}

/// Returns `true` iff the byte is a hexadecimal digit according to ASCII
pub fn is_hexit(x: u8) -> bool {
    x.is_ascii_hexdigit()
}

/// Converts from a hexadecimal digit to its value
///
/// Callers check `is_hexit` first.
pub fn from_hexit(x: u8) -> u8 {
    match x {
        b'0' ..= b'9' => x - b'0',
        b'A' ..= b'F' => x - b'A' + 10,
        b'a' ..= b'f' => x - b'a' + 10,
        _ => panic!("Contract violation: from_hexit expected a hexit, got 0x{:X}", x)
    }
}

#[test]
fn from_hexit_works() {
    use std::char;

    for x in 0x0 .. 0x10 {
        assert_eq!(from_hexit(char::from_digit(x, 16).unwrap() as u8), x as u8);
        assert_eq!(from_hexit(char::from_digit(x, 16).unwrap()
                              .to_ascii_uppercase() as u8), x as u8);
    }
}
