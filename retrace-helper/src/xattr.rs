// Extended attribute access without following symlinks

use std::collections::BTreeMap;
use std::ffi::{CString, OsStr, OsString};
use std::io;
use std::os::unix::ffi::{OsStrExt, OsStringExt};
use std::path::Path;

/// Attribute name -> value
pub type XattrMap = BTreeMap<OsString, Vec<u8>>;

const ACL_ACCESS: &[u8] = b"system.posix_acl_access";
const ACL_DEFAULT: &[u8] = b"system.posix_acl_default";

/// POSIX ACLs are stored as these two system attributes
pub fn is_acl_name(name: &OsStr) -> bool {
    let bytes = name.as_bytes();
    bytes == ACL_ACCESS || bytes == ACL_DEFAULT
}

fn c_path(path: &Path) -> io::Result<CString> {
    CString::new(path.as_os_str().as_bytes())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "path contains NUL byte"))
}

fn c_name(name: &OsStr) -> io::Result<CString> {
    CString::new(name.as_bytes())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "attribute name contains NUL byte"))
}

fn unsupported(err: &io::Error) -> bool {
    err.raw_os_error() == Some(libc::ENOTSUP)
}

/// Names of all attributes on `path`
pub fn list(path: &Path) -> io::Result<Vec<OsString>> {
    let cpath = c_path(path)?;

    loop {
        // SAFETY: cpath is NUL-terminated; a null buffer with size 0 queries the length
        let size = unsafe { libc::llistxattr(cpath.as_ptr(), std::ptr::null_mut(), 0) };
        if size < 0 {
            return Err(io::Error::last_os_error());
        }
        if size == 0 {
            return Ok(Vec::new());
        }

        let mut buf = vec![0u8; size as usize];
        // SAFETY: buf is valid for buf.len() bytes
        let read = unsafe {
            libc::llistxattr(cpath.as_ptr(), buf.as_mut_ptr().cast(), buf.len())
        };
        if read < 0 {
            let err = io::Error::last_os_error();
            // List grew between the two calls
            if err.raw_os_error() == Some(libc::ERANGE) {
                continue;
            }
            return Err(err);
        }

        buf.truncate(read as usize);
        return Ok(buf
            .split(|b| *b == 0)
            .filter(|name| !name.is_empty())
            .map(|name| OsString::from_vec(name.to_vec()))
            .collect());
    }
}

/// Value of one attribute
pub fn get(path: &Path, name: &OsStr) -> io::Result<Vec<u8>> {
    let cpath = c_path(path)?;
    let cname = c_name(name)?;

    loop {
        // SAFETY: both strings are NUL-terminated
        let size = unsafe {
            libc::lgetxattr(cpath.as_ptr(), cname.as_ptr(), std::ptr::null_mut(), 0)
        };
        if size < 0 {
            return Err(io::Error::last_os_error());
        }

        let mut buf = vec![0u8; size as usize];
        // SAFETY: buf is valid for buf.len() bytes
        let read = unsafe {
            libc::lgetxattr(
                cpath.as_ptr(),
                cname.as_ptr(),
                buf.as_mut_ptr().cast(),
                buf.len(),
            )
        };
        if read < 0 {
            let err = io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::ERANGE) {
                continue;
            }
            return Err(err);
        }

        buf.truncate(read as usize);
        return Ok(buf);
    }
}

pub fn set(path: &Path, name: &OsStr, value: &[u8]) -> io::Result<()> {
    let cpath = c_path(path)?;
    let cname = c_name(name)?;

    // SAFETY: value is valid for value.len() bytes
    let rc = unsafe {
        libc::lsetxattr(
            cpath.as_ptr(),
            cname.as_ptr(),
            value.as_ptr().cast(),
            value.len(),
            0,
        )
    };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

pub fn remove(path: &Path, name: &OsStr) -> io::Result<()> {
    let cpath = c_path(path)?;
    let cname = c_name(name)?;

    // SAFETY: both strings are NUL-terminated
    let rc = unsafe { libc::lremovexattr(cpath.as_ptr(), cname.as_ptr()) };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// All attributes of `path`; a filesystem without xattr support yields an empty map
pub fn read_all(path: &Path) -> io::Result<XattrMap> {
    let names = match list(path) {
        Ok(names) => names,
        Err(e) if unsupported(&e) => return Ok(XattrMap::new()),
        Err(e) => return Err(e),
    };

    let mut map = XattrMap::new();
    for name in names {
        match get(path, &name) {
            Ok(value) => {
                map.insert(name, value);
            }
            // Removed after listing
            Err(e) if e.raw_os_error() == Some(libc::ENODATA) => {}
            Err(e) => return Err(e),
        }
    }
    Ok(map)
}

/// Split a map into (plain xattrs, ACL attributes)
pub fn split_acl(map: XattrMap) -> (XattrMap, XattrMap) {
    map.into_iter().partition(|(name, _)| !is_acl_name(name))
}

/// Make the attributes of `target` selected by `filter` equal to `wanted`
pub fn sync(
    target: &Path,
    wanted: &XattrMap,
    filter: impl Fn(&OsStr) -> bool,
) -> io::Result<()> {
    let current = read_all(target)?;

    for name in current.keys().filter(|n| filter(n.as_os_str())) {
        if !wanted.contains_key(name) {
            remove(target, name)?;
        }
    }

    for (name, value) in wanted.iter().filter(|(n, _)| filter(n.as_os_str())) {
        if current.get(name) != Some(value) {
            set(target, name, value)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acl_names() {
        assert!(is_acl_name(OsStr::new("system.posix_acl_access")));
        assert!(is_acl_name(OsStr::new("system.posix_acl_default")));
        assert!(!is_acl_name(OsStr::new("user.comment")));
    }

    #[test]
    fn test_split_acl() {
        let mut map = XattrMap::new();
        map.insert(OsString::from("user.a"), b"1".to_vec());
        map.insert(OsString::from("system.posix_acl_access"), b"2".to_vec());
        let (plain, acl) = split_acl(map);
        assert_eq!(plain.len(), 1);
        assert_eq!(acl.len(), 1);
    }

    #[test]
    fn test_user_xattr_roundtrip_when_supported() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("f");
        std::fs::write(&file, b"x").unwrap();

        let name = OsStr::new("user.retrace.test");
        match set(&file, name, b"value") {
            Ok(()) => {}
            // tmpfs without user xattrs
            Err(e) if unsupported(&e) || e.kind() == io::ErrorKind::PermissionDenied => return,
            Err(e) => panic!("unexpected error: {e}"),
        }

        assert_eq!(get(&file, name).unwrap(), b"value");
        assert!(read_all(&file).unwrap().contains_key(name));

        sync(&file, &XattrMap::new(), |n| !is_acl_name(n)).unwrap();
        assert!(!read_all(&file).unwrap().contains_key(name));
    }
}
