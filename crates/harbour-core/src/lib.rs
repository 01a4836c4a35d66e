//! Foundational low-level utilities shared across Harbour crates.
//!
//! Provides atomic file-write helpers and time utilities used by descriptor
//! persistence, signature stamping, and install status records.

pub mod atomic_io;
pub mod time_utils;

pub use atomic_io::write_text_atomic;
pub use time_utils::current_unix_timestamp;

#[cfg(test)]
mod tests {
    use std::fs::read_to_string;

    use super::*;

    #[test]
    fn time_utils_reports_post_epoch_seconds() {
        assert!(current_unix_timestamp() > 1_600_000_000);
    }

    #[test]
    fn write_text_atomic_writes_content() {
        let tempdir = tempfile::tempdir().expect("tempdir");
        let path = tempdir.path().join("sample.txt");
        write_text_atomic(&path, "hello world").expect("write");
        let contents = read_to_string(&path).expect("read");
        assert_eq!(contents, "hello world");
    }

    #[test]
    fn write_text_atomic_replaces_existing_content_without_leftovers() {
        let tempdir = tempfile::tempdir().expect("tempdir");
        let path = tempdir.path().join("port.json");
        write_text_atomic(&path, "{}").expect("first write");
        write_text_atomic(&path, "{\"version\": 4}").expect("second write");
        assert_eq!(read_to_string(&path).expect("read"), "{\"version\": 4}");
        let entries = std::fs::read_dir(tempdir.path())
            .expect("read dir")
            .count();
        assert_eq!(entries, 1);
    }

    #[cfg(unix)]
    #[test]
    fn write_text_atomic_preserves_executable_bit() {
        use std::os::unix::fs::PermissionsExt;

        let tempdir = tempfile::tempdir().expect("tempdir");
        let path = tempdir.path().join("Game.sh");
        std::fs::write(&path, "#!/bin/bash\n").expect("seed");
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
            .expect("chmod");

        write_text_atomic(&path, "#!/bin/bash\necho hi\n").expect("rewrite");
        let mode = std::fs::metadata(&path).expect("metadata").permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
    }

    #[test]
    fn write_text_atomic_rejects_directory_destination() {
        let tempdir = tempfile::tempdir().expect("tempdir");
        let error = write_text_atomic(tempdir.path(), "x").expect_err("directory");
        assert!(error.to_string().contains("is a directory"));
    }
}
