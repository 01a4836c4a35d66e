//! Ownership signatures embedded in tracked launcher scripts.
//!
//! A signed file carries one marker line near its top:
//!
//! ```text
//! # PORTMASTER: <current_name>, <original_name>, <owner>
//! ```
//!
//! The marker travels with the file, so ownership survives the registry being
//! rebuilt from scratch. Any file mentioning [`UNMANAGED_MARKER`] in its first
//! [`UNMANAGED_SCAN_LINES`] lines is never read from or written to.

use std::path::Path;

use harbour_core::write_text_atomic;

use crate::PortError;

pub const SIGNATURE_PREFIX: &str = "# PORTMASTER:";
pub const UNMANAGED_MARKER: &str = "PORTMASTER_NO_MANAGE";
pub const UNMANAGED_SCAN_LINES: usize = 10;
const SIGNABLE_EXTENSIONS: &[&str] = &["sh", "bash"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnershipSignature {
    pub current_name: String,
    pub original_name: String,
    pub owner: String,
}

impl OwnershipSignature {
    /// Signature for a file seen for the first time under `name`.
    pub fn fresh(name: &str, owner: &str) -> Self {
        Self {
            current_name: name.to_string(),
            original_name: name.to_string(),
            owner: owner.to_string(),
        }
    }

    fn render(&self) -> String {
        format!(
            "{SIGNATURE_PREFIX} {}, {}, {}",
            self.current_name, self.original_name, self.owner
        )
    }

    fn parse(line: &str) -> Option<Self> {
        let body = line.trim().strip_prefix(SIGNATURE_PREFIX)?;
        let fields = body.split(',').map(str::trim).collect::<Vec<_>>();
        if fields.iter().any(|field| field.is_empty()) {
            return None;
        }
        match fields.as_slice() {
            [current_name, original_name, owner] => Some(Self {
                current_name: current_name.to_string(),
                original_name: original_name.to_string(),
                owner: owner.to_string(),
            }),
            // Older launchers carry `owner, name` only.
            [owner, name] => Some(Self::fresh(name, owner)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// What the codec can say about one file.
pub enum SignatureState {
    /// Opted out of tracking.
    Unmanaged,
    /// Not a text file type that can carry a marker.
    Unsupported,
    Unsigned,
    Signed(OwnershipSignature),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureWrite {
    Written,
    Unchanged,
    Unmanaged,
}

pub fn is_signable_file_name(file_name: &str) -> bool {
    Path::new(file_name)
        .extension()
        .and_then(|extension| extension.to_str())
        .is_some_and(|extension| {
            SIGNABLE_EXTENSIONS
                .iter()
                .any(|candidate| extension.eq_ignore_ascii_case(candidate))
        })
}

fn read_text(path: &Path) -> Result<Option<String>, PortError> {
    let bytes = std::fs::read(path).map_err(|error| PortError::filesystem(path, error))?;
    Ok(String::from_utf8(bytes).ok())
}

fn is_unmanaged(text: &str) -> bool {
    text.lines()
        .take(UNMANAGED_SCAN_LINES)
        .any(|line| line.contains(UNMANAGED_MARKER))
}

fn find_signature(text: &str) -> Option<OwnershipSignature> {
    text.lines().find_map(OwnershipSignature::parse)
}

/// Classifies `path` without modifying it. IO failures are surfaced.
pub fn inspect_signature(path: &Path) -> Result<SignatureState, PortError> {
    let signable = path
        .file_name()
        .and_then(|name| name.to_str())
        .is_some_and(is_signable_file_name);
    if !signable || !path.is_file() {
        return Ok(SignatureState::Unsupported);
    }
    let Some(text) = read_text(path)? else {
        return Ok(SignatureState::Unsupported);
    };
    if is_unmanaged(&text) {
        return Ok(SignatureState::Unmanaged);
    }
    Ok(find_signature(&text).map_or(SignatureState::Unsigned, SignatureState::Signed))
}

/// Reads the signature of `path`; anything unreadable, unsigned or opted out yields `None`.
pub fn read_signature(path: &Path) -> Option<OwnershipSignature> {
    match inspect_signature(path) {
        Ok(SignatureState::Signed(signature)) => Some(signature),
        Ok(_) => None,
        Err(error) => {
            tracing::debug!(path = %path.display(), error = %error, "signature read failed");
            None
        }
    }
}

fn validate_field(path: &Path, label: &str, value: &str) -> Result<(), PortError> {
    if value.trim().is_empty() {
        return Err(PortError::Signature {
            path: path.to_path_buf(),
            detail: format!("{label} must be non-empty"),
        });
    }
    if value.contains([',', '\n', '\r']) {
        return Err(PortError::Signature {
            path: path.to_path_buf(),
            detail: format!("{label} '{value}' cannot contain commas or line breaks"),
        });
    }
    Ok(())
}

fn load_signable_text(path: &Path) -> Result<Option<String>, PortError> {
    let signable = path
        .file_name()
        .and_then(|name| name.to_str())
        .is_some_and(is_signable_file_name);
    if !signable {
        return Err(PortError::Signature {
            path: path.to_path_buf(),
            detail: "file type cannot carry a signature".to_string(),
        });
    }
    let text = read_text(path)?.ok_or_else(|| PortError::Signature {
        path: path.to_path_buf(),
        detail: "file is not valid UTF-8 text".to_string(),
    })?;
    if is_unmanaged(&text) {
        return Ok(None);
    }
    Ok(Some(text))
}

/// Inserts or replaces the signature marker. Never leaves more than one marker behind.
pub fn write_signature(
    path: &Path,
    signature: &OwnershipSignature,
) -> Result<SignatureWrite, PortError> {
    validate_field(path, "current name", &signature.current_name)?;
    validate_field(path, "original name", &signature.original_name)?;
    validate_field(path, "owner", &signature.owner)?;
    let Some(text) = load_signable_text(path)? else {
        return Ok(SignatureWrite::Unmanaged);
    };

    let marker = format!("{}\n", signature.render());
    let mut lines = text.split_inclusive('\n').collect::<Vec<_>>();
    let existing = lines
        .iter()
        .position(|line| OwnershipSignature::parse(line).is_some());

    let mut updated = String::with_capacity(text.len() + marker.len());
    match existing {
        Some(index) => {
            for (position, line) in lines.iter().enumerate() {
                if position == index {
                    updated.push_str(&marker);
                } else if OwnershipSignature::parse(line).is_none() {
                    updated.push_str(line);
                }
            }
        }
        None => {
            let insert_at = usize::from(lines.first().is_some_and(|line| line.starts_with("#!")));
            if insert_at == 1 && !lines[0].ends_with('\n') {
                updated.push_str(lines[0]);
                updated.push('\n');
                lines.remove(0);
                updated.push_str(&marker);
            } else {
                for line in lines.drain(..insert_at) {
                    updated.push_str(line);
                }
                updated.push_str(&marker);
            }
            for line in lines {
                updated.push_str(line);
            }
        }
    }

    if updated == text {
        return Ok(SignatureWrite::Unchanged);
    }
    write_text_atomic(path, &updated).map_err(|error| PortError::persist(path, error))?;
    Ok(SignatureWrite::Written)
}

/// Removes every signature marker. Returns whether the file changed.
pub fn clear_signature(path: &Path) -> Result<bool, PortError> {
    let Some(text) = load_signable_text(path)? else {
        return Ok(false);
    };
    let kept = text
        .split_inclusive('\n')
        .filter(|line| OwnershipSignature::parse(line).is_none())
        .collect::<String>();
    if kept == text {
        return Ok(false);
    }
    write_text_atomic(path, &kept).map_err(|error| PortError::persist(path, error))?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};

    use tempfile::tempdir;

    use super::{
        clear_signature, inspect_signature, read_signature, write_signature,
        OwnershipSignature, SignatureState, SignatureWrite,
    };
    use crate::PortError;

    fn script(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, content).expect("write script");
        path
    }

    #[test]
    fn unit_read_signature_missing_file_is_none() {
        assert_eq!(read_signature(Path::new("/nonexistent/file.sh")), None);
    }

    #[test]
    fn unit_read_signature_ignores_unsupported_extension() {
        let temp = tempdir().expect("tempdir");
        let path = script(temp.path(), "notes.txt", "# PORTMASTER: a, b, c\n");
        assert_eq!(read_signature(&path), None);
        assert_eq!(
            inspect_signature(&path).expect("inspect"),
            SignatureState::Unsupported
        );
    }

    #[test]
    fn unit_read_signature_parses_marker() {
        let temp = tempdir().expect("tempdir");
        let path = script(
            temp.path(),
            "Game.sh",
            "#!/bin/bash\n# PORTMASTER: Game.sh, Old Game.sh, game.zip\necho 'test'\n",
        );
        assert_eq!(
            read_signature(&path),
            Some(OwnershipSignature {
                current_name: "Game.sh".to_string(),
                original_name: "Old Game.sh".to_string(),
                owner: "game.zip".to_string(),
            })
        );
    }

    #[test]
    fn unit_read_signature_accepts_legacy_two_field_marker() {
        let temp = tempdir().expect("tempdir");
        let path = script(
            temp.path(),
            "2048.sh",
            "#!/bin/bash\n# PORTMASTER: 2048.zip, 2048.sh\n",
        );
        assert_eq!(
            read_signature(&path),
            Some(OwnershipSignature::fresh("2048.sh", "2048.zip"))
        );
    }

    #[test]
    fn unit_read_signature_unsigned_and_binary_files_are_none() {
        let temp = tempdir().expect("tempdir");
        let unsigned = script(temp.path(), "a.sh", "#!/bin/bash\necho 'test'\n");
        assert_eq!(read_signature(&unsigned), None);
        assert_eq!(
            inspect_signature(&unsigned).expect("inspect"),
            SignatureState::Unsigned
        );

        let binary = temp.path().join("b.sh");
        std::fs::write(&binary, [0xff_u8, 0xfe, 0x00, 0x80]).expect("write binary");
        assert_eq!(read_signature(&binary), None);
        assert_eq!(
            inspect_signature(&binary).expect("inspect"),
            SignatureState::Unsupported
        );
    }

    #[test]
    fn functional_write_signature_inserts_after_shebang() {
        let temp = tempdir().expect("tempdir");
        let path = script(temp.path(), "Game.sh", "#!/bin/bash\necho 'test'\n");
        let outcome =
            write_signature(&path, &OwnershipSignature::fresh("Game.sh", "game.zip")).expect("write");
        assert_eq!(outcome, SignatureWrite::Written);
        assert_eq!(
            std::fs::read_to_string(&path).expect("read"),
            "#!/bin/bash\n# PORTMASTER: Game.sh, Game.sh, game.zip\necho 'test'\n"
        );
    }

    #[test]
    fn functional_write_signature_inserts_at_top_without_shebang() {
        let temp = tempdir().expect("tempdir");
        let path = script(temp.path(), "Game.sh", "echo 'test'\n");
        write_signature(&path, &OwnershipSignature::fresh("Game.sh", "game.zip")).expect("write");
        assert_eq!(
            std::fs::read_to_string(&path).expect("read"),
            "# PORTMASTER: Game.sh, Game.sh, game.zip\necho 'test'\n"
        );
    }

    #[test]
    fn functional_write_signature_handles_shebang_only_file() {
        let temp = tempdir().expect("tempdir");
        let path = script(temp.path(), "Game.sh", "#!/bin/sh");
        write_signature(&path, &OwnershipSignature::fresh("Game.sh", "game.zip")).expect("write");
        assert_eq!(
            std::fs::read_to_string(&path).expect("read"),
            "#!/bin/sh\n# PORTMASTER: Game.sh, Game.sh, game.zip\n"
        );
    }

    #[test]
    fn regression_write_signature_replaces_in_place_and_never_duplicates() {
        let temp = tempdir().expect("tempdir");
        let path = script(
            temp.path(),
            "Game.sh",
            "#!/bin/bash\n# PORTMASTER: old, signature\necho 'test'\n# PORTMASTER: stray, copy\n",
        );
        let signature = OwnershipSignature {
            current_name: "New.sh".to_string(),
            original_name: "Game.sh".to_string(),
            owner: "game.zip".to_string(),
        };
        write_signature(&path, &signature).expect("write");
        let content = std::fs::read_to_string(&path).expect("read");
        assert_eq!(
            content,
            "#!/bin/bash\n# PORTMASTER: New.sh, Game.sh, game.zip\necho 'test'\n"
        );
        assert_eq!(read_signature(&path), Some(signature.clone()));

        let outcome = write_signature(&path, &signature).expect("rewrite");
        assert_eq!(outcome, SignatureWrite::Unchanged);
    }

    #[test]
    fn regression_unmanaged_marker_blocks_read_and_write() {
        let temp = tempdir().expect("tempdir");
        let original = "#!/bin/bash\n# PORTMASTER_NO_MANAGE\n# PORTMASTER: a.sh, a.sh, a.zip\n";
        let path = script(temp.path(), "a.sh", original);
        assert_eq!(read_signature(&path), None);
        assert_eq!(
            inspect_signature(&path).expect("inspect"),
            SignatureState::Unmanaged
        );
        let outcome =
            write_signature(&path, &OwnershipSignature::fresh("a.sh", "other.zip")).expect("write");
        assert_eq!(outcome, SignatureWrite::Unmanaged);
        assert!(!clear_signature(&path).expect("clear"));
        assert_eq!(std::fs::read_to_string(&path).expect("read"), original);
    }

    #[test]
    fn functional_clear_signature_removes_marker() {
        let temp = tempdir().expect("tempdir");
        let path = script(
            temp.path(),
            "Game.sh",
            "#!/bin/bash\n# PORTMASTER: test, signature\necho 'test'\n",
        );
        assert!(clear_signature(&path).expect("clear"));
        assert_eq!(read_signature(&path), None);
        assert_eq!(
            std::fs::read_to_string(&path).expect("read"),
            "#!/bin/bash\necho 'test'\n"
        );
        assert!(!clear_signature(&path).expect("second clear"));
    }

    #[test]
    fn regression_write_signature_rejects_unencodable_names() {
        let temp = tempdir().expect("tempdir");
        let path = script(temp.path(), "Game.sh", "#!/bin/bash\n");
        let error = write_signature(&path, &OwnershipSignature::fresh("a,b.sh", "game.zip"))
            .expect_err("comma");
        assert!(matches!(error, PortError::Signature { .. }));

        let text = script(temp.path(), "readme.txt", "hello\n");
        let error = write_signature(&text, &OwnershipSignature::fresh("readme.txt", "game.zip"))
            .expect_err("unsupported");
        assert!(error.to_string().contains("cannot carry a signature"));
    }
}
