//! Attachment discovery from a directory.

use std::{fs, io, path::Path};

use herald_common::{AttachmentDescriptor, tracing::warn};

/// Lists the regular files directly inside `dir` as attachments.
///
/// Subdirectories are skipped and the directory's own enumeration order is
/// kept. `None` or an empty path yields nothing; an unreadable directory is
/// logged and also yields nothing.
#[must_use]
pub fn collect(dir: Option<&Path>) -> Vec<AttachmentDescriptor> {
    let Some(dir) = dir.filter(|d| !d.as_os_str().is_empty()) else {
        return Vec::new();
    };

    match read_files(dir) {
        Ok(attachments) => attachments,
        Err(error) => {
            warn!(
                dir = %dir.display(),
                %error,
                "Failed to read attachment directory, sending without attachments"
            );
            Vec::new()
        }
    }
}

fn read_files(dir: &Path) -> io::Result<Vec<AttachmentDescriptor>> {
    let mut attachments = Vec::new();

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();

        // follows symlinks, like the listing the transport will read through
        if !fs::metadata(&path)?.is_file() {
            continue;
        }

        attachments.push(AttachmentDescriptor {
            filename: entry.file_name().to_string_lossy().into_owned(),
            content_locator: path,
        });
    }

    Ok(attachments)
}
