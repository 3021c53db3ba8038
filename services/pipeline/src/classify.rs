//! Extension-based file classification.
//!
//! Pure, total and order-independent: the same path always yields the same
//! classification, which is what makes aggregation results reproducible in
//! tests. Unknown extensions fall through to [`FileType::Other`] with no MIME
//! guess.

use crate::event::{FileCategory, FileMetadata, FileType};

/// Map a lowercased extension (including the leading dot) to its file type.
pub fn file_type_for(extension: &str) -> FileType {
    match extension {
        ".jpg" | ".jpeg" | ".png" | ".gif" | ".bmp" | ".svg" | ".webp" | ".ico" => {
            FileType::Image
        }
        ".pdf" | ".doc" | ".docx" | ".xls" | ".xlsx" | ".ppt" | ".pptx" | ".txt" | ".rtf"
        | ".odt" => FileType::Document,
        ".mp4" | ".avi" | ".mkv" | ".mov" | ".wmv" | ".flv" | ".webm" | ".m4v" => FileType::Video,
        ".mp3" | ".wav" | ".flac" | ".aac" | ".ogg" | ".wma" | ".m4a" => FileType::Audio,
        ".zip" | ".rar" | ".7z" | ".tar" | ".gz" | ".bz2" => FileType::Archive,
        ".js" | ".ts" | ".py" | ".java" | ".cpp" | ".c" | ".h" | ".css" | ".html" | ".php"
        | ".rb" | ".go" | ".rs" | ".json" | ".xml" | ".yaml" | ".yml" => FileType::Code,
        ".exe" | ".msi" | ".deb" | ".rpm" | ".dmg" | ".pkg" | ".app" => FileType::Executable,
        _ => FileType::Other,
    }
}

/// MIME guess for well-known extensions.
pub fn mime_type_for(extension: &str) -> Option<&'static str> {
    let mime = match extension {
        ".jpg" | ".jpeg" => "image/jpeg",
        ".png" => "image/png",
        ".gif" => "image/gif",
        ".pdf" => "application/pdf",
        ".txt" => "text/plain",
        ".html" => "text/html",
        ".css" => "text/css",
        ".js" => "application/javascript",
        ".json" => "application/json",
        ".xml" => "application/xml",
        ".mp4" => "video/mp4",
        ".mp3" => "audio/mpeg",
        ".zip" => "application/zip",
        _ => return None,
    };
    Some(mime)
}

/// Second-stage mapping from file type to category.
pub fn category_for(file_type: FileType) -> FileCategory {
    match file_type {
        FileType::Image | FileType::Video | FileType::Audio => FileCategory::Media,
        FileType::Document => FileCategory::Document,
        FileType::Code => FileCategory::Code,
        FileType::Executable | FileType::Archive => FileCategory::System,
        FileType::Other | FileType::Directory => FileCategory::Other,
    }
}

/// Lowercased extension of a path, including the leading dot. Empty when the
/// path has no extension.
pub fn extension_of(path: &str) -> String {
    let name = path.rsplit('/').next().unwrap_or(path);
    match name.rfind('.') {
        // A leading dot is a hidden file, not an extension.
        Some(idx) if idx > 0 => name[idx..].to_ascii_lowercase(),
        _ => String::new(),
    }
}

/// Classify a path into the metadata attached to every event.
///
/// Directories classify uniformly: no extension, no MIME, category `other`.
pub fn classify(path: &str, is_directory: bool) -> FileMetadata {
    if is_directory {
        return FileMetadata {
            extension: String::new(),
            mime_type: None,
            category: FileCategory::Other,
            is_directory: true,
        };
    }

    let extension = extension_of(path);
    let file_type = file_type_for(&extension);

    FileMetadata {
        extension,
        mime_type: mime_type_for(&extension_of(path)).map(str::to_string),
        category: category_for(file_type),
        is_directory: false,
    }
}

/// File type for a path, honoring the directory flag.
pub fn file_type_of(path: &str, is_directory: bool) -> FileType {
    if is_directory {
        FileType::Directory
    } else {
        file_type_for(&extension_of(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_extensions_map_to_expected_types() {
        assert_eq!(file_type_for(".jpg"), FileType::Image);
        assert_eq!(file_type_for(".pdf"), FileType::Document);
        assert_eq!(file_type_for(".mkv"), FileType::Video);
        assert_eq!(file_type_for(".flac"), FileType::Audio);
        assert_eq!(file_type_for(".tar"), FileType::Archive);
        assert_eq!(file_type_for(".rs"), FileType::Code);
        assert_eq!(file_type_for(".deb"), FileType::Executable);
    }

    #[test]
    fn unknown_extension_is_other_with_no_mime() {
        let meta = classify("/data/file.xyz123", false);
        assert_eq!(meta.category, FileCategory::Other);
        assert_eq!(meta.mime_type, None);
        assert_eq!(meta.extension, ".xyz123");
    }

    #[test]
    fn classification_is_deterministic() {
        let a = classify("/home/user/photo.JPG", false);
        let b = classify("/home/user/photo.JPG", false);
        assert_eq!(a, b);
        assert_eq!(a.extension, ".jpg");
        assert_eq!(a.mime_type.as_deref(), Some("image/jpeg"));
        assert_eq!(a.category, FileCategory::Media);
    }

    #[test]
    fn directories_classify_as_other() {
        let meta = classify("/var/log", true);
        assert!(meta.is_directory);
        assert_eq!(meta.category, FileCategory::Other);
        assert_eq!(meta.extension, "");
        assert_eq!(meta.mime_type, None);
        assert_eq!(file_type_of("/var/log", true), FileType::Directory);
    }

    #[test]
    fn category_mapping_covers_all_types() {
        assert_eq!(category_for(FileType::Video), FileCategory::Media);
        assert_eq!(category_for(FileType::Document), FileCategory::Document);
        assert_eq!(category_for(FileType::Code), FileCategory::Code);
        assert_eq!(category_for(FileType::Archive), FileCategory::System);
        assert_eq!(category_for(FileType::Executable), FileCategory::System);
        assert_eq!(category_for(FileType::Other), FileCategory::Other);
        assert_eq!(category_for(FileType::Directory), FileCategory::Other);
    }

    #[test]
    fn extension_handles_hidden_and_bare_names() {
        assert_eq!(extension_of("/home/user/.bashrc"), "");
        assert_eq!(extension_of("/home/user/Makefile"), "");
        assert_eq!(extension_of("/home/user/archive.tar.gz"), ".gz");
    }
}
