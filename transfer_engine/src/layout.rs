use std::fmt::Write as _;

/// One file inside a multi-file download: a contiguous byte span within the
/// download's content addressing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub name: String,
    /// Byte offset of this file within the whole download.
    pub offset: u64,
    pub size: u64,
}

/// File layout and chunking of a download, as produced by the
/// container-metadata parser. All chunks share `chunk_size` except the final
/// chunk of the download, which may be shorter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadLayout {
    pub chunk_size: u64,
    pub total_size: u64,
    pub files: Vec<FileEntry>,
}

impl DownloadLayout {
    /// Builds a layout whose total size is the furthest byte any file reaches.
    pub fn new(chunk_size: u64, files: Vec<FileEntry>) -> Self {
        let total_size = files.iter().map(|f| f.offset + f.size).max().unwrap_or(0);
        Self {
            chunk_size,
            total_size,
            files,
        }
    }

    pub fn file(&self, index: usize) -> Option<&FileEntry> {
        self.files.get(index)
    }

    pub fn chunk_count(&self) -> u64 {
        self.total_size.div_ceil(self.chunk_size)
    }

    /// Human-readable listing of the files in the download, one line per file.
    pub fn describe(&self) -> String {
        let mut out = String::new();
        for (index, file) in self.files.iter().enumerate() {
            let _ = writeln!(out, "[{index}] {}: {} bytes at offset {}", file.name, file.size, file.offset);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_file_layout() -> DownloadLayout {
        DownloadLayout::new(
            16384,
            vec![
                FileEntry {
                    name: "intro.mkv".to_string(),
                    offset: 0,
                    size: 20000,
                },
                FileEntry {
                    name: "movie.mkv".to_string(),
                    offset: 20000,
                    size: 50000,
                },
            ],
        )
    }

    #[test]
    fn test_total_size_and_chunk_count() {
        let layout = two_file_layout();
        assert_eq!(layout.total_size, 70000);
        assert_eq!(layout.chunk_count(), 5);
    }

    #[test]
    fn test_file_lookup() {
        let layout = two_file_layout();
        assert_eq!(layout.file(1).unwrap().offset, 20000);
        assert!(layout.file(2).is_none());
    }

    #[test]
    fn test_describe_lists_files() {
        let description = two_file_layout().describe();
        assert!(description.contains("[0] intro.mkv"));
        assert!(description.contains("[1] movie.mkv: 50000 bytes at offset 20000"));
    }

    #[test]
    fn test_empty_layout() {
        let layout = DownloadLayout::new(16384, vec![]);
        assert_eq!(layout.total_size, 0);
        assert_eq!(layout.chunk_count(), 0);
    }
}
