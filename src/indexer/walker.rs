use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Chapter source formats the indexer understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupportedFormat {
    Markdown,
    PlainText,
    Pdf,
    Docx,
    Pptx,
}

impl SupportedFormat {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "md" | "mdx" | "markdown" => Some(Self::Markdown),
            "txt" | "rst" => Some(Self::PlainText),
            "pdf" => Some(Self::Pdf),
            "docx" => Some(Self::Docx),
            "pptx" => Some(Self::Pptx),
            _ => None,
        }
    }
}

/// Chapter files under `dir`, sorted by path so that file order can serve
/// as chapter order.
pub fn walk_chapters(dir: &Path) -> Vec<(PathBuf, SupportedFormat)> {
    let mut files: Vec<(PathBuf, SupportedFormat)> = WalkDir::new(dir)
        .follow_links(true)
        .into_iter()
        .filter_entry(|entry| {
            // Skip hidden directories (.git, .docusaurus, ...)
            entry.depth() == 0 || !entry.file_name().to_string_lossy().starts_with('.')
        })
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| {
            let path = entry.into_path();
            let ext = path.extension()?.to_str()?;
            let format = SupportedFormat::from_extension(ext)?;
            Some((path, format))
        })
        .collect();

    files.sort_by(|a, b| a.0.cmp(&b.0));
    files
}
