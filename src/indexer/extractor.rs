use std::fs::File;
use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use zip::ZipArchive;

use super::walker::SupportedFormat;

/// Text and title pulled out of one chapter file.
#[derive(Debug, Clone)]
pub struct ChapterFile {
    pub title: String,
    pub text: String,
}

pub fn load_chapter(path: &Path, format: SupportedFormat) -> Result<ChapterFile> {
    let text = extract_text(path, format)?;
    let title = heading_title(&text).unwrap_or_else(|| stem_title(path));
    Ok(ChapterFile { title, text })
}

pub fn extract_text(path: &Path, format: SupportedFormat) -> Result<String> {
    match format {
        SupportedFormat::Markdown | SupportedFormat::PlainText => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read chapter file: {}", path.display())),
        SupportedFormat::Pdf => pdf_extract::extract_text(path)
            .with_context(|| format!("Failed to extract PDF text: {}", path.display())),
        SupportedFormat::Docx => {
            let mut archive = open_archive(path)?;
            let xml = read_entry(&mut archive, "word/document.xml")
                .with_context(|| format!("No word/document.xml in {}", path.display()))?;
            Ok(text_between_tags(&xml, "w:t"))
        }
        SupportedFormat::Pptx => {
            let mut archive = open_archive(path)?;
            let mut slides: Vec<String> = archive
                .file_names()
                .filter(|name| name.starts_with("ppt/slides/slide") && name.ends_with(".xml"))
                .map(str::to_string)
                .collect();
            slides.sort();

            let mut texts = Vec::new();
            for slide in slides {
                let xml = read_entry(&mut archive, &slide)?;
                let text = text_between_tags(&xml, "a:t");
                if !text.is_empty() {
                    texts.push(text);
                }
            }
            Ok(texts.join("\n\n"))
        }
    }
}

fn open_archive(path: &Path) -> Result<ZipArchive<File>> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    ZipArchive::new(file).with_context(|| format!("Failed to read {} as ZIP", path.display()))
}

fn read_entry(archive: &mut ZipArchive<File>, name: &str) -> Result<String> {
    let mut entry = archive.by_name(name)?;
    let mut xml = String::new();
    entry.read_to_string(&mut xml)?;
    Ok(xml)
}

/// Concatenates the text content of every `<tag ...>...</tag>` element.
fn text_between_tags(xml: &str, tag: &str) -> String {
    let open_tag = format!("<{}", tag);
    let close_tag = format!("</{}>", tag);
    let mut texts = Vec::new();
    let mut rest = xml;

    while let Some(open_pos) = rest.find(&open_tag) {
        let after_open = &rest[open_pos + open_tag.len()..];
        // `<w:t>` and `<w:t xml:space="preserve">` match; `<w:tbl>` does not
        if !after_open.starts_with('>') && !after_open.starts_with(' ') {
            rest = after_open;
            continue;
        }
        let Some(tag_end) = after_open.find('>') else { break };
        let content = &after_open[tag_end + 1..];
        let Some(close_pos) = content.find(&close_tag) else { break };

        if close_pos > 0 {
            texts.push(&content[..close_pos]);
        }
        rest = &content[close_pos + close_tag.len()..];
    }

    texts.join(" ")
}

/// First Markdown level-one heading, if any.
fn heading_title(text: &str) -> Option<String> {
    text.lines()
        .map(str::trim)
        .find_map(|line| line.strip_prefix("# "))
        .map(|title| title.trim().to_string())
        .filter(|title| !title.is_empty())
}

/// `03-ros2_fundamentals.md` -> `ros2 fundamentals`
fn stem_title(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let stem = stem.trim_start_matches(|c: char| c.is_ascii_digit() || c == '-' || c == '_');
    stem.replace(&['-', '_'][..], " ").trim().to_string()
}
