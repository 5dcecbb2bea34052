use log::{ info, warn };
use std::collections::BTreeMap;
use std::fs;
use std::path::{ Path, PathBuf };
use std::sync::{ Arc, RwLock };

use super::{ ContextError, ContextKind, ContextSource, ContextStats };
use crate::config::prompt::PromptConfig;

const PAGE_BREAK: char = '\u{000C}';

#[derive(Debug)]
pub struct LoadedDocument {
    pub pages: Vec<String>,
    pub full_text: String,
    pub total_words: usize,
    pub total_characters: usize,
}

impl LoadedDocument {
    /// Pages are separated by form feeds, as `pdftotext` writes them.
    pub fn parse(raw: &str) -> Self {
        let pages: Vec<String> = raw
            .split(PAGE_BREAK)
            .map(normalize_page)
            .collect();

        // a trailing form feed leaves an empty last page
        let pages = match pages.split_last() {
            Some((last, rest)) if last.is_empty() && !rest.is_empty() => rest.to_vec(),
            _ => pages,
        };

        let full_text = pages
            .iter()
            .enumerate()
            .filter(|(_, text)| !text.is_empty())
            .map(|(i, text)| format!("--- Page {} ---\n{}", i + 1, text))
            .collect::<Vec<_>>()
            .join("\n\n");

        let total_words = pages.iter().map(|p| p.split_whitespace().count()).sum();
        let total_characters = pages.iter().map(|p| p.chars().count()).sum();

        Self { pages, full_text, total_words, total_characters }
    }
}

fn normalize_page(page: &str) -> String {
    let mut lines: Vec<String> = Vec::new();
    for line in page.lines() {
        let line = line.split_whitespace().collect::<Vec<_>>().join(" ");
        if line.is_empty() && lines.last().map_or(true, |l| l.is_empty()) {
            continue;
        }
        lines.push(line);
    }
    while lines.last().is_some_and(|l| l.is_empty()) {
        lines.pop();
    }
    lines.join("\n")
}

/// Grounds answers in one pre-extracted text document.
pub struct DocumentSource {
    path: PathBuf,
    title: String,
    loaded: RwLock<Option<Arc<LoadedDocument>>>,
}

impl DocumentSource {
    pub fn new(path: impl AsRef<Path>, title: impl Into<String>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            title: title.into(),
            loaded: RwLock::new(None),
        }
    }

    /// Builds the source and tries a first load. A failed load is logged and
    /// leaves the source unavailable until the next successful `refresh`.
    pub fn open(path: impl AsRef<Path>, title: impl Into<String>) -> Self {
        let source = Self::new(path, title);
        if let Err(e) = source.refresh() {
            warn!("Document {} not loaded: {}", source.path.display(), e);
        }
        source
    }

    fn current(&self) -> Result<Arc<LoadedDocument>, ContextError> {
        self.loaded
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .ok_or_else(|| ContextError::NotLoaded(self.path.display().to_string()))
    }
}

impl ContextSource for DocumentSource {
    fn kind(&self) -> ContextKind {
        ContextKind::Document
    }

    fn grounding_text(&self) -> Result<String, ContextError> {
        Ok(self.current()?.full_text.clone())
    }

    fn summary_stats(&self) -> Result<ContextStats, ContextError> {
        let doc = self.current()?;
        let mut counts = BTreeMap::new();
        counts.insert("pages".to_string(), doc.pages.len());
        counts.insert("words".to_string(), doc.total_words);
        counts.insert("characters".to_string(), doc.total_characters);
        Ok(ContextStats {
            source: ContextKind::Document.as_str(),
            title: self.title.clone(),
            counts,
        })
    }

    fn system_instruction(
        &self,
        prompts: &PromptConfig,
        _user_message: &str
    ) -> Result<String, ContextError> {
        let doc = self.current()?;
        Ok(prompts.document_prompt(&self.title, doc.pages.len(), doc.total_words, &doc.full_text))
    }

    fn refresh(&self) -> Result<(), ContextError> {
        let raw = fs::read_to_string(&self.path)?;
        let doc = LoadedDocument::parse(&raw);
        if doc.full_text.trim().is_empty() {
            return Err(ContextError::EmptyDocument(self.path.display().to_string()));
        }
        info!(
            "Loaded document '{}': {} pages, {} words",
            self.title,
            doc.pages.len(),
            doc.total_words
        );
        *self.loaded.write().unwrap_or_else(|e| e.into_inner()) = Some(Arc::new(doc));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn splits_pages_and_normalizes_whitespace() {
        let doc = LoadedDocument::parse("Title   line\n\n\n\nbody  text\n\u{000C}Second\tpage\n\u{000C}");
        assert_eq!(doc.pages.len(), 2);
        assert_eq!(doc.pages[0], "Title line\n\nbody text");
        assert_eq!(doc.pages[1], "Second page");
        assert_eq!(doc.total_words, 6);
        assert!(doc.full_text.starts_with("--- Page 1 ---\nTitle line"));
        assert!(doc.full_text.contains("--- Page 2 ---\nSecond page"));
    }

    #[test]
    fn unloaded_source_is_unavailable() {
        let source = DocumentSource::open("/no/such/file.txt", "Missing");
        assert!(!source.is_available());
        assert!(matches!(source.grounding_text(), Err(ContextError::NotLoaded(_))));
        assert!(source.system_instruction(&PromptConfig::default(), "hi").is_err());
    }

    #[test]
    fn loads_file_and_reports_stats() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "Accessible travel rules\u{000C}Airlines must assist passengers").unwrap();

        let source = DocumentSource::open(file.path(), "Accessible Travel Guide");
        assert!(source.is_available());
        let stats = source.summary_stats().unwrap();
        assert_eq!(stats.title, "Accessible Travel Guide");
        assert_eq!(stats.counts["pages"], 2);
        assert_eq!(stats.counts["words"], 7);

        let instruction = source.system_instruction(&PromptConfig::default(), "hi").unwrap();
        assert!(instruction.contains("Airlines must assist passengers"));
        assert!(instruction.contains("Pages: 2"));
    }

    #[test]
    fn blank_file_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "  \n\u{000C}\n").unwrap();
        let source = DocumentSource::new(file.path(), "Blank");
        assert!(matches!(source.refresh(), Err(ContextError::EmptyDocument(_))));
    }
}
