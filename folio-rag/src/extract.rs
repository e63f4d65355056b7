//! Corpus text extraction.
//!
//! [`TextExtractor`] walks a corpus directory and hands every file with a
//! recognised extension to the matching [`PageExtractor`]. Failures are
//! contained at the smallest unit possible: an unreadable page contributes
//! nothing, an unreadable file is skipped, and only a corpus that yields no
//! text at all is reported as [`RagError::EmptyCorpus`].

use std::fs;
use std::path::Path;

use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::document::Document;
use crate::error::{RagError, Result};

/// Extracts per-page text from one kind of document file.
pub trait PageExtractor: Send + Sync {
    /// Short name used in log output.
    fn name(&self) -> &str;

    /// Returns `true` if this extractor handles files with the given
    /// lowercase extension.
    fn supports(&self, extension: &str) -> bool;

    /// Extract the text of every page, in page order.
    ///
    /// Pages that exist but yield no text are returned as `None`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file as a whole cannot be opened or parsed.
    fn extract_pages(&self, path: &Path) -> Result<Vec<Option<String>>>;
}

/// PDF extraction backed by `lopdf`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfExtractor;

impl PageExtractor for PdfExtractor {
    fn name(&self) -> &str {
        "pdf"
    }

    fn supports(&self, extension: &str) -> bool {
        extension == "pdf"
    }

    fn extract_pages(&self, path: &Path) -> Result<Vec<Option<String>>> {
        let pdf = lopdf::Document::load(path).map_err(|e| {
            RagError::io(path, std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))
        })?;

        let pages = pdf
            .get_pages()
            .into_keys()
            .map(|number| match pdf.extract_text(&[number]) {
                Ok(text) => Some(text),
                Err(e) => {
                    // Scanned pages without a text layer end up here.
                    debug!(path = %path.display(), page = number, error = %e, "page has no extractable text");
                    None
                }
            })
            .collect();

        Ok(pages)
    }
}

/// Plain text and markdown files, read as a single page.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainTextExtractor;

impl PageExtractor for PlainTextExtractor {
    fn name(&self) -> &str {
        "text"
    }

    fn supports(&self, extension: &str) -> bool {
        matches!(extension, "txt" | "md")
    }

    fn extract_pages(&self, path: &Path) -> Result<Vec<Option<String>>> {
        let text = fs::read_to_string(path).map_err(|e| RagError::io(path, e))?;
        Ok(vec![Some(text)])
    }
}

/// Reads a directory of documents into raw corpus text.
pub struct TextExtractor {
    extractors: Vec<Box<dyn PageExtractor>>,
}

impl Default for TextExtractor {
    fn default() -> Self {
        Self::new(vec![Box::new(PdfExtractor), Box::new(PlainTextExtractor)])
    }
}

impl TextExtractor {
    /// Create an extractor dispatching to the given backends, first match wins.
    pub fn new(extractors: Vec<Box<dyn PageExtractor>>) -> Self {
        Self { extractors }
    }

    fn extractor_for(&self, path: &Path) -> Option<&dyn PageExtractor> {
        let extension = path.extension()?.to_str()?.to_ascii_lowercase();
        self.extractors.iter().map(|e| e.as_ref()).find(|e| e.supports(&extension))
    }

    /// Read every supported document in `dir`, sorted by file name.
    ///
    /// The listing is not recursive. Files without a supported extension are
    /// ignored; files that fail to parse are logged and skipped; documents
    /// whose pages are all blank are dropped.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::EmptyCorpus`] if `dir` does not exist or no file
    /// yields any text.
    pub fn load_documents(&self, dir: &Path) -> Result<Vec<Document>> {
        if !dir.is_dir() {
            warn!(path = %dir.display(), "corpus directory does not exist");
            return Err(RagError::EmptyCorpus { path: dir.to_path_buf() });
        }

        let mut documents = Vec::new();
        for entry in WalkDir::new(dir).min_depth(1).max_depth(1).sort_by_file_name() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(error = %e, "skipping unreadable directory entry");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            let Some(extractor) = self.extractor_for(path) else {
                debug!(path = %path.display(), "skipping unsupported file");
                continue;
            };

            let pages = match extractor.extract_pages(path) {
                Ok(pages) => pages,
                Err(e) => {
                    warn!(path = %path.display(), extractor = extractor.name(), error = %e, "skipping unreadable document");
                    continue;
                }
            };

            let pages: Vec<String> =
                pages.into_iter().flatten().filter(|page| !page.trim().is_empty()).collect();
            if pages.is_empty() {
                warn!(path = %path.display(), "document yielded no text");
                continue;
            }

            documents.push(Document {
                id: entry.file_name().to_string_lossy().into_owned(),
                pages,
            });
        }

        if documents.is_empty() {
            return Err(RagError::EmptyCorpus { path: dir.to_path_buf() });
        }

        let page_count: usize = documents.iter().map(|d| d.pages.len()).sum();
        info!(document_count = documents.len(), page_count, "loaded corpus documents");
        Ok(documents)
    }

    /// Concatenate the text of every document in `dir`, newline after each page.
    ///
    /// # Errors
    ///
    /// See [`TextExtractor::load_documents`].
    pub fn extract_dir(&self, dir: &Path) -> Result<String> {
        let documents = self.load_documents(dir)?;
        Ok(documents.iter().map(Document::text).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concatenates_supported_files_in_name_order() {
        let temp = tempfile::tempdir().unwrap();
        let root = temp.path();
        fs::write(root.join("b_projects.txt"), "Built a payment gateway.").unwrap();
        fs::write(root.join("a_summary.md"), "Backend developer.").unwrap();
        fs::write(root.join("photo.png"), [0u8, 1, 2, 3]).unwrap();

        let text = TextExtractor::default().extract_dir(root).unwrap();
        assert_eq!(text, "Backend developer.\nBuilt a payment gateway.\n");
    }

    /// Write a PDF with one page per entry; `None` pages have no content stream.
    fn write_pdf(path: &Path, pages: &[Option<&str>]) {
        use lopdf::content::{Content, Operation};
        use lopdf::{Object, Stream, dictionary};

        let mut doc = lopdf::Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => Object::Reference(font_id) },
        });

        let mut kids = Vec::new();
        for text in pages {
            let mut page = dictionary! {
                "Type" => "Page",
                "Parent" => Object::Reference(pages_id),
                "Resources" => Object::Reference(resources_id),
            };
            if let Some(text) = text {
                let content = Content {
                    operations: vec![
                        Operation::new("BT", vec![]),
                        Operation::new("Tf", vec![Object::Name(b"F1".to_vec()), Object::Integer(12)]),
                        Operation::new("Td", vec![Object::Integer(72), Object::Integer(720)]),
                        Operation::new("Tj", vec![Object::string_literal(*text)]),
                        Operation::new("ET", vec![]),
                    ],
                };
                let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
                page.set("Contents", Object::Reference(content_id));
            }
            kids.push(Object::Reference(doc.add_object(page)));
        }

        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => Object::Integer(count),
                "MediaBox" => vec![Object::Integer(0), Object::Integer(0), Object::Integer(612), Object::Integer(792)],
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => Object::Reference(pages_id),
        });
        doc.trailer.set("Root", Object::Reference(catalog_id));
        doc.save(path).unwrap();
    }

    #[test]
    fn pdf_pages_are_extracted_in_order_and_blank_pages_skipped() {
        let temp = tempfile::tempdir().unwrap();
        write_pdf(
            &temp.path().join("resume.pdf"),
            &[Some("Backend engineer at Acme"), None, Some("Built payment systems")],
        );

        let documents = TextExtractor::default().load_documents(temp.path()).unwrap();
        assert_eq!(documents.len(), 1);
        let pages = &documents[0].pages;
        assert_eq!(pages.len(), 2);
        assert!(pages[0].contains("Backend engineer at Acme"), "page 1: {:?}", pages[0]);
        assert!(pages[1].contains("Built payment systems"), "page 2: {:?}", pages[1]);

        let text = TextExtractor::default().extract_dir(temp.path()).unwrap();
        let expected: String = pages.iter().map(|page| format!("{page}\n")).collect();
        assert_eq!(text, expected);
    }

    #[test]
    fn broken_pdf_does_not_abort_the_batch() {
        let temp = tempfile::tempdir().unwrap();
        let root = temp.path();
        fs::write(root.join("broken.pdf"), b"%PDF-1.4 definitely not a pdf").unwrap();
        fs::write(root.join("resume.txt"), "Five years of experience.").unwrap();

        let documents = TextExtractor::default().load_documents(root).unwrap();
        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0].id, "resume.txt");
    }

    #[test]
    fn blank_documents_are_dropped() {
        let temp = tempfile::tempdir().unwrap();
        fs::write(temp.path().join("scan.txt"), "  \n\t ").unwrap();

        let err = TextExtractor::default().load_documents(temp.path()).unwrap_err();
        assert!(matches!(err, RagError::EmptyCorpus { .. }));
    }

    #[test]
    fn missing_directory_is_an_empty_corpus() {
        let temp = tempfile::tempdir().unwrap();
        let err = TextExtractor::default().extract_dir(&temp.path().join("nope")).unwrap_err();
        assert!(matches!(err, RagError::EmptyCorpus { .. }));
    }

    #[test]
    fn subdirectories_are_not_descended() {
        let temp = tempfile::tempdir().unwrap();
        let nested = temp.path().join("archive");
        fs::create_dir_all(&nested).unwrap();
        fs::write(nested.join("old.txt"), "Old resume.").unwrap();

        assert!(TextExtractor::default().load_documents(temp.path()).is_err());
    }
}
