//! 文档组装 - 把有序的 SlideRecord 持久化为最终产物

use super::assembler::SlideRecord;
use super::error::AssemblyError;
use log::info;
use serde::Serialize;
use std::fmt::Write as _;
use std::fs;
use std::path::PathBuf;

pub trait DocumentAssembler: Send + Sync {
    fn assemble(&self, records: &[SlideRecord]) -> Result<DocumentHandle, AssemblyError>;
}

/// 组装结果
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentHandle {
    /// 主文档路径；纯内存组装时为 None
    pub path: Option<PathBuf>,
    pub slide_count: usize,
}

impl DocumentHandle {
    pub fn in_memory(slide_count: usize) -> Self {
        Self {
            path: None,
            slide_count,
        }
    }
}

#[derive(Debug, Serialize)]
struct ManifestEntry<'a> {
    position: usize,
    order: u64,
    image: String,
    fingerprint: String,
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct Manifest<'a> {
    slide_count: usize,
    slides: Vec<ManifestEntry<'a>>,
}

/// 输出到目录：每张幻灯片一个 PNG，外加 `slides.json` 清单与 `slides.md` 文档
pub struct DirectoryAssembler {
    out_dir: PathBuf,
}

impl DirectoryAssembler {
    pub const MANIFEST_FILE: &'static str = "slides.json";
    pub const DOCUMENT_FILE: &'static str = "slides.md";

    pub fn new(out_dir: impl Into<PathBuf>) -> Self {
        Self {
            out_dir: out_dir.into(),
        }
    }

    fn image_name(position: usize) -> String {
        format!("slide_{:04}.png", position)
    }

    fn render_markdown(records: &[SlideRecord]) -> String {
        let mut doc = String::from("# Slides\n");
        for (i, record) in records.iter().enumerate() {
            let position = i + 1;
            let _ = write!(
                doc,
                "\n## Slide {} (frame {})\n\n![Slide {}]({})\n\n",
                position,
                record.order,
                position,
                Self::image_name(position)
            );
            if record.text.is_empty() {
                doc.push_str("_No text extracted._\n");
            } else {
                doc.push_str(&record.text);
                doc.push('\n');
            }
        }
        doc
    }
}

impl DocumentAssembler for DirectoryAssembler {
    fn assemble(&self, records: &[SlideRecord]) -> Result<DocumentHandle, AssemblyError> {
        fs::create_dir_all(&self.out_dir)?;

        let mut entries = Vec::with_capacity(records.len());
        for (i, record) in records.iter().enumerate() {
            let position = i + 1;
            let name = Self::image_name(position);
            record.image.save(self.out_dir.join(&name))?;
            entries.push(ManifestEntry {
                position,
                order: record.order,
                image: name,
                fingerprint: record.fingerprint.to_string(),
                text: &record.text,
            });
        }

        let manifest = Manifest {
            slide_count: records.len(),
            slides: entries,
        };
        fs::write(
            self.out_dir.join(Self::MANIFEST_FILE),
            serde_json::to_string_pretty(&manifest)?,
        )?;

        let document = self.out_dir.join(Self::DOCUMENT_FILE);
        fs::write(&document, Self::render_markdown(records))?;

        info!(
            "📄 Document written: {:?} ({} slides)",
            document,
            records.len()
        );
        Ok(DocumentHandle {
            path: Some(document),
            slide_count: records.len(),
        })
    }
}
