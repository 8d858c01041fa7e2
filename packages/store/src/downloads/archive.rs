// ABOUTME: Builds the zip archive for a completed selection
// ABOUTME: Entries are laid out as {category}/{filename} plus a README.txt manifest

use chrono::Utc;
use std::collections::HashSet;
use std::io::{Cursor, Write};
use std::sync::Arc;
use tracing::warn;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use super::blobs::BlobStore;
use crate::catalog::{Material, MaterialModule, Product};
use crate::selections::Selection;
use crate::storage::{StorageError, StorageResult};

/// A finished archive plus the entries that could not be included.
pub struct SelectionArchive {
    pub filename: String,
    pub bytes: Vec<u8>,
    pub skipped: Vec<String>,
}

pub struct ArchiveBuilder {
    blobs: Arc<dyn BlobStore>,
}

impl ArchiveBuilder {
    pub fn new(blobs: Arc<dyn BlobStore>) -> Self {
        Self { blobs }
    }

    /// Assemble the archive for a selection in memory.
    ///
    /// Modules are walked in the given order; a choice whose backing file is
    /// gone from blob storage is skipped and noted in the README rather than
    /// failing the whole download.
    pub async fn build(
        &self,
        product: &Product,
        modules: &[MaterialModule],
        selection: &Selection,
    ) -> StorageResult<SelectionArchive> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        let mut used_names = HashSet::new();
        let mut manifest = Vec::new();
        let mut skipped = Vec::new();

        for module in modules {
            let Some(material_id) = selection.choices.get(&module.id) else {
                continue;
            };
            let Some(material) = module.materials.iter().find(|m| &m.id == material_id) else {
                warn!(
                    "Chosen material {} no longer exists in module {}, skipping",
                    material_id, module.id
                );
                skipped.push(format!("{}/{}", module.name, material_id));
                continue;
            };

            match self.blobs.read(&material.file_path).await? {
                Some(bytes) => {
                    let dir = sanitize_segment(&module.category, &module.id);
                    let entry = unique_entry_name(&mut used_names, &dir, &material.filename);
                    writer
                        .start_file(entry, options)
                        .map_err(|e| StorageError::Archive(e.to_string()))?;
                    writer.write_all(&bytes)?;
                    manifest.push(manifest_line(module, material, true));
                }
                None => {
                    warn!(
                        "Blob missing for material {} at {}, skipping",
                        material.id, material.file_path
                    );
                    skipped.push(format!("{}/{}", module.name, material.filename));
                    manifest.push(manifest_line(module, material, false));
                }
            }
        }

        let readme = render_readme(product, &manifest);
        writer
            .start_file("README.txt", options)
            .map_err(|e| StorageError::Archive(e.to_string()))?;
        writer.write_all(readme.as_bytes())?;

        let cursor = writer
            .finish()
            .map_err(|e| StorageError::Archive(e.to_string()))?;

        Ok(SelectionArchive {
            filename: format!(
                "{}-{}.zip",
                sanitize_segment(&product.name, &product.id),
                selection.id
            ),
            bytes: cursor.into_inner(),
            skipped,
        })
    }
}

fn manifest_line(module: &MaterialModule, material: &Material, present: bool) -> String {
    if !present {
        return format!(
            "- {}: {} (missing from storage)",
            module.name, material.filename
        );
    }
    let dimensions = match (material.width, material.height) {
        (Some(w), Some(h)) => format!(", {w}x{h} px"),
        _ => String::new(),
    };
    format!(
        "- {}: {} ({}{})",
        module.name,
        material.filename,
        format_file_size(material.file_size),
        dimensions
    )
}

fn render_readme(product: &Product, manifest: &[String]) -> String {
    let mut readme = String::from("Magic Cube Materials\n====================\n\n");
    readme.push_str(&format!(
        "Product: {} (SPU: {})\n",
        product.name, product.spu_code
    ));
    readme.push_str(&format!("Generated: {}\n\n", Utc::now().to_rfc3339()));

    readme.push_str("Included files:\n");
    if manifest.is_empty() {
        readme.push_str("- (none)\n");
    } else {
        for line in manifest {
            readme.push_str(line);
            readme.push('\n');
        }
    }

    readme.push_str(
        "\nNotes:\n\
        - These materials are licensed for use with this product only.\n\
        - Print files at their original resolution for best results.\n\
        - Lost files can be downloaded again from your selection history.\n",
    );
    readme
}

/// Strip a name down to filesystem-safe characters, falling back to the
/// given id when nothing survives.
fn sanitize_segment(raw: &str, fallback: &str) -> String {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .collect();
    if cleaned.is_empty() {
        fallback.to_string()
    } else {
        cleaned
    }
}

/// Archive entry names must be unique; clashes get a numeric suffix.
fn unique_entry_name(used: &mut HashSet<String>, dir: &str, filename: &str) -> String {
    let candidate = format!("{dir}/{filename}");
    if used.insert(candidate.clone()) {
        return candidate;
    }

    let (stem, ext) = match filename.rsplit_once('.') {
        Some((stem, ext)) => (stem.to_string(), format!(".{ext}")),
        None => (filename.to_string(), String::new()),
    };
    let mut counter = 2;
    loop {
        let candidate = format!("{dir}/{stem}-{counter}{ext}");
        if used.insert(candidate.clone()) {
            return candidate;
        }
        counter += 1;
    }
}

fn format_file_size(bytes: i64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;
    const GB: f64 = MB * 1024.0;

    let size = bytes as f64;
    if size < KB {
        format!("{bytes} B")
    } else if size < MB {
        format!("{:.2} KB", size / KB)
    } else if size < GB {
        format!("{:.2} MB", size / MB)
    } else {
        format!("{:.2} GB", size / GB)
    }
}
