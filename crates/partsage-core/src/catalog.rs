//! Catalog loading and chunking.
//!
//! Reads the scraped JSON exports (`*_parts.json`, `*_repairs.json`,
//! `*_blogs.json`, or any file whose rows identify the kind) under a directory, normalizes them into catalog records and
//! cuts embedding chunks for the semantic store.
use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::types::{BlogExcerpt, CompatibilityEdge, EmbeddingChunk, Installation, PartRecord, RepairGuide, SourceKind};

#[derive(Debug, Clone, Default)]
pub struct Catalog {
    pub parts: Vec<PartRecord>,
    pub compatibility: Vec<CompatibilityEdge>,
    pub repairs: Vec<RepairGuide>,
    pub blogs: Vec<BlogExcerpt>,
}

impl Catalog {
    pub fn is_empty(&self) -> bool { self.parts.is_empty() && self.repairs.is_empty() && self.blogs.is_empty() }

    /// Adds parts, deriving compatibility edges from each part's model list.
    /// A later record for the same part number replaces the earlier one.
    pub fn add_parts(&mut self, parts: Vec<PartRecord>) {
        let mut by_number: BTreeMap<String, PartRecord> =
            self.parts.drain(..).map(|p| (p.part_number.clone(), p)).collect();
        for part in parts { by_number.insert(part.part_number.clone(), part); }
        self.parts = by_number.into_values().collect();
        self.compatibility = self.parts.iter().flat_map(edges_for_part).collect();
    }
}

fn edges_for_part(part: &PartRecord) -> Vec<CompatibilityEdge> {
    part.compatible_models
        .iter()
        .map(|m| m.trim())
        .filter(|m| !m.is_empty())
        .map(|model| CompatibilityEdge {
            part_number: part.part_number.clone(),
            model_number: model.to_ascii_uppercase(),
            brand: part.brand.clone(),
            appliance_type: part.category.clone(),
            part_name: Some(part.name.clone()),
            price: part.price,
            product_url: part.product_url.clone(),
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct ChunkingConfig {
    pub words_per_chunk: usize,
    pub overlap_percent: f32,
}

impl Default for ChunkingConfig {
    fn default() -> Self { Self { words_per_chunk: 300, overlap_percent: 0.2 } }
}

#[derive(Default)]
pub struct CatalogLoader {
    chunking_config: ChunkingConfig,
}

impl CatalogLoader {
    pub fn new() -> Self { Self::default() }

    pub fn with_chunking(chunking_config: ChunkingConfig) -> Self { Self { chunking_config } }

    pub fn load_directory(&self, data_dir: &Path) -> Result<Catalog> {
        let files = list_json_files(data_dir);
        let mut catalog = Catalog::default();
        if files.is_empty() {
            warn!(dir = %data_dir.display(), "no catalog .json files found");
            return Ok(catalog);
        }
        for file_path in &files {
            let raw = fs::read_to_string(file_path).with_context(|| format!("reading {}", file_path.display()))?;
            let stem = file_path.file_stem().map(|n| n.to_string_lossy().to_ascii_lowercase()).unwrap_or_default();
            let named = FileKind::from_stem(&stem);
            let rows: Value = match serde_json::from_str(&raw) {
                Ok(rows) => rows,
                Err(e) if named.is_none() => {
                    warn!(file = %file_path.display(), error = %e, "skipping unreadable json file");
                    continue;
                }
                Err(e) => return Err(e).with_context(|| format!("parsing {}", file_path.display())),
            };
            let Some(kind) = named.or_else(|| FileKind::sniff(&rows)) else {
                warn!(file = %file_path.display(), "skipping catalog file: neither its name nor its rows identify parts, repairs or blogs");
                continue;
            };
            let row_count = rows.as_array().map_or(0, Vec::len);
            let kept = match kind {
                FileKind::Parts => {
                    let parts: Vec<PartRecord> = parse_rows::<RawPart>(rows, file_path)?.into_iter().filter_map(RawPart::normalize).collect();
                    let kept = parts.len();
                    catalog.add_parts(parts);
                    kept
                }
                FileKind::Repairs => {
                    let before = catalog.repairs.len();
                    catalog.repairs.extend(parse_rows::<RawRepair>(rows, file_path)?.into_iter().filter_map(RawRepair::normalize));
                    catalog.repairs.len() - before
                }
                FileKind::Blogs => {
                    let before = catalog.blogs.len();
                    catalog.blogs.extend(parse_rows::<RawBlog>(rows, file_path)?.into_iter().filter_map(RawBlog::normalize));
                    catalog.blogs.len() - before
                }
            };
            if row_count > 0 && kept == 0 {
                warn!(file = %file_path.display(), kind = ?kind, rows = row_count, "no usable records in catalog file");
            } else {
                debug!(file = %file_path.display(), kind = ?kind, rows = row_count, kept, "loaded catalog file");
            }
        }
        info!(parts = catalog.parts.len(), edges = catalog.compatibility.len(), repairs = catalog.repairs.len(), blogs = catalog.blogs.len(), "catalog loaded");
        Ok(catalog)
    }

    /// Cuts every catalog entity into embedding chunks tagged with its source.
    pub fn chunk_catalog(&self, catalog: &Catalog) -> Vec<EmbeddingChunk> {
        let mut chunks = Vec::new();
        for part in &catalog.parts {
            let mut text = format!("{} ({})", part.name, part.part_number);
            if let Some(brand) = &part.brand { text.push_str(&format!(" by {brand}")); }
            if let Some(category) = &part.category { text.push_str(&format!(" for {category}")); }
            text.push_str(".\n\n");
            if let Some(description) = &part.description { text.push_str(description); text.push_str("\n\n"); }
            if !part.symptoms.is_empty() { text.push_str(&format!("Fixes symptoms: {}.", part.symptoms.join(", "))); }
            chunks.extend(self.chunk_content(&text, &part.part_number, SourceKind::Part, &part.name, part.product_url.as_deref()));
        }
        for repair in &catalog.repairs {
            let mut text = format!("{} {}.\n\n", repair.appliance_type, repair.symptom);
            if let Some(description) = &repair.description { text.push_str(description); text.push_str("\n\n"); }
            if !repair.parts_needed.is_empty() { text.push_str(&format!("Parts commonly involved: {}.", repair.parts_needed.join(", "))); }
            let title = format!("{} - {}", repair.symptom, repair.appliance_type);
            let url = repair.detail_url.as_deref().or(repair.video_url.as_deref());
            chunks.extend(self.chunk_content(&text, &repair.id, SourceKind::Repair, &title, url));
        }
        for blog in &catalog.blogs {
            let body = blog.content.as_deref().or(blog.excerpt.as_deref()).unwrap_or_default();
            let text = format!("{}\n\n{}", blog.title, body);
            chunks.extend(self.chunk_content(&text, &blog.url, SourceKind::Blog, &blog.title, Some(&blog.url)));
        }
        info!(chunks = chunks.len(), "catalog chunked");
        chunks
    }

    fn chunk_content(&self, content: &str, doc_id: &str, source: SourceKind, title: &str, url: Option<&str>) -> Vec<EmbeddingChunk> {
        let mut pieces: Vec<String> = Vec::new();
        let mut current = String::new();
        for paragraph in content.split("\n\n").map(str::trim).filter(|p| !p.is_empty()) {
            let words = paragraph.split_whitespace().count();
            if words > self.chunking_config.words_per_chunk {
                if !current.is_empty() { pieces.push(std::mem::take(&mut current)); }
                pieces.extend(self.split_paragraph_with_overlap(paragraph));
                continue;
            }
            if current.split_whitespace().count() + words > self.chunking_config.words_per_chunk {
                pieces.push(std::mem::take(&mut current));
            }
            if !current.is_empty() { current.push_str("\n\n"); }
            current.push_str(paragraph);
        }
        if !current.is_empty() { pieces.push(current); }

        let total_chunks = pieces.len();
        pieces
            .into_iter()
            .enumerate()
            .map(|(chunk_index, content)| EmbeddingChunk {
                id: format!("{}:{}#{}", source.as_str(), doc_id, chunk_index),
                doc_id: doc_id.to_string(),
                source,
                title: title.to_string(),
                url: url.map(str::to_string),
                content,
                chunk_index,
                total_chunks,
            })
            .collect()
    }

    fn split_paragraph_with_overlap(&self, paragraph: &str) -> Vec<String> {
        let words: Vec<&str> = paragraph.split_whitespace().collect();
        let words_per_chunk = self.chunking_config.words_per_chunk.max(1);
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
        let overlap_words = ((words_per_chunk as f32 * self.chunking_config.overlap_percent) as usize).min(words_per_chunk - 1);
        let mut chunks = Vec::new();
        let mut start = 0;
        while start < words.len() {
            let end = (start + words_per_chunk).min(words.len());
            chunks.push(words[start..end].join(" "));
            if end >= words.len() { break; }
            start = end - overlap_words;
        }
        chunks
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileKind {
    Parts,
    Repairs,
    Blogs,
}

impl FileKind {
    /// `all_partselect_parts` is parts; a stem naming two kinds
    /// (`repair_parts`) decides nothing.
    fn from_stem(stem: &str) -> Option<Self> {
        let mut found = None;
        for token in stem.split(|c: char| !c.is_ascii_alphanumeric()) {
            let kind = match token {
                "part" | "parts" => Self::Parts,
                "repair" | "repairs" => Self::Repairs,
                "blog" | "blogs" => Self::Blogs,
                _ => continue,
            };
            match found {
                Some(seen) if seen != kind => return None,
                _ => found = Some(kind),
            }
        }
        found
    }

    /// Looks at the keys of the first row.
    fn sniff(rows: &Value) -> Option<Self> {
        let first = rows.as_array()?.first()?.as_object()?;
        if first.contains_key("part_number") {
            Some(Self::Parts)
        } else if first.contains_key("symptom") {
            Some(Self::Repairs)
        } else if first.contains_key("url") && first.contains_key("title") {
            Some(Self::Blogs)
        } else {
            None
        }
    }
}

fn parse_rows<T: serde::de::DeserializeOwned>(rows: Value, file_path: &Path) -> Result<Vec<T>> {
    serde_json::from_value(rows).with_context(|| format!("parsing rows in {}", file_path.display()))
}

fn list_json_files(root: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for entry in walkdir::WalkDir::new(root).into_iter().filter_map(Result::ok).filter(|e| e.file_type().is_file()) {
        let path = entry.path();
        if path.extension().and_then(|s| s.to_str()) == Some("json") { files.push(path.to_path_buf()); }
    }
    files.sort();
    files
}

// ---------------------------------------------------------------------------
// Raw scraped rows
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RawPart {
    part_number: Option<String>,
    name: Option<String>,
    description: Option<String>,
    #[serde(default)]
    price: Value,
    brand: Option<String>,
    manufacturer: Option<String>,
    manufacturer_id: Option<String>,
    category: Option<String>,
    product_types: Option<String>,
    availability: Option<String>,
    in_stock: Option<bool>,
    #[serde(alias = "install_difficulty")]
    installation_difficulty: Option<String>,
    #[serde(alias = "install_time")]
    installation_time: Option<String>,
    installation_guide: Option<String>,
    #[serde(alias = "install_video_url")]
    video_url: Option<String>,
    #[serde(default)]
    symptoms: Value,
    product_url: Option<String>,
    image_url: Option<String>,
    #[serde(default, alias = "compatibility_models")]
    compatible_models: Vec<String>,
}

impl RawPart {
    fn normalize(self) -> Option<PartRecord> {
        let part_number = self.part_number.map(|p| p.trim().to_ascii_uppercase()).filter(|p| !p.is_empty())?;
        let category = normalize_category(self.category.as_deref(), self.product_types.as_deref());
        let in_stock = match (&self.availability, self.in_stock) {
            (Some(a), _) => a.trim().eq_ignore_ascii_case("in stock"),
            (None, Some(flag)) => flag,
            (None, None) => false,
        };
        Some(PartRecord {
            name: self.name.unwrap_or_else(|| part_number.clone()),
            part_number,
            description: self.description.filter(|d| !d.trim().is_empty()),
            price: parse_price(&self.price),
            brand: self.brand.or_else(|| self.manufacturer.clone()),
            manufacturer: self.manufacturer,
            manufacturer_id: self.manufacturer_id,
            category,
            availability: self.availability,
            in_stock,
            installation: Installation {
                difficulty: self.installation_difficulty,
                time: self.installation_time,
                video_url: self.video_url.filter(|u| !u.is_empty()),
                guide_url: self.installation_guide.filter(|u| u.starts_with("http")),
            },
            symptoms: split_list(&self.symptoms),
            product_url: self.product_url.filter(|u| !u.is_empty()),
            image_url: self.image_url.filter(|u| !u.is_empty()),
            compatible_models: self.compatible_models,
        })
    }
}

fn normalize_category(category: Option<&str>, product_types: Option<&str>) -> Option<String> {
    let product_types = product_types.unwrap_or_default().to_ascii_lowercase();
    if product_types.contains("dishwasher") {
        return Some("dishwasher".to_string());
    }
    if product_types.contains("refrigerator") {
        return Some("refrigerator".to_string());
    }
    category.map(|c| c.trim().to_ascii_lowercase()).filter(|c| !c.is_empty())
}

/// Accepts `45.12`, `"45.12"` and `"$45.12"`.
fn parse_price(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().trim_start_matches('$').replace(',', "").parse().ok(),
        _ => None,
    }
}

/// Accepts a JSON list or a `|`/`,` separated string.
fn split_list(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items.iter().filter_map(Value::as_str).map(str::trim).filter(|s| !s.is_empty()).map(str::to_string).collect(),
        Value::String(s) => s.split(['|', ',']).map(str::trim).filter(|s| !s.is_empty()).map(str::to_string).collect(),
        _ => Vec::new(),
    }
}

#[derive(Debug, Deserialize)]
struct RawRepair {
    #[serde(alias = "appliance_type")]
    product: Option<String>,
    symptom: Option<String>,
    description: Option<String>,
    difficulty: Option<String>,
    #[serde(default, alias = "percentage_reported")]
    percentage: Value,
    #[serde(default, alias = "parts_needed")]
    parts: Value,
    symptom_detail_url: Option<String>,
    repair_video_url: Option<String>,
}

impl RawRepair {
    fn normalize(self) -> Option<RepairGuide> {
        let symptom = self.symptom.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())?;
        let appliance_type = self.product.unwrap_or_default().trim().to_ascii_lowercase();
        #[allow(clippy::cast_possible_truncation)]
        let percentage_reported = match &self.percentage {
            Value::Number(n) => n.as_f64().map(|v| v as f32),
            Value::String(s) => s.trim().trim_end_matches('%').parse().ok(),
            _ => None,
        };
        Some(RepairGuide {
            id: format!("{}:{}", appliance_type, slug(&symptom)),
            appliance_type,
            symptom,
            description: self.description,
            difficulty: self.difficulty,
            percentage_reported,
            parts_needed: split_list(&self.parts),
            video_url: self.repair_video_url.filter(|u| !u.is_empty()),
            detail_url: self.symptom_detail_url.filter(|u| !u.is_empty()),
        })
    }
}

#[derive(Debug, Deserialize)]
struct RawBlog {
    title: Option<String>,
    url: Option<String>,
    excerpt: Option<String>,
    author: Option<String>,
    #[serde(alias = "date_published")]
    date: Option<String>,
    #[serde(default)]
    tags: Value,
    content: Option<String>,
}

impl RawBlog {
    fn normalize(self) -> Option<BlogExcerpt> {
        let url = self.url.filter(|u| !u.trim().is_empty())?;
        Some(BlogExcerpt {
            title: self.title.unwrap_or_else(|| url.clone()),
            url,
            excerpt: self.excerpt,
            author: self.author,
            published: self.date,
            tags: split_list(&self.tags),
            content: self.content,
        })
    }
}

fn slug(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.ends_with('-') && !out.is_empty() {
            out.push('-');
        }
    }
    out.trim_end_matches('-').to_string()
}
