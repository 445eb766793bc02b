//! Media analysis results
//!
//! Structured output of the analysis service. Every section and field
//! defaults when absent so partial responses still decode.

use serde::{Deserialize, Serialize};

/// Coarse media family derived from the file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Pdf,
    Image,
    Video,
    Other,
}

impl FileType {
    /// Classify by extension (case-insensitive)
    pub fn from_name(name: &str) -> Self {
        let ext = match name.rsplit_once('.') {
            Some((_, ext)) => ext.to_ascii_lowercase(),
            None => return FileType::Other,
        };
        match ext.as_str() {
            "pdf" => FileType::Pdf,
            "png" | "jpg" | "jpeg" | "gif" | "bmp" | "webp" => FileType::Image,
            "mp4" | "mov" | "avi" | "mkv" | "webm" => FileType::Video,
            _ => FileType::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FileType::Pdf => "pdf",
            FileType::Image => "image",
            FileType::Video => "video",
            FileType::Other => "other",
        }
    }
}

/// Basic file metadata
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Metadata {
    pub file_type: String,
    pub mime: Option<String>,
    pub size_bytes: Option<u64>,
    pub created_at: Option<String>,
    pub modified_at: Option<String>,
}

/// Video stream facts
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoInfo {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub duration_sec: Option<f64>,
    pub fps: Option<f64>,
    pub codec: Option<String>,
}

/// PDF document facts
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PdfInfo {
    pub page_count: Option<u32>,
    pub page0_width_pt: Option<f64>,
    pub page0_height_pt: Option<f64>,
}

/// Still image facts
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageInfo {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub exif_datetime: Option<String>,
    pub phash: Option<String>,
    pub dominant_colors: Vec<String>,
}

/// Semantic tags
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tagging {
    pub tags: Vec<String>,
    pub topics: Vec<String>,
    pub raw_keywords: Vec<String>,
}

/// Suggested rename
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Suggested {
    pub rename: String,
    pub reason: String,
    pub confidence: f32,
}

/// Full analysis result for one media item
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaAnalysis {
    pub meta: Metadata,
    pub video: VideoInfo,
    pub pdf: PdfInfo,
    pub image: ImageInfo,
    pub tagging: Tagging,
    pub suggested: Suggested,
}

impl MediaAnalysis {
    /// Local-only analysis: file type, MIME, size and filename keywords
    ///
    /// Used when no analysis service is configured.
    pub fn basic(name: &str, mime_type: &str, size_bytes: Option<u64>) -> Self {
        let mut out = MediaAnalysis::default();
        out.meta.file_type = FileType::from_name(name).as_str().to_string();
        out.meta.mime = Some(mime_type.to_string());
        out.meta.size_bytes = size_bytes;
        out.tagging.raw_keywords = gather_keywords(name);
        out
    }

    /// Suggested rename, if the analysis produced a usable one
    pub fn suggested_rename(&self) -> Option<&str> {
        let rename = self.suggested.rename.trim();
        (!rename.is_empty()).then_some(rename)
    }
}

const STOP_WORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "of", "to", "in", "on", "for", "with", "by", "at", "from",
    "is", "it", "this", "that", "v", "vs", "final", "copy", "img", "photo", "image", "video",
    "movie", "clip", "scan", "page", "pg", "doc",
];

/// Lowercase keywords (3+ chars, no stop words) from a file name, sorted and deduplicated
pub fn gather_keywords(name: &str) -> Vec<String> {
    let mut words: Vec<String> = name
        .split(|c: char| !c.is_ascii_alphanumeric())
        .map(|w| w.to_ascii_lowercase())
        .filter(|w| w.len() >= 3 && !STOP_WORDS.contains(&w.as_str()))
        .collect();
    words.sort();
    words.dedup();
    words
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_type_from_name() {
        assert_eq!(FileType::from_name("Report.PDF"), FileType::Pdf);
        assert_eq!(FileType::from_name("cat.webp"), FileType::Image);
        assert_eq!(FileType::from_name("trip.mkv"), FileType::Video);
        assert_eq!(FileType::from_name("notes.txt"), FileType::Other);
        assert_eq!(FileType::from_name("README"), FileType::Other);
    }

    #[test]
    fn test_gather_keywords_filters_and_dedups() {
        let kws = gather_keywords("IMG_golf-Tournament_final_golf (copy).jpg");
        assert_eq!(kws, vec!["golf", "jpg", "tournament"]);
    }

    #[test]
    fn test_partial_response_decodes_with_defaults() {
        let analysis: MediaAnalysis = serde_json::from_str(
            r#"{"tagging": {"tags": ["diagram"]}, "suggested": {"rename": "erd.png"}}"#,
        )
        .unwrap();
        assert_eq!(analysis.tagging.tags, vec!["diagram"]);
        assert!(analysis.tagging.topics.is_empty());
        assert_eq!(analysis.suggested_rename(), Some("erd.png"));
        assert_eq!(analysis.image, ImageInfo::default());
    }

    #[test]
    fn test_basic_analysis() {
        let analysis = MediaAnalysis::basic("beach_sunset.png", "image/png", Some(42));
        assert_eq!(analysis.meta.file_type, "image");
        assert_eq!(analysis.meta.mime.as_deref(), Some("image/png"));
        assert_eq!(analysis.meta.size_bytes, Some(42));
        assert_eq!(analysis.tagging.raw_keywords, vec!["beach", "png", "sunset"]);
        assert_eq!(analysis.suggested_rename(), None);
    }
}
