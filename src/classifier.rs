/// Classification of scanned files into group keys.
///
/// A [`Strategy`] turns a [`FileEntry`] into a [`GroupKey`]: the relative
/// folder (below the destination base) the planner places the file in.
/// Classification is a pure function of the entry snapshot, so the same entry
/// always lands in the same group.
///
/// # Examples
///
/// ```
/// use sortdir::classifier::MimeTable;
///
/// let table = MimeTable::default();
/// assert_eq!(table.lookup("png"), Some("image/png"));
/// assert_eq!(table.lookup("PDF"), Some("application/pdf"));
/// assert_eq!(table.lookup("nope"), None);
/// ```
use crate::scanner::FileEntry;
use chrono::{DateTime, Local, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Group used by the extension strategy for files without an extension.
pub const NO_EXTENSION_KEY: &str = "noext";

/// Group used by the MIME strategy when the type cannot be determined.
pub const UNKNOWN_MIME_KEY: &str = "unknown";

/// Which grouping rule to apply to every file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupBy {
    /// Lowercased file extension.
    #[default]
    Ext,
    /// Top-level MIME type (image, text, ...).
    Mime,
    /// Timestamp-derived folders.
    Date,
}

/// Timestamp used by the date strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DateField {
    /// Last modification time.
    #[default]
    Mtime,
    /// Creation (birth) time, falling back to mtime where unsupported.
    Ctime,
}

/// How many folder levels the date strategy produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DateGranularity {
    /// `YYYY`
    Year,
    /// `YYYY/MM`
    #[default]
    Month,
    /// `YYYY/MM/DD`
    Day,
}

impl DateGranularity {
    fn format_str(self) -> &'static str {
        match self {
            DateGranularity::Year => "%Y",
            DateGranularity::Month => "%Y/%m",
            DateGranularity::Day => "%Y/%m/%d",
        }
    }
}

/// A fully specified classification strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Extension,
    Mime,
    Date {
        field: DateField,
        granularity: DateGranularity,
    },
}

impl Strategy {
    /// Builds a strategy from the individual selectors the CLI and config expose.
    pub fn from_selectors(by: GroupBy, field: DateField, granularity: DateGranularity) -> Self {
        match by {
            GroupBy::Ext => Strategy::Extension,
            GroupBy::Mime => Strategy::Mime,
            GroupBy::Date => Strategy::Date { field, granularity },
        }
    }

    /// Whether scanning should sniff file contents to fill in MIME types.
    pub fn needs_content_sniffing(&self) -> bool {
        matches!(self, Strategy::Mime)
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::Extension => write!(f, "ext"),
            Strategy::Mime => write!(f, "mime"),
            Strategy::Date { field, granularity } => {
                let field = match field {
                    DateField::Mtime => "mtime",
                    DateField::Ctime => "ctime",
                };
                let granularity = match granularity {
                    DateGranularity::Year => "year",
                    DateGranularity::Month => "month",
                    DateGranularity::Day => "day",
                };
                write!(f, "date:{}:{}", field, granularity)
            }
        }
    }
}

/// Label naming the destination subfolder of a file.
///
/// Keys may contain `/` to express nested folders (date grouping).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupKey(String);

impl GroupKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Folder names making up this key, outermost first.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/').filter(|s| !s.is_empty())
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Computes the group key of `entry` under `strategy`.
pub fn classify(entry: &FileEntry, strategy: &Strategy) -> GroupKey {
    match strategy {
        Strategy::Extension => match entry.extension.as_deref() {
            Some(ext) if !ext.is_empty() => GroupKey::new(ext.to_lowercase()),
            _ => GroupKey::new(NO_EXTENSION_KEY),
        },
        Strategy::Mime => entry
            .mime
            .as_deref()
            .and_then(|mime| mime.split('/').next())
            .map(str::trim)
            .filter(|top| !top.is_empty())
            .map(|top| GroupKey::new(top.to_lowercase()))
            .unwrap_or_else(|| GroupKey::new(UNKNOWN_MIME_KEY)),
        Strategy::Date { field, granularity } => {
            let timestamp = match field {
                DateField::Mtime => entry.modified,
                DateField::Ctime => entry.created.unwrap_or(entry.modified),
            };
            GroupKey::new(date_key(timestamp, *granularity))
        }
    }
}

/// Renders a timestamp as a date group in local time.
pub fn date_key(timestamp: DateTime<Utc>, granularity: DateGranularity) -> String {
    timestamp
        .with_timezone(&Local)
        .format(granularity.format_str())
        .to_string()
}

/// Maps file extensions to MIME types.
///
/// Lookups are case-insensitive. The table can be extended with
/// [`MimeTable::add_mapping`].
#[derive(Debug, Clone)]
pub struct MimeTable {
    by_extension: HashMap<String, &'static str>,
}

impl MimeTable {
    /// Creates a table with the standard mappings.
    pub fn new() -> Self {
        let mut table = Self {
            by_extension: HashMap::new(),
        };
        table.populate_standard_mappings();
        table
    }

    fn populate_standard_mappings(&mut self) {
        const STANDARD: &[(&str, &str)] = &[
            // Images
            ("png", "image/png"),
            ("jpg", "image/jpeg"),
            ("jpeg", "image/jpeg"),
            ("gif", "image/gif"),
            ("webp", "image/webp"),
            ("svg", "image/svg+xml"),
            ("bmp", "image/bmp"),
            ("tif", "image/tiff"),
            ("tiff", "image/tiff"),
            ("ico", "image/vnd.microsoft.icon"),
            ("heic", "image/heic"),
            ("heif", "image/heif"),
            // Audio
            ("mp3", "audio/mpeg"),
            ("wav", "audio/wav"),
            ("ogg", "audio/ogg"),
            ("flac", "audio/flac"),
            ("aac", "audio/aac"),
            ("m4a", "audio/mp4"),
            ("wma", "audio/x-ms-wma"),
            // Video
            ("mp4", "video/mp4"),
            ("mkv", "video/x-matroska"),
            ("avi", "video/x-msvideo"),
            ("mov", "video/quicktime"),
            ("flv", "video/x-flv"),
            ("wmv", "video/x-ms-wmv"),
            ("webm", "video/webm"),
            ("3gp", "video/3gpp"),
            // Text
            ("txt", "text/plain"),
            ("md", "text/markdown"),
            ("html", "text/html"),
            ("htm", "text/html"),
            ("css", "text/css"),
            ("csv", "text/csv"),
            ("xml", "text/xml"),
            ("py", "text/x-python"),
            ("rs", "text/x-rust"),
            ("c", "text/x-c"),
            ("h", "text/x-c"),
            ("cpp", "text/x-c++src"),
            ("java", "text/x-java"),
            ("sh", "text/x-shellscript"),
            ("yaml", "text/x-yaml"),
            ("yml", "text/x-yaml"),
            ("toml", "text/x-toml"),
            // Application
            ("pdf", "application/pdf"),
            ("json", "application/json"),
            ("js", "application/javascript"),
            ("rtf", "application/rtf"),
            ("doc", "application/msword"),
            (
                "docx",
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
            ),
            ("odt", "application/vnd.oasis.opendocument.text"),
            ("xls", "application/vnd.ms-excel"),
            (
                "xlsx",
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
            ),
            ("ods", "application/vnd.oasis.opendocument.spreadsheet"),
            ("ppt", "application/vnd.ms-powerpoint"),
            (
                "pptx",
                "application/vnd.openxmlformats-officedocument.presentationml.presentation",
            ),
            ("odp", "application/vnd.oasis.opendocument.presentation"),
            ("zip", "application/zip"),
            ("rar", "application/vnd.rar"),
            ("7z", "application/x-7z-compressed"),
            ("tar", "application/x-tar"),
            ("gz", "application/gzip"),
            ("bz2", "application/x-bzip2"),
            ("xz", "application/x-xz"),
            // Fonts
            ("ttf", "font/ttf"),
            ("otf", "font/otf"),
            ("woff", "font/woff"),
            ("woff2", "font/woff2"),
        ];

        for (ext, mime) in STANDARD {
            self.add_mapping(ext, mime);
        }
    }

    /// Adds or replaces the MIME type for an extension.
    pub fn add_mapping(&mut self, ext: &str, mime: &'static str) {
        self.by_extension.insert(ext.to_lowercase(), mime);
    }

    /// Looks up the MIME type of an extension (without the dot).
    pub fn lookup(&self, ext: &str) -> Option<&'static str> {
        self.by_extension.get(&ext.to_lowercase()).copied()
    }
}

impl Default for MimeTable {
    fn default() -> Self {
        Self::new()
    }
}
