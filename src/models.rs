use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq)]
pub struct BucketEntry {
    pub name: String,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ObjectEntry {
    pub key: String,
    pub size: u64,
    pub last_modified: Option<DateTime<Utc>>,
    pub etag: Option<String>,
    pub is_directory: bool,
}

impl ObjectEntry {
    /// Synthesize a directory entry from a common prefix.
    pub fn directory(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            size: 0,
            last_modified: None,
            etag: None,
            is_directory: true,
        }
    }

    pub fn file_name(&self) -> &str {
        file_name(&self.key)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortMode {
    #[default]
    Name,
    Size,
    Date,
}

impl SortMode {
    pub fn next(self) -> Self {
        match self {
            SortMode::Name => SortMode::Size,
            SortMode::Size => SortMode::Date,
            SortMode::Date => SortMode::Name,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            SortMode::Name => "name",
            SortMode::Size => "size",
            SortMode::Date => "date",
        }
    }
}

/// Directories always come first; within each group the active mode decides.
pub fn sort_objects(objects: &mut [ObjectEntry], sort: SortMode) {
    objects.sort_by(|a, b| {
        if a.is_directory != b.is_directory {
            return if a.is_directory {
                Ordering::Less
            } else {
                Ordering::Greater
            };
        }
        match sort {
            SortMode::Name => a.file_name().cmp(b.file_name()),
            SortMode::Size => b.size.cmp(&a.size),
            SortMode::Date => b.last_modified.cmp(&a.last_modified),
        }
    });
}

pub fn sort_buckets(buckets: &mut [BucketEntry], sort: SortMode) {
    match sort {
        SortMode::Name => buckets.sort_by(|a, b| a.name.cmp(&b.name)),
        // Buckets carry no size; keep the fetched order.
        SortMode::Size => {}
        SortMode::Date => buckets.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
    }
}

/// Display name of a key: the segment after the last `/`, with a
/// directory's trailing `/` stripped first.
pub fn file_name(key: &str) -> &str {
    let trimmed = key.strip_suffix('/').unwrap_or(key);
    trimmed.rsplit('/').next().unwrap_or(trimmed)
}

/// Parent of a virtual directory prefix, keeping the trailing `/`.
/// Top-level prefixes map to the empty (root) prefix.
pub fn parent_prefix(prefix: &str) -> String {
    if prefix.is_empty() || prefix == "/" {
        return String::new();
    }
    let clean = prefix.strip_suffix('/').unwrap_or(prefix);
    match clean.rfind('/') {
        Some(idx) => clean[..=idx].to_string(),
        None => String::new(),
    }
}

/// Key of the zero-byte marker object that stands in for a folder.
pub fn folder_key(prefix: &str, name: &str) -> String {
    let name = name.trim();
    if name.ends_with('/') {
        format!("{prefix}{name}")
    } else {
        format!("{prefix}{name}/")
    }
}

pub fn format_size(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;
    const GB: f64 = MB * 1024.0;
    const TB: f64 = GB * 1024.0;
    let value = bytes as f64;
    if value >= TB {
        format!("{:.2} TB", value / TB)
    } else if value >= GB {
        format!("{:.2} GB", value / GB)
    } else if value >= MB {
        format!("{:.2} MB", value / MB)
    } else if value >= KB {
        format!("{:.2} KB", value / KB)
    } else {
        format!("{bytes} B")
    }
}

pub fn format_relative(ts: Option<DateTime<Utc>>) -> String {
    let Some(ts) = ts else {
        return "--".to_string();
    };
    let elapsed = Utc::now().signed_duration_since(ts);
    let mins = elapsed.num_minutes();
    let hours = elapsed.num_hours();
    let days = elapsed.num_days();
    if mins < 1 {
        "just now".to_string()
    } else if mins < 60 {
        format!("{mins}m ago")
    } else if hours < 24 {
        format!("{hours}h ago")
    } else if days < 7 {
        format!("{days}d ago")
    } else if days < 30 {
        format!("{}w ago", days / 7)
    } else {
        ts.format("%Y-%m-%d").to_string()
    }
}
