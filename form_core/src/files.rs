use crate::value::{FileItem, FileRef, Upload};
use std::collections::HashSet;

/// Reconciled state of one multi-image field.
///
/// `existing` never contains a ref whose url is in `removed`, and never the
/// same url twice.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileFieldState {
    pub existing: Vec<FileRef>,
    pub new_files: Vec<Upload>,
    pub removed: Vec<String>,
}

impl FileFieldState {
    /// Split a mixed field value into its three collections, dropping
    /// removed refs from the existing set
    pub fn from_items(items: &[FileItem], removed: &[String]) -> Self {
        let removed_set: HashSet<&str> = removed.iter().map(String::as_str).collect();
        let mut seen = HashSet::new();
        let mut existing = Vec::new();
        let mut new_files = Vec::new();

        for item in items {
            match item {
                FileItem::Existing(file_ref) => {
                    if !removed_set.contains(file_ref.url.as_str())
                        && seen.insert(file_ref.url.clone())
                    {
                        existing.push(file_ref.clone());
                    }
                }
                FileItem::New(upload) => new_files.push(upload.clone()),
            }
        }

        FileFieldState {
            existing,
            new_files,
            removed: removed.to_vec(),
        }
    }

    /// Images the field would hold after saving: existing − removed + new
    pub fn total(&self) -> usize {
        self.existing.len() + self.new_files.len()
    }

    pub fn has_changes(&self) -> bool {
        !self.new_files.is_empty() || !self.removed.is_empty()
    }

    pub fn into_diff(self) -> FileDiff {
        FileDiff {
            existing_images: self.existing,
            new_files: self.new_files,
            removed_images: self.removed,
        }
    }
}

/// Upload shape of one file field
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileDiff {
    /// Stored refs that survive the edit
    pub existing_images: Vec<FileRef>,
    /// Binaries to upload
    pub new_files: Vec<Upload>,
    /// Urls the user removed, verbatim
    pub removed_images: Vec<String>,
}

/// Drop `removed` urls from a field value, returning the urls that were
/// actually present. Used when the user deletes thumbnails one by one.
pub fn remove_refs(items: &mut Vec<FileItem>, removed: &[String]) -> Vec<String> {
    let mut dropped = Vec::new();
    items.retain(|item| match item {
        FileItem::Existing(file_ref) if removed.contains(&file_ref.url) => {
            dropped.push(file_ref.url.clone());
            false
        }
        _ => true,
    });
    dropped
}
