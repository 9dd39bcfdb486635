//! Editable item collection

use std::collections::BTreeMap;

use super::{NefsDataSource, NefsItem, NefsItemState};
use crate::transform::NefsDataTransform;
use crate::{NefsError, NefsResult};

/// Items of an archive, ordered by id
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NefsItemList {
    items: BTreeMap<u32, NefsItem>,
}

impl NefsItemList {
    /// Empty list
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an item, replacing any item with the same id
    pub fn insert(&mut self, item: NefsItem) -> Option<NefsItem> {
        self.items.insert(item.id, item)
    }

    /// Item by id
    pub fn get(&self, id: u32) -> Option<&NefsItem> {
        self.items.get(&id)
    }

    /// Mutable item by id
    pub fn get_mut(&mut self, id: u32) -> Option<&mut NefsItem> {
        self.items.get_mut(&id)
    }

    /// Number of items, removed ones included
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the list is empty
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Items in id order
    pub fn iter(&self) -> impl Iterator<Item = &NefsItem> + '_ {
        self.items.values()
    }

    /// Id following the largest id in use
    pub fn next_id(&self) -> u32 {
        self.items.keys().next_back().map_or(0, |id| id + 1)
    }

    /// Root items in id order
    pub fn roots(&self) -> Vec<&NefsItem> {
        self.items.values().filter(|item| item.is_root()).collect()
    }

    /// Direct children of a directory, in id order
    pub fn children(&self, id: u32) -> Vec<&NefsItem> {
        self.items
            .values()
            .filter(|item| item.directory_id == id && item.id != id)
            .collect()
    }

    fn require_directory(&self, id: u32) -> NefsResult<()> {
        match self.items.get(&id) {
            Some(item) if item.is_directory() => Ok(()),
            Some(_) => Err(NefsError::ItemNotFound(format!("item {id} is not a directory"))),
            None => Err(NefsError::ItemNotFound(format!("directory {id}"))),
        }
    }

    /// Add a file under `parent` (or as a root item) and return its id
    ///
    /// The extracted size is taken from the source.
    pub fn add_file(
        &mut self,
        parent: Option<u32>,
        name: impl Into<String>,
        source: NefsDataSource,
        transform: NefsDataTransform,
    ) -> NefsResult<u32> {
        if let Some(parent) = parent {
            self.require_directory(parent)?;
        }
        let id = self.next_id();
        let extracted_size = source_len(id, &source)?;

        let mut item = NefsItem::file(
            id,
            parent.unwrap_or(id),
            name,
            extracted_size,
            source,
            transform,
        );
        item.state = NefsItemState::Added;
        self.items.insert(id, item);
        Ok(id)
    }

    /// Add a directory under `parent` (or as a root item) and return its id
    pub fn add_directory(&mut self, parent: Option<u32>, name: impl Into<String>) -> NefsResult<u32> {
        if let Some(parent) = parent {
            self.require_directory(parent)?;
        }
        let id = self.next_id();
        let mut item = NefsItem::directory(id, parent.unwrap_or(id), name);
        item.state = NefsItemState::Added;
        self.items.insert(id, item);
        Ok(id)
    }

    /// Give a file new data
    ///
    /// Items duplicating this one keep sharing its (new) data.
    pub fn replace(
        &mut self,
        id: u32,
        source: NefsDataSource,
        transform: Option<NefsDataTransform>,
    ) -> NefsResult<()> {
        let extracted_size = source_len(id, &source)?;
        let item = self
            .items
            .get_mut(&id)
            .ok_or_else(|| NefsError::ItemNotFound(format!("item {id}")))?;
        if item.is_directory() {
            return Err(NefsError::ItemNotFound(format!("item {id} is not a file")));
        }

        item.source = source;
        item.extracted_size = extracted_size;
        item.duplicate_of = None;
        if let Some(transform) = transform {
            item.transform = transform;
        }
        if item.state != NefsItemState::Added {
            item.state = NefsItemState::Replaced;
        }
        Ok(())
    }

    /// Mark an item, its subtree and every duplicate of them as removed
    ///
    /// Returns the number of items newly marked.
    pub fn remove(&mut self, id: u32) -> NefsResult<usize> {
        if !self.items.contains_key(&id) {
            return Err(NefsError::ItemNotFound(format!("item {id}")));
        }

        let mut pending = vec![id];
        let mut marked = 0;
        while let Some(current) = pending.pop() {
            let Some(item) = self.items.get_mut(&current) else {
                continue;
            };
            if item.state == NefsItemState::Removed {
                continue;
            }
            item.state = NefsItemState::Removed;
            marked += 1;

            pending.extend(
                self.items
                    .values()
                    .filter(|other| {
                        other.id != current
                            && (other.directory_id == current || other.duplicate_of == Some(current))
                    })
                    .map(|other| other.id),
            );
        }
        Ok(marked)
    }

    /// Slash-separated path of an item from its root
    pub fn path(&self, id: u32) -> NefsResult<String> {
        let mut parts = Vec::new();
        let mut current = id;
        loop {
            let item = self
                .items
                .get(&current)
                .ok_or_else(|| NefsError::ItemNotFound(format!("item {current}")))?;
            parts.push(item.name.as_str());
            if item.is_root() {
                break;
            }
            if parts.len() > self.items.len() {
                return Err(NefsError::InvalidHeader(format!(
                    "directory cycle through item {id}"
                )));
            }
            current = item.directory_id;
        }
        parts.reverse();
        Ok(parts.join("/"))
    }

    /// Item at a slash- or backslash-separated path
    pub fn find_by_path(&self, path: &str) -> Option<&NefsItem> {
        let mut parts = path.split(['/', '\\']).filter(|part| !part.is_empty());
        let first = parts.next()?;
        let mut current = self
            .roots()
            .into_iter()
            .find(|item| item.name == first && item.state != NefsItemState::Removed)?;

        for part in parts {
            current = self
                .children(current.id)
                .into_iter()
                .find(|item| item.name == part && item.state != NefsItemState::Removed)?;
        }
        Some(current)
    }
}

fn source_len(id: u32, source: &NefsDataSource) -> NefsResult<u64> {
    match source {
        NefsDataSource::Memory(bytes) => Ok(bytes.len() as u64),
        NefsDataSource::File(path) => std::fs::metadata(path)
            .map(|m| m.len())
            .map_err(|_| NefsError::SourceFileNotFound(path.clone())),
        NefsDataSource::Archive { .. } | NefsDataSource::None => {
            Err(NefsError::MissingDataSource(id))
        }
    }
}
