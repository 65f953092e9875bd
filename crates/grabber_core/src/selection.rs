use std::collections::HashSet;

pub const DEFAULT_MAX_SELECTION: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleOutcome {
    Added,
    Removed,
    /// Absent and the set is full; nothing changed.
    AtCapacity,
    /// Empty address; nothing changed.
    Ignored,
}

/// Ordered, duplicate-free list of candidate addresses with a size cap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionSet {
    urls: Vec<String>,
    cap: usize,
}

impl SelectionSet {
    /// A cap of zero means the default cap.
    pub fn new(cap: usize) -> Self {
        Self {
            urls: Vec::new(),
            cap: effective_cap(cap),
        }
    }

    pub fn from_urls<I, S>(urls: I, cap: usize) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let cap = effective_cap(cap);
        Self {
            urls: normalize_selection(urls, cap),
            cap,
        }
    }

    pub fn urls(&self) -> &[String] {
        &self.urls
    }

    pub fn into_urls(self) -> Vec<String> {
        self.urls
    }

    pub fn len(&self) -> usize {
        self.urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    pub fn contains(&self, url: &str) -> bool {
        self.urls.iter().any(|u| u == url)
    }

    pub fn toggle(&mut self, url: &str) -> ToggleOutcome {
        let url = url.trim();
        if url.is_empty() {
            return ToggleOutcome::Ignored;
        }
        if let Some(pos) = self.urls.iter().position(|u| u == url) {
            self.urls.remove(pos);
            return ToggleOutcome::Removed;
        }
        if self.urls.len() >= self.cap {
            return ToggleOutcome::AtCapacity;
        }
        self.urls.push(url.to_string());
        ToggleOutcome::Added
    }

    /// Appends `urls` after the current members, then re-normalizes.
    pub fn extend<I, S>(&mut self, urls: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let merged = self
            .urls
            .drain(..)
            .chain(urls.into_iter().map(Into::into))
            .collect::<Vec<_>>();
        self.urls = normalize_selection(merged, self.cap);
    }

    pub fn clear(&mut self) {
        self.urls.clear();
    }
}

/// Drops empty values, deduplicates keeping the first occurrence, truncates to `cap`.
pub fn normalize_selection<I, S>(urls: I, cap: usize) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for url in urls {
        if out.len() >= cap {
            break;
        }
        let url: String = url.into();
        let trimmed = url.trim();
        if trimmed.is_empty() || !seen.insert(trimmed.to_string()) {
            continue;
        }
        out.push(trimmed.to_string());
    }
    out
}

fn effective_cap(cap: usize) -> usize {
    if cap == 0 {
        DEFAULT_MAX_SELECTION
    } else {
        cap
    }
}
