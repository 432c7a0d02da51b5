//! In-memory source and lookup used by pipeline tests.

use std::cell::RefCell;
use std::collections::HashMap;

use crate::sources::{CandidateSource, DimensionLookup, RawCandidate};

/// Scripted media service that records every call it receives.
#[derive(Default)]
pub struct FakeSource {
    media_lists: HashMap<String, Result<Vec<RawCandidate>, String>>,
    summaries: HashMap<String, Result<Option<RawCandidate>, String>>,
    media_list_calls: RefCell<Vec<String>>,
    summary_calls: RefCell<Vec<String>>,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_media_list(mut self, title: &str, candidates: Vec<RawCandidate>) -> Self {
        self.media_lists.insert(title.to_string(), Ok(candidates));
        self
    }

    pub fn with_media_list_error(mut self, title: &str, error: &str) -> Self {
        self.media_lists
            .insert(title.to_string(), Err(error.to_string()));
        self
    }

    pub fn with_summary(mut self, title: &str, candidate: RawCandidate) -> Self {
        self.summaries.insert(title.to_string(), Ok(Some(candidate)));
        self
    }

    pub fn with_summary_error(mut self, title: &str, error: &str) -> Self {
        self.summaries.insert(title.to_string(), Err(error.to_string()));
        self
    }

    pub fn media_list_calls(&self) -> Vec<String> {
        self.media_list_calls.borrow().clone()
    }

    pub fn summary_calls(&self) -> Vec<String> {
        self.summary_calls.borrow().clone()
    }

    pub fn total_calls(&self) -> usize {
        self.media_list_calls.borrow().len() + self.summary_calls.borrow().len()
    }
}

impl CandidateSource for FakeSource {
    fn fetch_media_list(&self, title: &str) -> Result<Vec<RawCandidate>, String> {
        self.media_list_calls.borrow_mut().push(title.to_string());
        self.media_lists
            .get(title)
            .cloned()
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    fn fetch_summary_image(&self, title: &str) -> Result<Option<RawCandidate>, String> {
        self.summary_calls.borrow_mut().push(title.to_string());
        self.summaries.get(title).cloned().unwrap_or(Ok(None))
    }
}

/// Scripted imageinfo lookup keyed by file name.
#[derive(Default)]
pub struct FakeLookup {
    sizes: HashMap<String, Result<(u32, u32), String>>,
    calls: RefCell<Vec<String>>,
}

impl FakeLookup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_size(mut self, file_name: &str, width: u32, height: u32) -> Self {
        self.sizes.insert(file_name.to_string(), Ok((width, height)));
        self
    }

    pub fn with_error(mut self, file_name: &str, error: &str) -> Self {
        self.sizes
            .insert(file_name.to_string(), Err(error.to_string()));
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }
}

impl DimensionLookup for FakeLookup {
    fn lookup_dimensions(&self, file_name: &str) -> Result<(u32, u32), String> {
        self.calls.borrow_mut().push(file_name.to_string());
        self.sizes
            .get(file_name)
            .cloned()
            .unwrap_or_else(|| Err(format!("not_found:no imageinfo for '{file_name}'")))
    }
}
