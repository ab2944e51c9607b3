//! Paged query types.

use clinic_core::config::PagingConfig;
use serde::Serialize;

/// A page request. Out-of-range values are clamped, never rejected:
/// `page_number` 0 becomes 1, `page_size` 0 becomes the configured default,
/// and anything above the configured maximum is capped there.
#[derive(Debug, Clone)]
pub struct PageRequest {
    pub page_number: u32,
    pub page_size: u32,
    /// Document field to order by; primary key when absent.
    pub order_by: Option<String>,
    pub ascending: bool,
}

impl PageRequest {
    pub fn new(page_number: u32, page_size: u32) -> Self {
        Self {
            page_number,
            page_size,
            order_by: None,
            ascending: true,
        }
    }

    pub fn order_by(mut self, field: impl Into<String>, ascending: bool) -> Self {
        self.order_by = Some(field.into());
        self.ascending = ascending;
        self
    }

    /// Effective (page_number, page_size) after clamping.
    pub fn clamped(&self, bounds: &PagingConfig) -> (u32, u32) {
        let page_number = self.page_number.max(1);
        let page_size = if self.page_size < 1 {
            bounds.default_page_size
        } else {
            self.page_size.min(bounds.max_page_size)
        };
        (page_number, page_size)
    }
}

/// One page of a scoped, filtered query.
#[derive(Debug, Clone, Serialize)]
pub struct PagedResult<T> {
    pub items: Vec<T>,
    pub total_count: u64,
    pub page_number: u32,
    pub page_size: u32,
}

impl<T> PagedResult<T> {
    pub fn empty(page_number: u32, page_size: u32) -> Self {
        Self {
            items: Vec::new(),
            total_count: 0,
            page_number,
            page_size,
        }
    }

    pub fn total_pages(&self) -> u64 {
        if self.total_count == 0 {
            0
        } else {
            (self.total_count + self.page_size as u64 - 1) / self.page_size as u64
        }
    }
}
