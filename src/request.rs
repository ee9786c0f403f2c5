use serde::Deserialize;

use crate::engine::models::common::Pagination as StorePagination;

#[derive(Debug, Deserialize)]
pub struct Pagination {
    #[serde(default = "first_page")]
    pub page: i64,
    #[serde(default = "page_size")]
    pub size: i64,
}

fn first_page() -> i64 {
    1
}

fn page_size() -> i64 {
    20
}

impl From<Pagination> for StorePagination {
    fn from(p: Pagination) -> Self {
        StorePagination::from_page(p.page, p.size)
    }
}
