/// Users live outside this service; they are referenced by their integer id everywhere.
pub type UserId = i32;

pub struct Pagination {
    pub limit: i64,
    pub offset: i64,
}

impl Pagination {
    pub fn new(limit: i64, offset: Option<i64>) -> Self {
        Self {
            limit,
            offset: offset.unwrap_or(0),
        }
    }

    pub fn from_page(page: i64, size: i64) -> Self {
        let page = page.max(1);
        let size = size.clamp(1, 100);
        Self::new(size, Some((page - 1) * size))
    }
}
