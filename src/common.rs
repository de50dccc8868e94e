use serde::{Deserialize, Serialize};

/// 统一响应结构
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub code: i32,
    pub msg: String,
    pub resp_data: Option<T>,
}

/// 分页参数
#[derive(Debug, Clone, Deserialize)]
pub struct PageQuery {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

impl PageQuery {
    pub const MAX_PAGE_SIZE: u32 = 100;

    /// 返回 (页码, 每页数量)，页码从 1 开始
    pub fn normalized(&self) -> (u32, u32) {
        let page = self.page.unwrap_or(1).max(1);
        let size = self
            .page_size
            .unwrap_or(20)
            .clamp(1, Self::MAX_PAGE_SIZE);
        (page, size)
    }

    pub fn offset(&self) -> u64 {
        let (page, size) = self.normalized();
        (page as u64 - 1) * size as u64
    }
}

#[derive(Debug, Serialize)]
pub struct Paged<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: u32,
    pub page_size: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_query_clamps_values() {
        let q = PageQuery {
            page: Some(0),
            page_size: Some(1000),
        };
        assert_eq!(q.normalized(), (1, PageQuery::MAX_PAGE_SIZE));
        assert_eq!(q.offset(), 0);

        let q = PageQuery {
            page: Some(3),
            page_size: None,
        };
        assert_eq!(q.normalized(), (3, 20));
        assert_eq!(q.offset(), 40);
    }
}
