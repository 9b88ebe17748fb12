use serde::Deserialize;
use utoipa::ToSchema;

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct Pagination {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

impl Pagination {
    pub fn normalize(&self) -> (i64, i64, i64) {
        let page = self.page.unwrap_or(1).max(1);
        let per_page = self.per_page.unwrap_or(20).clamp(1, 100);
        let offset = (page - 1) * per_page;
        (page, per_page, offset)
    }
}

#[derive(Debug, Clone, Copy, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ProductSortBy {
    CreatedAt,
    Price,
    Name,
}

impl ProductSortBy {
    pub fn as_sql(&self) -> &'static str {
        match self {
            ProductSortBy::CreatedAt => "created_at",
            ProductSortBy::Price => "price",
            ProductSortBy::Name => "name",
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ProductQuery {
    #[serde(flatten)]
    pub pagination: Pagination,
    pub q: Option<String>,
    pub category: Option<uuid::Uuid>,
    pub min_price: Option<i64>,
    pub max_price: Option<i64>,
    pub in_stock: Option<bool>,
    pub featured: Option<bool>,
    pub sort_by: Option<ProductSortBy>,
    pub sort_order: Option<SortOrder>,
}

impl ProductQuery {
    /// Stable string used as the cache-key suffix for a filtered listing.
    pub fn fingerprint(&self) -> String {
        let (page, per_page, _) = self.pagination.normalize();
        format!(
            "page_{}:per_{}:q_{}:cat_{}:min_{}:max_{}:stock_{}:feat_{}:sort_{}_{}",
            page,
            per_page,
            self.q.as_deref().unwrap_or(""),
            self.category.map(|c| c.to_string()).unwrap_or_default(),
            self.min_price.unwrap_or(-1),
            self.max_price.unwrap_or(-1),
            self.in_stock.map(|v| v.to_string()).unwrap_or_default(),
            self.featured.map(|v| v.to_string()).unwrap_or_default(),
            self.sort_by.unwrap_or(ProductSortBy::CreatedAt).as_sql(),
            self.sort_order.unwrap_or(SortOrder::Desc).as_sql(),
        )
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct OrderListQuery {
    #[serde(flatten)]
    pub pagination: Pagination,
    pub status: Option<String>,
    pub sort_order: Option<SortOrder>,
}

impl OrderListQuery {
    /// Stable string used as the cache-key suffix. Every field that changes
    /// the result set must appear here.
    pub fn fingerprint(&self) -> String {
        let (page, per_page, _) = self.pagination.normalize();
        format!(
            "page_{}:per_{}:status_{}:sort_{}",
            page,
            per_page,
            self.status.as_deref().filter(|s| !s.is_empty()).unwrap_or("all"),
            self.sort_order.unwrap_or(SortOrder::Desc).as_sql(),
        )
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AdminOrderListQuery {
    #[serde(flatten)]
    pub pagination: Pagination,
    pub status: Option<String>,
    pub payment_status: Option<String>,
    pub user_email: Option<String>,
    pub sort_order: Option<SortOrder>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LowStockQuery {
    #[serde(flatten)]
    pub pagination: Pagination,
    pub threshold: Option<i32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pagination_clamps_bounds() {
        let p = Pagination {
            page: Some(0),
            per_page: Some(1000),
        };
        assert_eq!(p.normalize(), (1, 100, 0));

        let p = Pagination {
            page: Some(3),
            per_page: None,
        };
        assert_eq!(p.normalize(), (3, 20, 40));
    }

    #[test]
    fn order_fingerprint_distinguishes_page_size_and_sort() {
        let base = OrderListQuery {
            pagination: Pagination {
                page: Some(1),
                per_page: Some(20),
            },
            status: Some("pending".into()),
            sort_order: Some(SortOrder::Desc),
        };
        let wider = OrderListQuery {
            pagination: Pagination {
                page: Some(1),
                per_page: Some(50),
            },
            status: Some("pending".into()),
            sort_order: Some(SortOrder::Desc),
        };
        let ascending = OrderListQuery {
            pagination: Pagination {
                page: Some(1),
                per_page: Some(20),
            },
            status: Some("pending".into()),
            sort_order: Some(SortOrder::Asc),
        };

        assert_eq!(base.fingerprint(), base.fingerprint());
        assert_ne!(base.fingerprint(), wider.fingerprint());
        assert_ne!(base.fingerprint(), ascending.fingerprint());
    }

    #[test]
    fn fingerprint_is_stable_for_equal_queries() {
        let q = ProductQuery {
            pagination: Pagination {
                page: Some(2),
                per_page: Some(10),
            },
            q: Some("mouse".into()),
            category: None,
            min_price: Some(100),
            max_price: None,
            in_stock: Some(true),
            featured: None,
            sort_by: Some(ProductSortBy::Price),
            sort_order: Some(SortOrder::Asc),
        };
        assert_eq!(q.fingerprint(), q.fingerprint());
        assert!(q.fingerprint().contains("page_2"));
        assert!(q.fingerprint().contains("q_mouse"));
        assert!(q.fingerprint().contains("sort_price_ASC"));
    }
}
