pub mod alerts;
pub mod products;
pub mod stock;

use serde::{Deserialize, Serialize};

/// Pagination parameters for list operations
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct PaginationParams {
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_per_page", alias = "page_size")]
    pub per_page: u64,
}

fn default_page() -> u64 {
    1
}

fn default_per_page() -> u64 {
    20
}

impl Default for PaginationParams {
    fn default() -> Self {
        Self {
            page: default_page(),
            per_page: default_per_page(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pagination_defaults_and_alias() {
        let params: PaginationParams = serde_json::from_str("{}").unwrap();
        assert_eq!((params.page, params.per_page), (1, 20));

        let params: PaginationParams =
            serde_json::from_str(r#"{"page": 3, "page_size": 50}"#).unwrap();
        assert_eq!((params.page, params.per_page), (3, 50));
    }
}
