use serde::Deserialize;
use utoipa::IntoParams;

/// Page-number pagination shared by the list endpoints.
#[derive(Debug, Deserialize, IntoParams)]
pub struct PaginationParams {
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_per_page")]
    pub per_page: u64,
}

fn default_page() -> u64 {
    1
}

fn default_per_page() -> u64 {
    20
}

impl PaginationParams {
    pub fn clamped(&self) -> (u64, u64) {
        (self.page.max(1), self.per_page.clamp(1, 100))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pagination_clamps_extremes() {
        let params = PaginationParams {
            page: 0,
            per_page: 5000,
        };
        assert_eq!(params.clamped(), (1, 100));
    }

    #[test]
    fn pagination_defaults_apply() {
        let params: PaginationParams = serde_json::from_str("{}").unwrap();
        assert_eq!(params.clamped(), (1, 20));
    }
}
