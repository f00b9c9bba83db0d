use serde::Deserialize;

pub mod friend;
pub mod group;
pub mod message;
pub mod notification;
pub mod user;

const DEFAULT_LIMIT: i64 = 100;
const MAX_LIMIT: i64 = 100;

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub skip: Option<i64>,
    pub limit: Option<i64>,
}

/// 分页参数归一化：skip 不小于 0，limit 限制在 1..=100
pub(crate) fn page(skip: Option<i64>, limit: Option<i64>) -> (i64, i64) {
    let skip = skip.unwrap_or(0).max(0);
    let limit = limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    (skip, limit)
}

#[cfg(test)]
mod tests {
    use super::page;

    #[test]
    fn page_defaults_and_clamps() {
        assert_eq!(page(None, None), (0, 100));
        assert_eq!(page(Some(-3), Some(0)), (0, 1));
        assert_eq!(page(Some(20), Some(500)), (20, 100));
        assert_eq!(page(Some(5), Some(10)), (5, 10));
    }
}
