/// Page window for list queries. Built from optional client arguments and
/// clamped so one request cannot pull an unbounded result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimitOffset {
    pub limit: i64,
    pub offset: i64,
}

impl LimitOffset {
    pub const DEFAULT_LIMIT: i64 = 50;
    pub const MAX_LIMIT: i64 = 200;

    pub fn from_args(limit: Option<i64>, offset: Option<i64>) -> Self {
        Self {
            limit: limit.unwrap_or(Self::DEFAULT_LIMIT).clamp(1, Self::MAX_LIMIT),
            offset: offset.unwrap_or(0).max(0),
        }
    }
}

impl Default for LimitOffset {
    fn default() -> Self {
        Self::from_args(None, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamps_client_arguments() {
        assert_eq!(LimitOffset::from_args(Some(10_000), Some(-5)), LimitOffset { limit: 200, offset: 0 });
        assert_eq!(LimitOffset::from_args(Some(0), None).limit, 1);
        assert_eq!(LimitOffset::default(), LimitOffset { limit: 50, offset: 0 });
    }
}
