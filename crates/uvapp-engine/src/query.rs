//! Query pagination.
//!
//! Results are always newest first. `n` is the page size (20 when not
//! positive). `p` is 1-based; when `p > 0` the matching documents are
//! counted and a page envelope is returned, otherwise the first `n` results
//! come back without one.

use serde::Serialize;

pub const DEFAULT_PAGE_SIZE: i64 = 20;

/// Title match and paging of a query.
#[derive(Debug, Clone, Default)]
pub struct Search {
    /// Case-sensitive, unanchored regular expression on `title`.
    pub q: String,
    pub n: i64,
    pub p: i64,
}

/// Normalised paging parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Paging {
    pub n: i64,
    pub p: i64,
}

impl Paging {
    pub fn new(n: i64, p: i64) -> Self {
        let n = if n < 1 { DEFAULT_PAGE_SIZE } else { n };
        Self { n, p }
    }

    pub fn wants_page(&self) -> bool {
        self.p > 0
    }

    pub fn skip(&self) -> u64 {
        if self.wants_page() {
            (self.n as u64).saturating_mul(self.p as u64 - 1)
        } else {
            0
        }
    }

    pub fn limit(&self) -> u64 {
        self.n as u64
    }

    /// Envelope for `total_count` matches.
    pub fn page(&self, total_count: u64) -> Page {
        let n = self.n as u64;
        Page {
            p: self.p,
            n: self.n,
            total_count,
            count: total_count.div_ceil(n),
        }
    }
}

/// Page envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    pub p: i64,
    pub n: i64,
    pub total_count: u64,
    /// Number of pages.
    pub count: u64,
}

/// Query result: items plus the envelope when one was requested.
#[derive(Debug, Clone, Serialize)]
pub struct QueryPage<V> {
    pub items: Vec<V>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<Page>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_size_defaults_when_not_positive() {
        assert_eq!(Paging::new(0, 1).n, 20);
        assert_eq!(Paging::new(-3, 1).n, 20);
        assert_eq!(Paging::new(5, 1).n, 5);
    }

    #[test]
    fn second_page_of_forty_five() {
        let paging = Paging::new(20, 2);
        assert_eq!(paging.skip(), 20);
        assert_eq!(paging.limit(), 20);
        assert_eq!(
            paging.page(45),
            Page {
                p: 2,
                n: 20,
                total_count: 45,
                count: 3
            }
        );
    }

    #[test]
    fn no_page_means_first_results() {
        let paging = Paging::new(10, 0);
        assert!(!paging.wants_page());
        assert_eq!(paging.skip(), 0);
        assert!(!Paging::new(10, -4).wants_page());
    }

    #[test]
    fn page_counts_round_up() {
        let paging = Paging::new(20, 1);
        assert_eq!(paging.page(0).count, 0);
        assert_eq!(paging.page(20).count, 1);
        assert_eq!(paging.page(21).count, 2);
    }

    #[test]
    fn envelope_wire_names() {
        let json = serde_json::to_value(Paging::new(20, 2).page(45)).unwrap();
        assert_eq!(json, serde_json::json!({"p": 2, "n": 20, "totalCount": 45, "count": 3}));
    }
}
