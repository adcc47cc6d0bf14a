//! Query evaluation, ranking and result shaping.

pub mod evaluator;
pub mod params;
pub mod result;
pub mod sort;


pub use evaluator::execute;
pub use params::{RawSortField, SearchParams};
pub use result::{FacetCount, FacetValueCount, GroupedHit, Hit, SearchResponse};
pub use sort::{SortDirection, SortKey, TEXT_MATCH_FIELD};
