pub mod criteria;
pub mod example;
pub mod keywords;
mod mapper;
mod parse;

pub use criteria::{Criteria, Direction, Query};
pub use example::Example;
pub use mapper::{MappedQuery, QueryMapper};
pub use parse::parse_criteria_json;
