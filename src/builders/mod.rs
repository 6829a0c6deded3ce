mod select;

pub use select::SelectQuery;
