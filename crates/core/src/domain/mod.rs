pub mod catalog;
pub mod order;
pub mod preference;
pub mod quote;
pub mod recommendation;
