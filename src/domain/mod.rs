pub mod grouping;
pub mod validation;
