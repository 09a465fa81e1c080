pub mod get;
pub mod pkg;
pub mod tree;
pub mod update;
