pub mod meta;
pub mod tree;
