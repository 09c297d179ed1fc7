pub mod filter;
pub mod metafix;
