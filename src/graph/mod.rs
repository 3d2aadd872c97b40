pub mod color;
pub mod indexer;
pub mod links;
pub mod regroup;
pub mod sankey;
