pub mod cache;
pub mod catalog;
pub mod index;
pub mod layout;
pub mod metadata;
pub mod models;
pub mod query;

pub use catalog::{Catalog, CatalogError, CatalogOptions, CatalogStats};
pub use index::{IndexError, IndexSet, RebuildStats};
pub use metadata::{MetadataError, MetadataStore};
pub use query::{AssetQuery, PageLimits, QueryResult, SortKey};
