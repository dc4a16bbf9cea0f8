use crate::module::ResourceModule;
use crate::validation::Validator;
use serde::Deserialize;

pub const PRODUCTS: &str = "products";

#[derive(Debug, Deserialize)]
pub struct Product {
    pub name: Option<String>,
    pub description: Option<String>,
    pub rank: Option<i64>,
    pub tags: Option<Vec<String>>,
}

/// Products are never deleted over HTTP.
pub struct ProductModule;

impl ResourceModule for ProductModule {
    type Doc = Product;

    fn name(&self) -> &str {
        PRODUCTS
    }

    fn save_validator(&self) -> Validator<Product> {
        Validator::builder()
            .constraint("name", |p: &Product| p.name.as_deref(), |c| c.not_null().not_blank().max_length(128))
            .constraint("description", |p: &Product| p.description.as_deref(), |c| c.max_length(1024))
            .constraint("rank", |p: &Product| p.rank.as_ref(), |c| c.greater_than_or_equal(0))
            .constraint("tags", |p: &Product| p.tags.as_deref(), |c| c.max_size(16))
            .build()
    }

    fn delete_enabled(&self) -> bool {
        false
    }
}
