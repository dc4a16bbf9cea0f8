use crate::module::ResourceModule;
use crate::validation::Validator;
use serde::Deserialize;

pub const WIDGETS: &str = "widgets";

#[derive(Debug, Deserialize)]
pub struct Widget {
    pub name: Option<String>,
    pub color: Option<String>,
}

pub struct WidgetModule;

impl ResourceModule for WidgetModule {
    type Doc = Widget;

    fn name(&self) -> &str {
        WIDGETS
    }

    fn save_validator(&self) -> Validator<Widget> {
        Validator::builder()
            .constraint("name", |w: &Widget| w.name.as_deref(), |c| c.not_null().not_blank())
            .constraint("color", |w: &Widget| w.color.as_deref(), |c| c.max_length(32))
            .build()
    }
}
