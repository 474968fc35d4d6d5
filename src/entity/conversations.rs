use sea_orm::entity::prelude::*;

#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "conversations")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: i64,
    #[sea_orm(column_type = "Text")]
    pub custom_directive: Option<String>,
    #[sea_orm(column_type = "Text")]
    pub active_prompt: Option<String>,
    #[sea_orm(column_type = "Text")]
    pub latest_response: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl ActiveModelBehavior for ActiveModel {}
