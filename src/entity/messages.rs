use sea_orm::entity::prelude::*;

#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "messages")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub conversation_id: i64,
    #[sea_orm(unique)]
    pub status_id: String,
    pub author: String,
    #[sea_orm(column_type = "Text")]
    pub content: String,
    pub url: Option<String>,
    pub is_self_authored: bool,
    /// Creation time of the post on the remote server.
    #[sea_orm(column_name = "created_at")]
    pub observed_at: Option<String>,
}

impl ActiveModelBehavior for ActiveModel {}
