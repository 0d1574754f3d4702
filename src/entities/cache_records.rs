use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "cache_records")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub full_image_url: String,
    pub title: Option<String>,
    pub publisher_username: Option<String>,
    pub publisher_first_name: Option<String>,
    pub publisher_last_name: Option<String>,
    pub publisher_portfolio_url: Option<String>,
    pub downloaded: bool,
    /// NULL until the record is first selected
    pub last_seen_at: Option<ChronoDateTimeUtc>,
    pub created_at: ChronoDateTimeUtc,
    pub updated_at: ChronoDateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
