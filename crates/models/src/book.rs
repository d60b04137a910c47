use sea_orm::{
    entity::prelude::*, sea_query::OnConflict, ActiveValue::Set, DatabaseConnection, EntityTrait,
    PaginatorTrait,
};
use serde::{Deserialize, Serialize};

use crate::errors::ModelError;

/// Index row for one catalog record. `rating` is stored as an exact decimal.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "book")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: i64,
    pub title: String,
    pub rating: Decimal,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

pub fn validate_title(title: &str) -> Result<(), ModelError> {
    if title.chars().count() > 512 {
        return Err(ModelError::Validation("title longer than 512 characters".into()));
    }
    Ok(())
}

/// Insert the row or fully replace the one with the same id.
pub async fn upsert(db: &DatabaseConnection, id: i64, title: &str, rating: Decimal) -> Result<(), ModelError> {
    validate_title(title)?;
    let am = ActiveModel { id: Set(id), title: Set(title.to_string()), rating: Set(rating) };
    Entity::insert(am)
        .on_conflict(
            OnConflict::column(Column::Id)
                .update_columns([Column::Title, Column::Rating])
                .to_owned(),
        )
        .exec(db)
        .await?;
    Ok(())
}

pub async fn find(db: &DatabaseConnection, id: i64) -> Result<Option<Model>, ModelError> {
    Ok(Entity::find_by_id(id).one(db).await?)
}

pub async fn all(db: &DatabaseConnection) -> Result<Vec<Model>, ModelError> {
    Ok(Entity::find().all(db).await?)
}

/// Delete by id; returns the number of rows removed (0 when absent).
pub async fn delete(db: &DatabaseConnection, id: i64) -> Result<u64, ModelError> {
    let res = Entity::delete_by_id(id).exec(db).await?;
    Ok(res.rows_affected)
}

pub async fn count(db: &DatabaseConnection) -> Result<u64, ModelError> {
    Ok(Entity::find().count(db).await?)
}
