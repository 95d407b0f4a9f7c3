use super::error::Error;
use entity::chat_users::{Column, Entity, Model};
use entity::Id;
use sea_orm::{ColumnTrait, Condition, ConnectionTrait, EntityTrait, QueryFilter};

pub async fn find_membership(
    db: &impl ConnectionTrait,
    chat_id: Id,
    user_id: Id,
) -> Result<Option<Model>, Error> {
    Ok(Entity::find()
        .filter(
            Condition::all()
                .add(Column::ChatId.eq(chat_id))
                .add(Column::UserId.eq(user_id)),
        )
        .one(db)
        .await?)
}

pub async fn is_member(db: &impl ConnectionTrait, chat_id: Id, user_id: Id) -> Result<bool, Error> {
    Ok(find_membership(db, chat_id, user_id).await?.is_some())
}
