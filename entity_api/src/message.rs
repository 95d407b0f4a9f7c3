use super::error::Error;
use crate::page_offset;
use chrono::{DateTime, Utc};
use entity::archived_messages;
use entity::messages::{ActiveModel, Column, Entity, Model};
use entity::Id;
use log::*;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};

/// Inserts a new unread message and returns the stored row.
pub async fn create(
    db: &impl ConnectionTrait,
    chat_id: Id,
    sender_id: Id,
    content: String,
) -> Result<Model, Error> {
    let now = Utc::now();

    let active_model = ActiveModel {
        chat_id: Set(chat_id),
        sender_id: Set(sender_id),
        content: Set(content),
        is_read: Set(false),
        read_at: Set(None),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
        ..Default::default()
    };

    let model = active_model.insert(db).await?;
    debug!("Inserted message {} into chat {chat_id}", model.id);

    Ok(model)
}

/// One page of a chat's messages, newest first. `page` is 1-based.
pub async fn find_recent_by_chat(
    db: &impl ConnectionTrait,
    chat_id: Id,
    page: u64,
    limit: u64,
) -> Result<Vec<Model>, Error> {
    Ok(Entity::find()
        .filter(Column::ChatId.eq(chat_id))
        .order_by_desc(Column::CreatedAt)
        .order_by_desc(Column::Id)
        .offset(page_offset(page, limit))
        .limit(limit)
        .all(db)
        .await?)
}

pub async fn count_by_chat(db: &impl ConnectionTrait, chat_id: Id) -> Result<u64, Error> {
    Ok(Entity::find()
        .filter(Column::ChatId.eq(chat_id))
        .count(db)
        .await?)
}

pub async fn find_latest_by_chat(
    db: &impl ConnectionTrait,
    chat_id: Id,
) -> Result<Option<Model>, Error> {
    Ok(Entity::find()
        .filter(Column::ChatId.eq(chat_id))
        .order_by_desc(Column::CreatedAt)
        .order_by_desc(Column::Id)
        .one(db)
        .await?)
}

/// Marks every unread message in the chat that `reader_id` did not send as read.
/// Returns the number of rows changed.
pub async fn mark_read(db: &impl ConnectionTrait, chat_id: Id, reader_id: Id) -> Result<u64, Error> {
    let now = Utc::now();

    let result = Entity::update_many()
        .col_expr(Column::IsRead, Expr::value(true))
        .col_expr(Column::ReadAt, Expr::value(now))
        .col_expr(Column::UpdatedAt, Expr::value(now))
        .filter(
            Condition::all()
                .add(Column::ChatId.eq(chat_id))
                .add(Column::SenderId.ne(reader_id))
                .add(Column::IsRead.eq(false)),
        )
        .exec(db)
        .await?;

    Ok(result.rows_affected)
}

/// Chats that hold at least one message created before `cutoff`.
pub async fn find_chat_ids_with_messages_before(
    db: &impl ConnectionTrait,
    cutoff: DateTime<Utc>,
) -> Result<Vec<Id>, Error> {
    Ok(Entity::find()
        .select_only()
        .column(Column::ChatId)
        .distinct()
        .filter(Column::CreatedAt.lt(cutoff))
        .into_tuple::<Id>()
        .all(db)
        .await?)
}

/// Moves the chat's messages created before `cutoff` into `archived_messages`.
///
/// The newest `keep_latest` messages of the chat are never moved, however old
/// they are. Copy and delete happen in one transaction. Returns the number of
/// messages archived.
pub async fn archive_older_than(
    db: &impl TransactionTrait,
    chat_id: Id,
    cutoff: DateTime<Utc>,
    keep_latest: u64,
) -> Result<u64, Error> {
    let txn = db.begin().await?;

    let mut condition = Condition::all()
        .add(Column::ChatId.eq(chat_id))
        .add(Column::CreatedAt.lt(cutoff));

    if keep_latest > 0 {
        // Oldest message inside the protected window; anything below it is eligible.
        let floor = Entity::find()
            .filter(Column::ChatId.eq(chat_id))
            .order_by_desc(Column::Id)
            .offset(keep_latest - 1)
            .one(&txn)
            .await?;

        match floor {
            Some(floor) => condition = condition.add(Column::Id.lt(floor.id)),
            None => {
                txn.rollback().await?;
                return Ok(0);
            }
        }
    }

    let stale = Entity::find()
        .filter(condition)
        .order_by_asc(Column::Id)
        .all(&txn)
        .await?;

    if stale.is_empty() {
        txn.rollback().await?;
        return Ok(0);
    }

    let archived_at = Utc::now();
    let ids: Vec<Id> = stale.iter().map(|m| m.id).collect();
    let archived = stale.into_iter().map(|m| archived_messages::ActiveModel {
        id: Set(m.id),
        chat_id: Set(m.chat_id),
        sender_id: Set(m.sender_id),
        content: Set(m.content),
        is_read: Set(m.is_read),
        read_at: Set(m.read_at),
        created_at: Set(m.created_at),
        archived_at: Set(archived_at.into()),
    });

    archived_messages::Entity::insert_many(archived)
        .exec_without_returning(&txn)
        .await?;

    let deleted = Entity::delete_many()
        .filter(Column::Id.is_in(ids))
        .exec(&txn)
        .await?;

    txn.commit().await?;

    Ok(deleted.rows_affected)
}

#[cfg(test)]
// We need to gate seaORM's mock feature behind conditional compilation because
// the feature removes the Clone trait implementation from seaORM's DatabaseConnection.
// see https://github.com/SeaQL/sea-orm/issues/830
#[cfg(feature = "mock")]
mod tests {
    use super::*;
    use chrono::Duration;
    use sea_orm::{DatabaseBackend, DatabaseConnection, MockDatabase, MockExecResult, Value};
    use std::collections::BTreeMap;

    fn message(id: Id, chat_id: Id, sender_id: Id, age: Duration) -> Model {
        let created_at = Utc::now() - age;
        Model {
            id,
            chat_id,
            sender_id,
            content: format!("message {id}"),
            is_read: false,
            read_at: None,
            created_at: created_at.into(),
            updated_at: created_at.into(),
        }
    }

    fn exec(rows_affected: u64) -> MockExecResult {
        MockExecResult {
            last_insert_id: 0,
            rows_affected,
        }
    }

    #[tokio::test]
    async fn create_returns_the_stored_message() -> Result<(), Error> {
        let stored = message(1, 42, 7, Duration::zero());
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results(vec![vec![stored.clone()]])
            .into_connection();

        let created = create(&db, 42, 7, "message 1".to_string()).await?;

        assert_eq!(created, stored);
        assert!(!created.is_read);

        Ok(())
    }

    /// Every logged statement, with the quote escaping of `Debug` undone.
    fn logged_sql(db: DatabaseConnection) -> String {
        format!("{:?}", db.into_transaction_log()).replace("\\\"", "\"")
    }

    #[tokio::test]
    async fn find_recent_by_chat_returns_rows_in_query_order() -> Result<(), Error> {
        let newest = message(3, 42, 7, Duration::minutes(1));
        let older = message(2, 42, 8, Duration::minutes(5));
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results(vec![vec![newest.clone(), older.clone()]])
            .into_connection();

        let page = find_recent_by_chat(&db, 42, 2, 2).await?;
        assert_eq!(page, vec![newest, older]);

        let sql = logged_sql(db);
        assert!(sql.contains(r#"FROM "heydays"."messages""#));
        assert!(sql.contains(r#"ORDER BY "messages"."created_at" DESC, "messages"."id" DESC"#));

        Ok(())
    }

    #[tokio::test]
    async fn count_by_chat_reads_the_aggregate() -> Result<(), Error> {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results(vec![vec![BTreeMap::from([(
                "num_items".to_string(),
                Value::BigInt(Some(5)),
            )])]])
            .into_connection();

        assert_eq!(count_by_chat(&db, 42).await?, 5);

        Ok(())
    }

    #[tokio::test]
    async fn find_latest_by_chat_is_none_for_an_empty_chat() -> Result<(), Error> {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results(vec![Vec::<Model>::new()])
            .into_connection();

        assert_eq!(find_latest_by_chat(&db, 42).await?, None);

        Ok(())
    }

    #[tokio::test]
    async fn mark_read_reports_rows_changed() -> Result<(), Error> {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results(vec![exec(3)])
            .into_connection();

        assert_eq!(mark_read(&db, 42, 7).await?, 3);

        let sql = logged_sql(db);
        assert!(sql.contains(r#"UPDATE "heydays"."messages""#));
        assert!(sql.contains(r#""messages"."sender_id" <> $"#));

        Ok(())
    }

    #[tokio::test]
    async fn archive_moves_stale_rows_below_the_protected_window() -> Result<(), Error> {
        let floor = message(10, 42, 7, Duration::days(4));
        let stale = vec![
            message(3, 42, 7, Duration::days(9)),
            message(5, 42, 8, Duration::days(8)),
        ];
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results(vec![vec![floor]])
            .append_query_results(vec![stale])
            .append_exec_results(vec![exec(2), exec(2)])
            .into_connection();

        let archived = archive_older_than(&db, 42, Utc::now() - Duration::days(3), 5).await?;
        assert_eq!(archived, 2);

        let log = logged_sql(db);
        assert!(log.contains(r#"INSERT INTO "heydays"."archived_messages""#));
        assert!(log.contains(r#"DELETE FROM "heydays"."messages""#));

        Ok(())
    }

    #[tokio::test]
    async fn archive_keeps_everything_when_the_chat_fits_the_window() -> Result<(), Error> {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results(vec![Vec::<Model>::new()])
            .into_connection();

        let archived = archive_older_than(&db, 42, Utc::now(), 100).await?;
        assert_eq!(archived, 0);

        let log = logged_sql(db);
        assert!(!log.contains("DELETE"));

        Ok(())
    }

    #[tokio::test]
    async fn archive_skips_writes_when_nothing_is_stale() -> Result<(), Error> {
        let floor = message(10, 42, 7, Duration::days(1));
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results(vec![vec![floor]])
            .append_query_results(vec![Vec::<Model>::new()])
            .into_connection();

        let archived = archive_older_than(&db, 42, Utc::now() - Duration::days(3), 1).await?;
        assert_eq!(archived, 0);

        Ok(())
    }
}
