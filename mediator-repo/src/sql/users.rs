use async_trait::async_trait;
use sqlx::QueryBuilder;

use mediator_types::{RepoError, User, UserId, UserQuery, UserRepository};

use super::types::{DbUser, USER_COLUMNS};
use super::{Db, SqlRepo, db_err, require_row, write_err};

#[async_trait]
impl UserRepository for SqlRepo {
    async fn insert_user(&self, user: &User) -> Result<(), RepoError> {
        sqlx::query(
            "INSERT INTO users (id, username, email, role, is_active, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(user.id.into_uuid())
        .bind(&user.username)
        .bind(&user.email)
        .bind(user.role.as_str())
        .bind(user.is_active)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| write_err(e, "A user with this username or email already exists"))?;
        Ok(())
    }

    async fn get_user(&self, id: UserId) -> Result<Option<User>, RepoError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        sqlx::query_as::<_, DbUser>(&sql)
            .bind(id.into_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
            .map(DbUser::into_domain)
            .transpose()
    }

    async fn list_users(&self, query: &UserQuery) -> Result<Vec<User>, RepoError> {
        let mut qb = QueryBuilder::<Db>::new(format!("SELECT {USER_COLUMNS} FROM users WHERE 1=1"));
        if let Some(role) = query.role {
            qb.push(" AND role = ").push_bind(role.as_str());
        }
        if let Some(active) = query.is_active {
            qb.push(" AND is_active = ").push_bind(active);
        }
        qb.push(" ORDER BY created_at DESC");

        qb.build_query_as::<DbUser>()
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?
            .into_iter()
            .map(DbUser::into_domain)
            .collect()
    }

    async fn update_user(&self, user: &User) -> Result<(), RepoError> {
        let result = sqlx::query(
            "UPDATE users SET email = $2, role = $3, is_active = $4, updated_at = $5 WHERE id = $1",
        )
        .bind(user.id.into_uuid())
        .bind(&user.email)
        .bind(user.role.as_str())
        .bind(user.is_active)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| write_err(e, "Email is already in use"))?;
        require_row(result.rows_affected())
    }

    async fn count_users(&self) -> Result<i64, RepoError> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)
    }
}
