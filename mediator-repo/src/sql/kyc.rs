use async_trait::async_trait;
use sqlx::QueryBuilder;

use mediator_types::{KycProfile, KycProfileId, KycQuery, KycRepository, RepoError, UserId};

use super::types::{DbKycProfile, KYC_COLUMNS};
use super::{Db, SqlRepo, db_err, require_row, write_err};

const DUPLICATE_KYC: &str = "User already has a KYC profile or the mobile number is registered";

#[async_trait]
impl KycRepository for SqlRepo {
    async fn insert_kyc(&self, profile: &KycProfile) -> Result<(), RepoError> {
        sqlx::query(
            "INSERT INTO kyc_profiles \
             (id, user_id, full_name, mobile_number, date_of_birth, address, document_type, \
             document_number, status, rejection_reason, verified_at, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
        )
        .bind(profile.id.into_uuid())
        .bind(profile.user_id.into_uuid())
        .bind(&profile.full_name)
        .bind(&profile.mobile_number)
        .bind(profile.date_of_birth)
        .bind(&profile.address)
        .bind(profile.document_type.as_str())
        .bind(&profile.document_number)
        .bind(profile.status.as_str())
        .bind(&profile.rejection_reason)
        .bind(profile.verified_at)
        .bind(profile.created_at)
        .bind(profile.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| write_err(e, DUPLICATE_KYC))?;
        Ok(())
    }

    async fn get_kyc(&self, id: KycProfileId) -> Result<Option<KycProfile>, RepoError> {
        let sql = format!("SELECT {KYC_COLUMNS} FROM kyc_profiles WHERE id = $1");
        sqlx::query_as::<_, DbKycProfile>(&sql)
            .bind(id.into_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
            .map(DbKycProfile::into_domain)
            .transpose()
    }

    async fn find_kyc_by_user(&self, user_id: UserId) -> Result<Option<KycProfile>, RepoError> {
        let sql = format!("SELECT {KYC_COLUMNS} FROM kyc_profiles WHERE user_id = $1");
        sqlx::query_as::<_, DbKycProfile>(&sql)
            .bind(user_id.into_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
            .map(DbKycProfile::into_domain)
            .transpose()
    }

    async fn list_kyc(&self, query: &KycQuery) -> Result<Vec<KycProfile>, RepoError> {
        let mut qb =
            QueryBuilder::<Db>::new(format!("SELECT {KYC_COLUMNS} FROM kyc_profiles WHERE 1=1"));
        if let Some(status) = query.status {
            qb.push(" AND status = ").push_bind(status.as_str());
        }
        if let Some(user_id) = query.user_id {
            qb.push(" AND user_id = ").push_bind(user_id.into_uuid());
        }
        qb.push(" ORDER BY created_at DESC");

        qb.build_query_as::<DbKycProfile>()
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?
            .into_iter()
            .map(DbKycProfile::into_domain)
            .collect()
    }

    async fn update_kyc(&self, profile: &KycProfile) -> Result<(), RepoError> {
        let result = sqlx::query(
            "UPDATE kyc_profiles SET full_name = $2, mobile_number = $3, date_of_birth = $4, \
             address = $5, document_type = $6, document_number = $7, status = $8, \
             rejection_reason = $9, verified_at = $10, updated_at = $11 WHERE id = $1",
        )
        .bind(profile.id.into_uuid())
        .bind(&profile.full_name)
        .bind(&profile.mobile_number)
        .bind(profile.date_of_birth)
        .bind(&profile.address)
        .bind(profile.document_type.as_str())
        .bind(&profile.document_number)
        .bind(profile.status.as_str())
        .bind(&profile.rejection_reason)
        .bind(profile.verified_at)
        .bind(profile.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| write_err(e, DUPLICATE_KYC))?;
        require_row(result.rows_affected())
    }
}
