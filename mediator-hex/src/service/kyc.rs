use mediator_types::{
    AppError, AuditAction, KycDetails, KycProfile, KycProfileId, KycQuery, KycRequest,
    ProviderGateway, Repository,
};
use serde_json::json;

use super::{Caller, MediatorService, not_found};

impl<R: Repository, G: ProviderGateway> MediatorService<R, G> {
    #[tracing::instrument(skip(self, caller, req))]
    pub async fn create_kyc(
        &self,
        caller: &Caller,
        req: KycRequest,
    ) -> Result<KycProfile, AppError> {
        let subject = caller.owner_for(req.user_id)?;
        let profile = KycProfile::new(subject, details(req), self.now())?;
        self.repo.insert_kyc(&profile).await?;
        self.audit(
            Some(caller),
            AuditAction::Create,
            "kyc_profile",
            profile.id,
            json!({"user_id": subject, "document_type": profile.document_type}),
        )
        .await;
        Ok(profile)
    }

    pub async fn list_kyc(
        &self,
        caller: &Caller,
        mut query: KycQuery,
    ) -> Result<Vec<KycProfile>, AppError> {
        query.user_id = caller.scope(query.user_id);
        self.repo.list_kyc(&query).await.map_err(Into::into)
    }

    pub async fn get_kyc(&self, caller: &Caller, id: KycProfileId) -> Result<KycProfile, AppError> {
        self.repo
            .get_kyc(id)
            .await?
            .filter(|p| caller.can_see(p.user_id))
            .ok_or_else(|| not_found("KYC profile", id))
    }

    /// Replaces the submitted details; only while the profile is pending.
    #[tracing::instrument(skip(self, caller, req), fields(kyc_id = %id))]
    pub async fn update_kyc(
        &self,
        caller: &Caller,
        id: KycProfileId,
        req: KycRequest,
    ) -> Result<KycProfile, AppError> {
        let mut profile = self.get_kyc(caller, id).await?;
        profile.amend(details(req), self.now())?;
        self.repo.update_kyc(&profile).await?;
        self.audit(Some(caller), AuditAction::Update, "kyc_profile", profile.id, json!({}))
            .await;
        Ok(profile)
    }

    #[tracing::instrument(skip(self, caller), fields(kyc_id = %id))]
    pub async fn verify_kyc(
        &self,
        caller: &Caller,
        id: KycProfileId,
    ) -> Result<KycProfile, AppError> {
        caller.require_admin()?;
        let profile = self.apply_kyc_decision(id, None).await?;
        self.audit(
            Some(caller),
            AuditAction::StatusChange,
            "kyc_profile",
            profile.id,
            json!({"status": profile.status}),
        )
        .await;
        Ok(profile)
    }

    #[tracing::instrument(skip(self, caller, reason), fields(kyc_id = %id))]
    pub async fn reject_kyc(
        &self,
        caller: &Caller,
        id: KycProfileId,
        reason: String,
    ) -> Result<KycProfile, AppError> {
        caller.require_admin()?;
        let profile = self.apply_kyc_decision(id, Some(reason)).await?;
        self.audit(
            Some(caller),
            AuditAction::StatusChange,
            "kyc_profile",
            profile.id,
            json!({"status": profile.status, "reason": profile.rejection_reason}),
        )
        .await;
        Ok(profile)
    }

    /// Verifies the profile, or rejects it when a reason is given.
    pub(crate) async fn apply_kyc_decision(
        &self,
        id: KycProfileId,
        rejection: Option<String>,
    ) -> Result<KycProfile, AppError> {
        let mut profile = self
            .repo
            .get_kyc(id)
            .await?
            .ok_or_else(|| not_found("KYC profile", id))?;
        let now = self.now();
        match rejection {
            Some(reason) => profile.reject(reason, now)?,
            None => profile.verify(now)?,
        }
        self.repo.update_kyc(&profile).await?;
        Ok(profile)
    }
}

fn details(req: KycRequest) -> KycDetails {
    KycDetails {
        full_name: req.full_name,
        mobile_number: req.mobile_number,
        date_of_birth: req.date_of_birth,
        address: req.address,
        document_type: req.document_type,
        document_number: req.document_number,
    }
}
